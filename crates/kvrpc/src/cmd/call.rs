use kvrpc_rpc::{ClientConfig, RpcClient};

use crate::cmd::{parse_duration, parse_kwargs, parse_value, CallArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_result, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let connect_timeout = parse_duration(&args.timeout)?;
    let kwargs = parse_kwargs(&args.kwargs)?;
    let positional = args.args.iter().map(|raw| parse_value(raw)).collect();

    let mut client = RpcClient::with_config(
        args.addr,
        ClientConfig {
            connect_timeout: Some(connect_timeout),
            ..ClientConfig::default()
        },
    );

    let request_id = client.next_request_id();
    let result = client
        .call_with_kwargs(&args.method, positional, kwargs)
        .map_err(|err| client_error(&format!("{} failed", args.method), err))?;

    print_result(&args.method, request_id, &result, format);
    Ok(SUCCESS)
}
