use std::sync::Arc;

use kvrpc_frame::FrameConfig;
use kvrpc_rpc::{AsyncRpcServer, Datastore, MemoryDatastore, RpcServer, ServerConfig};

use crate::cmd::{parse_duration, Runtime, ServeArgs};
use crate::exit::{io_error, rpc_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_listening, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let read_timeout = args.read_timeout.as_deref().map(parse_duration).transpose()?;
    let config = ServerConfig {
        frame: FrameConfig {
            read_timeout,
            ..FrameConfig::default()
        },
        ..ServerConfig::default()
    };
    let store: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());

    match args.runtime {
        Runtime::Threads => serve_threads(&args.bind, store, config, format),
        Runtime::Tokio => serve_tokio(&args.bind, store, config, format),
    }
}

fn serve_threads(
    bind: &str,
    store: Arc<dyn Datastore>,
    config: ServerConfig,
    format: OutputFormat,
) -> CliResult<i32> {
    let server = RpcServer::bind_with_config(bind, store, config)
        .map_err(|err| rpc_error("bind failed", err))?;

    let handle = server.handle();
    install_ctrlc_handler(move || {
        tracing::info!("interrupt received, stopping");
        handle.stop();
    })?;

    print_listening(server.local_addr(), "threads", format);
    server
        .serve()
        .map_err(|err| rpc_error("server failed", err))?;
    Ok(SUCCESS)
}

fn serve_tokio(
    bind: &str,
    store: Arc<dyn Datastore>,
    config: ServerConfig,
    format: OutputFormat,
) -> CliResult<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("kvrpc-worker")
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;

    runtime.block_on(async {
        let server = AsyncRpcServer::bind_with_config(bind, store, config)
            .await
            .map_err(|err| rpc_error("bind failed", err))?;

        let token = server.shutdown_token();
        install_ctrlc_handler(move || {
            tracing::info!("interrupt received, stopping");
            token.cancel();
        })?;

        print_listening(server.local_addr(), "tokio", format);
        server
            .serve()
            .await
            .map_err(|err| rpc_error("server failed", err))
    })?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler<F>(on_interrupt: F) -> CliResult<()>
where
    F: FnMut() + Send + 'static,
{
    ctrlc::set_handler(on_interrupt).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}
