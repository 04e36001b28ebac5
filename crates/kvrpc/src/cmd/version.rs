use kvrpc_frame::{DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
use kvrpc_rpc::Method;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("kvrpc {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let methods: Vec<&str> = Method::ALL.iter().map(|method| method.name()).collect();

    println!("name: kvrpc");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("KVRPC_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("features: async={}, cli=true", cfg!(feature = "async"));
    println!(
        "wire: {HEADER_SIZE}-byte big-endian length + JSON, max payload {DEFAULT_MAX_PAYLOAD} bytes"
    );
    println!("methods: {}", methods.join(", "));

    Ok(SUCCESS)
}
