use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use serde_json::{Map, Value};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod bench;
pub mod call;
pub mod serve;
pub mod shell;
pub mod version;

const DEFAULT_ADDR: &str = "127.0.0.1:9000";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve an in-memory datastore until interrupted.
    Serve(ServeArgs),
    /// Make a single RPC call and print the result.
    Call(CallArgs),
    /// Interactive read/write session against a server.
    Shell(ShellArgs),
    /// Compare local datastore calls with RPC calls.
    Bench(BenchArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::Shell(args) => shell::run(args),
        Command::Bench(args) => bench::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Runtime {
    /// One OS thread per connection.
    Threads,
    /// One tokio task per connection.
    Tokio,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on. Port 0 picks a free port.
    #[arg(long, env = "KVRPC_BIND", default_value = DEFAULT_ADDR)]
    pub bind: String,
    /// Connection handling model.
    #[arg(long, value_enum, default_value = "threads")]
    pub runtime: Runtime,
    /// Drop connections idle for longer than this (e.g. 30s, 500ms).
    #[arg(long)]
    pub read_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Server address.
    #[arg(long, env = "KVRPC_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,
    /// Method to invoke.
    pub method: String,
    /// Positional arguments, parsed as JSON when possible.
    #[arg(allow_negative_numbers = true)]
    pub args: Vec<String>,
    /// Named argument as NAME=VALUE. Repeatable.
    #[arg(long = "kwarg", value_name = "NAME=VALUE")]
    pub kwargs: Vec<String>,
    /// Connect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ShellArgs {
    /// Server address.
    #[arg(long, env = "KVRPC_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,
}

#[derive(Args, Debug)]
pub struct BenchArgs {
    /// Server address.
    #[arg(long, env = "KVRPC_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,
    /// Calls per operation.
    #[arg(long, default_value_t = 1000)]
    pub iterations: u64,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `2s`, `150ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Interpret a command-line argument as JSON, falling back to a string.
///
/// `3` is a number, `"3"` a string, and `abc` (not valid JSON) the string
/// `abc`.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Split `NAME=VALUE` pairs into a kwargs object.
pub fn parse_kwargs(pairs: &[String]) -> CliResult<Map<String, Value>> {
    let mut kwargs = Map::new();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            return Err(CliError::new(
                USAGE,
                format!("--kwarg expects NAME=VALUE, got {pair:?}"),
            ));
        };
        if name.is_empty() {
            return Err(CliError::new(USAGE, "--kwarg name must not be empty"));
        }
        if kwargs.insert(name.to_string(), parse_value(value)).is_some() {
            return Err(CliError::new(
                USAGE,
                format!("--kwarg {name} given more than once"),
            ));
        }
    }
    Ok(kwargs)
}
