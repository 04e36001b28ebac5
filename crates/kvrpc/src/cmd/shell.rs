use std::io::{self, BufRead, IsTerminal, Write};

use kvrpc_rpc::{ClientError, DatastoreClient};

use crate::cmd::ShellArgs;
use crate::exit::{io_error, CliResult, SUCCESS};

const HELP: &str = "commands:
  write <index> <data>  store data at index
  read <index>          print data stored at index
  help                  show this message
  quit                  exit";

#[derive(Debug, PartialEq, Eq)]
enum ShellCommand {
    Write { index: u64, data: String },
    Read { index: u64 },
    Help,
    Quit,
    Empty,
}

fn parse_line(line: &str) -> Result<ShellCommand, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim_start()),
        None => (line, ""),
    };

    match verb {
        "" => Ok(ShellCommand::Empty),
        "quit" | "exit" => Ok(ShellCommand::Quit),
        "help" => Ok(ShellCommand::Help),
        "read" => {
            if rest.is_empty() || rest.contains(char::is_whitespace) {
                return Err("usage: read <index>".to_string());
            }
            Ok(ShellCommand::Read {
                index: parse_index(rest)?,
            })
        }
        "write" => {
            let Some((index, data)) = rest.split_once(char::is_whitespace) else {
                return Err("usage: write <index> <data>".to_string());
            };
            Ok(ShellCommand::Write {
                index: parse_index(index)?,
                data: data.trim_start().to_string(),
            })
        }
        other => Err(format!("unknown command {other:?}; try help")),
    }
}

fn parse_index(raw: &str) -> Result<u64, String> {
    raw.parse()
        .map_err(|_| format!("invalid index {raw:?}: expected a non-negative integer"))
}

fn describe(err: &ClientError) -> String {
    match err {
        ClientError::Remote { kind, message } => format!("remote error ({kind}): {message}"),
        other => other.to_string(),
    }
}

/// Drive one session. Errors are reported on `out` and the loop continues;
/// only I/O failures on `input`/`out` end it early.
fn run_session<R, W>(
    client: &mut DatastoreClient,
    input: R,
    mut out: W,
    prompt: bool,
) -> io::Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        if prompt {
            write!(out, "> ")?;
            out.flush()?;
        }
        let Some(line) = lines.next().transpose()? else {
            return Ok(());
        };

        match parse_line(&line) {
            Ok(ShellCommand::Empty) => {}
            Ok(ShellCommand::Quit) => return Ok(()),
            Ok(ShellCommand::Help) => writeln!(out, "{HELP}")?,
            Ok(ShellCommand::Write { index, data }) => match client.write(index, &data) {
                Ok(()) => writeln!(out, "ok: wrote {} bytes at {index}", data.len())?,
                Err(err) => writeln!(out, "error: {}", describe(&err))?,
            },
            Ok(ShellCommand::Read { index }) => match client.read(index) {
                Ok(data) => writeln!(out, "{data}")?,
                Err(err) => writeln!(out, "error: {}", describe(&err))?,
            },
            Err(usage) => writeln!(out, "error: {usage}")?,
        }
    }
}

pub fn run(args: ShellArgs) -> CliResult<i32> {
    let mut client = DatastoreClient::new(args.addr);
    let stdin = io::stdin();
    let prompt = stdin.is_terminal();
    if prompt {
        println!("{HELP}");
    }

    run_session(&mut client, stdin.lock(), io::stdout().lock(), prompt)
        .map_err(|err| io_error("shell i/o failed", err))?;
    Ok(SUCCESS)
}
