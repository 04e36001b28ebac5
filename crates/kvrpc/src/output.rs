use std::io::IsTerminal;
use std::net::SocketAddr;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ListeningOutput<'a> {
    event: &'static str,
    addr: String,
    runtime: &'a str,
}

/// Announce the bound address. Scripts read the first stdout line to learn
/// the port when binding port 0.
pub fn print_listening(addr: SocketAddr, runtime: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ListeningOutput {
                event: "listening",
                addr: addr.to_string(),
                runtime,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Raw => println!("{addr}"),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("listening on {addr} ({runtime})");
        }
    }
}

#[derive(Serialize)]
struct CallOutput<'a> {
    method: &'a str,
    request_id: u64,
    result: &'a Value,
}

pub fn print_result(method: &str, request_id: u64, result: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CallOutput {
                method,
                request_id,
                result,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "REQUEST ID", "RESULT"])
                .add_row(vec![
                    method.to_string(),
                    request_id.to_string(),
                    value_preview(result),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let body = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
            println!("{method} (request {request_id}) => {body}");
        }
        OutputFormat::Raw => println!("{}", value_preview(result)),
    }
}

/// Timing summary for one operation.
#[derive(Debug, Clone, Serialize)]
pub struct OpStats {
    pub operation: String,
    pub mode: &'static str,
    pub count: u64,
    pub total_secs: f64,
    pub average_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
}

#[derive(Serialize)]
struct BenchOutput<'a> {
    iterations: u64,
    results: &'a [OpStats],
    ratios: &'a [(String, f64)],
}

pub fn print_bench(
    iterations: u64,
    results: &[OpStats],
    ratios: &[(String, f64)],
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            let out = BenchOutput {
                iterations,
                results,
                ratios,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OPERATION", "MODE", "COUNT", "TOTAL", "AVERAGE", "MIN", "MAX"]);
            for stats in results {
                table.add_row(vec![
                    stats.operation.clone(),
                    stats.mode.to_string(),
                    stats.count.to_string(),
                    micros(stats.total_secs),
                    micros(stats.average_secs),
                    micros(stats.min_secs),
                    micros(stats.max_secs),
                ]);
            }
            println!("{table}");
            for (operation, ratio) in ratios {
                println!("{operation}: rpc is {ratio:.1}x slower than local");
            }
        }
        OutputFormat::Pretty => {
            for stats in results {
                println!(
                    "{} [{}] count={} total={} avg={} min={} max={}",
                    stats.operation,
                    stats.mode,
                    stats.count,
                    micros(stats.total_secs),
                    micros(stats.average_secs),
                    micros(stats.min_secs),
                    micros(stats.max_secs)
                );
            }
            for (operation, ratio) in ratios {
                println!("{operation}: rpc/local = {ratio:.1}");
            }
        }
    }
}

fn value_preview(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn micros(secs: f64) -> String {
    format!("{:.2}us", secs * 1_000_000.0)
}
