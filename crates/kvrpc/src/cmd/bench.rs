use std::time::{Duration, Instant};

use kvrpc_rpc::{Datastore, DatastoreClient, MemoryDatastore};

use crate::cmd::BenchArgs;
use crate::exit::{client_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_bench, OpStats, OutputFormat};

pub fn run(args: BenchArgs, format: OutputFormat) -> CliResult<i32> {
    if args.iterations == 0 {
        return Err(CliError::new(USAGE, "--iterations must be greater than zero"));
    }

    let local = MemoryDatastore::new();
    let local_write = time_calls(args.iterations, |i| {
        local
            .write(i, payload(i))
            .map_err(|err| CliError::new(INTERNAL, format!("local write failed: {err}")))
    })?;
    let local_read = time_calls(args.iterations, |i| {
        local
            .read(i)
            .map(drop)
            .map_err(|err| CliError::new(INTERNAL, format!("local read failed: {err}")))
    })?;

    let mut remote = DatastoreClient::new(args.addr);
    let rpc_write = time_calls(args.iterations, |i| {
        remote
            .write(i, &payload(i))
            .map_err(|err| client_error("rpc write failed", err))
    })?;
    let rpc_read = time_calls(args.iterations, |i| {
        remote
            .read(i)
            .map(drop)
            .map_err(|err| client_error("rpc read failed", err))
    })?;

    tracing::debug!(iterations = args.iterations, "benchmark finished");

    let results = vec![
        summarize("write", "local", &local_write),
        summarize("read", "local", &local_read),
        summarize("write", "rpc", &rpc_write),
        summarize("read", "rpc", &rpc_read),
    ];
    let ratios = vec![
        ("write".to_string(), ratio(&results[2], &results[0])),
        ("read".to_string(), ratio(&results[3], &results[1])),
    ];

    print_bench(args.iterations, &results, &ratios, format);
    Ok(SUCCESS)
}

fn payload(i: u64) -> String {
    format!("test_data_{i}")
}

fn time_calls<F>(iterations: u64, mut call: F) -> CliResult<Vec<Duration>>
where
    F: FnMut(u64) -> CliResult<()>,
{
    let mut samples = Vec::with_capacity(usize::try_from(iterations).unwrap_or(0));
    for i in 0..iterations {
        let start = Instant::now();
        call(i)?;
        samples.push(start.elapsed());
    }
    Ok(samples)
}

fn summarize(operation: &str, mode: &'static str, samples: &[Duration]) -> OpStats {
    let total: Duration = samples.iter().sum();
    let count = samples.len() as u64;
    let min = samples.iter().min().copied().unwrap_or_default();
    let max = samples.iter().max().copied().unwrap_or_default();
    let average = if count == 0 {
        0.0
    } else {
        total.as_secs_f64() / count as f64
    };

    OpStats {
        operation: operation.to_string(),
        mode,
        count,
        total_secs: total.as_secs_f64(),
        average_secs: average,
        min_secs: min.as_secs_f64(),
        max_secs: max.as_secs_f64(),
    }
}

fn ratio(rpc: &OpStats, local: &OpStats) -> f64 {
    if local.average_secs > 0.0 {
        rpc.average_secs / local.average_secs
    } else {
        0.0
    }
}
