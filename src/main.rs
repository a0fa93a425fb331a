extern crate env_logger;

use clap::{Parser, ValueEnum};

use std::io;
use std::process;

mod aggregate;
mod command;
mod cpulist;
mod lscpu;
mod metrics;
mod mpstat;
mod output;
mod topology;
mod util;

#[cfg(test)]
mod aggregate_test;

/// Aggregate the per-CPU rows of `mpstat -P ALL` into per-NUMA-node rows.
///
/// The report is read from stdin and the aggregated report written to stdout, eg
///
///   mpstat -P ALL 5 | mpnode --lscpu <(lscpu)
#[derive(Parser)]
#[command(author, version, about, long_about)]
struct Cli {
    /// File (or pipe) holding the output of lscpu or lscpu -p
    #[arg(long, required_unless_present = "lscpu_command", conflicts_with = "lscpu_command")]
    lscpu: Option<String>,

    /// Run this shell command to obtain the lscpu output instead of reading a file
    #[arg(long)]
    lscpu_command: Option<String>,

    /// What to do with rows for CPUs that are not on any node
    #[arg(long, value_enum, default_value_t = Unmapped::Drop)]
    unmapped: Unmapped,

    /// Do not copy the system-wide "all" rows to the output
    #[arg(long, default_value_t = false)]
    skip_all: bool,

    /// Sum these comma-separated columns across a node's CPUs, overriding the built-in table
    #[arg(long)]
    sum_columns: Option<String>,

    /// Average these comma-separated columns across a node's CPUs, overriding the built-in table
    #[arg(long)]
    mean_columns: Option<String>,

    /// Write CSV instead of an mpstat-like report
    #[arg(long, default_value_t = false)]
    csv: bool,

    /// Log debug information to stderr
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Unmapped {
    /// Ignore the rows
    Drop,
    /// Aggregate them into an extra group labeled "-"
    Bucket,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .parse_default_env()
        .init();

    let topology = match (&cli.lscpu, &cli.lscpu_command) {
        (Some(path), _) => lscpu::read_file(path),
        (None, Some(cmd)) => lscpu::run_command(cmd),
        (None, None) => {
            // clap enforces this
            log::error!("One of --lscpu and --lscpu-command is required");
            process::exit(2);
        }
    };
    let topology = match topology {
        Ok(t) => t,
        Err(e) => {
            log::error!("{e}");
            process::exit(1);
        }
    };

    let mut classifier = metrics::Classifier::new();
    for (names, aggregation) in [
        (&cli.sum_columns, metrics::Aggregation::Sum),
        (&cli.mean_columns, metrics::Aggregation::Mean),
    ] {
        if let Some(s) = names {
            for name in s.split(',').filter(|n| !n.is_empty()) {
                classifier = classifier.with_override(name, aggregation);
            }
        }
    }

    let options = aggregate::Options {
        format: if cli.csv {
            output::Format::Csv
        } else {
            output::Format::Text
        },
        unmapped: match cli.unmapped {
            Unmapped::Drop => aggregate::UnmappedPolicy::Drop,
            Unmapped::Bucket => aggregate::UnmappedPolicy::Bucket,
        },
        skip_all: cli.skip_all,
        classifier,
    };

    let mut aggregator = aggregate::Aggregator::new(&topology, options);
    let mut input = io::stdin().lock();
    let mut output = io::BufWriter::new(io::stdout().lock());
    match aggregate::run(&mut input, &mut output, &mut aggregator) {
        Ok(()) => {
            let unmapped = aggregator.unmapped_cpus();
            if !unmapped.is_empty() {
                log::debug!("Rows for CPUs {unmapped:?} had no NUMA node");
            }
            let unknown = aggregator.unknown_columns();
            if !unknown.is_empty() {
                log::debug!("Columns {unknown:?} were averaged by default");
            }
        }
        // The consumer went away (eg `| head`), that's a normal way to stop.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
        Err(e) => {
            log::error!("{e}");
            process::exit(1);
        }
    }
}
