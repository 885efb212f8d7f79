//! Command line interface of the demonstration binary.

use clap::Parser;
use memoizer::Guarantee;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Memoize a slow greeting and show slow and fast calls", long_about = None)]
pub struct Args {
    #[arg(
        value_name = "INPUT",
        default_values = ["world!", "is it me you're looking for?"],
        help = "Arguments passed to the greeting"
    )]
    pub inputs: Vec<String>,

    #[arg(
        short = 'd',
        long = "delay-ms",
        default_value_t = 1000,
        help = "Artificial delay of the greeting, in milliseconds"
    )]
    pub delay_ms: u64,

    #[arg(
        short = 'r',
        long = "repeat",
        default_value_t = 3,
        help = "Number of fast calls after the first one"
    )]
    pub repeat: usize,

    #[arg(
        short = 'c',
        long = "callers",
        default_value_t = 1,
        help = "Concurrent callers issuing the first call of each input"
    )]
    pub callers: usize,

    #[arg(
        short = 'g',
        long = "guarantee",
        value_enum,
        default_value = "exactly-once",
        help = "What concurrent first calls of the same input may do"
    )]
    pub guarantee: Guarantee,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase verbosity level"
    )]
    pub verbosity: u8,

    #[arg(
        long,
        short = 'l',
        value_name = "LOG_FILE",
        help = "Optional path to the log file. Defaults to stderr if not specified."
    )]
    pub log_output: Option<PathBuf>,
}
