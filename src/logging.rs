//! Logger setup of the demonstration binary.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::File;
use std::path::PathBuf;

fn level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

// Falls back to stderr when the log file cannot be created.
fn target(log_output: Option<PathBuf>) -> Target {
    let Some(path) = log_output else {
        return Target::Stderr;
    };
    match File::create(&path) {
        Ok(file) => Target::Pipe(Box::new(file)),
        Err(e) => {
            eprintln!("Could not create log file at {}: {}. Logging to stderr.", path.display(), e);
            Target::Stderr
        }
    }
}

/// Sets up the logger. `RUST_LOG` is read first, the verbosity count overrides it.
pub fn setup_logger(verbosity: u8, log_output: Option<PathBuf>) {
    Builder::from_default_env()
        .format_timestamp_millis()
        .filter_level(level(verbosity))
        .target(target(log_output))
        .init();
}
