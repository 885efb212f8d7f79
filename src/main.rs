use clap::Parser;
use log::info;
use rayon::prelude::*;
use std::thread;
use std::time::{Duration, Instant};

use memoizer::compose::{compose, identity};
use memoizer::Memoizer;

mod cli;
mod logging;

fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let output = f();
    (output, start.elapsed())
}

fn main() {
    // parse CLI arguments
    let args = cli::Args::parse();

    // set up logging
    logging::setup_logger(args.verbosity, args.log_output.clone());

    let delay = Duration::from_millis(args.delay_ms);
    let greet = move |x: &String| {
        // simulates a long running function
        thread::sleep(delay);
        format!("Hello {}", x)
    };

    // id . f == f . id == f
    let abcd = |_: &str| "abcd";
    println!("Identity check:");
    println!("{}", compose(identity, abcd)("input"));
    println!("{}\n", compose(abcd, identity)("input"));

    if let Some(first) = args.inputs.first() {
        let (output, elapsed) = timed(|| greet(first));
        println!("Sanity check ({:?}):\n{}\n", elapsed, output);
    }

    let memoizer = Memoizer::with_guarantee(args.guarantee);
    info!("{:?}", memoizer);
    let memo_greet = memoizer.memoize(greet);

    for input in &args.inputs {
        let callers = args.callers.max(1);
        let (outputs, elapsed) = timed(|| {
            (0..callers)
                .into_par_iter()
                .map(|_| memo_greet.call(input.clone()))
                .collect::<Vec<_>>()
        });
        println!("Slow, {} caller(s) ({:?}):", callers, elapsed);
        for output in outputs {
            println!("{}", output);
        }
        println!();

        let (outputs, elapsed) = timed(|| {
            (0..args.repeat)
                .map(|_| memo_greet.call(input.clone()))
                .collect::<Vec<_>>()
        });
        println!("Fast, {} call(s) ({:?}):", args.repeat, elapsed);
        for output in outputs {
            println!("{}", output);
        }
        println!();
    }

    let stats = memoizer.stats();
    info!("{:?}", stats);
    println!(
        "entries: {}, hits: {}, misses: {}, hit rate: {:.2}",
        stats.entries,
        stats.hits,
        stats.misses,
        stats.hit_rate()
    );
}
