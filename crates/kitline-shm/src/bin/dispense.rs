//! Shared-memory demo producer: writes per-dispenser type codes into the
//! segment each interval until the budgets drain, then signals end of
//! stream.

use anyhow::Context;
use clap::Parser;
use kitline_shm::{code_label, Segment, EMPTY, END_OF_STREAM, KINDS, SHM_KEY};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "shm-dispense", version, about = "SysV shared-memory dispenser demo (producer)")]
struct Args {
    /// Dispenser slots in the shared segment
    dispensers: usize,
    /// SETs worth of parts to dispense
    sets: u32,
    /// Parts of kind A per SET
    parts_a: u32,
    /// Parts of kind B per SET
    parts_b: u32,
    /// Parts of kind C per SET
    parts_c: u32,
    /// Parts of kind D per SET
    parts_d: u32,
    /// Microseconds between dispensing events
    interval_us: u64,
    /// Seed for a reproducible stream (defaults to the clock)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    anyhow::ensure!(args.dispensers > 0, "dispenser count must be positive");
    anyhow::ensure!(args.interval_us > 0, "interval must be positive");

    let mut budgets: [u64; KINDS] = [args.parts_a, args.parts_b, args.parts_c, args.parts_d]
        .map(|per_set| u64::from(per_set) * u64::from(args.sets));
    let mut total: u64 = budgets.iter().sum();
    anyhow::ensure!(total > 0, "nothing to dispense");

    println!("dispensers: {}", args.dispensers);
    println!("total parts: {total}");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Release))
            .context("failed to install the signal handler")?;
    }

    let segment =
        Segment::create(SHM_KEY, args.dispensers).context("failed to create the segment")?;
    segment.fill(EMPTY);

    // Give watchers a moment to attach before the stream starts.
    std::thread::sleep(Duration::from_secs(2));

    let seed = args.seed.unwrap_or_else(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    });
    let mut rng = StdRng::seed_from_u64(seed);
    let interval = Duration::from_micros(args.interval_us);

    while total > 0 && !stop.load(Ordering::Acquire) {
        std::thread::sleep(interval);
        for slot in 0..args.dispensers {
            // One chance in five of dispensing nothing this interval.
            let choice = rng.gen_range(0..=KINDS);
            let code = match choice {
                kind if kind < KINDS && budgets[kind] > 0 => {
                    budgets[kind] -= 1;
                    total -= 1;
                    kind as i32 + 1
                }
                _ => EMPTY,
            };
            segment.write(slot, code);
            print!("{} ", code_label(code));
        }
        println!();
    }

    segment.fill(END_OF_STREAM);
    if stop.load(Ordering::Acquire) {
        println!("dispensers disconnected");
    } else {
        println!("all parts dispensed");
    }
    Ok(())
}
