//! Shared-memory demo watcher: attaches to the producer's segment and polls
//! the per-dispenser codes until it sees end of stream.

use anyhow::Context;
use clap::Parser;
use kitline_shm::{code_label, Segment, END_OF_STREAM, SHM_KEY};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "shm-watch", version, about = "SysV shared-memory dispenser demo (watcher)")]
struct Args {
    /// Dispenser slots in the shared segment
    dispensers: usize,
    /// Microseconds between polls
    interval_us: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    anyhow::ensure!(args.dispensers > 0, "dispenser count must be positive");
    anyhow::ensure!(args.interval_us > 0, "interval must be positive");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Release))
            .context("failed to install the signal handler")?;
    }

    let segment =
        Segment::attach(SHM_KEY, args.dispensers).context("failed to attach the segment")?;
    let interval = Duration::from_micros(args.interval_us);

    while segment.read(0) != END_OF_STREAM && !stop.load(Ordering::Acquire) {
        std::thread::sleep(interval);
        let line: Vec<&str> = (0..segment.slots())
            .map(|slot| code_label(segment.read(slot)))
            .collect();
        println!("{}", line.join(" "));
    }

    println!("stream ended");
    Ok(())
}
