//! Ping-pong between worker pairs, then shut down mid-flight
//!
//! Each pair of workers bounces a ball back and forth as fast as the
//! mailboxes allow. After `PINGPONG_DURATION_MS` the processor is shut
//! down while balls are still in the air; in-flight posts are refused
//! and shutdown must finish promptly.
//!
//! Usage: `pingpong [balls-per-pair]`. Processor sizing comes from the
//! usual `SHARDLOOP_*` variables, log filtering from `RUST_LOG`. Set
//! `PINGPONG_PER_WORKER=0` to skip the per-worker breakdown.

use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use shardloop::env::{env_get, env_get_bool};
use shardloop::prelude::*;
use shardloop::RejectReason;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct Tally {
    hops: AtomicU64,
    retries: AtomicU64,
    dropped: AtomicU64,
}

/// Runs on one worker of a pair and sends a fresh ball to the other
struct Ball {
    on: WorkerId,
    tally: Arc<Tally>,
    /// Set while waiting for the peer's mailbox to free up
    retrying: bool,
}

impl Request for Ball {
    fn execute(&mut self, ctx: &mut LoopContext<'_>) -> Execution {
        if !self.retrying {
            self.tally.hops.fetch_add(1, Ordering::Relaxed);
        }
        let Some(processor) = ctx.processor() else {
            return Execution::Complete;
        };

        let next = Ball {
            on: self.on.peer(),
            tally: Arc::clone(&self.tally),
            retrying: false,
        };
        match processor.post_request(Box::new(next)) {
            Ok(()) => Execution::Complete,
            Err(err) if err.reason() == RejectReason::Full => {
                self.tally.retries.fetch_add(1, Ordering::Relaxed);
                self.retrying = true;
                Execution::Continue
            }
            Err(_) => {
                self.tally.dropped.fetch_add(1, Ordering::Relaxed);
                Execution::Complete
            }
        }
    }

    fn thread_affinity(&self, _num_workers: usize) -> ThreadAffinity {
        ThreadAffinity::Worker(self.on)
    }

    fn request_type(&self) -> RequestType {
        RequestType::new("PING_PONG")
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let balls_per_pair: usize = std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(4);
    let duration = Duration::from_millis(env_get("PINGPONG_DURATION_MS", 1_000));
    let per_worker = env_get_bool("PINGPONG_PER_WORKER", true);

    let settings = ProcessorSettings::from_env();
    if settings.num_workers < 2 {
        error!(num_workers = settings.num_workers, "ping-pong needs at least two workers");
        return ExitCode::FAILURE;
    }
    let mut processor = match Processor::new(settings) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "failed to start processor");
            return ExitCode::FAILURE;
        }
    };

    let pairs = processor.num_workers() / 2;
    info!(pairs, balls_per_pair, ?duration, "starting ping-pong");

    let tally = Arc::new(Tally::default());
    for pair in 0..pairs {
        for _ in 0..balls_per_pair {
            let ball = Ball {
                on: WorkerId::new(pair * 2),
                tally: Arc::clone(&tally),
                retrying: false,
            };
            if let Err(e) = processor.blocking_request(Box::new(ball)) {
                error!(error = %e, "failed to serve");
                return ExitCode::FAILURE;
            }
        }
    }

    std::thread::sleep(duration);

    let start = Instant::now();
    processor.shutdown();
    let shutdown_time = start.elapsed();

    let hops = tally.hops.load(Ordering::Relaxed);
    println!("=== Ping-Pong Results ===");
    println!("Hops:          {}", hops);
    println!("Hop rate:      {:.0}/sec", hops as f64 / duration.as_secs_f64());
    println!("Full retries:  {}", tally.retries.load(Ordering::Relaxed));
    println!("Refused posts: {}", tally.dropped.load(Ordering::Relaxed));
    println!("Shutdown time: {:?}", shutdown_time);
    if per_worker {
        println!();
        for (i, stats) in processor.stats().iter().enumerate() {
            println!("W{}: {}", i, stats);
        }
    }

    ExitCode::SUCCESS
}
