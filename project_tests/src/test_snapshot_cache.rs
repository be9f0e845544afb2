//! # Snapshot Cache Smoke Run
//!
//! Drives the cache primitives of lib_aggregator against an in-process fake
//! provider: a scheduled fan-out over flaky resources publishing into a
//! snapshot store, and a post feed appending into a ring buffer. Prints a
//! PASS or FAIL line per check and exits non-zero on the first failure.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;

use lib_aggregator::buf::RingBuffer;
use lib_aggregator::core::{latest_version, FanOut, RetryPolicy, Scheduler, SnapshotStore};

/// Pretends to be a remote API: `flaky` fails on its first call, `dead`
/// always fails.
struct FakeProvider {
    calls: AtomicU32,
    counts: SnapshotStore<BTreeMap<String, u64>>,
    posts: RingBuffer<u32>,
}

impl FakeProvider {
    fn new() -> Result<Self> {
        Ok(Self {
            calls: AtomicU32::new(0),
            counts: SnapshotStore::new(),
            posts: RingBuffer::new(3)?,
        })
    }

    async fn refresh(self: Arc<Self>, cancel: CancellationToken) {
        let round = self.calls.fetch_add(1, Ordering::SeqCst);
        let fan_out = FanOut::new(2, RetryPolicy::new(2, Duration::from_millis(10)), cancel);
        let attempts = Arc::new(AtomicU32::new(0));

        let report = fan_out
            .run(
                "fake-counts",
                vec!["alpha".to_string(), "flaky".to_string(), "dead".to_string()],
                move |name: Arc<String>| {
                    let attempts = Arc::clone(&attempts);
                    async move {
                        match name.as_str() {
                            "dead" => Err("gone".to_string()),
                            "flaky" if attempts.fetch_add(1, Ordering::SeqCst) == 0 => Err("try again".to_string()),
                            _ => Ok((name.to_string(), u64::from(round) + 1)),
                        }
                    }
                },
                |map: &mut BTreeMap<String, u64>, (name, value): (String, u64)| {
                    map.insert(name, value);
                },
            )
            .await;

        if !report.cancelled {
            self.counts.store(report.aggregate);
        }
        self.posts.add(round);
    }
}

fn check(label: &str, ok: bool) -> Result<()> {
    if ok {
        println!("[PASS] {}", label);
        Ok(())
    } else {
        println!("[FAIL] {}", label);
        bail!("check failed: {}", label)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("[*] Snapshot cache smoke run");

    let provider = Arc::new(FakeProvider::new()?);
    check("store is empty before the first refresh", !provider.counts.is_ready())?;
    check("empty store serves a default value", provider.counts.load().is_empty())?;

    let scheduler = Scheduler::new();
    let job_provider = Arc::clone(&provider);
    let token = scheduler.cancellation_token();
    scheduler.schedule("fake-refresh", Duration::from_millis(200), true, move || {
        Arc::clone(&job_provider).refresh(token.clone())
    })?;

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let counts = provider.counts.load();
    check("snapshot published", provider.counts.is_ready())?;
    check("retried resource contributed", counts.contains_key("flaky"))?;
    check("failing resource left out", !counts.contains_key("dead"))?;
    check("healthy resource contributed", counts.get("alpha").is_some_and(|v| *v >= 1))?;

    scheduler.shutdown().await;
    check("scheduler stopped", scheduler.running_jobs() == 0)?;

    let rounds = provider.calls.load(Ordering::SeqCst);
    check("job ran repeatedly", rounds >= 3)?;
    check("ring buffer bounded", provider.posts.len() == 3)?;
    let newest = provider.posts.latest(1);
    check("ring buffer newest first", newest.first().copied() == Some(rounds - 1))?;

    let after = rounds;
    tokio::time::sleep(Duration::from_millis(400)).await;
    check("no runs after shutdown", provider.calls.load(Ordering::SeqCst) == after)?;

    let tags = ["latest", "v5.10.0", "5.9.1", "5.11.0-beta.1"];
    check("latest version skips beta", latest_version(&tags, false).as_deref() == Some("v5.10.0"))?;

    println!("[*] All checks passed");
    Ok(())
}
