//! # Example: retry_with_backoff
//!
//! Demonstrates how [`RetryWhenOperator`] resubscribes a failing source
//! on the schedule of a [`TimedBackoff`] companion.
//!
//! The source fails twice before emitting, showing how backoff delay and
//! jitter are applied between resubscriptions.
//!
//! ## Flow
//! ```text
//! subscribe
//!   ├─► Flaky attempt=1 → on_error("boom #1")
//!   ├─► TimedBackoff: publish(BackoffScheduled{delay≈100ms})
//!   ├─► timer fires → publish(Resubscribing, attempt=1)
//!   │     ├─► Flaky attempt=2 → on_error("boom #2")
//!   │     ├─► publish(BackoffScheduled{delay≈200ms})
//!   │     └─► timer fires → publish(Resubscribing, attempt=2)
//!   ├─► Flaky attempt=3 → 1, 2, 3, 4, 5
//!   └─► on_complete
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example retry_with_backoff --features logging
//! ```

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use pullstream::{
    fail, from_iter, BackoffPolicy, BoundedSubscriber, Bus, Config, FlowError, JitterPolicy,
    LogWriter, Observe, ObserverSet, Publisher, PublisherRef, RetryWhenOperator, Sink,
    SubscriberRef, TimedBackoff, TimerRef, TokioTimer,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Source that fails its first two subscriptions.
struct Flaky {
    attempts: AtomicU64,
}

impl Publisher<u32> for Flaky {
    fn subscribe(&self, subscriber: SubscriberRef<u32>) {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        println!("[flaky] attempt {attempt}");

        if attempt <= 2 {
            println!("[flaky] simulated failure #{attempt}");
            fail::<u32>(FlowError::upstream(format!("boom #{attempt}"))).subscribe(subscriber);
        } else {
            from_iter(1u32..=5).subscribe(subscriber);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 1. Event bus with a logging observer listening on it
    let mut cfg = Config::default();
    cfg.bus_capacity = 100;
    let bus = Bus::from_config(&cfg);

    let observers: Vec<Arc<dyn Observe>> = vec![Arc::new(LogWriter)];
    let set = Arc::new(ObserverSet::new(observers, bus.clone()));
    let token = CancellationToken::new();
    let listener = set.listen(token.clone());

    // 2. Backoff: exponential from 100ms with equal jitter, at most 3 retries
    let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(2))
        .with_jitter(JitterPolicy::Equal);
    let timer: TimerRef = Arc::new(TokioTimer::new(tokio::runtime::Handle::current()));

    let backoff_bus = bus.clone();
    let control = move |errors: PublisherRef<FlowError>| -> PublisherRef<u64> {
        Arc::new(
            TimedBackoff::new(errors, policy, 3, Arc::clone(&timer)).with_bus(backoff_bus.clone()),
        )
    };

    // 3. Pipeline: flaky source, resubscribed on each backoff signal
    let source: PublisherRef<u32> = Arc::new(Flaky {
        attempts: AtomicU64::new(0),
    });
    let retried: PublisherRef<u32> =
        Arc::new(RetryWhenOperator::new(source, control).with_bus(bus.clone()));

    // 4. Consume with a prefetch window of 4
    let done = Arc::new(Notify::new());
    let on_error = Arc::clone(&done);
    let on_complete = Arc::clone(&done);
    let sink = Sink::new(|v: u32| println!("[main] received {v}"))
        .on_error(move |e| {
            println!("[main] failed: {e}");
            on_error.notify_one();
        })
        .on_complete(move || {
            println!("[main] completed");
            on_complete.notify_one();
        });

    let consumer = BoundedSubscriber::new(4, Arc::new(sink));
    consumer.subscribe_to(&retried);
    tokio::time::timeout(Duration::from_secs(10), done.notified()).await?;

    // 5. Let the observers drain, then stop them
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();
    listener.await?;
    if let Ok(set) = Arc::try_unwrap(set) {
        set.shutdown().await;
    }

    println!("[main] done.");
    Ok(())
}
