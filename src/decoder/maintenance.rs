//! Periodic housekeeping for a running decoder.
//!
//! Three independent tasks: fragment GC, TCP assembler flush and the stats
//! report. All of them stop when the shutdown broadcast fires.

use super::tcp_assembly::IDLE_TIMEOUT;
use super::Decoder;
use crate::config::MaintenanceConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Running maintenance tasks
#[derive(Debug)]
pub struct MaintenanceHandle {
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Signal every task and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Spawn the maintenance tasks on the current tokio runtime.
pub fn spawn(decoder: Arc<Decoder>, config: &MaintenanceConfig) -> MaintenanceHandle {
    let (shutdown, _) = broadcast::channel(1);
    let mut tasks = Vec::with_capacity(3);

    let gc_timeout = config.fragment_timeout();
    tasks.push(spawn_periodic(
        "fragment-gc",
        config.fragment_gc_interval(),
        &shutdown,
        {
            let decoder = Arc::clone(&decoder);
            move || {
                let decoder = Arc::clone(&decoder);
                async move { collect_fragments(&decoder, gc_timeout) }
            }
        },
    ));

    let flush_age = config.tcp_flush_interval();
    tasks.push(spawn_periodic(
        "tcp-flush",
        config.tcp_flush_interval(),
        &shutdown,
        {
            let decoder = Arc::clone(&decoder);
            move || {
                let decoder = Arc::clone(&decoder);
                async move { flush_tcp(&decoder, flush_age) }
            }
        },
    ));

    tasks.push(spawn_periodic(
        "stats",
        config.stats_interval(),
        &shutdown,
        move || {
            let decoder = Arc::clone(&decoder);
            async move { info!(stats = %decoder.stats().report_line(), "decoder stats") }
        },
    ));

    MaintenanceHandle { shutdown, tasks }
}

fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: &broadcast::Sender<()>,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let mut rx = shutdown.subscribe();

    tokio::spawn(async move {
        let mut timer = timer(period);
        // The first tick completes immediately
        timer.tick().await;
        loop {
            tokio::select! {
                _ = timer.tick() => job().await,
                _ = rx.recv() => {
                    debug!(task = name, "maintenance task stopped");
                    break;
                }
            }
        }
    })
}

fn timer(period: Duration) -> Interval {
    let mut timer = interval(period.max(Duration::from_millis(1)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

fn cutoff(decoder: &Decoder, age: Duration) -> SystemTime {
    decoder
        .capture_clock()
        .checked_sub(age)
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Drop stale fragment sets and expired correlation state
pub fn collect_fragments(decoder: &Decoder, timeout: Duration) {
    let dropped = decoder.discard_fragments_older_than(cutoff(decoder, timeout));
    if dropped > 0 {
        debug!(dropped, "discarded incomplete fragment sets");
    }
    decoder.purge_dedup();
    decoder.correlator().purge_expired();
}

/// Deliver TCP data stuck behind gaps and close idle connections
pub fn flush_tcp(decoder: &Decoder, age: Duration) {
    let delivered = decoder.flush_tcp(cutoff(decoder, age), cutoff(decoder, IDLE_TIMEOUT));
    if delivered > 0 {
        debug!(delivered, "flushed TCP streams");
    }
}
