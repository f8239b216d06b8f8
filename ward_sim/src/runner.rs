//! Run drivers - bounded tick runs and the console subscriber.

use crate::exporter::TickExport;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};
use ward_core::{
    Scheduler, SchedulerError, StoreError, Subscription, TierCounts, Tier, WardConfig,
};
use ward_env::WardContext;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Failed to open store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to write export: {0}")]
    Export(#[from] std::io::Error),
}

/// Drives up to `ticks` ticks on the caller's task, sleeping through the
/// scheduler's context between them.
///
/// Failed ticks count towards `ticks` and are followed by the error
/// backoff instead of the interval, as in the background loop. Raising
/// `shutdown` cuts the current sleep short; a tick already in progress
/// always runs to its broadcast.
pub async fn run_ticks<Ctx: WardContext>(
    scheduler: &Scheduler<Ctx>,
    config: &WardConfig,
    ticks: u64,
    export: &mut TickExport,
    shutdown: &mut watch::Receiver<bool>,
) {
    let ctx = scheduler.context();
    for i in 0..ticks {
        let stopping = *shutdown.borrow_and_update();
        if stopping {
            warn!(completed = i, requested = ticks, "Run stopped between ticks");
            break;
        }

        let pause = match scheduler.run_tick().await {
            Ok(report) => {
                export.add_frame(ctx.now().as_secs_f64(), report);
                config.tick_interval
            }
            Err(e) => {
                error!("Tick failed: {}", e);
                export.record_failure();
                config.error_backoff
            }
        };
        if i + 1 < ticks {
            tokio::select! {
                _ = ctx.sleep(pause) => {}
                Ok(()) = shutdown.changed() => {}
            }
        }
    }
}

/// Extracts the tier counts from a `vitals_update` message.
pub fn tier_counts(message: &str) -> Option<TierCounts> {
    let json: serde_json::Value = serde_json::from_str(message).ok()?;
    if json.get("type")?.as_str()? != "vitals_update" {
        return None;
    }
    let entries = json.get("data")?.as_object()?;
    let tiers = entries.values().filter_map(|entry| {
        serde_json::from_value::<Tier>(entry.get("status")?.clone()).ok()
    });
    Some(TierCounts::tally(tiers))
}

/// Logs a one-line summary for every message until the hub drops us.
pub async fn console_subscriber(mut subscription: Subscription) {
    info!(subscriber = %subscription.id(), "Console subscriber attached");
    while let Some(message) = subscription.recv().await {
        match tier_counts(&message) {
            Some(counts) => info!(
                "📡 {} patients | normal={} watch={} critical={}",
                counts.total(),
                counts.normal,
                counts.watch,
                counts.critical
            ),
            None => warn!("Unrecognized message: {}", message),
        }
    }
    info!("Console subscriber detached");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimContext;
    use std::sync::Arc;
    use std::time::Duration;
    use ward_core::{BroadcastHub, MemoryStore};

    async fn seeded_run(seed: u64, ticks: u64) -> (Vec<String>, TickExport) {
        let config = WardConfig::default()
            .with_cohort_size(10)
            .with_tick_interval(Duration::from_secs(3))
            .with_seed(seed);
        let scheduler = Scheduler::bootstrap(
            SimContext::shared(seed),
            &config,
            Arc::new(BroadcastHub::default()),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        let mut sub = scheduler.hub().subscribe();

        let (_stop, mut shutdown) = watch::channel(false);
        let mut export = TickExport::new(seed, 10, 3000);
        run_ticks(&scheduler, &config, ticks, &mut export, &mut shutdown).await;

        let mut messages = Vec::new();
        while let Some(message) = sub.try_recv() {
            messages.push(message);
        }
        (messages, export)
    }

    #[tokio::test]
    async fn test_same_seed_same_stream() {
        let (a, _) = seeded_run(42, 3).await;
        let (b, _) = seeded_run(42, 3).await;
        let (c, _) = seeded_run(43, 3).await;

        assert_eq!(a.len(), 3);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_virtual_clock_spaces_ticks() {
        let (messages, export) = seeded_run(5, 3).await;

        let stamps: Vec<String> = messages
            .iter()
            .map(|m| {
                let json: serde_json::Value = serde_json::from_str(m).unwrap();
                json["timestamp"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(
            stamps,
            vec![
                "2024-01-01T00:00:00.000Z",
                "2024-01-01T00:00:03.000Z",
                "2024-01-01T00:00:06.000Z",
            ]
        );
        assert_eq!(export.frames.len(), 3);
        approx::assert_abs_diff_eq!(export.duration_sec, 6.0);
    }

    #[tokio::test]
    async fn test_console_counts_match_batch() {
        let (messages, export) = seeded_run(9, 1).await;
        let counts = tier_counts(&messages[0]).unwrap();

        assert_eq!(counts.total(), 10);
        assert_eq!(counts, export.frames[0].report.tiers);
    }

    fn seeded_scheduler(seed: u64) -> (Scheduler<SimContext>, WardConfig) {
        let config = WardConfig::default().with_cohort_size(6).with_seed(seed);
        let scheduler = Scheduler::bootstrap(
            SimContext::shared(seed),
            &config,
            Arc::new(BroadcastHub::default()),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        (scheduler, config)
    }

    #[tokio::test]
    async fn test_raised_shutdown_runs_no_ticks() {
        let (scheduler, config) = seeded_scheduler(3);
        let (stop, mut shutdown) = watch::channel(false);
        stop.send_replace(true);

        let mut export = TickExport::new(3, 6, 3000);
        run_ticks(&scheduler, &config, 5, &mut export, &mut shutdown).await;

        assert!(export.frames.is_empty());
        assert_eq!(scheduler.status().ticks_completed, 0);
    }

    #[tokio::test]
    async fn test_shutdown_mid_run_keeps_whole_ticks() {
        let (scheduler, config) = seeded_scheduler(11);
        let mut sub = scheduler.hub().subscribe();
        let (stop, mut shutdown) = watch::channel(false);

        let mut export = TickExport::new(11, 6, 3000);
        let mut seen = Vec::new();
        tokio::join!(
            run_ticks(&scheduler, &config, 50, &mut export, &mut shutdown),
            async {
                if let Some(message) = sub.recv().await {
                    seen.push(message);
                }
                stop.send_replace(true);
            },
        );
        while let Some(message) = sub.try_recv() {
            seen.push(message);
        }

        assert!(!export.frames.is_empty());
        assert!(export.frames.len() < 50);
        assert_eq!(seen.len(), export.frames.len());
        for message in &seen {
            assert_eq!(tier_counts(message).unwrap().total(), 6);
        }
        assert_eq!(scheduler.status().ticks_completed, export.frames.len() as u64);
    }

    #[test]
    fn test_tier_counts_ignores_other_events() {
        assert!(tier_counts(r#"{"type":"status_change","patient_id":1,"status":"watch"}"#).is_none());
        assert!(tier_counts("not json").is_none());
    }
}
