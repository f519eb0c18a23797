use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::channel::SnapshotChannel;
use crate::error::TelemetryError;
use crate::snapshot::{Snapshot, SnapshotBuilder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderSettings {
    pub interval: Duration,
    /// Consecutive failures after which the delay between ticks doubles.
    pub max_consecutive_errors: u32,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_consecutive_errors: 5,
        }
    }
}

/// Delay policy for the builder loop.
///
/// Once `threshold` builds in a row have failed, the delay doubles until the
/// next success resets the counter.
#[derive(Debug, Clone)]
pub struct BuildBackoff {
    interval: Duration,
    threshold: u32,
    consecutive_errors: u32,
}

impl BuildBackoff {
    pub fn new(interval: Duration, threshold: u32) -> Self {
        Self {
            interval,
            threshold,
            consecutive_errors: 0,
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Records a success and returns the next delay.
    pub fn on_success(&mut self) -> Duration {
        self.consecutive_errors = 0;
        self.delay()
    }

    /// Records a failure and returns the next delay.
    pub fn on_failure(&mut self) -> Duration {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.delay()
    }

    pub fn delay(&self) -> Duration {
        if self.consecutive_errors >= self.threshold {
            self.interval.saturating_mul(2)
        } else {
            self.interval
        }
    }
}

/// Builds and publishes a snapshot every tick until `cancel` fires.
///
/// A failed or panicking build publishes a placeholder carrying the error
/// count instead, so the renderer keeps receiving data.
pub async fn run_builder(
    builder: SnapshotBuilder,
    channel: Arc<SnapshotChannel>,
    settings: BuilderSettings,
    cancel: CancellationToken,
) {
    tracing::info!("snapshot builder started");
    let mut backoff = BuildBackoff::new(settings.interval, settings.max_consecutive_errors);
    let mut built: u64 = 0;
    let mut last_phase: Option<String> = None;

    while !cancel.is_cancelled() {
        let delay = match super::contain(TelemetryError::BuildFailure, || builder.build()) {
            Ok(snapshot) => {
                built += 1;
                let phase_changed = snapshot.phase != last_phase;
                log_progress(built, phase_changed, &snapshot);
                last_phase.clone_from(&snapshot.phase);
                channel.publish(snapshot);
                backoff.on_success()
            }
            Err(err) => {
                let delay = backoff.on_failure();
                let errors = backoff.consecutive_errors();
                tracing::warn!(errors, "error building snapshot: {err}");
                if delay > settings.interval {
                    tracing::warn!(?delay, "snapshot builder backing off");
                }
                channel.publish(Snapshot::placeholder(format!(
                    "Error building snapshot ({errors} errors)"
                )));
                delay
            }
        };

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    tracing::info!(built, "snapshot builder stopped");
}

fn log_progress(count: u64, phase_changed: bool, snapshot: &Snapshot) {
    if count == 1 || count % 10 == 0 || phase_changed {
        tracing::info!(
            count,
            phase = ?snapshot.phase,
            layer = ?snapshot.layer,
            run_id = ?snapshot.run_id,
            activations = snapshot.total_activations,
            "built snapshot"
        );
    } else {
        tracing::debug!(count, phase = ?snapshot.phase, "built snapshot");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use tokio::time::Instant;

    use super::*;
    use crate::snapshot::{WorkerStateProvider, WorkerStatus};
    use crate::tracker::SharedTracker;

    /// Fails the first `failures` calls and records when each call happened.
    struct FlakyProvider {
        failures: usize,
        calls: Mutex<Vec<Instant>>,
    }

    impl FlakyProvider {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_gaps(&self) -> Vec<Duration> {
            let calls = self.calls.lock().unwrap();
            calls.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    impl WorkerStateProvider for FlakyProvider {
        fn worker_status(&self) -> anyhow::Result<WorkerStatus> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Instant::now());
            if calls.len() <= self.failures {
                Err(anyhow!("state manager offline"))
            } else {
                Ok(WorkerStatus::default())
            }
        }
    }

    /// Panics on every status query.
    #[derive(Default)]
    struct PanickingProvider {
        calls: AtomicUsize,
    }

    impl WorkerStateProvider for PanickingProvider {
        fn worker_status(&self) -> anyhow::Result<WorkerStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("worker state is corrupt");
        }
    }

    #[test]
    fn test_backoff_doubles_from_threshold_until_success() {
        let interval = Duration::from_secs(1);
        let mut backoff = BuildBackoff::new(interval, 5);

        let delays: Vec<Duration> = (0..6).map(|_| backoff.on_failure()).collect();
        assert_eq!(delays[..4], [interval; 4]);
        assert_eq!(delays[4..], [interval * 2; 2]);

        assert_eq!(backoff.on_success(), interval);
        assert_eq!(backoff.consecutive_errors(), 0);
    }

    /// Six failing ticks: a placeholder per tick, doubled delay from the fifth.
    #[tokio::test(start_paused = true)]
    async fn test_failing_builds_publish_placeholders_and_back_off() {
        let provider = FlakyProvider::new(usize::MAX);
        let builder = SnapshotBuilder::new(SharedTracker::default()).with_provider(provider.clone());
        let channel = Arc::new(SnapshotChannel::new(16));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_builder(
            builder,
            Arc::clone(&channel),
            BuilderSettings::default(),
            cancel.clone(),
        ));
        // Ticks at 0, 1, 2, 3, 4 and (after the doubled delay) 6 seconds.
        tokio::time::sleep(Duration::from_millis(6_500)).await;
        cancel.cancel();
        task.await.unwrap();

        let secs = Duration::from_secs;
        assert_eq!(
            provider.call_gaps(),
            vec![secs(1), secs(1), secs(1), secs(1), secs(2)]
        );

        let messages: Vec<String> = channel
            .drain()
            .into_iter()
            .map(|s| s.status_message)
            .collect();
        let expected: Vec<String> = (1..=6)
            .map(|n| format!("Error building snapshot ({n} errors)"))
            .collect();
        assert_eq!(messages, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_provider_publishes_placeholders() {
        let provider = Arc::new(PanickingProvider::default());
        let builder = SnapshotBuilder::new(SharedTracker::default()).with_provider(provider.clone());
        let channel = Arc::new(SnapshotChannel::new(16));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_builder(
            builder,
            Arc::clone(&channel),
            BuilderSettings::default(),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert!(!task.is_finished());
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
        let messages: Vec<String> = channel
            .drain()
            .into_iter()
            .map(|s| s.status_message)
            .collect();
        let expected: Vec<String> = (1..=4)
            .map(|n| format!("Error building snapshot ({n} errors)"))
            .collect();
        assert_eq!(messages, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_failures_restores_interval() {
        let provider = FlakyProvider::new(5);
        let builder = SnapshotBuilder::new(SharedTracker::default()).with_provider(provider.clone());
        let channel = Arc::new(SnapshotChannel::new(16));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_builder(
            builder,
            Arc::clone(&channel),
            BuilderSettings::default(),
            cancel.clone(),
        ));
        // Failures at 0..=4, success at 6, next success at 7.
        tokio::time::sleep(Duration::from_millis(7_500)).await;
        cancel.cancel();
        task.await.unwrap();

        let gaps = provider.call_gaps();
        assert_eq!(gaps[4], Duration::from_secs(2));
        assert_eq!(gaps[5], Duration::from_secs(1));

        let last = channel.drain().pop().unwrap();
        assert_eq!(last.status_message, "Collecting worker metrics…");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let builder = SnapshotBuilder::new(SharedTracker::default());
        let channel = Arc::new(SnapshotChannel::new(4));
        let cancel = CancellationToken::new();
        let settings = BuilderSettings {
            interval: Duration::from_secs(3600),
            ..BuilderSettings::default()
        };

        let task = tokio::spawn(run_builder(builder, Arc::clone(&channel), settings, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let started = Instant::now();
        cancel.cancel();
        task.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(channel.len(), 1);
    }
}
