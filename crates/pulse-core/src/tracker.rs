//! Metrics tracker fed by the worker's hot paths.
//!
//! Callers invoke the `record_*` methods whenever an event happens (an
//! activation processed, bytes transferred, a loss computed). The snapshot
//! builder reads the aggregated views once per tick. Nothing here performs
//! I/O or suspends.
//!
//! Timestamps are seconds on a monotonic scale anchored at tracker creation.
//! Caller-supplied timestamps must use the same scale (see [`MetricsTracker::now`]).

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use crate::config::PulseConfig;
use crate::error::{Result, TelemetryError};

/// Guards the rate denominator against a zero elapsed time.
const RATE_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A single processed activation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivationSample {
    pub timestamp: f64,
    pub direction: Direction,
}

/// A loss value and the time it was recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossSample {
    pub timestamp: f64,
    pub value: f64,
}

/// Aggregate view over the retained loss samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub latest: f64,
}

/// Accumulates worker runtime statistics for the dashboard.
#[derive(Debug)]
pub struct MetricsTracker {
    epoch: Instant,
    activation_window: f64,
    loss_capacity: usize,
    current_layer: Option<u32>,
    current_phase: Option<String>,
    remote_epoch: Option<u64>,
    local_epoch: Option<u64>,
    run_id: Option<String>,
    forward_count: u64,
    backward_count: u64,
    download_bytes: u64,
    upload_bytes: u64,
    activations: VecDeque<ActivationSample>,
    losses: VecDeque<LossSample>,
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ACTIVATION_WINDOW_SECS, Self::DEFAULT_LOSS_CAPACITY)
    }
}

impl MetricsTracker {
    pub const DEFAULT_ACTIVATION_WINDOW_SECS: f64 = 300.0;
    pub const DEFAULT_LOSS_CAPACITY: usize = 50;

    pub fn new(activation_window_secs: f64, loss_capacity: usize) -> Self {
        Self {
            epoch: Instant::now(),
            activation_window: activation_window_secs,
            loss_capacity,
            current_layer: None,
            current_phase: None,
            remote_epoch: None,
            local_epoch: None,
            run_id: None,
            forward_count: 0,
            backward_count: 0,
            download_bytes: 0,
            upload_bytes: 0,
            activations: VecDeque::new(),
            losses: VecDeque::with_capacity(loss_capacity),
        }
    }

    /// Current time on the tracker's monotonic scale.
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    pub fn activation_window(&self) -> f64 {
        self.activation_window
    }

    pub fn loss_capacity(&self) -> usize {
        self.loss_capacity
    }

    // --- Recording -------------------------------------------------------

    pub fn record_forward(&mut self) {
        let now = self.now();
        self.record_forward_at(now);
    }

    pub fn record_forward_at(&mut self, timestamp: f64) {
        self.forward_count += 1;
        self.record_activation(Direction::Forward, timestamp);
    }

    pub fn record_backward(&mut self) {
        let now = self.now();
        self.record_backward_at(now);
    }

    pub fn record_backward_at(&mut self, timestamp: f64) {
        self.backward_count += 1;
        self.record_activation(Direction::Backward, timestamp);
    }

    /// Adds downloaded bytes. Negative counts are rejected and leave the total untouched.
    ///
    /// # Errors
    /// Returns `InvalidArgument` when `byte_count` is negative.
    pub fn record_download(&mut self, byte_count: i64) -> Result<()> {
        let bytes = non_negative(byte_count)?;
        self.download_bytes = self.download_bytes.saturating_add(bytes);
        Ok(())
    }

    /// Adds uploaded bytes. Negative counts are rejected and leave the total untouched.
    ///
    /// # Errors
    /// Returns `InvalidArgument` when `byte_count` is negative.
    pub fn record_upload(&mut self, byte_count: i64) -> Result<()> {
        let bytes = non_negative(byte_count)?;
        self.upload_bytes = self.upload_bytes.saturating_add(bytes);
        Ok(())
    }

    pub fn record_loss(&mut self, value: f64) {
        let now = self.now();
        self.record_loss_at(value, now);
    }

    pub fn record_loss_at(&mut self, value: f64, timestamp: f64) {
        if self.loss_capacity == 0 {
            return;
        }
        while self.losses.len() >= self.loss_capacity {
            self.losses.pop_front();
        }
        self.losses.push_back(LossSample { timestamp, value });
    }

    pub fn set_layer(&mut self, layer: Option<u32>) {
        self.current_layer = layer;
    }

    pub fn set_phase(&mut self, phase: Option<&str>) {
        self.current_phase = phase.map(str::to_owned);
    }

    pub fn set_remote_epoch(&mut self, epoch: Option<u64>) {
        self.remote_epoch = epoch;
    }

    pub fn set_local_epoch(&mut self, epoch: Option<u64>) {
        self.local_epoch = epoch;
    }

    pub fn set_run_id(&mut self, run_id: Option<&str>) {
        self.run_id = run_id.map(str::to_owned);
    }

    /// Restores counters and state fields and clears both sample sequences.
    ///
    /// The activation window and loss capacity are kept.
    pub fn reset(&mut self) {
        self.current_layer = None;
        self.current_phase = None;
        self.remote_epoch = None;
        self.local_epoch = None;
        self.run_id = None;

        self.forward_count = 0;
        self.backward_count = 0;
        self.download_bytes = 0;
        self.upload_bytes = 0;

        self.activations.clear();
        self.losses.clear();
    }

    // --- Aggregated views ------------------------------------------------

    pub fn forward_count(&self) -> u64 {
        self.forward_count
    }

    pub fn backward_count(&self) -> u64 {
        self.backward_count
    }

    pub fn total_activations(&self) -> u64 {
        self.forward_count + self.backward_count
    }

    pub fn download_bytes(&self) -> u64 {
        self.download_bytes
    }

    pub fn upload_bytes(&self) -> u64 {
        self.upload_bytes
    }

    pub fn current_layer(&self) -> Option<u32> {
        self.current_layer
    }

    pub fn current_phase(&self) -> Option<&str> {
        self.current_phase.as_deref()
    }

    pub fn remote_epoch(&self) -> Option<u64> {
        self.remote_epoch
    }

    pub fn local_epoch(&self) -> Option<u64> {
        self.local_epoch
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn activation_samples(&self) -> impl Iterator<Item = &ActivationSample> {
        self.activations.iter()
    }

    /// Activations per minute over the configured window.
    pub fn activation_rate(&mut self) -> f64 {
        let now = self.now();
        self.activation_rate_at(now, self.activation_window)
    }

    /// Activations per minute over `window_secs`.
    pub fn activation_rate_over(&mut self, window_secs: f64) -> f64 {
        let now = self.now();
        self.activation_rate_at(now, window_secs)
    }

    /// Activations per minute over `window_secs`, evaluated at `now`.
    ///
    /// Samples older than the window are pruned first. The denominator is
    /// `min(window, now - oldest)`, so a tracker with less history than the
    /// window is not diluted by the missing time.
    pub fn activation_rate_at(&mut self, now: f64, window_secs: f64) -> f64 {
        if !window_secs.is_finite() || window_secs <= 0.0 {
            return 0.0;
        }
        self.prune_activations(now, window_secs);

        let Some(oldest) = self.activations.front() else {
            return 0.0;
        };
        let elapsed = (now - oldest.timestamp).max(0.0) + RATE_EPSILON;
        let count = self
            .activations
            .iter()
            .filter(|sample| now - sample.timestamp <= window_secs)
            .count();
        if count == 0 {
            return 0.0;
        }

        count as f64 / window_secs.min(elapsed) * 60.0
    }

    /// Copy of the retained loss samples, oldest first.
    pub fn loss_history(&self) -> Vec<LossSample> {
        self.losses.iter().copied().collect()
    }

    pub fn loss_summary(&self) -> Option<LossSummary> {
        let latest = self.losses.back()?.value;
        let count = self.losses.len();
        let (min, max, sum) = self.losses.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), sample| (min.min(sample.value), max.max(sample.value), sum + sample.value),
        );
        Some(LossSummary {
            count,
            min,
            max,
            avg: sum / count as f64,
            latest,
        })
    }

    fn record_activation(&mut self, direction: Direction, timestamp: f64) {
        self.activations.push_back(ActivationSample {
            timestamp,
            direction,
        });
        self.prune_activations(timestamp, self.activation_window);
    }

    fn prune_activations(&mut self, now: f64, window_secs: f64) {
        let cutoff = now - window_secs;
        while self
            .activations
            .front()
            .is_some_and(|sample| sample.timestamp < cutoff)
        {
            self.activations.pop_front();
        }
    }
}

fn non_negative(byte_count: i64) -> Result<u64> {
    u64::try_from(byte_count).map_err(|_| {
        TelemetryError::InvalidArgument(format!(
            "byte count must be non-negative, got {byte_count}"
        ))
    })
}

/// Cloneable handle to a tracker shared between the worker and the pipeline.
///
/// All mutations take the exclusive lock; queries that only read take the
/// shared one. A writer that panicked does not make the data unreadable.
#[derive(Debug, Clone, Default)]
pub struct SharedTracker {
    inner: Arc<RwLock<MetricsTracker>>,
}

impl SharedTracker {
    pub fn new(tracker: MetricsTracker) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tracker)),
        }
    }

    /// Fresh tracker using the configured activation window and loss capacity.
    pub fn from_config(config: &PulseConfig) -> Self {
        Self::new(MetricsTracker::new(
            config.activation_window_secs,
            config.loss_history_size,
        ))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, MetricsTracker> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, MetricsTracker> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
