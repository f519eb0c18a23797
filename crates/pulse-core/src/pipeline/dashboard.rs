use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::channel::SnapshotChannel;
use crate::logging::LogTail;
use crate::snapshot::Snapshot;

/// Once stalled, a fresh "waiting" placeholder is shown every this many ticks.
const STALL_REFRESH_TICKS: u32 = 20;

/// What a single renderer tick found in the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// At least one snapshot was queued; the newest one was kept.
    Received,
    /// Nothing new; the previous snapshot stays on screen.
    Idle,
    /// Nothing new for too long; a waiting placeholder was shown.
    Stalled,
}

/// Renderer-owned state: the snapshot on screen plus the chart histories.
#[derive(Debug)]
pub struct DashboardState {
    current: Option<Snapshot>,
    loss_history: VecDeque<f64>,
    rate_history: VecDeque<f64>,
    history_capacity: usize,
    empty_ticks: u32,
    stall_ticks: u32,
    started: Instant,
}

impl DashboardState {
    pub fn new(history_capacity: usize, stall_ticks: u32) -> Self {
        let history_capacity = history_capacity.max(1);
        Self {
            current: None,
            loss_history: VecDeque::with_capacity(history_capacity),
            rate_history: VecDeque::with_capacity(history_capacity),
            history_capacity,
            empty_ticks: 0,
            stall_ticks,
            started: Instant::now(),
        }
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    pub fn loss_history(&self) -> &VecDeque<f64> {
        &self.loss_history
    }

    pub fn rate_history(&self) -> &VecDeque<f64> {
        &self.rate_history
    }

    /// Consecutive ticks that found the channel empty.
    pub fn empty_ticks(&self) -> u32 {
        self.empty_ticks
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Drains the channel down to its newest snapshot and ingests it.
    ///
    /// After more than `stall_ticks` empty ticks a "waiting" placeholder is
    /// ingested: on the first stalled tick, then every 20 ticks, and on every
    /// stalled tick while nothing has ever been shown.
    pub fn tick(&mut self, channel: &SnapshotChannel) -> TickOutcome {
        if let Some(snapshot) = channel.drain_latest() {
            self.empty_ticks = 0;
            self.ingest(snapshot);
            return TickOutcome::Received;
        }

        self.empty_ticks = self.empty_ticks.saturating_add(1);
        if self.empty_ticks <= self.stall_ticks || !channel.is_empty() {
            return TickOutcome::Idle;
        }

        let stalled_for = self.empty_ticks - self.stall_ticks - 1;
        if self.current.is_some() && stalled_for % STALL_REFRESH_TICKS != 0 {
            return TickOutcome::Idle;
        }

        tracing::debug!(empty_ticks = self.empty_ticks, "no snapshots arriving");
        self.ingest(Snapshot::placeholder(format!(
            "Waiting for snapshots (none for {} ticks)",
            self.empty_ticks
        )));
        TickOutcome::Stalled
    }

    /// Makes `snapshot` current and extends the chart histories.
    ///
    /// Loss falls back to the running average when no latest value is known.
    /// Non-finite values are not charted.
    pub fn ingest(&mut self, snapshot: Snapshot) {
        let loss = snapshot
            .latest_loss
            .filter(|v| v.is_finite())
            .or(snapshot.loss_average.filter(|v| v.is_finite()));
        if let Some(loss) = loss {
            push_bounded(&mut self.loss_history, loss, self.history_capacity);
        }
        if snapshot.activation_rate.is_finite() {
            push_bounded(
                &mut self.rate_history,
                snapshot.activation_rate,
                self.history_capacity,
            );
        }
        self.current = Some(snapshot);
    }

    /// Borrowed view for one frame.
    pub fn view<'a>(&'a self, queue_depth: usize, logs: Option<&'a LogTail>) -> DashboardView<'a> {
        DashboardView {
            snapshot: self.current.as_ref(),
            loss_history: &self.loss_history,
            rate_history: &self.rate_history,
            uptime: self.uptime(),
            empty_ticks: self.empty_ticks,
            queue_depth,
            logs,
        }
    }
}

fn push_bounded(history: &mut VecDeque<f64>, value: f64, capacity: usize) {
    while history.len() >= capacity {
        history.pop_front();
    }
    history.push_back(value);
}

/// Everything a [`Surface`](super::Surface) needs to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct DashboardView<'a> {
    pub snapshot: Option<&'a Snapshot>,
    pub loss_history: &'a VecDeque<f64>,
    pub rate_history: &'a VecDeque<f64>,
    pub uptime: Duration,
    pub empty_ticks: u32,
    /// Snapshots still queued after this tick's drain.
    pub queue_depth: usize,
    pub logs: Option<&'a LogTail>,
}

impl DashboardView<'_> {
    pub fn loss_points(&self) -> Vec<f64> {
        self.loss_history.iter().copied().collect()
    }

    pub fn rate_points(&self) -> Vec<f64> {
        self.rate_history.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_loss(latest: Option<f64>, average: Option<f64>) -> Snapshot {
        Snapshot {
            latest_loss: latest,
            loss_average: average,
            activation_rate: 12.0,
            ..Snapshot::placeholder("metrics")
        }
    }

    #[test]
    fn test_tick_keeps_newest_snapshot_only() {
        let channel = SnapshotChannel::new(5);
        for i in 0..3 {
            channel.publish(Snapshot::placeholder(format!("snapshot-{i}")));
        }

        let mut state = DashboardState::new(50, 10);
        assert_eq!(state.tick(&channel), TickOutcome::Received);
        assert_eq!(state.current().unwrap().status_message, "snapshot-2");
        assert!(channel.is_empty());
        assert_eq!(state.rate_history().len(), 1);
    }

    #[test]
    fn test_loss_falls_back_to_average() {
        let mut state = DashboardState::new(50, 10);
        state.ingest(with_loss(Some(1.5), Some(2.0)));
        state.ingest(with_loss(None, Some(2.0)));
        state.ingest(with_loss(None, None));
        state.ingest(with_loss(Some(f64::NAN), None));

        assert_eq!(state.view(0, None).loss_points(), vec![1.5, 2.0]);
        assert_eq!(state.rate_history().len(), 4);
    }

    #[test]
    fn test_histories_are_bounded() {
        let mut state = DashboardState::new(3, 10);
        for i in 0..5 {
            state.ingest(with_loss(Some(f64::from(i)), None));
        }
        assert_eq!(state.view(0, None).loss_points(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_stall_placeholder_after_threshold() {
        let channel = SnapshotChannel::new(5);
        let mut state = DashboardState::new(50, 10);
        channel.publish(Snapshot::placeholder("real data"));
        assert_eq!(state.tick(&channel), TickOutcome::Received);

        for _ in 0..10 {
            assert_eq!(state.tick(&channel), TickOutcome::Idle);
        }
        assert_eq!(state.current().unwrap().status_message, "real data");

        assert_eq!(state.tick(&channel), TickOutcome::Stalled);
        assert_eq!(
            state.current().unwrap().status_message,
            "Waiting for snapshots (none for 11 ticks)"
        );

        let refreshed = (0..20).filter(|_| state.tick(&channel) == TickOutcome::Stalled).count();
        assert_eq!(refreshed, 1);
        assert_eq!(state.empty_ticks(), 31);
    }

    #[test]
    fn test_new_snapshot_resets_stall_counter() {
        let channel = SnapshotChannel::new(5);
        let mut state = DashboardState::new(50, 2);
        for _ in 0..5 {
            state.tick(&channel);
        }
        assert!(state.empty_ticks() > 2);

        channel.publish(Snapshot::placeholder("back"));
        assert_eq!(state.tick(&channel), TickOutcome::Received);
        assert_eq!(state.empty_ticks(), 0);
    }

    #[test]
    fn test_view_borrows_state() {
        let mut state = DashboardState::new(50, 10);
        state.ingest(with_loss(Some(0.5), None));
        let view = state.view(2, None);
        assert_eq!(view.queue_depth, 2);
        assert_eq!(view.loss_points(), vec![0.5]);
        assert_eq!(view.rate_points(), vec![12.0]);
        assert!(view.snapshot.is_some());
    }
}
