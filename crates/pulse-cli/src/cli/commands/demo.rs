//! Demo command: drives the dashboard from a simulated worker.
//!
//! The simulated worker cycles through training, weight upload and merge
//! phases, feeding the tracker the way a real training loop would.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use pulse_core::config::{PulseConfig, paths};
use pulse_core::logging::{self, LogTail};
use pulse_core::pipeline::{PipelineSettings, PipelineSupervisor};
use pulse_core::{ModelInfo, SharedTracker, SnapshotBuilder, WorkerStateProvider, WorkerStatus};
use pulse_tui::{TerminalSurface, terminal};
use tokio_util::sync::CancellationToken;

const STEPS_PER_EPOCH: u64 = 200;
const TRAINING_STEPS: u64 = 160;
const UPLOAD_STEPS: u64 = 20;
const DEMO_LAYER: u32 = 1;
const DEMO_HOTKEY: &str = "5DemoWorkerHotkeyF3sa2TJAWMqDhXG6jhV4N8ko9Sx";
const DEMO_RUN_ID: &str = "demo-run-0001";

/// Worker identity and model metadata of the simulated worker.
#[derive(Debug, Default)]
struct DemoProvider {
    needs_pull: AtomicBool,
}

impl WorkerStateProvider for DemoProvider {
    fn worker_status(&self) -> Result<WorkerStatus> {
        Ok(WorkerStatus {
            layer: Some(DEMO_LAYER),
            run_id: Some(DEMO_RUN_ID.to_string()),
            hotkey: Some(DEMO_HOTKEY.to_string()),
            need_to_pull_weights: self.needs_pull.load(Ordering::Relaxed),
        })
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            model_name: Some("llama-demo".to_string()),
            model_size: Some("1B".to_string()),
            total_params: Some(1_100_000_000),
            n_splits: Some(4),
            learning_rate: Some(3e-4),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DemoPhase {
    Training,
    Uploading,
    Merging,
}

impl DemoPhase {
    fn at(step: u64) -> Self {
        match step % STEPS_PER_EPOCH {
            s if s < TRAINING_STEPS => Self::Training,
            s if s < TRAINING_STEPS + UPLOAD_STEPS => Self::Uploading,
            _ => Self::Merging,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Training => "LayerPhase.TRAINING",
            Self::Uploading => "LayerPhase.WEIGHTS_UPLOADING",
            Self::Merging => "LayerPhase.MERGING_PARTITIONS",
        }
    }
}

/// Smoothly decaying loss with a little deterministic wobble.
fn simulated_loss(step: u64) -> f64 {
    let t = step as f64;
    2.5 * (-t / 400.0).exp() + 0.4 + 0.05 * (t * 0.37).sin()
}

async fn simulate(
    tracker: SharedTracker,
    provider: Arc<DemoProvider>,
    step: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(step);
    let mut previous = None;

    for n in 0u64.. {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let phase = DemoPhase::at(n);
        let epoch = n / STEPS_PER_EPOCH;
        if previous != Some(phase) {
            tracing::info!(phase = phase.name(), epoch, "worker phase changed");
            previous = Some(phase);
        }
        provider
            .needs_pull
            .store(phase == DemoPhase::Merging, Ordering::Relaxed);

        let mut t = tracker.write();
        t.set_phase(Some(phase.name()));
        t.set_local_epoch(Some(epoch));
        t.set_remote_epoch(Some(epoch));
        match phase {
            DemoPhase::Training => {
                t.record_forward();
                if n % 2 == 0 {
                    t.record_backward();
                    t.record_loss(simulated_loss(n));
                }
                t.record_download(256 * 1024)?;
            }
            DemoPhase::Uploading => t.record_upload(4 * 1024 * 1024)?,
            DemoPhase::Merging => t.record_download(1024 * 1024)?,
        }
    }
    Ok(())
}

async fn wait_for_exit(duration: Option<u64>) -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    match duration {
        Some(secs) => tokio::select! {
            result = ctrl_c => result.context("listen for Ctrl+C")?,
            () = tokio::time::sleep(Duration::from_secs(secs)) => {}
        },
        None => ctrl_c.await.context("listen for Ctrl+C")?,
    }
    Ok(())
}

pub async fn run(config: &PulseConfig, duration: Option<u64>, step_ms: u64) -> Result<()> {
    let tail = LogTail::new(config.log_tail_size);
    let _guard = logging::init(&paths::logs_dir(), &tail)?;
    tracing::info!(?duration, step_ms, "starting demo");

    terminal::install_panic_hook();
    let surface = TerminalSurface::new()?;

    let tracker = SharedTracker::from_config(config);
    let provider = Arc::new(DemoProvider::default());
    let builder = SnapshotBuilder::new(tracker.clone()).with_provider(provider.clone());
    let mut pipeline =
        PipelineSupervisor::new(builder, surface, PipelineSettings::from(config)).with_logs(tail);
    pipeline.start()?;

    let cancel = CancellationToken::new();
    let worker = tokio::spawn(simulate(
        tracker,
        provider,
        Duration::from_millis(step_ms.max(1)),
        cancel.clone(),
    ));

    let waited = wait_for_exit(duration).await;
    cancel.cancel();
    match worker.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!("simulated worker failed: {err:#}"),
        Err(err) => tracing::warn!("simulated worker task failed: {err}"),
    }
    pipeline.stop().await;
    tracing::info!("demo finished");
    waited
}
