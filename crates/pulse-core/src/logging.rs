//! Tracing setup.
//!
//! The dashboard owns the terminal, so formatted logs go to a daily rolling
//! file. A copy of every event also lands in a [`LogTail`] that the dashboard
//! shows in its log panel.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::channel::DropOldest;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "PULSE_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: String,
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// Bounded buffer of recent log lines; the oldest line is dropped when full.
#[derive(Debug, Clone)]
pub struct LogTail {
    lines: Arc<DropOldest<LogLine>>,
}

impl LogTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(DropOldest::new(capacity)),
        }
    }

    pub fn push(&self, line: LogLine) {
        self.lines.publish(line);
    }

    /// The newest `n` lines, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogLine> {
        self.lines.recent(n)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Copies every event into a [`LogTail`].
#[derive(Debug, Clone)]
pub struct LogTailLayer {
    tail: LogTail,
}

impl LogTailLayer {
    pub fn new(tail: LogTail) -> Self {
        Self { tail }
    }
}

impl<S> Layer<S> for LogTailLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.tail.push(LogLine {
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.finish(),
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.record_debug(field, &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
            return;
        }
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={value:?}", field.name());
    }
}

/// Installs the global subscriber: env filter, rolling file output and the log tail.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the background writer.
///
/// # Errors
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init(logs_dir: &Path, tail: &LogTail) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create log dir {}", logs_dir.display()))?;

    let appender = tracing_appender::rolling::daily(logs_dir, "pulse.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(LogTailLayer::new(tail.clone()))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
