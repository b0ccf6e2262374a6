//! Host services handed to strategies: logging and file persistence.
//!
//! Neither service can fail from the strategy's point of view. Log lines go
//! to `tracing` under the `strategy` target and into a bounded per-run buffer.
//! File writes are queued to one writer task per run, which applies them in
//! the order they were requested; the strategy never waits on them.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::storage::FileRepository;

/// Lines kept in a run's strategy log.
pub const STRATEGY_LOG_CAPACITY: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// One strategy-emitted log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub spin: u64,
    pub level: LogLevel,
    pub message: String,
}

/// Most recent strategy log lines of a run.
#[derive(Debug, Default)]
pub struct StrategyLog {
    lines: Mutex<VecDeque<LogLine>>,
}

impl StrategyLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: LogLine) {
        let mut lines = self.lines.lock().unwrap_or_else(|p| p.into_inner());
        if lines.len() == STRATEGY_LOG_CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Copy of the buffered lines, oldest first.
    pub fn lines(&self) -> Vec<LogLine> {
        self.lines
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum FileJob {
    Save { path: String, text: String, spin: u64 },
    Flush(oneshot::Sender<()>),
}

/// Drain queued writes in order until every sender is gone.
async fn write_files(
    repository: Arc<dyn FileRepository>,
    mut jobs: mpsc::UnboundedReceiver<FileJob>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            FileJob::Save { path, text, spin } => {
                if let Err(e) = repository.save(&path, &text).await {
                    warn!(path = %path, spin, error = %e, "Strategy file not persisted");
                }
            }
            FileJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

/// Services exposed to a strategy for the duration of one run.
pub struct HostServices {
    strategy: String,
    repository: Arc<dyn FileRepository>,
    log: Arc<StrategyLog>,
    spin: AtomicU64,
    /// Started on the first write so construction needs no runtime.
    writer: OnceLock<mpsc::UnboundedSender<FileJob>>,
}

impl HostServices {
    pub fn new(strategy: impl Into<String>, repository: Arc<dyn FileRepository>) -> Self {
        Self {
            strategy: strategy.into(),
            repository,
            log: Arc::new(StrategyLog::new()),
            spin: AtomicU64::new(0),
            writer: OnceLock::new(),
        }
    }

    /// Shared handle to this run's log buffer.
    pub fn log_buffer(&self) -> Arc<StrategyLog> {
        Arc::clone(&self.log)
    }

    /// Mark the spin the strategy is about to be invoked for.
    pub fn begin_spin(&self, spin: u64) {
        self.spin.store(spin, Ordering::Relaxed);
    }

    pub fn current_spin(&self) -> u64 {
        self.spin.load(Ordering::Relaxed)
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        let spin = self.current_spin();
        let strategy = self.strategy.as_str();
        match level {
            LogLevel::Debug => debug!(target: "strategy", strategy, spin, "{message}"),
            LogLevel::Info => info!(target: "strategy", strategy, spin, "{message}"),
            LogLevel::Warn => warn!(target: "strategy", strategy, spin, "{message}"),
            LogLevel::Error => error!(target: "strategy", strategy, spin, "{message}"),
        }
        self.log.push(LogLine {
            spin,
            level,
            message,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    fn writer(&self) -> Option<&mpsc::UnboundedSender<FileJob>> {
        if let Some(tx) = self.writer.get() {
            return Some(tx);
        }
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        Some(self.writer.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            runtime.spawn(write_files(Arc::clone(&self.repository), rx));
            tx
        }))
    }

    /// Queue `text` for `path`. Writes land in call order; failures are
    /// logged and otherwise ignored.
    pub fn persist(&self, path: impl Into<String>, text: impl Into<String>) {
        let path = path.into();
        let spin = self.current_spin();
        let Some(writer) = self.writer() else {
            warn!(path = %path, spin, "No runtime available, strategy file dropped");
            return;
        };
        let job = FileJob::Save {
            path,
            text: text.into(),
            spin,
        };
        if writer.send(job).is_err() {
            warn!(spin, "Strategy file writer stopped, file dropped");
        }
    }

    /// Wait until every write queued so far has been attempted.
    pub async fn flush(&self) {
        let Some(writer) = self.writer.get() else {
            return;
        };
        let (done, wait) = oneshot::channel();
        if writer.send(FileJob::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
