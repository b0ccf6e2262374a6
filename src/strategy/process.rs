//! External-program strategies.
//!
//! The program is spawned once per run and talks line-delimited JSON. Each
//! request carries the spin index, the real bankroll, the persistent state,
//! and the spin records settled since the previous request; the run config
//! is sent with the first request only. Each response line may carry:
//!
//! ```json
//! {"wagers": [...], "state": {...}, "logs": ["..."], "files": [{"path": "...", "text": "..."}]}
//! ```
//!
//! `{"error": "..."}`, a line that is not JSON, or the program exiting is a
//! strategy error.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use super::host::LogLevel;
use super::{Strategy, StrategyContext, StrategyError, StrategyState};
use crate::config::RunConfig;
use crate::types::{SimError, SpinRecord};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct Request<'a> {
    spin: u64,
    bankroll: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a RunConfig>,
    state: &'a StrategyState,
    history: &'a [SpinRecord],
}

#[derive(Debug, Default, Deserialize)]
struct Response {
    #[serde(default)]
    wagers: Value,
    #[serde(default)]
    state: Option<Map<String, Value>>,
    #[serde(default)]
    logs: Vec<ResponseLog>,
    #[serde(default)]
    files: Vec<ResponseFile>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseLog {
    Text(String),
    Line {
        #[serde(default)]
        level: LogLevel,
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct ResponseFile {
    path: String,
    text: String,
}

/// Strategy backed by a child process.
pub struct ProcessStrategy {
    name: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    /// History records already sent.
    sent: usize,
    config_sent: bool,
}

impl ProcessStrategy {
    /// Spawn `program`. Must be called inside a tokio runtime.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, SimError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SimError::StrategyLoad(format!("failed to spawn {program}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SimError::StrategyLoad("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SimError::StrategyLoad("child stdout unavailable".into()))?;

        debug!(program, pid = ?child.id(), "Strategy process spawned");

        Ok(Self {
            name: program.to_string(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            sent: 0,
            config_sent: false,
        })
    }

    async fn exchange(&mut self, line: String) -> Result<Response, StrategyError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| StrategyError::Process("process already shut down".into()))?;
        let io = |e: std::io::Error| StrategyError::Process(e.to_string());
        stdin.write_all(line.as_bytes()).await.map_err(io)?;
        stdin.write_all(b"\n").await.map_err(io)?;
        stdin.flush().await.map_err(io)?;

        let reply = self
            .stdout
            .next_line()
            .await
            .map_err(io)?
            .ok_or_else(|| StrategyError::Process("process exited without answering".into()))?;

        serde_json::from_str(&reply)
            .map_err(|e| StrategyError::Process(format!("invalid response {reply:?}: {e}")))
    }
}

#[async_trait]
impl Strategy for ProcessStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(&mut self, mut ctx: StrategyContext<'_>) -> Result<Value, StrategyError> {
        let start = self.sent.min(ctx.history.len());
        let request = Request {
            spin: ctx.spin,
            bankroll: ctx.bankroll,
            config: (!self.config_sent).then_some(ctx.config),
            state: &*ctx.state,
            history: &ctx.history[start..],
        };
        let line = serde_json::to_string(&request)
            .map_err(|e| StrategyError::Process(format!("request encoding: {e}")))?;

        let response = self.exchange(line).await?;
        self.config_sent = true;
        self.sent = ctx.history.len();

        if let Some(message) = response.error {
            return Err(StrategyError::Failed(message));
        }
        if let Some(state) = response.state {
            ctx.state.replace(state);
        }
        for log in response.logs {
            match log {
                ResponseLog::Text(message) => ctx.host.log(LogLevel::Info, message),
                ResponseLog::Line { level, message } => ctx.host.log(level, message),
            }
        }
        for file in response.files {
            ctx.host.persist(file.path, file.text);
        }

        Ok(response.wagers)
    }

    async fn shutdown(&mut self) {
        // Closing stdin is the signal to exit.
        self.stdin.take();
        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(program = %self.name, %status, "Strategy process exited"),
            Ok(Err(e)) => warn!(program = %self.name, error = %e, "Strategy process wait failed"),
            Err(_) => {
                warn!(program = %self.name, "Strategy process did not exit, killing");
                if let Err(e) = self.child.kill().await {
                    warn!(program = %self.name, error = %e, "Strategy process kill failed");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
