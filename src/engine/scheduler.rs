//! Run scheduler. The spin loop and the handle that owns a run.
//!
//! Lifecycle: `idle -> running -> (completed | stopped)`, and back to `idle`
//! through `reset`. A spin is: check cancel/limits/bankroll, draw, ask the
//! strategy, re-check cancel, validate, settle, append. The loop yields to
//! the runtime every `yield_every` spins so cancellation is seen promptly.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::engine::ledger::{Ledger, Metrics, MetricsAccumulator};
use crate::engine::payout;
use crate::engine::source::{build_source, OutcomeSource};
use crate::engine::validator::BetValidator;
use crate::storage::FileRepository;
use crate::strategy::host::{HostServices, LogLine, StrategyLog};
use crate::strategy::{parse_decision, Strategy, StrategyContext, StrategyState};
use crate::types::{RunStatus, SimError, SpinRecord, StopReason};

// ---------------------------------------------------------------------------
// Spin loop
// ---------------------------------------------------------------------------

/// Everything a finished loop leaves behind.
#[derive(Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub ledger: Ledger,
    pub state: StrategyState,
}

/// Drive one run to completion. `on_spin` sees every appended record with
/// the metrics as of that record.
pub async fn run_spins<F>(
    config: &RunConfig,
    source: &mut dyn OutcomeSource,
    strategy: &mut dyn Strategy,
    host: &HostServices,
    cancel: &AtomicBool,
    mut on_spin: F,
) -> RunOutcome
where
    F: FnMut(&SpinRecord, &Metrics) + Send,
{
    let validator = BetValidator::new(config);
    let mut ledger = Ledger::new(config.starting_bankroll);
    let mut state = StrategyState::new();
    let yield_every = u64::from(config.yield_every.max(1));

    info!(
        strategy = strategy.name(),
        bankroll = %config.starting_bankroll,
        max_spins = config.max_spins,
        table = %config.table,
        "Run started"
    );

    let status = loop {
        if cancel.load(Ordering::SeqCst) {
            break RunStatus::stopped(StopReason::Cancelled);
        }
        if ledger.len() as u64 >= config.max_spins {
            break RunStatus::Completed;
        }
        if ledger.bankroll() <= Decimal::ZERO && !state.is_virtual() {
            break RunStatus::stopped(StopReason::BankrollExhausted);
        }
        let Some(outcome) = source.next_outcome() else {
            info!(spins = ledger.len(), "Outcome source exhausted");
            break RunStatus::Completed;
        };

        let spin = ledger.next_spin();
        host.begin_spin(spin);
        let ctx = StrategyContext {
            spin,
            history: ledger.records(),
            bankroll: ledger.bankroll(),
            config,
            state: &mut state,
            host,
        };
        let decision = match strategy.decide(ctx).await {
            Ok(value) => value,
            Err(e) => {
                error!(spin, error = %e, "Strategy failed, stopping run");
                break RunStatus::stopped(StopReason::StrategyError {
                    spin,
                    message: e.to_string(),
                });
            }
        };

        // Cancelled while the strategy was deciding: the spin never happened.
        if cancel.load(Ordering::SeqCst) {
            break RunStatus::stopped(StopReason::Cancelled);
        }

        let items = parse_decision(decision).unwrap_or_else(|reason| {
            warn!(spin, %reason, "Strategy yield ignored");
            Vec::new()
        });
        let mut proposed = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Ok(wager) => proposed.push(wager),
                Err(reason) => warn!(spin, %reason, "Unreadable wager dropped"),
            }
        }

        let is_virtual = state.is_virtual();
        let checked = validator.validate(proposed, ledger.bankroll(), is_virtual);
        for (wager, reason) in &checked.rejected {
            warn!(
                spin,
                category = %wager.category,
                stake = %wager.stake,
                %reason,
                "Wager dropped"
            );
        }

        let appended = payout::settle(&checked.accepted, &outcome)
            .and_then(|(bets, _)| ledger.append(outcome, bets, is_virtual))
            .is_some();
        if !appended {
            error!(spin, stake = %checked.total_stake(), "Settlement overflowed, stopping run");
            break RunStatus::stopped(StopReason::SettlementOverflow { spin });
        }

        let metrics = ledger.metrics();
        if let Some(record) = ledger.records().last() {
            debug!(
                spin,
                outcome = %record.outcome,
                stake = %record.total_stake,
                profit = %record.profit,
                bankroll = %record.real_bankroll_after(),
                is_virtual,
                "Spin settled"
            );
            on_spin(record, &metrics);
        }

        if spin % yield_every == 0 {
            tokio::task::yield_now().await;
        }
    };

    strategy.shutdown().await;
    info!(
        status = %status,
        spins = ledger.len(),
        bankroll = %ledger.bankroll(),
        "Run finished"
    );

    RunOutcome {
        status,
        ledger,
        state,
    }
}

// ---------------------------------------------------------------------------
// Run view
// ---------------------------------------------------------------------------

/// Lightweight progress, published on every spin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunProgress {
    pub run_id: Option<Uuid>,
    pub status: RunStatus,
    pub spins: u64,
    pub bankroll: Decimal,
}

/// Status fields of the current (or last) run, without records or log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunHeader {
    pub run_id: Option<Uuid>,
    pub strategy: Option<String>,
    pub status: RunStatus,
    pub spins: u64,
    pub bankroll: Decimal,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Full read model of the current (or last) run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: Option<Uuid>,
    pub strategy: Option<String>,
    pub status: RunStatus,
    pub bankroll: Decimal,
    pub metrics: Metrics,
    pub records: Vec<SpinRecord>,
    pub strategy_log: Vec<LogLine>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct RunView {
    run_id: Option<Uuid>,
    strategy: Option<String>,
    status: RunStatus,
    bankroll: Decimal,
    metrics: Metrics,
    records: Vec<SpinRecord>,
    log: Option<Arc<StrategyLog>>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Default for RunView {
    fn default() -> Self {
        Self {
            run_id: None,
            strategy: None,
            status: RunStatus::Idle,
            bankroll: Decimal::ZERO,
            metrics: MetricsAccumulator::new(Decimal::ZERO).snapshot(),
            records: Vec::new(),
            log: None,
            started_at: None,
            finished_at: None,
        }
    }
}

impl RunView {
    fn progress(&self) -> RunProgress {
        RunProgress {
            run_id: self.run_id,
            status: self.status.clone(),
            spins: self.records.len() as u64,
            bankroll: self.bankroll,
        }
    }
}

type SharedView = Arc<RwLock<RunView>>;

fn read(view: &RwLock<RunView>) -> RwLockReadGuard<'_, RunView> {
    view.read().unwrap_or_else(|p| p.into_inner())
}

fn write(view: &RwLock<RunView>) -> RwLockWriteGuard<'_, RunView> {
    view.write().unwrap_or_else(|p| p.into_inner())
}

// ---------------------------------------------------------------------------
// Run handle
// ---------------------------------------------------------------------------

struct ActiveRun {
    cancel: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Owns at most one run at a time and exposes its progress.
pub struct RunHandle {
    repository: Arc<dyn FileRepository>,
    view: SharedView,
    progress: Arc<watch::Sender<RunProgress>>,
    active: tokio::sync::Mutex<Option<ActiveRun>>,
    cancel_flag: Mutex<Arc<AtomicBool>>,
}

impl RunHandle {
    pub fn new(repository: Arc<dyn FileRepository>) -> Self {
        let view = RunView::default();
        let (progress, _) = watch::channel(view.progress());
        Self {
            repository,
            view: Arc::new(RwLock::new(view)),
            progress: Arc::new(progress),
            active: tokio::sync::Mutex::new(None),
            cancel_flag: Mutex::new(Arc::new(AtomicBool::new(false))),
        }
    }

    /// Validate `config`, stop any active run, and start a new one.
    pub async fn start(
        &self,
        config: RunConfig,
        strategy: Box<dyn Strategy>,
    ) -> Result<Uuid, SimError> {
        config.validate()?;

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            stop(previous).await;
        }

        let run_id = Uuid::new_v4();
        let cancel = Arc::new(AtomicBool::new(false));
        *self.cancel_flag.lock().unwrap_or_else(|p| p.into_inner()) = Arc::clone(&cancel);

        let host = HostServices::new(strategy.name(), Arc::clone(&self.repository));
        {
            let mut view = write(&self.view);
            *view = RunView {
                run_id: Some(run_id),
                strategy: Some(strategy.name().to_string()),
                status: RunStatus::Running,
                bankroll: config.starting_bankroll,
                metrics: MetricsAccumulator::new(config.starting_bankroll).snapshot(),
                records: Vec::new(),
                log: Some(host.log_buffer()),
                started_at: Some(Utc::now()),
                finished_at: None,
            };
            self.progress.send_replace(view.progress());
        }

        info!(%run_id, strategy = strategy.name(), "Run scheduled");

        let driver = tokio::spawn(drive(
            run_id,
            config,
            strategy,
            host,
            Arc::clone(&cancel),
            Arc::clone(&self.view),
            Arc::clone(&self.progress),
        ));
        let view = Arc::clone(&self.view);
        let progress = Arc::clone(&self.progress);
        let task = tokio::spawn(async move {
            if let Err(e) = driver.await {
                error!(%run_id, error = %e, "Run task aborted");
                let mut view = write(&view);
                if view.run_id == Some(run_id) && !view.status.is_terminal() {
                    view.status = RunStatus::stopped(StopReason::StrategyError {
                        spin: view.records.len() as u64 + 1,
                        message: format!("run task aborted: {e}"),
                    });
                    view.finished_at = Some(Utc::now());
                    progress.send_replace(view.progress());
                }
            }
        });

        *active = Some(ActiveRun { cancel, task });
        Ok(run_id)
    }

    /// Request cancellation of the active run. Returns immediately; the run
    /// stops at its next check.
    pub fn cancel(&self) {
        self.cancel_flag
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .store(true, Ordering::SeqCst);
        info!("Run cancellation requested");
    }

    /// Stop any active run and discard its ledger and state.
    pub async fn reset(&self) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            stop(previous).await;
        }
        let mut view = write(&self.view);
        *view = RunView::default();
        self.progress.send_replace(view.progress());
        info!("Run reset");
    }

    /// Wait until the current run is no longer running.
    pub async fn wait(&self) -> RunSnapshot {
        let mut rx = self.progress.subscribe();
        // Only fails if the sender is gone, which cannot outlive `self`.
        let _ = rx.wait_for(|p| p.status != RunStatus::Running).await;
        self.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunProgress> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> RunProgress {
        read(&self.view).progress()
    }

    pub fn header(&self) -> RunHeader {
        let view = read(&self.view);
        RunHeader {
            run_id: view.run_id,
            strategy: view.strategy.clone(),
            status: view.status.clone(),
            spins: view.records.len() as u64,
            bankroll: view.bankroll,
            started_at: view.started_at,
            finished_at: view.finished_at,
        }
    }

    pub fn status(&self) -> RunStatus {
        read(&self.view).status.clone()
    }

    pub fn metrics(&self) -> Metrics {
        read(&self.view).metrics.clone()
    }

    /// Page of spin records, `offset` counted from the first spin.
    pub fn spins(&self, offset: usize, limit: usize) -> Vec<SpinRecord> {
        let view = read(&self.view);
        view.records.iter().skip(offset).take(limit).cloned().collect()
    }

    pub fn strategy_log(&self) -> Vec<LogLine> {
        read(&self.view)
            .log
            .as_ref()
            .map(|log| log.lines())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let view = read(&self.view);
        RunSnapshot {
            run_id: view.run_id,
            strategy: view.strategy.clone(),
            status: view.status.clone(),
            bankroll: view.bankroll,
            metrics: view.metrics.clone(),
            records: view.records.clone(),
            strategy_log: view.log.as_ref().map(|log| log.lines()).unwrap_or_default(),
            started_at: view.started_at,
            finished_at: view.finished_at,
        }
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        self.cancel_flag
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .store(true, Ordering::SeqCst);
    }
}

async fn stop(run: ActiveRun) {
    run.cancel.store(true, Ordering::SeqCst);
    if let Err(e) = run.task.await {
        warn!(error = %e, "Previous run task did not shut down cleanly");
    }
}

async fn drive(
    run_id: Uuid,
    config: RunConfig,
    mut strategy: Box<dyn Strategy>,
    host: HostServices,
    cancel: Arc<AtomicBool>,
    view: SharedView,
    progress: Arc<watch::Sender<RunProgress>>,
) {
    let mut source = build_source(&config);
    let outcome = run_spins(
        &config,
        source.as_mut(),
        strategy.as_mut(),
        &host,
        &cancel,
        |record, metrics| {
            let mut view = write(&view);
            view.records.push(record.clone());
            view.bankroll = record.real_bankroll_after();
            view.metrics = metrics.clone();
            progress.send_replace(view.progress());
        },
    )
    .await;
    host.flush().await;

    let metrics = outcome.ledger.metrics();
    metrics.log_summary();

    let mut view = write(&view);
    if view.run_id != Some(run_id) {
        return;
    }
    view.status = outcome.status;
    view.bankroll = outcome.ledger.bankroll();
    view.metrics = metrics;
    view.finished_at = Some(Utc::now());
    progress.send_replace(view.progress());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
