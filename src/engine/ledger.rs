//! Settlement ledger: append-only spin records and derived metrics.
//!
//! Metrics are a pure function of the starting bankroll and the record list.
//! `MetricsAccumulator` folds records one at a time for live progress;
//! `compute_metrics` is the same fold over a finished list, so both agree.
//! Virtual spins are counted but contribute nothing else: no bankroll
//! change, no win/loss, no stake statistics.

use rust_decimal::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::types::{Outcome, SettledBet, SpinRecord};

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Derived run performance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub starting_bankroll: Decimal,
    pub final_bankroll: Decimal,
    pub total_profit: Decimal,
    pub real_spins: u64,
    pub virtual_spins: u64,
    pub winning_spins: u64,
    pub losing_spins: u64,
    /// Real spins with zero aggregate profit (usually no wagers).
    pub push_spins: u64,
    /// `winning_spins / real_spins`, 0 when no real spin happened.
    pub win_rate: f64,
    pub peak_bankroll: Decimal,
    /// Spin at which the peak was first reached; 0 is the starting bankroll.
    pub peak_spin: u64,
    pub trough_bankroll: Decimal,
    pub trough_spin: u64,
    pub max_drawdown: Decimal,
    /// Largest drawdown as a percentage of the peak it fell from.
    pub max_drawdown_pct: f64,
    pub total_stake: Decimal,
    pub avg_stake: Decimal,
    pub max_stake: Decimal,
}

impl Metrics {
    pub fn return_pct(&self) -> f64 {
        if self.starting_bankroll.is_zero() {
            return 0.0;
        }
        (self.total_profit / self.starting_bankroll)
            .to_f64()
            .unwrap_or(0.0)
            * 100.0
    }

    /// Emit the summary as one structured log line.
    pub fn log_summary(&self) {
        info!(
            spins = self.real_spins,
            virtual_spins = self.virtual_spins,
            bankroll = format!("${:.2}", self.final_bankroll),
            profit = format!("${:.2}", self.total_profit),
            return_pct = format!("{:.2}%", self.return_pct()),
            win_rate = format!("{:.1}%", self.win_rate * 100.0),
            peak = format!("${:.2} @{}", self.peak_bankroll, self.peak_spin),
            trough = format!("${:.2} @{}", self.trough_bankroll, self.trough_spin),
            max_drawdown = format!("${:.2} ({:.2}%)", self.max_drawdown, self.max_drawdown_pct),
            avg_stake = format!("${:.2}", self.avg_stake),
            max_stake = format!("${:.2}", self.max_stake),
            "Run summary"
        );
    }
}

/// Incremental metrics fold.
#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    starting: Decimal,
    bankroll: Decimal,
    real_spins: u64,
    virtual_spins: u64,
    winning: u64,
    losing: u64,
    pushes: u64,
    peak: Decimal,
    peak_spin: u64,
    trough: Decimal,
    trough_spin: u64,
    max_drawdown: Decimal,
    max_drawdown_ratio: Decimal,
    total_stake: Decimal,
    max_stake: Decimal,
}

impl MetricsAccumulator {
    pub fn new(starting_bankroll: Decimal) -> Self {
        Self {
            starting: starting_bankroll,
            bankroll: starting_bankroll,
            real_spins: 0,
            virtual_spins: 0,
            winning: 0,
            losing: 0,
            pushes: 0,
            peak: starting_bankroll,
            peak_spin: 0,
            trough: starting_bankroll,
            trough_spin: 0,
            max_drawdown: Decimal::ZERO,
            max_drawdown_ratio: Decimal::ZERO,
            total_stake: Decimal::ZERO,
            max_stake: Decimal::ZERO,
        }
    }

    pub fn record(&mut self, record: &SpinRecord) {
        if record.is_virtual {
            self.virtual_spins += 1;
            return;
        }

        self.real_spins += 1;
        self.bankroll = record.bankroll_after;

        if record.profit > Decimal::ZERO {
            self.winning += 1;
        } else if record.profit < Decimal::ZERO {
            self.losing += 1;
        } else {
            self.pushes += 1;
        }

        // Totals saturate; a long run at extreme stakes must not panic.
        self.total_stake = self.total_stake.saturating_add(record.total_stake);
        if record.total_stake > self.max_stake {
            self.max_stake = record.total_stake;
        }

        // Strict comparisons keep the first spin an extreme was reached at.
        if self.bankroll > self.peak {
            self.peak = self.bankroll;
            self.peak_spin = record.spin;
        }
        if self.bankroll < self.trough {
            self.trough = self.bankroll;
            self.trough_spin = record.spin;
        }

        let drawdown = self.peak - self.bankroll;
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }
        if self.peak > Decimal::ZERO {
            let ratio = drawdown / self.peak;
            if ratio > self.max_drawdown_ratio {
                self.max_drawdown_ratio = ratio;
            }
        }
    }

    pub fn snapshot(&self) -> Metrics {
        let win_rate = if self.real_spins > 0 {
            self.winning as f64 / self.real_spins as f64
        } else {
            0.0
        };
        let avg_stake = if self.real_spins > 0 {
            self.total_stake / Decimal::from(self.real_spins)
        } else {
            Decimal::ZERO
        };

        Metrics {
            starting_bankroll: self.starting,
            final_bankroll: self.bankroll,
            total_profit: self.bankroll - self.starting,
            real_spins: self.real_spins,
            virtual_spins: self.virtual_spins,
            winning_spins: self.winning,
            losing_spins: self.losing,
            push_spins: self.pushes,
            win_rate,
            peak_bankroll: self.peak,
            peak_spin: self.peak_spin,
            trough_bankroll: self.trough,
            trough_spin: self.trough_spin,
            max_drawdown: self.max_drawdown,
            max_drawdown_pct: self.max_drawdown_ratio.to_f64().unwrap_or(0.0) * 100.0,
            total_stake: self.total_stake,
            avg_stake,
            max_stake: self.max_stake,
        }
    }
}

/// Full recompute over a record list.
pub fn compute_metrics(starting_bankroll: Decimal, records: &[SpinRecord]) -> Metrics {
    let mut acc = MetricsAccumulator::new(starting_bankroll);
    for record in records {
        acc.record(record);
    }
    acc.snapshot()
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Append-only spin records plus the real bankroll they imply.
#[derive(Debug, Clone)]
pub struct Ledger {
    bankroll: Decimal,
    records: Vec<SpinRecord>,
    metrics: MetricsAccumulator,
}

impl Ledger {
    pub fn new(starting_bankroll: Decimal) -> Self {
        Self {
            bankroll: starting_bankroll,
            records: Vec::new(),
            metrics: MetricsAccumulator::new(starting_bankroll),
        }
    }

    /// Current real bankroll.
    pub fn bankroll(&self) -> Decimal {
        self.bankroll
    }

    pub fn records(&self) -> &[SpinRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sequence number the next record will carry.
    pub fn next_spin(&self) -> u64 {
        self.records.len() as u64 + 1
    }

    /// Append one settled spin. Virtual spins record the shadow bankroll in
    /// `bankroll_after` but leave the real bankroll untouched.
    ///
    /// Returns `None`, and appends nothing, when the spin's totals or the
    /// resulting bankroll do not fit in a `Decimal`.
    pub fn append(
        &mut self,
        outcome: Outcome,
        bets: Vec<SettledBet>,
        is_virtual: bool,
    ) -> Option<&SpinRecord> {
        let profit = bets
            .iter()
            .try_fold(Decimal::ZERO, |acc, b| acc.checked_add(b.profit))?;
        let total_stake = bets
            .iter()
            .try_fold(Decimal::ZERO, |acc, b| acc.checked_add(b.wager.stake))?;
        let bankroll_before = self.bankroll;
        let bankroll_after = bankroll_before.checked_add(profit)?;

        let record = SpinRecord {
            spin: self.next_spin(),
            outcome,
            bankroll_before,
            bankroll_after,
            profit,
            total_stake,
            is_virtual,
            bets,
        };

        self.bankroll = record.real_bankroll_after();
        self.metrics.record(&record);
        self.records.push(record);
        self.records.last()
    }

    /// Live metrics, kept in step with every append.
    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
