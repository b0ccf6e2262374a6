//! Configuration loading from TOML.
//!
//! `AppConfig` mirrors the on-disk `spinlab.toml` layout. `RunConfig` is the
//! engine-facing snapshot taken when a run starts; it is immutable for the
//! duration of the run and read-only to strategies.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::storage::history;
use crate::strategy::StrategySource;
use crate::types::{Pocket, SimError, TableVariant};

/// Spins processed between cooperative yields when not configured.
pub const DEFAULT_YIELD_EVERY: u32 = 16;

// ---------------------------------------------------------------------------
// Engine-facing run configuration
// ---------------------------------------------------------------------------

/// Table limits applied by the bet validator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetLimits {
    /// Minimum stake for straight/split/street/corner/line.
    pub min_inside: Decimal,
    /// Minimum stake for color/parity/range/dozen/column.
    pub min_outside: Decimal,
    /// Maximum stake for any single wager.
    pub max_stake: Decimal,
}

impl Default for BetLimits {
    fn default() -> Self {
        Self {
            min_inside: dec!(1),
            min_outside: dec!(5),
            max_stake: dec!(500),
        }
    }
}

/// What to do with a wager that exceeds the remaining real bankroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverBudgetPolicy {
    /// Shrink the stake to whatever bankroll remains.
    #[default]
    Clamp,
    /// Drop the wager entirely.
    Drop,
}

/// Slice of an imported history to replay.
///
/// Offsets are 0-based and `end` is exclusive. With `from_end`, both
/// offsets count back from the newest entry, but draws are still replayed
/// oldest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ImportRange {
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub end: Option<usize>,
    #[serde(default)]
    pub from_end: bool,
}

impl ImportRange {
    /// Apply the range to `items`, clamping out-of-range offsets.
    pub fn apply<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let len = items.len();
        let start = self.start.min(len);
        let end = self.end.unwrap_or(len).min(len);
        if end <= start {
            return &[];
        }
        if self.from_end {
            &items[len - end..len - start]
        } else {
            &items[start..end]
        }
    }
}

/// Where outcomes come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    /// Uniform draws; seeded for reproducible runs.
    Synthetic {
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Previously recorded draws.
    Imported {
        numbers: Vec<Pocket>,
        #[serde(default)]
        range: ImportRange,
    },
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::Synthetic { seed: None }
    }
}

/// Snapshot of everything a run needs. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub starting_bankroll: Decimal,
    pub max_spins: u64,
    #[serde(default)]
    pub table: TableVariant,
    #[serde(default)]
    pub limits: BetLimits,
    #[serde(default)]
    pub source: DataSource,
    #[serde(default)]
    pub over_budget: OverBudgetPolicy,
    #[serde(default = "default_yield_every")]
    pub yield_every: u32,
}

fn default_yield_every() -> u32 {
    DEFAULT_YIELD_EVERY
}

impl RunConfig {
    /// Single-zero table, default limits, unseeded synthetic draws.
    pub fn new(starting_bankroll: Decimal, max_spins: u64) -> Self {
        Self {
            starting_bankroll,
            max_spins,
            table: TableVariant::default(),
            limits: BetLimits::default(),
            source: DataSource::default(),
            over_budget: OverBudgetPolicy::default(),
            yield_every: DEFAULT_YIELD_EVERY,
        }
    }

    pub fn with_table(mut self, table: TableVariant) -> Self {
        self.table = table;
        self
    }

    pub fn with_limits(mut self, limits: BetLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_source(mut self, source: DataSource) -> Self {
        self.source = source;
        self
    }

    /// Replay a fixed list of draws from the start.
    pub fn with_draws(self, numbers: Vec<Pocket>) -> Self {
        self.with_source(DataSource::Imported {
            numbers,
            range: ImportRange::default(),
        })
    }

    pub fn with_over_budget(mut self, policy: OverBudgetPolicy) -> Self {
        self.over_budget = policy;
        self
    }

    /// Shape checks performed before a run may start.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.starting_bankroll <= Decimal::ZERO {
            return Err(SimError::Config(format!(
                "starting bankroll must be positive, got {}",
                self.starting_bankroll
            )));
        }
        if self.max_spins == 0 {
            return Err(SimError::Config("max spins must be positive".into()));
        }
        if self.yield_every == 0 {
            return Err(SimError::Config("yield interval must be positive".into()));
        }

        let limits = &self.limits;
        if limits.min_inside < Decimal::ZERO || limits.min_outside < Decimal::ZERO {
            return Err(SimError::Config("minimum stakes must not be negative".into()));
        }
        if limits.max_stake <= Decimal::ZERO {
            return Err(SimError::Config("maximum stake must be positive".into()));
        }
        if limits.max_stake < limits.min_inside || limits.max_stake < limits.min_outside {
            return Err(SimError::Config(format!(
                "maximum stake {} is below a minimum stake (inside {}, outside {})",
                limits.max_stake, limits.min_inside, limits.min_outside
            )));
        }

        if let DataSource::Imported { numbers, .. } = &self.source {
            if numbers.is_empty() {
                return Err(SimError::Config("imported history is empty".into()));
            }
            if let Some(bad) = numbers.iter().find(|p| !self.table.contains(**p)) {
                return Err(SimError::Config(format!(
                    "imported pocket {bad} does not exist on a {} table",
                    self.table
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// On-disk application configuration
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub run: RunSection,
    #[serde(default)]
    pub source: SourceSection,
    pub strategy: StrategySource,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunSection {
    pub starting_bankroll: Decimal,
    pub max_spins: u64,
    #[serde(default)]
    pub table: TableVariant,
    #[serde(default)]
    pub limits: BetLimits,
    #[serde(default)]
    pub over_budget: OverBudgetPolicy,
    #[serde(default = "default_yield_every")]
    pub yield_every: u32,
}

/// `[source]` as written in the file. Imported history is referenced by
/// path and loaded when the run config is built.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSection {
    Synthetic {
        #[serde(default)]
        seed: Option<u64>,
    },
    Imported {
        file: String,
        #[serde(flatten)]
        range: ImportRange,
    },
}

impl Default for SourceSection {
    fn default() -> Self {
        SourceSection::Synthetic { seed: None }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory for files written by strategies.
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "strategy_files".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Build the engine-facing run configuration, loading imported history
    /// relative to `base_dir` when the path is not absolute.
    pub fn run_config(&self, base_dir: &Path) -> Result<RunConfig> {
        let source = match &self.source {
            SourceSection::Synthetic { seed } => DataSource::Synthetic { seed: *seed },
            SourceSection::Imported { file, range } => {
                let path = base_dir.join(file);
                let numbers = history::load_history(&path)
                    .with_context(|| format!("Failed to import history: {}", path.display()))?;
                DataSource::Imported {
                    numbers,
                    range: *range,
                }
            }
        };

        let run = &self.run;
        let config = RunConfig {
            starting_bankroll: run.starting_bankroll,
            max_spins: run.max_spins,
            table: run.table,
            limits: run.limits,
            source,
            over_budget: run.over_budget,
            yield_every: run.yield_every,
        };
        config.validate()?;
        Ok(config)
    }
}
