//! Strategy sandbox.
//!
//! A strategy is anything implementing `Strategy`: it sees the spin history,
//! the real bankroll, the run config, its own persistent state, and the host
//! services, and yields the wagers it wants placed. The yield is untyped JSON
//! so that built-in, external-process, and embedder strategies share one
//! output contract, enforced by `parse_decision`.

pub mod builtin;
pub mod host;
pub mod process;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::config::RunConfig;
use crate::types::{ProposedWager, SimError, SpinRecord};
use builtin::StrategyRegistry;
use host::HostServices;
use process::ProcessStrategy;

/// Reserved state key that switches a strategy into virtual mode.
pub const VIRTUAL_MODE_KEY: &str = "virtual_mode";

// ---------------------------------------------------------------------------
// Persistent state
// ---------------------------------------------------------------------------

/// Opaque per-run strategy memory. The engine only ever reads
/// `virtual_mode`; everything else round-trips untouched, key order included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyState(Map<String, Value>);

impl StrategyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_virtual(&self) -> bool {
        self.get_bool(VIRTUAL_MODE_KEY).unwrap_or(false)
    }

    pub fn set_virtual(&mut self, on: bool) {
        self.insert(VIRTUAL_MODE_KEY, Value::Bool(on));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Numbers and numeric strings both read back as decimals.
    pub fn get_decimal(&self, key: &str) -> Option<Decimal> {
        match self.0.get(key)? {
            Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            Value::String(s) => Decimal::from_str(s).ok(),
            _ => None,
        }
    }

    pub fn set_decimal(&mut self, key: impl Into<String>, value: Decimal) {
        self.insert(key, serde_json::to_value(value).unwrap_or(Value::Null));
    }

    /// Replace the whole state, as returned by an external program.
    pub fn replace(&mut self, map: Map<String, Value>) {
        self.0 = map;
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Sandbox contract
// ---------------------------------------------------------------------------

/// Everything a strategy may look at for one decision.
pub struct StrategyContext<'a> {
    /// 1-based index of the spin being decided.
    pub spin: u64,
    /// Records of every spin settled so far, oldest first.
    pub history: &'a [SpinRecord],
    /// Real bankroll.
    pub bankroll: Decimal,
    pub config: &'a RunConfig,
    pub state: &'a mut StrategyState,
    pub host: &'a HostServices,
}

/// Failure raised by a strategy. Stops the run.
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("{0}")]
    Failed(String),

    #[error("Strategy process error: {0}")]
    Process(String),

    #[error("Invalid strategy parameters: {0}")]
    Params(String),
}

/// A betting strategy.
#[async_trait]
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Decide the wagers for the next spin. The returned value is `null`, a
    /// wager object, or an array of wager objects.
    async fn decide(&mut self, ctx: StrategyContext<'_>) -> Result<Value, StrategyError>;

    /// Release external resources once the run is over.
    async fn shutdown(&mut self) {}
}

/// Serialize wagers into a strategy yield.
pub fn yield_wagers(wagers: &[ProposedWager]) -> Result<Value, StrategyError> {
    serde_json::to_value(wagers).map_err(|e| StrategyError::Failed(e.to_string()))
}

/// Read a strategy yield. The outer error means the yield had the wrong
/// shape altogether; inner errors are individual unreadable wagers.
pub fn parse_decision(value: Value) -> Result<Vec<Result<ProposedWager, String>>, String> {
    let read = |v: Value| serde_json::from_value::<ProposedWager>(v).map_err(|e| e.to_string());
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(_) => Ok(vec![read(value)]),
        Value::Array(items) => Ok(items.into_iter().map(read).collect()),
        other => Err(format!(
            "expected null, a wager object, or an array of wagers, got {other}"
        )),
    }
}

/// Adapter turning a closure into a strategy.
pub struct FnStrategy<F> {
    name: String,
    decide: F,
}

impl<F> FnStrategy<F>
where
    F: FnMut(&mut StrategyContext<'_>) -> Result<Value, StrategyError> + Send,
{
    pub fn new(name: impl Into<String>, decide: F) -> Self {
        Self {
            name: name.into(),
            decide,
        }
    }
}

#[async_trait]
impl<F> Strategy for FnStrategy<F>
where
    F: FnMut(&mut StrategyContext<'_>) -> Result<Value, StrategyError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(&mut self, mut ctx: StrategyContext<'_>) -> Result<Value, StrategyError> {
        (self.decide)(&mut ctx)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// `[strategy]` config section.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySource {
    /// A registered built-in, configured by `params`.
    Builtin {
        name: String,
        #[serde(default)]
        params: Value,
    },
    /// External program speaking line-delimited JSON on stdin/stdout.
    Process {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Instantiate the configured strategy. Process strategies are spawned
/// immediately, so this must run inside a tokio runtime.
pub fn load_strategy(source: &StrategySource) -> Result<Box<dyn Strategy>, SimError> {
    match source {
        StrategySource::Builtin { name, params } => {
            StrategyRegistry::with_builtins().create(name, params)
        }
        StrategySource::Process { program, args } => {
            Ok(Box::new(ProcessStrategy::spawn(program, args)?))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
