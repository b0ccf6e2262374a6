//! Built-in strategies and the registry that names them.
//!
//! Each strategy reads its parameters from the `[strategy.params]` table and
//! keeps its progression in `StrategyState`, so a snapshot of the state is
//! enough to see where it is.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use super::{yield_wagers, Strategy, StrategyContext, StrategyError};
use crate::types::{BetCategory, ProposedWager, RawTarget, SimError, SpinRecord};

type Factory = fn(&Value) -> Result<Box<dyn Strategy>, StrategyError>;

/// Deserialize params, treating `null` as "all defaults".
fn params<P: DeserializeOwned + Default>(value: &Value) -> Result<P, StrategyError> {
    if value.is_null() {
        return Ok(P::default());
    }
    serde_json::from_value(value.clone()).map_err(|e| StrategyError::Params(e.to_string()))
}

fn category(name: &str) -> Result<BetCategory, StrategyError> {
    name.parse()
        .map_err(|_| StrategyError::Params(format!("unknown bet category {name:?}")))
}

fn even_money(name: &str) -> Result<BetCategory, StrategyError> {
    let category = category(name)?;
    if !category.is_even_money() {
        return Err(StrategyError::Params(format!(
            "{category} is not an even-money bet"
        )));
    }
    Ok(category)
}

/// `base * 2^level`, saturating. The validator caps the stake afterwards.
fn doubled(base: Decimal, level: u64) -> Decimal {
    base.saturating_mul(Decimal::from(1u64 << level.min(40)))
}

/// Outcome of this strategy's last real wager, if it placed one.
fn last_real_result(history: &[SpinRecord]) -> Option<Decimal> {
    history
        .last()
        .filter(|r| !r.is_virtual && r.total_stake > Decimal::ZERO)
        .map(|r| r.profit)
}

// ---------------------------------------------------------------------------
// Flat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlatParams {
    pub category: String,
    pub target: Option<RawTarget>,
    pub stake: Decimal,
}

impl Default for FlatParams {
    fn default() -> Self {
        Self {
            category: "red".into(),
            target: None,
            stake: dec!(10),
        }
    }
}

/// Same wager every spin.
pub struct Flat {
    wager: ProposedWager,
}

impl Flat {
    pub fn new(p: FlatParams) -> Result<Self, StrategyError> {
        let category = category(&p.category)?;
        Ok(Self {
            wager: ProposedWager::new(category, p.target, p.stake),
        })
    }
}

#[async_trait]
impl Strategy for Flat {
    fn name(&self) -> &str {
        "flat"
    }

    async fn decide(&mut self, _ctx: StrategyContext<'_>) -> Result<Value, StrategyError> {
        yield_wagers(std::slice::from_ref(&self.wager))
    }
}

// ---------------------------------------------------------------------------
// Martingale
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MartingaleParams {
    pub category: String,
    pub base_stake: Decimal,
    /// Losses in a row before the progression gives up and resets.
    pub max_level: u64,
}

impl Default for MartingaleParams {
    fn default() -> Self {
        Self {
            category: "red".into(),
            base_stake: dec!(5),
            max_level: 8,
        }
    }
}

/// Double after each loss, back to base after a win.
pub struct Martingale {
    category: BetCategory,
    base_stake: Decimal,
    max_level: u64,
}

impl Martingale {
    pub fn new(p: MartingaleParams) -> Result<Self, StrategyError> {
        Ok(Self {
            category: even_money(&p.category)?,
            base_stake: p.base_stake,
            max_level: p.max_level,
        })
    }
}

#[async_trait]
impl Strategy for Martingale {
    fn name(&self) -> &str {
        "martingale"
    }

    async fn decide(&mut self, mut ctx: StrategyContext<'_>) -> Result<Value, StrategyError> {
        let mut level = ctx.state.get_u64("level").unwrap_or(0);
        match last_real_result(ctx.history) {
            Some(p) if p < Decimal::ZERO => {
                level += 1;
                if level > self.max_level {
                    ctx.host.info(format!("max level {} reached, resetting", self.max_level));
                    level = 0;
                }
            }
            Some(p) if p > Decimal::ZERO => level = 0,
            _ => {}
        }
        ctx.state.insert("level", json!(level));

        let stake = doubled(self.base_stake, level);
        yield_wagers(&[ProposedWager::on(self.category, stake)])
    }
}

// ---------------------------------------------------------------------------
// D'Alembert
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DAlembertParams {
    pub category: String,
    pub unit: Decimal,
    pub max_units: u64,
}

impl Default for DAlembertParams {
    fn default() -> Self {
        Self {
            category: "red".into(),
            unit: dec!(5),
            max_units: 20,
        }
    }
}

/// One unit up after a loss, one down after a win, never below one.
pub struct DAlembert {
    category: BetCategory,
    unit: Decimal,
    max_units: u64,
}

impl DAlembert {
    pub fn new(p: DAlembertParams) -> Result<Self, StrategyError> {
        if p.max_units == 0 {
            return Err(StrategyError::Params("max_units must be at least 1".into()));
        }
        Ok(Self {
            category: even_money(&p.category)?,
            unit: p.unit,
            max_units: p.max_units,
        })
    }
}

#[async_trait]
impl Strategy for DAlembert {
    fn name(&self) -> &str {
        "dalembert"
    }

    async fn decide(&mut self, mut ctx: StrategyContext<'_>) -> Result<Value, StrategyError> {
        let mut units = ctx.state.get_u64("units").unwrap_or(1).max(1);
        match last_real_result(ctx.history) {
            Some(p) if p < Decimal::ZERO => units = (units + 1).min(self.max_units),
            Some(p) if p > Decimal::ZERO => units = units.saturating_sub(1).max(1),
            _ => {}
        }
        ctx.state.insert("units", json!(units));

        let stake = self.unit.saturating_mul(Decimal::from(units));
        yield_wagers(&[ProposedWager::on(self.category, stake)])
    }
}

// ---------------------------------------------------------------------------
// Shadow recovery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShadowRecoveryParams {
    pub category: String,
    pub base_stake: Decimal,
    pub max_level: u64,
    /// Real losses in a row that switch betting to virtual.
    pub trigger_losses: u64,
    /// Virtual spins that must net non-negative before real betting resumes.
    pub window: usize,
    pub log_path: String,
}

impl Default for ShadowRecoveryParams {
    fn default() -> Self {
        Self {
            category: "red".into(),
            base_stake: dec!(5),
            max_level: 6,
            trigger_losses: 4,
            window: 8,
            log_path: "shadow_recovery/journal.txt".into(),
        }
    }
}

/// Martingale that stops risking money after a losing streak, paper-trades
/// flat base stakes in virtual mode, and resumes once the shadow window is
/// back to break-even.
pub struct ShadowRecovery {
    params: ShadowRecoveryParams,
    category: BetCategory,
    journal: Vec<String>,
}

impl ShadowRecovery {
    pub fn new(p: ShadowRecoveryParams) -> Result<Self, StrategyError> {
        if p.window == 0 || p.trigger_losses == 0 {
            return Err(StrategyError::Params(
                "window and trigger_losses must be at least 1".into(),
            ));
        }
        Ok(Self {
            category: even_money(&p.category)?,
            params: p,
            journal: Vec::new(),
        })
    }

    fn note(&mut self, ctx: &StrategyContext<'_>, message: String) {
        ctx.host.info(message.clone());
        self.journal.push(format!("spin {}: {message}", ctx.spin));
        ctx.host.persist(self.params.log_path.clone(), self.journal.join("\n"));
    }

    fn shadow_results(ctx: &StrategyContext<'_>) -> Vec<Decimal> {
        ctx.state
            .get("shadow_results")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.to_string().parse::<Decimal>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Strategy for ShadowRecovery {
    fn name(&self) -> &str {
        "shadow_recovery"
    }

    async fn decide(&mut self, mut ctx: StrategyContext<'_>) -> Result<Value, StrategyError> {
        let mut level = ctx.state.get_u64("level").unwrap_or(0);
        let mut streak = ctx.state.get_u64("losing_streak").unwrap_or(0);

        if ctx.state.is_virtual() {
            let mut results = Self::shadow_results(&ctx);
            if let Some(last) = ctx.history.last().filter(|r| r.is_virtual) {
                results.push(last.profit);
                if results.len() > self.params.window {
                    results.remove(0);
                }
                let shadow = ctx.state.get_decimal("shadow_bankroll").unwrap_or(ctx.bankroll);
                ctx.state.set_decimal("shadow_bankroll", shadow.saturating_add(last.profit));
            }

            let net = results
                .iter()
                .fold(Decimal::ZERO, |acc, p| acc.saturating_add(*p));
            if results.len() >= self.params.window && net >= Decimal::ZERO {
                ctx.state.set_virtual(false);
                ctx.state.remove("shadow_results");
                level = 0;
                streak = 0;
                self.note(&ctx, format!("shadow window net {net}, resuming real betting"));
            } else {
                ctx.state.insert("shadow_results", json!(results));
            }
        } else {
            match last_real_result(ctx.history) {
                Some(p) if p < Decimal::ZERO => {
                    streak += 1;
                    level += 1;
                    if level > self.params.max_level {
                        level = 0;
                    }
                }
                Some(p) if p > Decimal::ZERO => {
                    streak = 0;
                    level = 0;
                }
                _ => {}
            }

            if streak >= self.params.trigger_losses {
                ctx.state.set_virtual(true);
                ctx.state.set_decimal("shadow_bankroll", ctx.bankroll);
                ctx.state.insert("shadow_results", json!([]));
                let bankroll = ctx.bankroll;
                self.note(
                    &ctx,
                    format!("{streak} losses in a row at bankroll {bankroll}, switching to virtual"),
                );
                level = 0;
                streak = 0;
            }
        }

        ctx.state.insert("level", json!(level));
        ctx.state.insert("losing_streak", json!(streak));

        let stake = if ctx.state.is_virtual() {
            self.params.base_stake
        } else {
            doubled(self.params.base_stake, level)
        };
        yield_wagers(&[ProposedWager::on(self.category, stake)])
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

fn flat(v: &Value) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(Flat::new(params(v)?)?))
}

fn martingale(v: &Value) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(Martingale::new(params(v)?)?))
}

fn dalembert(v: &Value) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(DAlembert::new(params(v)?)?))
}

fn shadow_recovery(v: &Value) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(ShadowRecovery::new(params(v)?)?))
}

/// Named strategy factories.
pub struct StrategyRegistry {
    factories: HashMap<String, Factory>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding every built-in strategy.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("flat", flat);
        registry.register("martingale", martingale);
        registry.register("dalembert", dalembert);
        registry.register("shadow_recovery", shadow_recovery);
        registry
    }

    pub fn register(&mut self, name: &str, factory: Factory) {
        self.factories.insert(name.to_lowercase(), factory);
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn create(&self, name: &str, params: &Value) -> Result<Box<dyn Strategy>, SimError> {
        let factory = self.factories.get(&name.to_lowercase()).ok_or_else(|| {
            SimError::StrategyLoad(format!(
                "unknown strategy {name:?}, expected one of: {}",
                self.names().join(", ")
            ))
        })?;
        factory(params).map_err(|e| SimError::StrategyLoad(format!("{name}: {e}")))
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
