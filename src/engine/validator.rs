//! Bet validation and clamping.
//!
//! Proposed wagers are checked in order:
//! 1. drop non-positive stakes, unknown categories, and malformed targets;
//! 2. drop stakes under the inside/outside minimum;
//! 3. clamp to the maximum stake;
//! 4. outside virtual mode, cap the running total at the real bankroll.
//!
//! Rejections are not errors. The spin proceeds with whatever survives.

use rust_decimal::Decimal;
use std::fmt;
use tracing::debug;

use crate::config::{BetLimits, OverBudgetPolicy, RunConfig};
use crate::types::{BetCategory, BetTarget, Pocket, ProposedWager, RawTarget, TableVariant, Wager};

/// Why a proposed wager was dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    NonPositiveStake(Decimal),
    UnknownCategory(String),
    MalformedTarget { category: BetCategory, detail: String },
    BelowMinimum { stake: Decimal, minimum: Decimal },
    OverBudget { stake: Decimal, remaining: Decimal },
    BankrollExhausted,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NonPositiveStake(stake) => write!(f, "non-positive stake {stake}"),
            Rejection::UnknownCategory(c) => write!(f, "unknown category {c:?}"),
            Rejection::MalformedTarget { category, detail } => {
                write!(f, "malformed {category} target: {detail}")
            }
            Rejection::BelowMinimum { stake, minimum } => {
                write!(f, "stake {stake} below minimum {minimum}")
            }
            Rejection::OverBudget { stake, remaining } => {
                write!(f, "stake {stake} exceeds remaining bankroll {remaining}")
            }
            Rejection::BankrollExhausted => write!(f, "no bankroll left this spin"),
        }
    }
}

/// Result of validating one spin's proposals.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    /// Accepted wagers, in proposal order.
    pub accepted: Vec<Wager>,
    pub rejected: Vec<(ProposedWager, Rejection)>,
}

impl ValidationOutcome {
    /// Sum of accepted stakes, saturating at `Decimal::MAX`.
    pub fn total_stake(&self) -> Decimal {
        self.accepted
            .iter()
            .fold(Decimal::ZERO, |acc, w| acc.saturating_add(w.stake))
    }
}

/// Applies the table limits of one run.
#[derive(Debug, Clone)]
pub struct BetValidator {
    limits: BetLimits,
    table: TableVariant,
    policy: OverBudgetPolicy,
}

impl BetValidator {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            limits: config.limits,
            table: config.table,
            policy: config.over_budget,
        }
    }

    /// Validate a spin's proposals against the real `bankroll`. In virtual
    /// mode the bankroll cap is skipped.
    pub fn validate(
        &self,
        proposed: Vec<ProposedWager>,
        bankroll: Decimal,
        virtual_mode: bool,
    ) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        let mut remaining = bankroll;
        let mut exhausted = false;

        for raw in proposed {
            if exhausted {
                outcome.rejected.push((raw, Rejection::BankrollExhausted));
                continue;
            }

            let mut wager = match self.admit(&raw) {
                Ok(wager) => wager,
                Err(reason) => {
                    outcome.rejected.push((raw, reason));
                    continue;
                }
            };

            if !virtual_mode {
                if remaining <= Decimal::ZERO {
                    exhausted = true;
                    outcome.rejected.push((raw, Rejection::BankrollExhausted));
                    continue;
                }
                if wager.stake > remaining {
                    match self.policy {
                        OverBudgetPolicy::Clamp => {
                            debug!(
                                category = %wager.category,
                                stake = %wager.stake,
                                remaining = %remaining,
                                "Stake clamped to remaining bankroll"
                            );
                            wager.stake = remaining;
                        }
                        OverBudgetPolicy::Drop => {
                            let reason = Rejection::OverBudget {
                                stake: wager.stake,
                                remaining,
                            };
                            outcome.rejected.push((raw, reason));
                            continue;
                        }
                    }
                }
                remaining -= wager.stake;
            }

            outcome.accepted.push(wager);
        }

        outcome
    }

    /// Steps 1-3: shape, minimum, maximum. Independent of bankroll.
    pub fn admit(&self, raw: &ProposedWager) -> Result<Wager, Rejection> {
        if raw.stake <= Decimal::ZERO {
            return Err(Rejection::NonPositiveStake(raw.stake));
        }
        let category: BetCategory = raw
            .category
            .parse()
            .map_err(|_| Rejection::UnknownCategory(raw.category.clone()))?;
        let target = self.interpret_target(category, raw.target.as_ref())?;

        let minimum = if category.is_outside() {
            self.limits.min_outside
        } else {
            self.limits.min_inside
        };
        if raw.stake < minimum {
            return Err(Rejection::BelowMinimum {
                stake: raw.stake,
                minimum,
            });
        }

        Ok(Wager {
            category,
            target,
            stake: raw.stake.min(self.limits.max_stake),
        })
    }

    fn interpret_target(
        &self,
        category: BetCategory,
        target: Option<&RawTarget>,
    ) -> Result<BetTarget, Rejection> {
        let malformed = |detail: String| Rejection::MalformedTarget { category, detail };

        if category.is_even_money() {
            return Ok(BetTarget::None);
        }

        match category {
            BetCategory::Dozen | BetCategory::Column => {
                let index = match target {
                    Some(RawTarget::Number(n)) => *n,
                    Some(RawTarget::Label(s)) => s
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| malformed(format!("index {s:?} is not a number")))?,
                    Some(RawTarget::List(items)) if items.len() == 1 => match &items[0] {
                        RawTarget::Number(n) => *n,
                        other => return Err(malformed(format!("unexpected index {other:?}"))),
                    },
                    other => return Err(malformed(format!("expected index 1-3, got {other:?}"))),
                };
                match u8::try_from(index) {
                    Ok(i @ 1..=3) => Ok(BetTarget::Index(i)),
                    _ => Err(malformed(format!("index {index} outside 1-3"))),
                }
            }
            _ => {
                let expected = category.group_size().unwrap_or(1);
                let pockets = match target {
                    Some(RawTarget::List(items)) => items
                        .iter()
                        .map(|item| self.pocket(item))
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(&malformed)?,
                    Some(single) => vec![self.pocket(single).map_err(&malformed)?],
                    None => return Err(malformed("missing target".into())),
                };
                if pockets.len() != expected {
                    return Err(malformed(format!(
                        "expected {expected} numbers, got {}",
                        pockets.len()
                    )));
                }
                let mut distinct = pockets.clone();
                distinct.sort();
                distinct.dedup();
                if distinct.len() != pockets.len() {
                    return Err(malformed("numbers must be distinct".into()));
                }
                if category == BetCategory::Straight {
                    Ok(BetTarget::Pocket(pockets[0]))
                } else {
                    Ok(BetTarget::Group(pockets))
                }
            }
        }
    }

    fn pocket(&self, raw: &RawTarget) -> Result<Pocket, String> {
        let pocket = match raw {
            RawTarget::Number(n) => u8::try_from(*n)
                .ok()
                .and_then(Pocket::new)
                .ok_or_else(|| format!("{n} is not a pocket"))?,
            RawTarget::Label(s) => s.parse::<Pocket>().map_err(|e| e.to_string())?,
            RawTarget::List(_) => return Err("nested lists are not allowed".into()),
        };
        if !self.table.contains(pocket) {
            return Err(format!("pocket {pocket} is not on a {} table", self.table));
        }
        Ok(pocket)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
