//! Shared types for the SPINLAB engine.
//!
//! These types form the data model used across all modules: pockets and
//! outcomes, wagers in their raw (strategy-proposed) and validated forms,
//! settled bets, spin records, run status, and the domain error type.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Red numbers on a standard wheel.
const RED_NUMBERS: [u8; 18] = [1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36];

/// Internal number used for the "00" pocket on double-zero tables.
pub const DOUBLE_ZERO: u8 = 37;

/// Wheel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TableVariant {
    /// European wheel: 0..=36.
    #[default]
    SingleZero,
    /// American wheel: 0..=36 plus "00".
    DoubleZero,
}

impl TableVariant {
    /// Number of pockets on the wheel.
    pub fn pocket_count(&self) -> u8 {
        match self {
            TableVariant::SingleZero => 37,
            TableVariant::DoubleZero => 38,
        }
    }

    /// Whether the pocket exists on this wheel.
    pub fn contains(&self, pocket: Pocket) -> bool {
        pocket.number() < self.pocket_count()
    }
}

impl fmt::Display for TableVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableVariant::SingleZero => write!(f, "single-zero"),
            TableVariant::DoubleZero => write!(f, "double-zero"),
        }
    }
}

/// Pocket color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Red,
    Black,
    Green,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Red => write!(f, "red"),
            Color::Black => write!(f, "black"),
            Color::Green => write!(f, "green"),
        }
    }
}

/// A single pocket on the wheel. 37 is the "00" pocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Pocket(u8);

impl Pocket {
    pub const ZERO: Pocket = Pocket(0);
    pub const DOUBLE_ZERO: Pocket = Pocket(DOUBLE_ZERO);

    /// Build a pocket from its number; `None` above 37.
    pub fn new(number: u8) -> Option<Self> {
        (number <= DOUBLE_ZERO).then_some(Pocket(number))
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    /// True for both 0 and 00.
    pub fn is_zero(&self) -> bool {
        self.0 == 0 || self.0 == DOUBLE_ZERO
    }

    pub fn color(&self) -> Color {
        if self.is_zero() {
            Color::Green
        } else if RED_NUMBERS.contains(&self.0) {
            Color::Red
        } else {
            Color::Black
        }
    }

    pub fn is_even(&self) -> bool {
        !self.is_zero() && self.0 % 2 == 0
    }

    pub fn is_odd(&self) -> bool {
        !self.is_zero() && self.0 % 2 == 1
    }

    /// 1..=18
    pub fn is_low(&self) -> bool {
        (1..=18).contains(&self.0)
    }

    /// 19..=36
    pub fn is_high(&self) -> bool {
        (19..=36).contains(&self.0)
    }

    /// Dozen index 1..=3, `None` for zero pockets.
    pub fn dozen(&self) -> Option<u8> {
        (!self.is_zero()).then(|| (self.0 - 1) / 12 + 1)
    }

    /// Column index 1..=3, `None` for zero pockets.
    pub fn column(&self) -> Option<u8> {
        (!self.is_zero()).then(|| (self.0 - 1) % 3 + 1)
    }
}

impl TryFrom<u8> for Pocket {
    type Error = SimError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Pocket::new(value).ok_or_else(|| SimError::InvalidPocket(value.to_string()))
    }
}

impl From<Pocket> for u8 {
    fn from(pocket: Pocket) -> Self {
        pocket.0
    }
}

impl fmt::Display for Pocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == DOUBLE_ZERO {
            write!(f, "00")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Parses `"0"`..`"36"` and `"00"`.
impl FromStr for Pocket {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "00" {
            return Ok(Pocket::DOUBLE_ZERO);
        }
        match s.parse::<u8>() {
            Ok(n) if n <= 36 => Ok(Pocket(n)),
            _ => Err(SimError::InvalidPocket(s.to_string())),
        }
    }
}

/// One drawn pocket plus its derived color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub pocket: Pocket,
    pub color: Color,
}

impl Outcome {
    pub fn new(pocket: Pocket) -> Self {
        Self {
            pocket,
            color: pocket.color(),
        }
    }
}

impl From<Pocket> for Outcome {
    fn from(pocket: Pocket) -> Self {
        Outcome::new(pocket)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.pocket, self.color)
    }
}

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

/// Recognised wager categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetCategory {
    Straight,
    Split,
    Street,
    Corner,
    Line,
    Dozen,
    Column,
    Red,
    Black,
    Even,
    Odd,
    Low,
    High,
}

impl BetCategory {
    pub const ALL: &'static [BetCategory] = &[
        BetCategory::Straight,
        BetCategory::Split,
        BetCategory::Street,
        BetCategory::Corner,
        BetCategory::Line,
        BetCategory::Dozen,
        BetCategory::Column,
        BetCategory::Red,
        BetCategory::Black,
        BetCategory::Even,
        BetCategory::Odd,
        BetCategory::Low,
        BetCategory::High,
    ];

    /// Outside bets use the outside minimum; everything else is inside.
    pub fn is_outside(&self) -> bool {
        matches!(
            self,
            BetCategory::Dozen
                | BetCategory::Column
                | BetCategory::Red
                | BetCategory::Black
                | BetCategory::Even
                | BetCategory::Odd
                | BetCategory::Low
                | BetCategory::High
        )
    }

    /// Even-money categories carry no target.
    pub fn is_even_money(&self) -> bool {
        matches!(
            self,
            BetCategory::Red
                | BetCategory::Black
                | BetCategory::Even
                | BetCategory::Odd
                | BetCategory::Low
                | BetCategory::High
        )
    }

    /// Number of pockets an inside group must name (straight = 1).
    pub fn group_size(&self) -> Option<usize> {
        match self {
            BetCategory::Straight => Some(1),
            BetCategory::Split => Some(2),
            BetCategory::Street => Some(3),
            BetCategory::Corner => Some(4),
            BetCategory::Line => Some(6),
            _ => None,
        }
    }

    /// Profit multiple on a win (excludes the returned stake).
    pub fn payout_multiplier(&self) -> u32 {
        match self {
            BetCategory::Straight => 35,
            BetCategory::Split => 17,
            BetCategory::Street => 11,
            BetCategory::Corner => 8,
            BetCategory::Line => 5,
            BetCategory::Dozen | BetCategory::Column => 2,
            BetCategory::Red
            | BetCategory::Black
            | BetCategory::Even
            | BetCategory::Odd
            | BetCategory::Low
            | BetCategory::High => 1,
        }
    }
}

impl fmt::Display for BetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BetCategory::Straight => "straight",
            BetCategory::Split => "split",
            BetCategory::Street => "street",
            BetCategory::Corner => "corner",
            BetCategory::Line => "line",
            BetCategory::Dozen => "dozen",
            BetCategory::Column => "column",
            BetCategory::Red => "red",
            BetCategory::Black => "black",
            BetCategory::Even => "even",
            BetCategory::Odd => "odd",
            BetCategory::Low => "low",
            BetCategory::High => "high",
        };
        write!(f, "{name}")
    }
}

/// Case-insensitive, with the usual table aliases.
impl FromStr for BetCategory {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "straight" | "single" | "number" => Ok(BetCategory::Straight),
            "split" => Ok(BetCategory::Split),
            "street" => Ok(BetCategory::Street),
            "corner" | "square" => Ok(BetCategory::Corner),
            "line" | "sixline" | "six_line" | "double_street" => Ok(BetCategory::Line),
            "dozen" => Ok(BetCategory::Dozen),
            "column" => Ok(BetCategory::Column),
            "red" | "rouge" => Ok(BetCategory::Red),
            "black" | "noir" => Ok(BetCategory::Black),
            "even" | "pair" => Ok(BetCategory::Even),
            "odd" | "impair" => Ok(BetCategory::Odd),
            "low" | "1-18" | "manque" => Ok(BetCategory::Low),
            "high" | "19-36" | "passe" => Ok(BetCategory::High),
            other => Err(SimError::UnknownCategory(other.to_string())),
        }
    }
}

/// Target descriptor as a strategy writes it: a number, a label such as
/// `"00"`, or a list of either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTarget {
    Number(i64),
    Label(String),
    List(Vec<RawTarget>),
}

/// A wager exactly as proposed by a strategy. Not yet validated: the
/// category may be unknown and the stake may be anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedWager {
    #[serde(alias = "type", alias = "bet")]
    pub category: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "number",
        alias = "numbers",
        alias = "value"
    )]
    pub target: Option<RawTarget>,
    #[serde(alias = "amount")]
    pub stake: Decimal,
}

impl ProposedWager {
    pub fn new(category: BetCategory, target: Option<RawTarget>, stake: Decimal) -> Self {
        Self {
            category: category.to_string(),
            target,
            stake,
        }
    }

    /// Even-money or other target-less wager.
    pub fn on(category: BetCategory, stake: Decimal) -> Self {
        Self::new(category, None, stake)
    }

    pub fn straight(number: u8, stake: Decimal) -> Self {
        Self::new(
            BetCategory::Straight,
            Some(RawTarget::Number(i64::from(number))),
            stake,
        )
    }

    pub fn group(category: BetCategory, numbers: &[u8], stake: Decimal) -> Self {
        let list = numbers
            .iter()
            .map(|n| RawTarget::Number(i64::from(*n)))
            .collect();
        Self::new(category, Some(RawTarget::List(list)), stake)
    }
}

/// Validated target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BetTarget {
    None,
    Pocket(Pocket),
    Group(Vec<Pocket>),
    /// Dozen or column index, 1..=3.
    Index(u8),
}

impl fmt::Display for BetTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetTarget::None => Ok(()),
            BetTarget::Pocket(p) => write!(f, "{p}"),
            BetTarget::Group(ps) => {
                let parts: Vec<String> = ps.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", parts.join("/"))
            }
            BetTarget::Index(i) => write!(f, "#{i}"),
        }
    }
}

/// A wager that passed validation and clamping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wager {
    pub category: BetCategory,
    pub target: BetTarget,
    pub stake: Decimal,
}

impl fmt::Display for Wager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            BetTarget::None => write!(f, "{} ${:.2}", self.category, self.stake),
            _ => write!(f, "{} {} ${:.2}", self.category, self.target, self.stake),
        }
    }
}

/// A wager resolved against a drawn outcome. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledBet {
    #[serde(flatten)]
    pub wager: Wager,
    /// Stake returned plus profit on a win, zero on a loss.
    pub payout: Decimal,
    pub profit: Decimal,
    pub is_win: bool,
}

// ---------------------------------------------------------------------------
// Ledger records
// ---------------------------------------------------------------------------

/// One resolved spin. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinRecord {
    /// 1-based sequence number.
    pub spin: u64,
    pub outcome: Outcome,
    pub bankroll_before: Decimal,
    /// `bankroll_before + profit`. For virtual spins this is the shadow
    /// value only; the real bankroll carries `bankroll_before` forward.
    pub bankroll_after: Decimal,
    pub profit: Decimal,
    pub total_stake: Decimal,
    #[serde(rename = "virtual")]
    pub is_virtual: bool,
    pub bets: Vec<SettledBet>,
}

impl SpinRecord {
    /// Real bankroll that the next spin starts from.
    pub fn real_bankroll_after(&self) -> Decimal {
        if self.is_virtual {
            self.bankroll_before
        } else {
            self.bankroll_after
        }
    }

    pub fn is_winning(&self) -> bool {
        self.profit > Decimal::ZERO
    }

    pub fn is_losing(&self) -> bool {
        self.profit < Decimal::ZERO
    }
}

impl fmt::Display for SpinRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Spin #{}{}: {} | bets={} stake=${:.2} profit=${:.2} | ${:.2} -> ${:.2}",
            self.spin,
            if self.is_virtual { " (virtual)" } else { "" },
            self.outcome,
            self.bets.len(),
            self.total_stake,
            self.profit,
            self.bankroll_before,
            self.bankroll_after,
        )
    }
}

// ---------------------------------------------------------------------------
// Run status
// ---------------------------------------------------------------------------

/// Why a run ended early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    BankrollExhausted,
    StrategyError { spin: u64, message: String },
    /// Settling the spin produced an amount beyond `Decimal` range.
    SettlementOverflow { spin: u64 },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::BankrollExhausted => write!(f, "bankroll exhausted"),
            StopReason::StrategyError { spin, message } => {
                write!(f, "strategy error on spin {spin}: {message}")
            }
            StopReason::SettlementOverflow { spin } => {
                write!(f, "settlement overflow on spin {spin}")
            }
        }
    }
}

/// Run lifecycle: `idle -> running -> (completed | stopped)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Stopped {
        #[serde(flatten)]
        reason: StopReason,
    },
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Stopped { .. })
    }

    pub fn stopped(reason: StopReason) -> Self {
        RunStatus::Stopped { reason }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "IDLE"),
            RunStatus::Running => write!(f, "RUNNING"),
            RunStatus::Completed => write!(f, "COMPLETED"),
            RunStatus::Stopped { reason } => write!(f, "STOPPED ({reason})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SPINLAB.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pocket: {0}")]
    InvalidPocket(String),

    #[error("Unknown bet category: {0}")]
    UnknownCategory(String),

    #[error("Strategy load error: {0}")]
    StrategyLoad(String),

    #[error("Import error (line {line}): {message}")]
    Import { line: usize, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // -- Pocket tests --

    #[test]
    fn test_pocket_colors() {
        assert_eq!(Pocket::new(1).unwrap().color(), Color::Red);
        assert_eq!(Pocket::new(2).unwrap().color(), Color::Black);
        assert_eq!(Pocket::new(36).unwrap().color(), Color::Red);
        assert_eq!(Pocket::ZERO.color(), Color::Green);
        assert_eq!(Pocket::DOUBLE_ZERO.color(), Color::Green);
    }

    #[test]
    fn test_red_and_black_partition() {
        let reds = (1..=36).filter(|n| Pocket::new(*n).unwrap().color() == Color::Red).count();
        let blacks = (1..=36).filter(|n| Pocket::new(*n).unwrap().color() == Color::Black).count();
        assert_eq!(reds, 18);
        assert_eq!(blacks, 18);
    }

    #[test]
    fn test_pocket_new_bounds() {
        assert!(Pocket::new(37).is_some());
        assert!(Pocket::new(38).is_none());
    }

    #[test]
    fn test_zero_pockets_have_no_parity_or_range() {
        for p in [Pocket::ZERO, Pocket::DOUBLE_ZERO] {
            assert!(!p.is_even());
            assert!(!p.is_odd());
            assert!(!p.is_low());
            assert!(!p.is_high());
            assert_eq!(p.dozen(), None);
            assert_eq!(p.column(), None);
        }
    }

    #[test]
    fn test_dozen_and_column() {
        let p = Pocket::new(13).unwrap();
        assert_eq!(p.dozen(), Some(2));
        assert_eq!(p.column(), Some(1));
        let p = Pocket::new(36).unwrap();
        assert_eq!(p.dozen(), Some(3));
        assert_eq!(p.column(), Some(3));
        let p = Pocket::new(2).unwrap();
        assert_eq!(p.column(), Some(2));
    }

    #[test]
    fn test_pocket_parse_and_display() {
        assert_eq!("00".parse::<Pocket>().unwrap(), Pocket::DOUBLE_ZERO);
        assert_eq!(" 17 ".parse::<Pocket>().unwrap().number(), 17);
        assert!("37".parse::<Pocket>().is_err());
        assert!("red".parse::<Pocket>().is_err());
        assert_eq!(Pocket::DOUBLE_ZERO.to_string(), "00");
        assert_eq!(Pocket::new(7).unwrap().to_string(), "7");
    }

    #[test]
    fn test_pocket_serde_rejects_out_of_range() {
        let p: Pocket = serde_json::from_str("12").unwrap();
        assert_eq!(p.number(), 12);
        assert!(serde_json::from_str::<Pocket>("40").is_err());
    }

    #[test]
    fn test_table_contains() {
        assert!(TableVariant::SingleZero.contains(Pocket::new(36).unwrap()));
        assert!(!TableVariant::SingleZero.contains(Pocket::DOUBLE_ZERO));
        assert!(TableVariant::DoubleZero.contains(Pocket::DOUBLE_ZERO));
    }

    // -- Category tests --

    #[test]
    fn test_category_parse_aliases() {
        assert_eq!("RED".parse::<BetCategory>().unwrap(), BetCategory::Red);
        assert_eq!("sixline".parse::<BetCategory>().unwrap(), BetCategory::Line);
        assert_eq!("19-36".parse::<BetCategory>().unwrap(), BetCategory::High);
        assert!(matches!(
            "basket".parse::<BetCategory>(),
            Err(SimError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_category_display_round_trips() {
        for cat in BetCategory::ALL {
            assert_eq!(cat.to_string().parse::<BetCategory>().unwrap(), *cat);
        }
    }

    #[test]
    fn test_outside_classification() {
        assert!(BetCategory::Dozen.is_outside());
        assert!(BetCategory::Red.is_outside());
        assert!(!BetCategory::Straight.is_outside());
        assert!(!BetCategory::Line.is_outside());
    }

    // -- Wager parsing --

    #[test]
    fn test_proposed_wager_from_json_aliases() {
        let w: ProposedWager =
            serde_json::from_value(serde_json::json!({"type": "split", "numbers": [1, 2], "amount": 5}))
                .unwrap();
        assert_eq!(w.category, "split");
        assert_eq!(
            w.target,
            Some(RawTarget::List(vec![RawTarget::Number(1), RawTarget::Number(2)]))
        );
        assert_eq!(w.stake, dec!(5));
    }

    #[test]
    fn test_proposed_wager_label_target() {
        let w: ProposedWager =
            serde_json::from_value(serde_json::json!({"category": "straight", "target": "00", "stake": 2.5}))
                .unwrap();
        assert_eq!(w.target, Some(RawTarget::Label("00".into())));
        assert_eq!(w.stake, dec!(2.5));
    }

    // -- Record tests --

    #[test]
    fn test_real_bankroll_after_virtual() {
        let record = SpinRecord {
            spin: 1,
            outcome: Outcome::new(Pocket::ZERO),
            bankroll_before: dec!(100),
            bankroll_after: dec!(90),
            profit: dec!(-10),
            total_stake: dec!(10),
            is_virtual: true,
            bets: Vec::new(),
        };
        assert_eq!(record.real_bankroll_after(), dec!(100));
        assert!(record.is_losing());
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(!RunStatus::Idle.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::stopped(StopReason::Cancelled).is_terminal());
    }

    #[test]
    fn test_run_status_serializes_flat() {
        let status = RunStatus::stopped(StopReason::StrategyError {
            spin: 5,
            message: "boom".into(),
        });
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "stopped");
        assert_eq!(json["reason"], "strategy_error");
        assert_eq!(json["spin"], 5);
    }

    #[test]
    fn test_settlement_overflow_reason() {
        let status = RunStatus::stopped(StopReason::SettlementOverflow { spin: 1 });
        assert_eq!(status.to_string(), "STOPPED (settlement overflow on spin 1)");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["reason"], "settlement_overflow");
    }
}
