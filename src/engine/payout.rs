//! Payout resolution.
//!
//! Pure functions: a validated wager and the drawn outcome in, signed profit
//! out. Zero pockets (0 and 00) lose every outside bet; they can only win as
//! part of an inside bet that names them.

use rust_decimal::Decimal;

use crate::types::{BetCategory, BetTarget, Color, Outcome, Pocket, SettledBet, Wager};

/// Whether `wager` covers the drawn pocket. A target that does not fit its
/// category covers nothing.
pub fn covers(wager: &Wager, pocket: Pocket) -> bool {
    match (wager.category, &wager.target) {
        (BetCategory::Straight, BetTarget::Pocket(p)) => *p == pocket,
        (
            BetCategory::Split | BetCategory::Street | BetCategory::Corner | BetCategory::Line,
            BetTarget::Group(group),
        ) => Some(group.len()) == wager.category.group_size() && group.contains(&pocket),
        (BetCategory::Dozen, BetTarget::Index(i)) => pocket.dozen() == Some(*i),
        (BetCategory::Column, BetTarget::Index(i)) => pocket.column() == Some(*i),
        (BetCategory::Red, _) => pocket.color() == Color::Red,
        (BetCategory::Black, _) => pocket.color() == Color::Black,
        (BetCategory::Even, _) => pocket.is_even(),
        (BetCategory::Odd, _) => pocket.is_odd(),
        (BetCategory::Low, _) => pocket.is_low(),
        (BetCategory::High, _) => pocket.is_high(),
        _ => false,
    }
}

/// Signed profit of one wager, or `None` when the win does not fit in a
/// `Decimal`.
pub fn profit(wager: &Wager, outcome: &Outcome) -> Option<Decimal> {
    if covers(wager, outcome.pocket) {
        wager
            .stake
            .checked_mul(Decimal::from(wager.category.payout_multiplier()))
    } else {
        Some(-wager.stake)
    }
}

/// Resolve one wager into a settled bet. `None` on overflow.
pub fn resolve(wager: &Wager, outcome: &Outcome) -> Option<SettledBet> {
    let profit = profit(wager, outcome)?;
    let is_win = profit > Decimal::ZERO;
    let payout = if is_win {
        wager.stake.checked_add(profit)?
    } else {
        Decimal::ZERO
    };
    Some(SettledBet {
        wager: wager.clone(),
        payout,
        profit,
        is_win,
    })
}

/// Resolve every wager of a spin; returns the settled bets (same order) and
/// the aggregate profit, or `None` if any amount overflows.
pub fn settle(wagers: &[Wager], outcome: &Outcome) -> Option<(Vec<SettledBet>, Decimal)> {
    let mut settled = Vec::with_capacity(wagers.len());
    let mut total = Decimal::ZERO;
    for wager in wagers {
        let bet = resolve(wager, outcome)?;
        total = total.checked_add(bet.profit)?;
        settled.push(bet);
    }
    Some((settled, total))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pocket(n: u8) -> Pocket {
        Pocket::new(n).unwrap()
    }

    fn draw(n: u8) -> Outcome {
        Outcome::new(pocket(n))
    }

    fn wager(category: BetCategory, target: BetTarget, stake: Decimal) -> Wager {
        Wager { category, target, stake }
    }

    fn pays(w: &Wager, outcome: &Outcome) -> Decimal {
        profit(w, outcome).unwrap()
    }

    fn group(ns: &[u8]) -> BetTarget {
        BetTarget::Group(ns.iter().map(|n| pocket(*n)).collect())
    }

    #[test]
    fn test_straight_pays_35_on_exact_match_only() {
        for n in 0..=36u8 {
            let w = wager(BetCategory::Straight, BetTarget::Pocket(pocket(n)), dec!(4));
            for drawn in 0..=36u8 {
                let expected = if drawn == n { dec!(140) } else { dec!(-4) };
                assert_eq!(pays(&w, &draw(drawn)), expected, "bet {n} drawn {drawn}");
            }
        }
    }

    #[test]
    fn test_straight_on_double_zero() {
        let w = wager(BetCategory::Straight, BetTarget::Pocket(Pocket::DOUBLE_ZERO), dec!(1));
        assert_eq!(pays(&w, &Outcome::new(Pocket::DOUBLE_ZERO)), dec!(35));
        assert_eq!(pays(&w, &draw(0)), dec!(-1));
    }

    #[test]
    fn test_inside_group_multipliers() {
        let cases = [
            (BetCategory::Split, group(&[1, 2]), dec!(17)),
            (BetCategory::Street, group(&[1, 2, 3]), dec!(11)),
            (BetCategory::Corner, group(&[1, 2, 4, 5]), dec!(8)),
            (BetCategory::Line, group(&[1, 2, 3, 4, 5, 6]), dec!(5)),
        ];
        for (category, target, multiple) in cases {
            let w = wager(category, target, dec!(10));
            assert_eq!(pays(&w, &draw(1)), dec!(10) * multiple, "{category}");
            assert_eq!(pays(&w, &draw(30)), dec!(-10), "{category}");
        }
    }

    #[test]
    fn test_group_with_wrong_size_loses() {
        let w = wager(BetCategory::Split, group(&[1, 2, 3]), dec!(10));
        assert_eq!(pays(&w, &draw(1)), dec!(-10));
    }

    #[test]
    fn test_dozen_and_column() {
        let dozen = wager(BetCategory::Dozen, BetTarget::Index(2), dec!(5));
        assert_eq!(pays(&dozen, &draw(13)), dec!(10));
        assert_eq!(pays(&dozen, &draw(12)), dec!(-5));
        assert_eq!(pays(&dozen, &draw(0)), dec!(-5));

        let column = wager(BetCategory::Column, BetTarget::Index(3), dec!(5));
        assert_eq!(pays(&column, &draw(36)), dec!(10));
        assert_eq!(pays(&column, &draw(34)), dec!(-5));
        assert_eq!(pays(&column, &Outcome::new(Pocket::DOUBLE_ZERO)), dec!(-5));
    }

    #[test]
    fn test_even_money_bets() {
        let stake = dec!(10);
        let red = wager(BetCategory::Red, BetTarget::None, stake);
        let black = wager(BetCategory::Black, BetTarget::None, stake);
        let even = wager(BetCategory::Even, BetTarget::None, stake);
        let odd = wager(BetCategory::Odd, BetTarget::None, stake);
        let low = wager(BetCategory::Low, BetTarget::None, stake);
        let high = wager(BetCategory::High, BetTarget::None, stake);

        assert_eq!(pays(&red, &draw(1)), dec!(10));
        assert_eq!(pays(&black, &draw(1)), dec!(-10));
        assert_eq!(pays(&even, &draw(18)), dec!(10));
        assert_eq!(pays(&odd, &draw(18)), dec!(-10));
        assert_eq!(pays(&low, &draw(18)), dec!(10));
        assert_eq!(pays(&high, &draw(19)), dec!(10));
    }

    #[test]
    fn test_zero_pockets_lose_outside_bets() {
        let outside = [
            BetCategory::Red,
            BetCategory::Black,
            BetCategory::Even,
            BetCategory::Odd,
            BetCategory::Low,
            BetCategory::High,
        ];
        for zero in [Pocket::ZERO, Pocket::DOUBLE_ZERO] {
            for category in outside {
                let w = wager(category, BetTarget::None, dec!(7));
                assert_eq!(pays(&w, &Outcome::new(zero)), dec!(-7), "{category} on {zero}");
            }
        }
    }

    #[test]
    fn test_zero_can_win_inside_group() {
        let w = wager(BetCategory::Street, group(&[0, 1, 2]), dec!(3));
        assert_eq!(pays(&w, &draw(0)), dec!(33));
    }

    #[test]
    fn test_resolve_is_pure() {
        let w = wager(BetCategory::Red, BetTarget::None, dec!(12.5));
        let a = resolve(&w, &draw(3)).unwrap();
        let b = resolve(&w, &draw(3)).unwrap();
        assert_eq!(a, b);
        assert!(a.is_win);
        assert_eq!(a.payout, dec!(25));
        assert_eq!(a.profit, dec!(12.5));
    }

    #[test]
    fn test_resolve_loss_has_zero_payout() {
        let w = wager(BetCategory::Red, BetTarget::None, dec!(10));
        let settled = resolve(&w, &draw(2)).unwrap();
        assert!(!settled.is_win);
        assert_eq!(settled.payout, Decimal::ZERO);
        assert_eq!(settled.profit, dec!(-10));
    }

    #[test]
    fn test_mismatched_target_is_a_loss() {
        let w = wager(BetCategory::Dozen, BetTarget::None, dec!(10));
        assert_eq!(pays(&w, &draw(5)), dec!(-10));
    }

    #[test]
    fn test_settle_sums_profits_in_order() {
        let wagers = vec![
            wager(BetCategory::Red, BetTarget::None, dec!(10)),
            wager(BetCategory::Straight, BetTarget::Pocket(pocket(1)), dec!(1)),
            wager(BetCategory::Black, BetTarget::None, dec!(5)),
        ];
        let (settled, total) = settle(&wagers, &draw(1)).unwrap();
        assert_eq!(settled.len(), 3);
        assert_eq!(settled[1].wager.category, BetCategory::Straight);
        assert_eq!(total, dec!(10) + dec!(35) - dec!(5));
    }

    #[test]
    fn test_oversized_win_is_reported_not_panicking() {
        let huge = Decimal::from_i128_with_scale(10i128.pow(28), 0);
        let w = wager(BetCategory::Straight, BetTarget::Pocket(pocket(17)), huge);
        assert_eq!(profit(&w, &draw(17)), None);
        assert_eq!(profit(&w, &draw(18)), Some(-huge));
        assert!(resolve(&w, &draw(17)).is_none());
        assert!(settle(&[w], &draw(17)).is_none());
    }

    #[test]
    fn test_settle_total_overflow() {
        let stake = Decimal::from_i128_with_scale(3 * 10i128.pow(28), 0);
        let w = wager(BetCategory::Red, BetTarget::None, stake);
        // One win fits; three together exceed Decimal::MAX.
        assert_eq!(resolve(&w, &draw(1)).unwrap().payout, stake * dec!(2));
        assert!(settle(&[w.clone(), w.clone()], &draw(1)).is_some());
        assert!(settle(&[w.clone(), w.clone(), w], &draw(1)).is_none());
    }
}
