//! Weekly return calculation. Pure functions over integral minor-currency
//! amounts; the ratio is computed at full precision and rounded only for
//! display.

/// Total account value: wallet plus portfolio, exact.
pub fn account_value(wallet: i64, portfolio: i64) -> i64 {
    wallet + portfolio
}

/// Deposit-adjusted weekly return.
///
/// Deposits are excluded from the gain so that adding cash never counts as
/// performance, and counted as capital employed in the denominator. A zero
/// starting value always yields 0, regardless of gain.
pub fn weekly_return(start_value: i64, end_value: i64, deposits: i64) -> f64 {
    if start_value <= 0 {
        return 0.0;
    }
    let gain = end_value - start_value - deposits;
    let capital = start_value + deposits;
    if capital <= 0 {
        return 0.0;
    }
    gain as f64 / capital as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_deposit_is_not_performance() {
        for x in [1, 100, 12_345, i64::MAX / 4] {
            assert_eq!(weekly_return(0, x, x), 0.0);
        }
    }

    #[test]
    fn ten_percent_gain_is_exact() {
        assert_eq!(weekly_return(100, 110, 0), 0.10);
    }

    #[test]
    fn loss_after_deposit_counts_deposit_as_capital() {
        // gain = 950 - 1000 - 200 = -250, capital = 1000 + 200.
        let r = weekly_return(1000, 950, 200);
        assert!((r - (-0.208333)).abs() < 1e-6, "got {r}");
    }

    #[test]
    fn zero_start_always_returns_zero() {
        assert_eq!(weekly_return(0, 1_000_000, 0), 0.0);
        assert_eq!(weekly_return(0, 0, 500), 0.0);
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let a = weekly_return(1_234_567, 2_345_678, 111_111);
        let b = weekly_return(1_234_567, 2_345_678, 111_111);
        assert_eq!(a, b);
    }

    #[test]
    fn account_value_is_additive() {
        assert_eq!(account_value(0, 0), 0);
        assert_eq!(account_value(150, 350), 500);
        assert_eq!(account_value(1_000_000, 0), 1_000_000);
    }
}
