//! Native-token amounts. Everything is carried as wei in a `U256` and only
//! turned into decimal text at the edges.

use alloy::primitives::{
    U256,
    utils::parse_ether,
};
use thiserror::Error;

pub const NATIVE_DECIMALS: usize = 18;
pub const NATIVE_TICKER: &str = "ETH";

/// 1 whole native token in wei.
pub const ONE_NATIVE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Smallest wager the game accepts (0.001), also the wager input step.
pub const MIN_WAGER: U256 = U256::from_limbs([1_000_000_000_000_000, 0, 0, 0]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount {0:?} is negative")]
    Negative(String),
    #[error("amount {input:?} is not a valid decimal: {reason}")]
    Invalid { input: String, reason: String },
}

pub fn parse_native(input: &str) -> Result<U256, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(AmountError::Negative(trimmed.to_string()));
    }
    parse_ether(trimmed).map_err(|e| AmountError::Invalid {
        input: trimmed.to_string(),
        reason: e.to_string(),
    })
}

/// Full precision with trailing zeros trimmed: `2e15` wei is `"0.002"`.
pub fn format_native(amount: U256) -> String {
    let (whole, fraction) = split(amount);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole
    } else {
        format!("{whole}.{fraction}")
    }
}

/// Truncated (not rounded) to exactly `decimals` places.
pub fn format_native_fixed(amount: U256, decimals: usize) -> String {
    let (whole, fraction) = split(amount);
    let decimals = decimals.min(NATIVE_DECIMALS);
    if decimals == 0 {
        return whole;
    }
    format!("{whole}.{}", &fraction[..decimals])
}

/// Whole native units, rounded down. Saturates at `u64::MAX`.
pub fn whole_units_floor(amount: U256) -> u64 {
    u64::try_from(amount / ONE_NATIVE).unwrap_or(u64::MAX)
}

/// Keeps a user-entered wager inside `[MIN_WAGER, balance]`. When the
/// balance is below the minimum the minimum is returned and the drop
/// precondition rejects it later.
pub fn clamp_wager(wager: U256, balance: U256) -> U256 {
    if balance < MIN_WAGER {
        return MIN_WAGER;
    }
    wager.clamp(MIN_WAGER, balance)
}

pub fn step_wager(wager: U256, up: bool, balance: U256) -> U256 {
    let stepped = if up {
        wager.saturating_add(MIN_WAGER)
    } else {
        wager.saturating_sub(MIN_WAGER)
    };
    clamp_wager(stepped, balance)
}

fn split(amount: U256) -> (String, String) {
    let whole = (amount / ONE_NATIVE).to_string();
    let fraction = format!(
        "{:0>width$}",
        (amount % ONE_NATIVE).to_string(),
        width = NATIVE_DECIMALS
    );
    (whole, fraction)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_native__reads_decimal_wager() {
        assert_eq!(parse_native("0.001").unwrap(), MIN_WAGER);
        assert_eq!(parse_native(" 1 ").unwrap(), ONE_NATIVE);
    }

    #[test]
    fn parse_native__rejects_empty_and_negative() {
        assert_eq!(parse_native("  "), Err(AmountError::Empty));
        assert!(matches!(parse_native("-0.1"), Err(AmountError::Negative(_))));
        assert!(matches!(
            parse_native("abc"),
            Err(AmountError::Invalid { .. })
        ));
    }

    #[test]
    fn format_native__trims_trailing_zeros() {
        assert_eq!(format_native(U256::from(2_000_000_000_000_000u64)), "0.002");
        assert_eq!(format_native(ONE_NATIVE * U256::from(3u64)), "3");
        assert_eq!(format_native(U256::ZERO), "0");
        assert_eq!(format_native(U256::from(1u64)), "0.000000000000000001");
    }

    #[test]
    fn format_native_fixed__truncates_to_requested_places() {
        let amount = parse_native("1.23456").unwrap();
        assert_eq!(format_native_fixed(amount, 4), "1.2345");
        assert_eq!(format_native_fixed(U256::ZERO, 4), "0.0000");
        assert_eq!(format_native_fixed(amount, 0), "1");
    }

    #[test]
    fn whole_units_floor__drops_fraction() {
        assert_eq!(whole_units_floor(parse_native("0.002").unwrap()), 0);
        assert_eq!(whole_units_floor(parse_native("2.999").unwrap()), 2);
        assert_eq!(whole_units_floor(U256::MAX), u64::MAX);
    }

    #[test]
    fn clamp_wager__falls_back_to_minimum_for_small_balance() {
        let balance = U256::from(10u64);
        assert_eq!(clamp_wager(ONE_NATIVE, balance), MIN_WAGER);
    }

    #[test]
    fn step_wager__moves_by_minimum_unit_within_bounds() {
        let balance = parse_native("0.003").unwrap();
        let two = parse_native("0.002").unwrap();

        assert_eq!(step_wager(two, true, balance), balance);
        assert_eq!(step_wager(balance, true, balance), balance);
        assert_eq!(step_wager(MIN_WAGER, false, balance), MIN_WAGER);
    }

    proptest! {
        #[test]
        fn format_native__parses_back_to_same_amount(wei in any::<u128>()) {
            let amount = U256::from(wei);
            let text = format_native(amount);
            prop_assert_eq!(parse_native(&text).unwrap(), amount);
        }

        #[test]
        fn whole_units_floor__is_largest_whole_not_above_amount(wei in any::<u128>()) {
            let amount = U256::from(wei);
            let floor = U256::from(whole_units_floor(amount));
            prop_assert!(floor * ONE_NATIVE <= amount);
            prop_assert!((floor + U256::from(1u64)) * ONE_NATIVE > amount);
        }

        #[test]
        fn clamp_wager__stays_within_minimum_and_balance(
            wager in any::<u128>(),
            balance in 1_000_000_000_000_000u128..u128::MAX,
        ) {
            let balance = U256::from(balance);
            let clamped = clamp_wager(U256::from(wager), balance);
            prop_assert!(clamped >= MIN_WAGER);
            prop_assert!(clamped <= balance);
        }
    }
}
