//! Decimal precision rules.
//!
//! Quantities carry 3 decimal places, unit costs 4 and currency amounts 2.
//! Every computed output goes through one of the `round_*` helpers so the
//! rules hold regardless of which service produced the number. Rounding is
//! half-up (midpoint away from zero).

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{DomainError, DomainResult};

pub const QUANTITY_DP: u32 = 3;
pub const COST_DP: u32 = 4;
pub const CURRENCY_DP: u32 = 2;

fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round_quantity(value: Decimal) -> Decimal {
    round_half_up(value, QUANTITY_DP)
}

pub fn round_cost(value: Decimal) -> Decimal {
    round_half_up(value, COST_DP)
}

pub fn round_currency(value: Decimal) -> Decimal {
    round_half_up(value, CURRENCY_DP)
}

fn out_of_range() -> DomainError {
    DomainError::validation("amount out of range")
}

/// `a * b`, or a validation error when the product does not fit a `Decimal`.
pub fn checked_product(a: Decimal, b: Decimal) -> DomainResult<Decimal> {
    a.checked_mul(b).ok_or_else(out_of_range)
}

/// `a / b`; dividing by zero is also reported as out of range.
pub fn checked_quotient(a: Decimal, b: Decimal) -> DomainResult<Decimal> {
    a.checked_div(b).ok_or_else(out_of_range)
}

/// Overflow-checked sum.
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> DomainResult<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .ok_or_else(out_of_range)
}

/// Weighted average cost after receiving `new_qty` at `new_cost` on top of
/// `old_qty` held at `old_avg`.
///
/// When the existing quantity is zero or negative the incoming cost becomes
/// the new average.
pub fn weighted_average_cost(
    old_qty: Decimal,
    old_avg: Decimal,
    new_qty: Decimal,
    new_cost: Decimal,
) -> Decimal {
    if old_qty <= Decimal::ZERO {
        return round_cost(new_cost);
    }
    let total_qty = old_qty + new_qty;
    if total_qty <= Decimal::ZERO {
        return round_cost(old_avg);
    }
    round_cost((old_qty * old_avg + new_qty * new_cost) / total_qty)
}

/// Average cost after taking `removed_qty` valued at `removed_cost` back out
/// of the stock (the inverse of [`weighted_average_cost`]).
///
/// If nothing remains the previous average is kept; the result never drops
/// below zero.
pub fn remove_from_average(
    old_qty: Decimal,
    old_avg: Decimal,
    removed_qty: Decimal,
    removed_cost: Decimal,
) -> Decimal {
    let remaining = old_qty - removed_qty;
    if remaining <= Decimal::ZERO {
        return round_cost(old_avg);
    }
    let value = old_qty * old_avg - removed_qty * removed_cost;
    round_cost((value / remaining).max(Decimal::ZERO))
}
