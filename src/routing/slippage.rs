//! Minimum-output and price-impact math
//!
//! Amounts stay in `U256`; floats only appear in display percentages.

use alloy_primitives::U256;
use serde::Serialize;

use crate::oracle::PairReserves;

pub const BPS_DENOMINATOR: u64 = 10_000;

/// Quoted output less slippage tolerance and aggregator fee, floored at zero.
pub fn min_out(quoted: U256, slippage_bps: u16, fee_bps: u16) -> U256 {
    let haircut = u64::from(slippage_bps) + u64::from(fee_bps);
    if haircut >= BPS_DENOMINATOR {
        return U256::ZERO;
    }
    quoted * U256::from(BPS_DENOMINATOR - haircut) / U256::from(BPS_DENOMINATOR)
}

/// Display-only impact estimate for a route
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceImpact {
    /// Summed per-hop impact, in percent
    pub impact_pct: f64,
    /// Aggregator fee, in percent
    pub fee_pct: f64,
    /// True when no hop had readable reserves
    pub estimated: bool,
}

/// Per hop `amountIn / (reserveIn + amountIn)`, summed over hops whose
/// reserves are known. `hop_amounts[i]` is the amount entering hop `i`.
///
/// With nothing readable, falls back to 0.1% per whole input unit capped
/// at 5%.
pub fn price_impact(
    reserves: &[Option<PairReserves>],
    hop_amounts: &[U256],
    input_decimals: u8,
    fee_bps: u16,
) -> PriceImpact {
    let fee_pct = f64::from(fee_bps) / 100.0;
    let mut total = 0.0;
    let mut readable = 0usize;

    for (hop, amount) in reserves.iter().zip(hop_amounts) {
        let Some(r) = hop else { continue };
        if r.reserve_in.is_zero() {
            continue;
        }
        let amount = to_f64(*amount);
        let reserve = to_f64(r.reserve_in);
        total += amount / (reserve + amount) * 100.0;
        readable += 1;
    }

    if readable == 0 {
        let units = hop_amounts
            .first()
            .map(|a| to_f64(*a) / 10f64.powi(i32::from(input_decimals)))
            .unwrap_or(0.0);
        return PriceImpact {
            impact_pct: (units * 0.1).min(5.0),
            fee_pct,
            estimated: true,
        };
    }

    PriceImpact {
        impact_pct: total,
        fee_pct,
        estimated: false,
    }
}

fn to_f64(v: U256) -> f64 {
    v.to_string().parse().unwrap_or(f64::MAX)
}

/// Render a raw amount with `decimals`, trimming trailing zeros
pub fn format_units(amount: U256, decimals: u8) -> String {
    let raw = amount.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return raw;
    }
    let padded = format!("{:0>width$}", raw, width = decimals + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let frac = frac_part.trim_end_matches('0');
    if frac.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, frac)
    }
}

/// Parse a human amount like `1.5` into raw units
pub fn parse_units(amount: &str, decimals: u8) -> Option<U256> {
    let amount = amount.trim();
    let (int_part, frac_part) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };
    if frac_part.len() > decimals as usize || (int_part.is_empty() && frac_part.is_empty()) {
        return None;
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let digits = format!(
        "{}{}{}",
        int_part,
        frac_part,
        "0".repeat(decimals as usize - frac_part.len())
    );
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Some(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).ok()
}
