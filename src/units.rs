//! Conversions between user-entered decimal strings and smallest-unit integers

use crate::error::{BridgeError, BridgeResult};

use ethers::types::U256;
use ethers::utils::{format_units, parse_units};

/// Decimals of every native asset the registry knows about
pub const NATIVE_DECIMALS: u32 = 18;

/// Places shown for balances
pub const BALANCE_DISPLAY_PLACES: u32 = 4;

/// Parse a human-entered amount into smallest units
pub fn parse_amount(amount: &str, decimals: u32) -> BridgeResult<U256> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::InvalidAmount("empty amount".to_string()));
    }

    parse_units(trimmed, decimals)
        .map(U256::from)
        .map_err(|e| BridgeError::InvalidAmount(format!("{}: {}", trimmed, e)))
}

/// True when the amount is empty, unparseable, or zero
pub fn is_blank_amount(amount: &str, decimals: u32) -> bool {
    parse_amount(amount, decimals)
        .map(|v| v.is_zero())
        .unwrap_or(true)
}

/// Format a smallest-unit value with every significant decimal
pub fn format_amount(value: U256, decimals: u32) -> BridgeResult<String> {
    format_units(value, decimals).map_err(|e| BridgeError::Internal(e.to_string()))
}

/// Format a smallest-unit value rounded half-up to a fixed number of places
pub fn format_fixed(value: U256, decimals: u32, places: u32) -> String {
    let places = places.min(decimals);
    let scale = U256::exp10((decimals - places) as usize);

    let rounded = if scale > U256::one() {
        (value + scale / 2) / scale
    } else {
        value
    };

    let unit = U256::exp10(places as usize);
    let whole = rounded / unit;
    let frac = rounded % unit;

    if places == 0 {
        whole.to_string()
    } else {
        format!(
            "{}.{:0>width$}",
            whole,
            frac.to_string(),
            width = places as usize
        )
    }
}

/// Balance display used by the view
pub fn format_balance(value: U256, decimals: u32) -> String {
    format_fixed(value, decimals, BALANCE_DISPLAY_PLACES)
}
