use anyhow::{bail, Context};

use brains_core::constants::{ONE_TOKEN, TOKEN_DECIMALS};
use brains_core::types::Amount;

/// Parse a decimal token amount ("12", "0.5") into base units.
pub fn parse_tokens(s: &str) -> anyhow::Result<Amount> {
    let s = s.trim().replace('_', "");
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s.as_str(), ""),
    };
    if whole.is_empty() && frac.is_empty() {
        bail!("empty amount");
    }
    if frac.len() > TOKEN_DECIMALS as usize {
        bail!("at most {TOKEN_DECIMALS} decimal places");
    }

    let whole: Amount = if whole.is_empty() {
        0
    } else {
        whole.parse().with_context(|| format!("invalid amount {s:?}"))?
    };
    let frac_units: Amount = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = TOKEN_DECIMALS as usize);
        padded.parse().with_context(|| format!("invalid amount {s:?}"))?
    };

    whole
        .checked_mul(ONE_TOKEN)
        .and_then(|w| w.checked_add(frac_units))
        .with_context(|| format!("amount {s:?} out of range"))
}

/// Base units as a decimal token amount, trailing zeros trimmed.
pub fn format_tokens(amount: Amount) -> String {
    let whole = amount / ONE_TOKEN;
    let frac = amount % ONE_TOKEN;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0>width$}", width = TOKEN_DECIMALS as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}
