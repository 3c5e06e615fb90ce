use alloy_primitives::utils::{format_units, parse_units, UnitsError};
use alloy_primitives::U256;

/// Decimals of the native currency on both chains
pub(crate) const NATIVE_DECIMALS: u8 = 18;

/// Converts a raw token amount into display units as a float.
///
/// Precision beyond `f64` is lost; the result only feeds USD comparisons.
pub(crate) fn to_display(amount: U256, decimals: u8) -> Result<f64, UnitsError> {
    let formatted = format_units(amount, decimals)?;
    // format_units always yields a plain decimal string
    Ok(formatted.parse::<f64>().unwrap_or(f64::MAX))
}

/// Wei to ether (or any 18-decimals native unit)
pub(crate) fn to_ether(wei: U256) -> Result<f64, UnitsError> {
    to_display(wei, NATIVE_DECIMALS)
}

/// Display units to wei, truncating below 18 decimals.
///
/// Goes through the shortest round-trip decimal form of the float so that
/// `0.1` becomes exactly `10^17` wei.
pub(crate) fn to_wei(amount: f64) -> Result<U256, UnitsError> {
    let formatted = amount.max(0.0).to_string();
    let truncated = match formatted.split_once('.') {
        Some((whole, frac)) if frac.len() > NATIVE_DECIMALS as usize => {
            format!("{whole}.{}", &frac[..NATIVE_DECIMALS as usize])
        }
        _ => formatted,
    };
    Ok(parse_units(&truncated, NATIVE_DECIMALS)?.get_absolute())
}
