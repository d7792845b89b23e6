use alloy::primitives::U256;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexError {
    #[error("quantity {0:?} is missing the 0x prefix")]
    MissingPrefix(String),
    #[error("invalid hex quantity {0:?}")]
    Invalid(String),
}

fn digits(value: &str) -> Result<&str, HexError> {
    let stripped = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| HexError::MissingPrefix(value.to_string()))?;
    if stripped.is_empty() {
        return Err(HexError::Invalid(value.to_string()));
    }
    Ok(stripped)
}

/// Decode a JSON-RPC hex quantity such as `"0x1b4"`.
pub fn decode_u64(value: &str) -> Result<u64, HexError> {
    u64::from_str_radix(digits(value)?, 16).map_err(|_| HexError::Invalid(value.to_string()))
}

pub fn decode_opt_u64(value: Option<&str>) -> Result<Option<u64>, HexError> {
    value.map(decode_u64).transpose()
}

/// Decode a 256-bit quantity (wei amounts) into its decimal string form.
pub fn decode_u256_decimal(value: &str) -> Result<String, HexError> {
    U256::from_str_radix(digits(value)?, 16)
        .map(|v| v.to_string())
        .map_err(|_| HexError::Invalid(value.to_string()))
}

pub fn encode_u64(value: u64) -> String {
    format!("0x{value:x}")
}
