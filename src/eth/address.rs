//! Canonical Ethereum address handling
//!
//! Registry keys are always the lowercase, unprefixed 40-hex form. Everything
//! that touches an address string goes through [`normalize_address`] so lookups
//! are case- and prefix-insensitive.

use alloy_primitives::Address;

/// Errors from address normalization
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("Malformed address: expected 40 hex characters, got {0:?}")]
    Malformed(String),
}

/// Normalize an Ethereum address string to its canonical form.
///
/// Strips an optional `0x`/`0X` prefix, lowercases, and validates the result
/// is exactly 40 hexadecimal characters.
pub fn normalize_address(input: &str) -> Result<String, AddressError> {
    let trimmed = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")).unwrap_or(input);

    if trimmed.len() != 40 || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AddressError::Malformed(input.to_string()));
    }

    Ok(trimmed.to_ascii_lowercase())
}

/// Parse a canonical or wire-format address string into an [`Address`]
pub fn parse_address(input: &str) -> Result<Address, AddressError> {
    let canonical = normalize_address(input)?;
    let bytes = hex::decode(&canonical).map_err(|_| AddressError::Malformed(input.to_string()))?;
    Ok(Address::from_slice(&bytes))
}

/// Canonical form of a 20-byte address
pub fn canonical(address: &Address) -> String {
    hex::encode(address.as_slice())
}

/// Wire form of a canonical address (0x-prefixed, lowercase)
pub fn prefixed(canonical: &str) -> String {
    format!("0x{canonical}")
}

/// Extract the trailing 40-hex address from a descriptor basename, if present.
///
/// Descriptor filenames may carry an arbitrary prefix before the address; only
/// the last 40 characters matter and matching is case-insensitive.
pub fn address_from_basename(base_name: &str) -> Option<String> {
    if base_name.len() < 40 {
        return None;
    }
    // get() rather than indexing: a multi-byte character at the cut is not hex anyway
    let suffix = base_name.get(base_name.len() - 40..)?;
    normalize_address(suffix).ok()
}
