//! Random identifiers.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("operating system randomness unavailable: {0}")]
pub struct IdError(String);

/// A fresh identifier: `prefix` followed by 16 random bytes in hex.
pub fn random_id(prefix: &str) -> Result<String, IdError> {
    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes).map_err(|e| IdError(e.to_string()))?;
    Ok(format!("{prefix}{}", hex::encode(bytes)))
}
