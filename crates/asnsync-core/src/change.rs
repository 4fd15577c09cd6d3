//! Dataset change detection
//!
//! Fingerprints are opaque: they are compared, never decoded.

use crate::error::{Error, Result};

/// State store key holding the fingerprint of the last imported dataset
pub const FINGERPRINT_KEY: &str = "fingerprint";

/// Decide whether a freshly fetched dataset differs from the imported one
///
/// # Parameters
///
/// - `fresh`: fingerprint of the dataset just fetched
/// - `stored`: fingerprint of the last successful import, if any
///
/// # Returns
///
/// - `Ok(true)`: nothing imported yet, or the fingerprints differ
/// - `Ok(false)`: the dataset is already imported
/// - `Err(Error::InvalidInput)`: the fresh fingerprint is empty
pub fn has_changed(fresh: &str, stored: Option<&str>) -> Result<bool> {
    let fresh = fresh.trim();
    if fresh.is_empty() {
        return Err(Error::invalid_input("Dataset fingerprint cannot be empty"));
    }

    Ok(match stored.map(str::trim) {
        Some(stored) if !stored.is_empty() => stored != fresh,
        _ => true,
    })
}
