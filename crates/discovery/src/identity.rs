//! Device identifier generation and validation.

use rand::Rng;
use soundtrack_protocol::constants::ID_LEN;

use crate::DiscoveryError;

/// Generates a random 10-character device id.
///
/// Each character starts as a value in `48..109`. Values above `'9'` are
/// shifted by 7 into the upper-case range, and values that then land above
/// `'Z'` are shifted by another 6 into the lower-case range. The result is
/// digits, `A`-`Z` and `a`-`y`; `z` never appears.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| char::from(remap(rng.gen_range(48..109))))
        .collect()
}

fn remap(mut value: u8) -> u8 {
    if value > 57 {
        value += 7;
    }
    if value > 90 {
        value += 6;
    }
    value
}

/// Checks a device id. The empty id means "unset" and is always valid.
pub fn validate_id(id: &str) -> Result<(), DiscoveryError> {
    if id.is_empty() {
        return Ok(());
    }
    if id.len() != ID_LEN {
        return Err(DiscoveryError::InvalidId {
            id: id.to_string(),
            reason: "must be 10 characters long",
        });
    }
    if !id.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(DiscoveryError::InvalidId {
            id: id.to_string(),
            reason: "invalid characters",
        });
    }
    Ok(())
}
