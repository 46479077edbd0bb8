//! Random identifiers in the canonical dashed-hex form.
//!
//! [`generate_uuid`] draws 128 bits from the operating system's random source
//! and formats them as `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`. The RFC 4122
//! version and variant bits are left as drawn, so the result is a random
//! 128-bit label rather than a conformant version 4 UUID. [`is_uuid`] checks
//! the shape only and does not inspect those bits either.
//!
//! ```
//! use bubblestore_core::uuid::{generate_uuid, is_uuid};
//!
//! let id = generate_uuid();
//! assert!(is_uuid(&id));
//! assert!(!is_uuid("not-a-uuid"));
//! ```

use rand::{RngCore, rngs::OsRng};

/// Length of `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`.
const CANONICAL_LEN: usize = 36;

/// Byte offsets of the four dashes in the canonical form.
const DASH_POSITIONS: [usize; 4] = [8, 13, 18, 23];

/// Generate a fresh random identifier.
///
/// The 16 random bytes come from [`OsRng`], which blocks only as long as the
/// platform's own random source does.
#[must_use]
pub fn generate_uuid() -> String {
    let mut bytes = [0_u8; 16];
    OsRng.fill_bytes(&mut bytes);
    ::uuid::Uuid::from_bytes(bytes).hyphenated().to_string()
}

/// Returns `true` if `candidate` is a lowercase, dash-separated 8-4-4-4-12 hex
/// string.
#[must_use]
pub fn is_uuid(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    bytes.len() == CANONICAL_LEN
        && bytes.iter().enumerate().all(|(index, byte)| {
            if DASH_POSITIONS.contains(&index) {
                *byte == b'-'
            } else {
                matches!(byte, b'0'..=b'9' | b'a'..=b'f')
            }
        })
}
