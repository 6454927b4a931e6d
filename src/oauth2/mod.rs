// ABOUTME: OAuth2 protocol implementation for the mock identity provider
// ABOUTME: Authorization flow, token issuance, and dynamic client registration
//
// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod client_registration;
pub mod flow;
pub mod models;
pub mod tokens;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;

/// Generate an unguessable URL-safe secret of `bytes` random bytes.
///
/// Used for authorization codes, access tokens, refresh tokens, and
/// client secrets.
#[must_use]
pub fn random_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_values_are_unique_and_urlsafe() {
        let a = random_urlsafe(32);
        let b = random_urlsafe(32);
        assert_ne!(a, b);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
