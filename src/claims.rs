// ABOUTME: Scope-to-claims filtering per OIDC Core section 5.4
// ABOUTME: Pure function mapping (user claims, granted scope) to disclosed claims
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Scopes the server advertises in its discovery document.
pub const SUPPORTED_SCOPES: &[&str] = &["openid", "profile", "email", "address", "phone"];

/// Standard claims owned by the `profile` scope
const PROFILE_CLAIMS: &[&str] = &[
    "name",
    "family_name",
    "given_name",
    "middle_name",
    "nickname",
    "preferred_username",
    "profile",
    "picture",
    "website",
    "gender",
    "birthdate",
    "zoneinfo",
    "locale",
    "updated_at",
];

/// Standard claims owned by the `email` scope
const EMAIL_CLAIMS: &[&str] = &["email", "email_verified"];

/// Standard claims owned by the `address` scope
const ADDRESS_CLAIMS: &[&str] = &["address"];

/// Standard claims owned by the `phone` scope
const PHONE_CLAIMS: &[&str] = &["phone_number", "phone_number_verified"];

/// The scope that gates a standard claim, or `None` for custom claims.
fn owning_scope(claim: &str) -> Option<&'static str> {
    if PROFILE_CLAIMS.contains(&claim) {
        Some("profile")
    } else if EMAIL_CLAIMS.contains(&claim) {
        Some("email")
    } else if ADDRESS_CLAIMS.contains(&claim) {
        Some("address")
    } else if PHONE_CLAIMS.contains(&claim) {
        Some("phone")
    } else {
        None
    }
}

/// Filter user claims by granted scope.
///
/// A standard claim is disclosed only when its owning scope was granted.
/// Claims with non-standard names are always disclosed. `sub` is always
/// included. Deterministic and side-effect free.
#[must_use]
pub fn disclose(sub: &str, claims: &HashMap<String, Value>, scope: &str) -> Map<String, Value> {
    let granted: Vec<&str> = scope.split_whitespace().collect();

    let mut disclosed = Map::new();
    for (name, value) in claims {
        match owning_scope(name) {
            Some(owner) if !granted.contains(&owner) => {}
            _ => {
                disclosed.insert(name.clone(), value.clone());
            }
        }
    }
    disclosed.insert("sub".to_owned(), Value::String(sub.to_owned()));
    disclosed
}
