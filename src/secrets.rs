//! # Secret References
//!
//! Provisioners never hand secret values to the converter directly. Instead they
//! return an opaque *secret reference* token naming a Kubernetes `Secret` and a
//! key inside it:
//!
//! ```text
//! 🔐💬<secret-name>_<key>💬🔐
//! ```
//!
//! The converter turns environment variables whose whole value is one such
//! token into `valueFrom.secretKeyRef`. Any token that survives conversion
//! (for example one interpolated into the middle of a command argument) would
//! leak a placeholder into the cluster, so every manifest is passed through
//! [`find_first_unresolved_secret_ref`] before it is emitted.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const MAGIC_PREFIX: &str = "🔐💬";
const MAGIC_SUFFIX: &str = "💬🔐";

/// Kubernetes secret names are DNS subdomains and cannot contain `_`, so the
/// first underscore separates the name from the key.
#[allow(clippy::expect_used)]
static SECRET_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^🔐💬([a-z0-9.\-]+)_(.+?)💬🔐$").expect("valid secret reference regex")
});

/// Encode a reference to `key` inside the Kubernetes secret `secret`.
pub fn encode_secret_ref(secret: &str, key: &str) -> String {
    format!("{MAGIC_PREFIX}{secret}_{key}{MAGIC_SUFFIX}")
}

/// Decode a string that consists of exactly one secret reference.
///
/// Returns `None` when the string is not a single, whole reference.
pub fn decode_secret_ref(value: &str) -> Option<(String, String)> {
    let caps = SECRET_REF.captures(value)?;
    let name = caps.get(1)?.as_str();
    let key = caps.get(2)?.as_str();
    if key.contains(MAGIC_PREFIX) {
        return None;
    }
    Some((name.to_string(), key.to_string()))
}

/// Whether the string contains any secret reference, resolved or not.
pub fn contains_secret_ref(value: &str) -> bool {
    value.contains(MAGIC_PREFIX)
}

/// Walk a decoded manifest and return the structural path of the first string
/// that still carries a secret reference.
///
/// Mapping entries extend the path with `.key`, sequence items with `[i]`.
/// Returns `None` when the document is clean.
pub fn find_first_unresolved_secret_ref(prefix: &str, node: &Value) -> Option<String> {
    match node {
        Value::String(s) if contains_secret_ref(s) => Some(prefix.to_string()),
        Value::Object(map) => map.iter().find_map(|(key, child)| {
            find_first_unresolved_secret_ref(&format!("{prefix}.{key}"), child)
        }),
        Value::Array(items) => items.iter().enumerate().find_map(|(i, child)| {
            find_first_unresolved_secret_ref(&format!("{prefix}[{i}]"), child)
        }),
        _ => None,
    }
}
