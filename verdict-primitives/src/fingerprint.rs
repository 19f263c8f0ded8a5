//! Content hashing and fingerprinting.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::canonical::canonical_json;

/// Sentinel hash recorded when the prior state of an audited object is
/// absent (e.g. the `before_hash` of a create entry).
pub const NULL_HASH: &str = "null";

/// Number of hex characters retained in a short fingerprint.
const FINGERPRINT_LEN: usize = 16;

/// Returns the 16-hex-character prefix of the SHA-256 of the canonical
/// rendering of `value`.
#[must_use]
pub fn fingerprint(value: &Value) -> String {
    let mut full = hash_full(value);
    full.truncate(FINGERPRINT_LEN);
    full
}

/// Returns the full 64-hex-character SHA-256 of the canonical rendering
/// of `value`.
#[must_use]
pub fn hash_full(value: &Value) -> String {
    let canonical = canonical_json(value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hashes the audited identity of a policy: id, name, version, namespace,
/// status, and the rule list. `None` hashes to [`NULL_HASH`] so a create
/// entry can record the absence of a prior state.
#[must_use]
pub fn policy_content_hash(
    policy: Option<(&str, &str, &str, &str, &str, &Value)>,
) -> String {
    match policy {
        None => NULL_HASH.to_owned(),
        Some((id, name, version, namespace, status, rules)) => hash_full(&json!({
            "id": id,
            "name": name,
            "version": version,
            "namespace": namespace,
            "status": status,
            "rules": rules,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_is_sixteen_hex_chars() {
        let fp = fingerprint(&json!({"a": 1}));
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn identical_values_share_a_fingerprint() {
        let a = json!({"user": {"id": "u1"}, "llm": {"model": "gpt-4"}});
        let b = json!({"llm": {"model": "gpt-4"}, "user": {"id": "u1"}});
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn distinct_values_diverge() {
        assert_ne!(fingerprint(&json!({"a": 1})), fingerprint(&json!({"a": 2})));
    }

    #[test]
    fn absent_policy_hashes_to_null() {
        assert_eq!(policy_content_hash(None), NULL_HASH);
    }

    #[test]
    fn policy_hash_tracks_content() {
        let rules = json!([{"id": "r1"}]);
        let a = policy_content_hash(Some(("p1", "P", "1.0.0", "ns", "active", &rules)));
        let b = policy_content_hash(Some(("p1", "P", "1.0.1", "ns", "active", &rules)));
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
