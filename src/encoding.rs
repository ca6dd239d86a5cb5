//! Canonical serialization for hashing and signing.
//!
//! Two equal logical values must serialize to identical bytes: objects emit
//! their keys in sorted order with compact separators and no whitespace, so
//! the output can feed a SHA-256 digest or an ECDSA signing input directly.
//! `serde_json`'s `Map` is backed by a `BTreeMap` (the `preserve_order`
//! feature stays off), which makes sorted keys a structural property rather
//! than a post-processing step. All numeric fields are integers; floating
//! point never appears in a canonical encoding because its textual form is
//! not reproducible across platforms.

use serde_json::Value;

/// Serialize `value` to canonical bytes: sorted keys, no whitespace.
pub fn canonical(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("serializing an in-memory JSON value cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_and_compact() {
        let value = json!({
            "zeta": 1,
            "alpha": {"delta": 2, "beta": 3},
        });
        assert_eq!(
            canonical(&value),
            br#"{"alpha":{"beta":3,"delta":2},"zeta":1}"#
        );
    }

    #[test]
    fn test_equal_values_encode_identically() {
        let a = json!({"x": 1, "y": null});
        let b = json!({"y": null, "x": 1});
        assert_eq!(canonical(&a), canonical(&b));
    }

    #[test]
    fn test_no_whitespace() {
        let value = json!({"a": [1, 2, 3], "b": "text with spaces"});
        let encoded = canonical(&value);
        let outside_strings: Vec<u8> = String::from_utf8(encoded)
            .unwrap()
            .split('"')
            .step_by(2)
            .flat_map(|chunk| chunk.bytes())
            .collect();
        assert!(!outside_strings.iter().any(|b| b.is_ascii_whitespace()));
    }
}
