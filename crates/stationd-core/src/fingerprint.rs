//! Deterministic operation fingerprints (spec §4.E, §8 property 1).
//!
//! A fingerprint is computed from `(kind, target, normalized params)`. Two
//! submissions with the same fingerprint are the same logical request, and
//! the scheduler must hand back the same [`crate::ids::OperationId`] for
//! both rather than enqueueing twice.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A deterministic key over `(kind, target, normalized params)`.
///
/// Normalization means: JSON object keys are sorted (via [`BTreeMap`]) and
/// `null`/absent optional fields are treated identically, so that requests
/// differing only in field order or in explicitly-passed defaults collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Fingerprint {
    /// Compute a fingerprint from an operation kind name, a target
    /// identifier (workstation name, project id, volume id, ...), and a
    /// JSON value of parameters. The parameters are normalized (keys
    /// sorted recursively) before hashing so that two logically-identical
    /// requests fingerprint identically regardless of field order.
    pub fn compute(kind: &str, target: &str, params: &Value) -> Self {
        let normalized = normalize(params);
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        kind.hash(&mut hasher);
        target.hash(&mut hasher);
        normalized.hash(&mut hasher);
        Fingerprint(format!("{kind}:{target}:{:016x}", hasher.finish()))
    }
}

/// Recursively sort object keys so the string/hash representation of a JSON
/// value depends only on its content, not on construction order.
fn normalize(value: &Value) -> String {
    fn walk(value: &Value, out: &mut String) {
        match value {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(&b.to_string()),
            Value::Number(n) => out.push_str(&n.to_string()),
            Value::String(s) => {
                out.push('"');
                out.push_str(s);
                out.push('"');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    walk(item, out);
                }
                out.push(']');
            }
            Value::Object(map) => {
                let sorted: BTreeMap<&String, &Value> = map.iter().collect();
                out.push('{');
                for (i, (k, v)) in sorted.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push('"');
                    out.push_str(k);
                    out.push_str("\":");
                    walk(v, out);
                }
                out.push('}');
            }
        }
    }
    let mut out = String::new();
    walk(value, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_order_does_not_change_fingerprint() {
        let a = Fingerprint::compute("apply-template", "w1", &json!({"template": "t", "force": false}));
        let b = Fingerprint::compute("apply-template", "w1", &json!({"force": false, "template": "t"}));
        assert_eq!(a, b);
    }

    #[test]
    fn different_target_changes_fingerprint() {
        let a = Fingerprint::compute("stop", "w1", &json!({}));
        let b = Fingerprint::compute("stop", "w2", &json!({}));
        assert_ne!(a, b);
    }

    #[test]
    fn different_kind_changes_fingerprint() {
        let a = Fingerprint::compute("stop", "w1", &json!({}));
        let b = Fingerprint::compute("start", "w1", &json!({}));
        assert_ne!(a, b);
    }
}
