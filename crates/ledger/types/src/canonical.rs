//! Deterministic JSON canonicalization.
//!
//! Every committed hash in the ledger is computed over the canonical form, so
//! any party holding the stored fields can reproduce it byte-for-byte:
//! - object keys sorted by byte order at every depth
//! - no insignificant whitespace
//! - integral floats rendered as integers (`1.0` and `1` canonicalize alike)
//! - remaining floats in shortest round-trip form

use serde::Serialize;
use serde_json::{Number, Value};

use crate::error::ChainError;

/// Largest magnitude at which every integral `f64` is exactly representable.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Render a JSON value in canonical form.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Serialize any value through `serde_json` and render it canonically.
pub fn canonicalize_serializable<T: Serialize>(value: &T) -> Result<String, ChainError> {
    let value =
        serde_json::to_value(value).map_err(|e| ChainError::Serialization(e.to_string()))?;
    Ok(canonicalize(&value))
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(number) => write_number(out, number),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();

            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                if let Some(item) = map.get(key) {
                    write_value(out, item);
                }
            }
            out.push('}');
        }
    }
}

fn write_number(out: &mut String, number: &Number) {
    if let Some(i) = number.as_i64() {
        out.push_str(&i.to_string());
    } else if let Some(u) = number.as_u64() {
        out.push_str(&u.to_string());
    } else if let Some(f) = number.as_f64() {
        if f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT_INT {
            out.push_str(&(f as i64).to_string());
        } else {
            out.push_str(&number.to_string());
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    // Value's Display emits compact JSON with standard escaping.
    out.push_str(&Value::String(s.to_owned()).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_at_every_depth() {
        let value = json!({
            "zeta": 1,
            "alpha": { "y": true, "b": [3, 2, 1] },
        });
        assert_eq!(
            canonicalize(&value),
            r#"{"alpha":{"b":[3,2,1],"y":true},"zeta":1}"#
        );
    }

    #[test]
    fn integral_floats_match_integers() {
        assert_eq!(canonicalize(&json!({"n": 1.0})), canonicalize(&json!({"n": 1})));
        assert_eq!(canonicalize(&json!(-0.0)), "0");
        assert_eq!(canonicalize(&json!(2.5)), "2.5");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(
            canonicalize(&json!("line\n\"quoted\"")),
            r#""line\n\"quoted\"""#
        );
    }

    #[test]
    fn empty_containers() {
        assert_eq!(canonicalize(&json!({})), "{}");
        assert_eq!(canonicalize(&json!([])), "[]");
        assert_eq!(canonicalize(&Value::Null), "null");
    }

    #[test]
    fn serializable_structs_are_canonicalized() {
        #[derive(Serialize)]
        struct Signable<'a> {
            prev_hash: &'a str,
            actor_id: &'a str,
        }

        let rendered = canonicalize_serializable(&Signable {
            prev_hash: "00",
            actor_id: "archon-1",
        })
        .unwrap();
        assert_eq!(rendered, r#"{"actor_id":"archon-1","prev_hash":"00"}"#);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z0-9 ]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn canonical_form_is_a_fixed_point(value in arb_json()) {
            let rendered = canonicalize(&value);
            let reparsed: Value = serde_json::from_str(&rendered).unwrap();
            prop_assert_eq!(canonicalize(&reparsed), rendered);
        }
    }
}
