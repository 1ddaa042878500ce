//! Runaway tool-call detection.
//!
//! Every tool invocation in a run is keyed by its name plus a canonical
//! rendering of its arguments. Object keys are sorted so that `{"a":1,"b":2}`
//! and `{"b":2,"a":1}` collide; array order and number formatting are kept
//! exactly as parsed.

use std::collections::HashMap;

use serde_json::Value;

/// Deterministic JSON rendering with recursively sorted object keys.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// The repeat-guard key for one invocation: `name:canonical(args)`.
pub fn guard_key(tool_name: &str, args: &Value) -> String {
    format!("{tool_name}:{}", canonical_json(args))
}

/// Per-run invocation counter. Created at run start, dropped at run end.
#[derive(Debug)]
pub struct RepeatGuard {
    limit: u32,
    counts: HashMap<String, u32>,
}

/// A tool/argument pair went past the configured repeat limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatTripped {
    pub count: u32,
    pub limit: u32,
}

impl RepeatGuard {
    /// `limit` is floored at 1.
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            counts: HashMap::new(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Count one invocation. Fails on the call that takes the count past
    /// the limit, never earlier.
    pub fn record(&mut self, tool_name: &str, args: &Value) -> Result<u32, RepeatTripped> {
        let count = self.counts.entry(guard_key(tool_name, args)).or_insert(0);
        *count += 1;
        if *count > self.limit {
            return Err(RepeatTripped {
                count: *count,
                limit: self.limit,
            });
        }
        Ok(*count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b":{"y":1,"x":[2,1]},"a":"s"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{ "a" : "s", "b" : { "x" : [2,1], "y" : 1 } }"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":"s","b":{"x":[2,1],"y":1}}"#);
    }

    #[test]
    fn array_order_is_significant() {
        assert_ne!(canonical_json(&json!([1, 2])), canonical_json(&json!([2, 1])));
    }

    #[test]
    fn numbers_are_not_normalised() {
        let int: Value = serde_json::from_str("1").unwrap();
        let float: Value = serde_json::from_str("1.0").unwrap();
        assert_ne!(canonical_json(&int), canonical_json(&float));
    }

    #[test]
    fn keys_sort_by_code_point() {
        assert_eq!(canonical_json(&json!({ "b": 1, "B": 2, "a": 3 })), r#"{"B":2,"a":3,"b":1}"#);
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(canonical_json(&json!({ "q\"k": "line\nbreak" })), r#"{"q\"k":"line\nbreak"}"#);
    }

    #[test]
    fn guard_key_prefixes_tool_name() {
        assert_eq!(guard_key("sum", &json!({ "b": 3, "a": 2 })), r#"sum:{"a":2,"b":3}"#);
    }

    #[test]
    fn trips_on_limit_plus_one() {
        let mut guard = RepeatGuard::new(3);
        let args = json!({ "a": 2, "b": 3 });
        for expected in 1..=3 {
            assert_eq!(guard.record("sum", &args), Ok(expected));
        }
        assert_eq!(
            guard.record("sum", &json!({ "b": 3, "a": 2 })),
            Err(RepeatTripped { count: 4, limit: 3 })
        );
    }

    #[test]
    fn distinct_arguments_count_separately() {
        let mut guard = RepeatGuard::new(1);
        assert!(guard.record("sum", &json!({ "a": 1 })).is_ok());
        assert!(guard.record("sum", &json!({ "a": 2 })).is_ok());
        assert!(guard.record("mul", &json!({ "a": 1 })).is_ok());
        assert!(guard.record("sum", &json!({ "a": 1 })).is_err());
    }

    #[test]
    fn zero_limit_is_floored_to_one() {
        let mut guard = RepeatGuard::new(0);
        assert_eq!(guard.limit(), 1);
        assert!(guard.record("t", &json!({})).is_ok());
        assert!(guard.record("t", &json!({})).is_err());
    }
}
