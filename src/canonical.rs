//! Canonical textual serialization for map-side shuffle keys.
//!
//! The map side of every wide operator (§4.3) buffers `key -> accumulator`
//! by a *stringified* form of the key, because the accumulator map must be
//! addressable by any `Eq + Hash` key the user's extractor produces, and the
//! same stringification must be byte-identical across workers so that the
//! hash partitioner routes a given key to the same bucket everywhere.
//!
//! We piggyback on `serde_json::Value` for this: serialize the key, then
//! recursively sort every object's entries by key name before re-stringifying.
//! Sorting object entries keeps `{1,2}` and `{2,1}`-shaped maps canonically
//! equal; JSON already distinguishes integers from floats and length-prefixes
//! nothing, but strings are quoted/escaped consistently by `serde_json`, which
//! is enough to make the encoding collision-free for the key types this crate
//! expects (primitives, tuples, strings, small structs).

use serde::Serialize;
use serde_json::Value;

/// Serialize `key` to its canonical textual form.
///
/// Panics only if `key`'s `Serialize` impl itself fails, which does not
/// happen for the `RFBound`-style element types this crate supports.
pub fn canonical_key<K: Serialize>(key: &K) -> String {
    let value = serde_json::to_value(key).expect("key must be serializable");
    canonicalize(value).to_string()
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
