//! Canonical JSON: la forma serializada sobre la que se calculan identidades.
//!
//! - Objetos con claves ordenadas (el orden de inserción no importa).
//! - Sin espacios redundantes.
//! - Arrays en su orden original (una secuencia sí es ordenada).
//! - Números tal como los imprime `serde_json` (`1` y `1.0` son distintos).

use serde_json::Value;
use std::collections::BTreeMap;

pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // `Display` de un `Value::String` ya produce el literal JSON escapado.
        Value::String(_) => value.to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let mut tree = BTreeMap::new();
            for (k, v) in map {
                tree.insert(k, to_canonical_json(v));
            }
            let items: Vec<String> = tree.into_iter()
                                         .map(|(k, v)| format!("{}:{}", Value::from(k.as_str()), v))
                                         .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::to_canonical_json;
    use serde_json::json;

    #[test]
    fn primitives() {
        assert_eq!(to_canonical_json(&json!(null)), "null");
        assert_eq!(to_canonical_json(&json!(true)), "true");
        assert_eq!(to_canonical_json(&json!(123)), "123");
        assert_eq!(to_canonical_json(&json!(0.1)), "0.1");
        assert_eq!(to_canonical_json(&json!("RespiNasale")), "\"RespiNasale\"");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(to_canonical_json(&json!("a\"b")), "\"a\\\"b\"");
    }

    #[test]
    fn object_keys_sorted_at_every_level() {
        let val = json!({ "z": [ { "y": "yes", "b": 1 }, null ], "a": { "x": 10 } });
        assert_eq!(to_canonical_json(&val),
                   "{\"a\":{\"x\":10},\"z\":[{\"b\":1,\"y\":\"yes\"},null]}");
    }

    #[test]
    fn array_order_is_preserved() {
        assert_ne!(to_canonical_json(&json!([1, 2])), to_canonical_json(&json!([2, 1])));
    }
}
