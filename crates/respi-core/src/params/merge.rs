//! Utilidades para fusionar parámetros JSON de forma determinista.
//!
//! Merge "deep": cuando ambos lados son objetos se fusiona clave a clave de
//! forma recursiva; en cualquier otra combinación el override reemplaza al
//! default (un array override reemplaza al array completo).

use serde_json::{Map, Value};

use crate::errors::ParamsError;

/// Merge recursivo: claves de `overrides` reemplazan a las de `base`.
pub fn deep_merge(base: &Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (Value::Object(mb), Value::Object(mo)) => {
            let mut out = mb.clone();
            for (k, v) in mo.iter() {
                let merged = match out.get(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => v.clone(),
                };
                out.insert(k.clone(), merged);
            }
            Value::Object(out)
        }
        (_, other) => other.clone(),
    }
}

/// Verifica que cada clave de `overrides` exista en `base` (recursivamente
/// mientras ambos lados sean objetos).
fn check_known_keys(base: &Map<String, Value>, overrides: &Map<String, Value>, prefix: &str) -> Result<(), ParamsError> {
    for (k, v) in overrides {
        let path = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
        match base.get(k) {
            None => return Err(ParamsError::UnknownKey { path }),
            Some(Value::Object(nested_base)) => {
                if let Value::Object(nested_over) = v {
                    check_known_keys(nested_base, nested_over, &path)?;
                }
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Params efectivos de una llamada. `Null` o un objeto vacío significan "sin
/// overrides".
pub fn effective_params(defaults: &Value, overrides: &Value) -> Result<Value, ParamsError> {
    let over = match overrides {
        Value::Null => return Ok(defaults.clone()),
        Value::Object(m) if m.is_empty() => return Ok(defaults.clone()),
        Value::Object(m) => m,
        other => return Err(ParamsError::NotAnObject(other.to_string())),
    };
    match defaults {
        Value::Object(base) => check_known_keys(base, over, "")?,
        _ => {
            let first = over.keys().next().cloned().unwrap_or_default();
            return Err(ParamsError::UnknownKey { path: first });
        }
    }
    Ok(deep_merge(defaults, overrides))
}

/// Construye un override anidado a partir de una ruta con puntos:
/// `override_at("psd_params.lowest_freq", 0.2)` ->
/// `{"psd_params": {"lowest_freq": 0.2}}`.
pub fn override_at(path: &str, value: Value) -> Value {
    path.rsplit('.').fold(value, |acc, segment| {
                        let mut m = Map::new();
                        m.insert(segment.to_string(), acc);
                        Value::Object(m)
                    })
}
