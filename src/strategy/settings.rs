//! Parameter and variable reflection over serde.
//!
//! A strategy keeps its configurable parameters in a plain serde struct.
//! The declared parameter names are that struct's field names, in
//! declaration order.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Ordered name → value mapping used for settings and snapshots.
pub type Setting = serde_json::Map<String, Value>;

/// Serialize a struct into an ordered mapping.
pub fn to_setting<T: Serialize>(value: &T) -> Setting {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(kind = %value_kind(&other), "Value does not serialize to a mapping");
            Setting::new()
        }
        Err(e) => {
            warn!(error = %e, "Failed to serialize value");
            Setting::new()
        }
    }
}

/// Default values of a parameter struct.
pub fn class_parameters<T: Serialize + Default>() -> Setting {
    to_setting(&T::default())
}

/// Overwrite every field of `target` whose name appears in `setting`.
///
/// Unknown keys are ignored. The update is all-or-nothing: if any matched
/// value has the wrong type, `target` is left untouched. Returns the names
/// that were applied.
pub fn merge_setting<T>(target: &mut T, setting: &Setting) -> Result<Vec<String>>
where
    T: Serialize + DeserializeOwned,
{
    let mut current = to_setting(target);
    let mut applied = Vec::new();

    for (name, value) in setting {
        if let Some(slot) = current.get_mut(name) {
            *slot = value.clone();
            applied.push(name.clone());
        }
    }

    if applied.is_empty() {
        return Ok(applied);
    }

    *target = serde_json::from_value(Value::Object(current))
        .with_context(|| format!("Invalid value for parameter(s): {}", applied.join(", ")))?;

    Ok(applied)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct DemoParams {
        window: usize,
        threshold: Decimal,
        label: String,
    }

    impl Default for DemoParams {
        fn default() -> Self {
            Self {
                window: 20,
                threshold: dec!(1.5),
                label: "demo".to_string(),
            }
        }
    }

    fn setting(value: Value) -> Setting {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_keys_keep_declaration_order() {
        let keys: Vec<String> = class_parameters::<DemoParams>().keys().cloned().collect();
        assert_eq!(keys, vec!["window", "threshold", "label"]);
    }

    #[test]
    fn test_merge_applies_known_keys() {
        let mut params = DemoParams::default();
        let applied =
            merge_setting(&mut params, &setting(json!({"window": 5, "threshold": 2}))).unwrap();

        assert_eq!(applied, vec!["window", "threshold"]);
        assert_eq!(params.window, 5);
        assert_eq!(params.threshold, dec!(2));
        assert_eq!(params.label, "demo");
    }

    #[test]
    fn test_merge_ignores_unknown_keys() {
        let mut params = DemoParams::default();
        let applied = merge_setting(&mut params, &setting(json!({"unknownKey": 1}))).unwrap();

        assert!(applied.is_empty());
        assert_eq!(params, DemoParams::default());
    }

    #[test]
    fn test_merge_is_all_or_nothing() {
        let mut params = DemoParams::default();
        let result = merge_setting(
            &mut params,
            &setting(json!({"window": 7, "label": ["not", "a", "string"]})),
        );

        assert!(result.is_err());
        assert_eq!(params, DemoParams::default());
    }
}
