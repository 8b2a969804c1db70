//! `key=value` pipeline parameters from the command line.

use serde_json::{Map, Number, Value};

use crate::error::{Result, SimError};

/// Parse pairs into a parameter map. Later pairs win.
pub fn parse_params<S: AsRef<str>>(pairs: &[S]) -> Result<Map<String, Value>> {
    let mut params = Map::new();
    for pair in pairs {
        let (key, value) = parse_pair(pair.as_ref())?;
        params.insert(key, value);
    }
    Ok(params)
}

fn parse_pair(pair: &str) -> Result<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| SimError::Param(pair.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(SimError::Param(pair.to_string()));
    }
    Ok((key.to_string(), parse_value(raw.trim())))
}

/// Integers, floats and booleans are typed; anything else stays a string.
pub fn parse_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<u64>() {
        return Value::Number(n.into());
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_values() {
        let params = parse_params(&["steps=5", "seedPattern=toad", "rate=0.5", "offset=-2", "fast=true"]).unwrap();
        assert_eq!(params["steps"], json!(5));
        assert_eq!(params["seedPattern"], json!("toad"));
        assert_eq!(params["rate"], json!(0.5));
        assert_eq!(params["offset"], json!(-2));
        assert_eq!(params["fast"], json!(true));
    }

    #[test]
    fn test_value_may_contain_equals() {
        let params = parse_params(&["label=a=b"]).unwrap();
        assert_eq!(params["label"], json!("a=b"));
    }

    #[test]
    fn test_rejects_malformed_pairs() {
        assert!(matches!(parse_params(&["steps"]), Err(SimError::Param(_))));
        assert!(matches!(parse_params(&["=5"]), Err(SimError::Param(_))));
    }

    #[test]
    fn test_nan_stays_string() {
        assert_eq!(parse_value("NaN"), json!("NaN"));
        assert_eq!(parse_value(""), json!(""));
    }
}
