//! Helpers for pulling typed values out of `AgentArgs`.

use medorch_common::{AgentArgs, AgentError};
use serde_json::{Map, Value};

/// A required string argument.
pub(crate) fn required_str<'a>(args: &'a AgentArgs, key: &str) -> Result<&'a str, AgentError> {
    match args.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim()),
        Some(Value::String(_)) => Err(AgentError::InvalidInput(format!("'{}' is empty", key))),
        Some(other) => Err(AgentError::InvalidInput(format!(
            "'{}' must be a string, got {}",
            key, other
        ))),
        None => Err(AgentError::InvalidInput(format!("missing '{}'", key))),
    }
}

/// A required JSON object argument.
pub(crate) fn required_object<'a>(
    args: &'a AgentArgs,
    key: &str,
) -> Result<&'a Map<String, Value>, AgentError> {
    match args.get(key) {
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(AgentError::InvalidInput(format!(
            "'{}' must be an object, got {}",
            key, other
        ))),
        None => Err(AgentError::InvalidInput(format!("missing '{}'", key))),
    }
}

/// Read a whole number from a number or a numeric string.
pub(crate) fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a list of strings from an array or a single string.
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Normalize free-form sex values to "F", "M" or `None`.
pub(crate) fn sex(patient: &Map<String, Value>) -> Option<&'static str> {
    let raw = patient.get("sex").or_else(|| patient.get("gender"))?.as_str()?;
    match raw.trim().to_lowercase().as_str() {
        "f" | "female" | "woman" => Some("F"),
        "m" | "male" | "man" => Some("M"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_str() {
        let mut args = AgentArgs::new();
        args.insert("report".into(), json!("  scan.png "));
        args.insert("blank".into(), json!(" "));
        args.insert("number".into(), json!(3));

        assert_eq!(required_str(&args, "report").unwrap(), "scan.png");
        assert!(required_str(&args, "blank").is_err());
        assert!(required_str(&args, "number").is_err());
        assert!(matches!(required_str(&args, "absent"), Err(AgentError::InvalidInput(_))));
    }

    #[test]
    fn test_number_and_list_coercion() {
        assert_eq!(as_u64(&json!(7)), Some(7));
        assert_eq!(as_u64(&json!("12")), Some(12));
        assert_eq!(as_u64(&json!(-1)), None);
        assert_eq!(string_list(Some(&json!(["a", " ", "b"]))), vec!["a", "b"]);
        assert_eq!(string_list(Some(&json!("asthma"))), vec!["asthma"]);
        assert!(string_list(None).is_empty());
    }

    #[test]
    fn test_sex_normalization() {
        let patient = json!({"sex": "male"});
        assert_eq!(sex(patient.as_object().unwrap()), Some("M"));
        let patient = json!({"gender": "Female"});
        assert_eq!(sex(patient.as_object().unwrap()), Some("F"));
        let patient = json!({"sex": "unknown"});
        assert_eq!(sex(patient.as_object().unwrap()), None);
    }
}
