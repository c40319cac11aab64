//! Typed view of setting values for export

use serde::Serialize;

/// A setting value with a guessed type.
///
/// The file stores every value as text. Export guesses a type from the
/// text alone: `"0"` and `"1"` become booleans, other numbers become
/// numbers, anything else stays a string. The guess is lossy for fields
/// whose legitimate values are the strings `"0"`/`"1"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl SettingValue {
    /// Guess the type of a raw value
    pub fn coerce(raw: &str) -> Self {
        match raw {
            "0" => return SettingValue::Bool(false),
            "1" => return SettingValue::Bool(true),
            _ => {}
        }

        if let Ok(i) = raw.parse::<i64>() {
            return SettingValue::Integer(i);
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => SettingValue::Float(f),
            _ => SettingValue::Text(raw.to_string()),
        }
    }
}

impl From<&str> for SettingValue {
    fn from(raw: &str) -> Self {
        SettingValue::coerce(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce() {
        assert_eq!(SettingValue::coerce("1"), SettingValue::Bool(true));
        assert_eq!(SettingValue::coerce("0"), SettingValue::Bool(false));
        assert_eq!(SettingValue::coerce("2"), SettingValue::Integer(2));
        assert_eq!(SettingValue::coerce("-15"), SettingValue::Integer(-15));
        assert_eq!(SettingValue::coerce("3.75"), SettingValue::Float(3.75));
        assert_eq!(
            SettingValue::coerce("ZWO ASI120MM"),
            SettingValue::Text("ZWO ASI120MM".to_string())
        );
        assert_eq!(SettingValue::coerce("NaN"), SettingValue::Text("NaN".to_string()));
        assert_eq!(SettingValue::coerce(""), SettingValue::Text(String::new()));
    }

    #[test]
    fn test_serializes_untagged() {
        let values = vec![
            SettingValue::Bool(true),
            SettingValue::Integer(2),
            SettingValue::Float(1.5),
            SettingValue::Text("x".into()),
        ];
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"[true,2,1.5,"x"]"#);
    }
}
