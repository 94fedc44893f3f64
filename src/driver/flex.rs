//! String-or-number JSON fields.
//!
//! Tracker APIs are inconsistent about whether codes and counters are sent
//! as `"42"` or `42`. These wrappers decode both, trying the string shape
//! first and the numeric shape second.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::units::parse_number;

/// A value the API may send as a string or a number, kept as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlexString(pub String);

/// An integer the API may send as `"42"` or `42`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlexInt(pub i64);

impl FlexString {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value, 0 when the text is not a number.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        parse_number(&self.0).unwrap_or(0.0)
    }
}

impl fmt::Display for FlexString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for FlexString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        match Raw::deserialize(deserializer) {
            Ok(Raw::Text(text)) => Ok(Self(text)),
            Ok(Raw::Number(number)) => Ok(Self(number.to_string())),
            Err(_) => Err(serde::de::Error::custom("expected a string or a number")),
        }
    }
}

impl Serialize for FlexString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for FlexInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Integer(i64),
        }

        match Raw::deserialize(deserializer) {
            Ok(Raw::Text(text)) => text
                .trim()
                .parse()
                .map(Self)
                .map_err(|_| serde::de::Error::custom(format!("'{text}' is not an integer"))),
            Ok(Raw::Integer(value)) => Ok(Self(value)),
            Err(_) => Err(serde::de::Error::custom("expected an integer or an integer string")),
        }
    }
}

impl Serialize for FlexInt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_flex_string_accepts_both_shapes() {
        assert_eq!(serde_json::from_value::<FlexString>(json!("0")).unwrap().as_str(), "0");
        assert_eq!(serde_json::from_value::<FlexString>(json!(0)).unwrap().as_str(), "0");
        assert_eq!(serde_json::from_value::<FlexString>(json!(1.5)).unwrap().to_f64(), 1.5);
        assert!(serde_json::from_value::<FlexString>(json!(null)).is_err());
        assert!(serde_json::from_value::<FlexString>(json!([1])).is_err());
    }

    #[test]
    fn test_flex_int_try_order() {
        assert_eq!(serde_json::from_value::<FlexInt>(json!("42")).unwrap(), FlexInt(42));
        assert_eq!(serde_json::from_value::<FlexInt>(json!(" 7 ")).unwrap(), FlexInt(7));
        assert_eq!(serde_json::from_value::<FlexInt>(json!(42)).unwrap(), FlexInt(42));
        assert!(serde_json::from_value::<FlexInt>(json!("4.2")).is_err());
        assert!(serde_json::from_value::<FlexInt>(json!("lots")).is_err());
        assert!(serde_json::from_value::<FlexInt>(json!(4.2)).is_err());
    }

    #[test]
    fn test_optional_flex_int_null() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(default)]
            seeders: Option<FlexInt>,
        }
        let row: Row = serde_json::from_value(json!({"seeders": null})).unwrap();
        assert!(row.seeders.is_none());
    }
}
