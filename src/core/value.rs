use std::fmt;
use serde::{Deserialize, Serialize};
use crate::core::{MigrateError, Result};

/// A single field value stored in a record.
///
/// Serialized untagged, so JSON manifests can spell constants and defaults as
/// plain literals (`null`, `42`, `1.5`, `"text"`, `true`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer(_) => "INTEGER",
            Self::Float(_) => "FLOAT",
            Self::Text(_) => "TEXT",
            Self::Boolean(_) => "BOOLEAN",
        }
    }

    /// The declared type this value carries, `None` for `Null`.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(DataType::Integer),
            Self::Float(_) => Some(DataType::Float),
            Self::Text(_) => Some(DataType::Text),
            Self::Boolean(_) => Some(DataType::Boolean),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Explicit conversion into `target`.
    ///
    /// Only called from custom mapping rules; automatic inference never casts.
    pub fn cast_to(&self, target: &DataType) -> Result<Value> {
        let mismatch = || {
            MigrateError::TypeMismatch(format!(
                "Cannot cast {} value '{}' to {}",
                self.type_name(),
                self,
                target
            ))
        };

        match (self, target) {
            (Self::Null, _) => Ok(Self::Null),
            (value, target) if value.data_type().as_ref() == Some(target) => Ok(value.clone()),

            (Self::Integer(i), DataType::Float) => Ok(Self::Float(*i as f64)),
            (Self::Integer(i), DataType::Boolean) => Ok(Self::Boolean(*i != 0)),
            (Self::Float(f), DataType::Integer) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Ok(Self::Integer(*f as i64))
                } else {
                    Err(mismatch())
                }
            }
            (Self::Boolean(b), DataType::Integer) => Ok(Self::Integer(i64::from(*b))),

            (Self::Integer(_) | Self::Float(_) | Self::Boolean(_), DataType::Text) => {
                Ok(Self::Text(self.to_string()))
            }

            (Self::Text(s), DataType::Integer) => {
                s.trim().parse::<i64>().map(Self::Integer).map_err(|_| mismatch())
            }
            (Self::Text(s), DataType::Float) => {
                s.trim().parse::<f64>().map(Self::Float).map_err(|_| mismatch())
            }
            (Self::Text(s), DataType::Boolean) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Self::Boolean(true)),
                "false" | "0" | "no" => Ok(Self::Boolean(false)),
                _ => Err(mismatch()),
            },

            _ => Err(mismatch()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => {
                if a.is_nan() && b.is_nan() {
                    return true;
                }
                a == b
            }
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            // No cross-type equality: an Integer never equals a Float.
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(fl) => {
                if fl.is_nan() {
                    write!(f, "NaN")
                } else if fl.is_infinite() {
                    if *fl > 0.0 {
                        write!(f, "Infinity")
                    } else {
                        write!(f, "-Infinity")
                    }
                } else {
                    write!(f, "{}", fl)
                }
            }
            Self::Text(s) => write!(f, "{}", s),
            Self::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
}

impl DataType {
    /// Exact-match check. `Null` is accepted here; nullability is the field's concern.
    pub fn is_compatible(&self, value: &Value) -> bool {
        match value.data_type() {
            None => true,
            Some(actual) => actual == *self,
        }
    }

    /// Value a non-nullable field receives when nothing else supplies one.
    pub fn zero_value(&self) -> Value {
        match self {
            Self::Integer => Value::Integer(0),
            Self::Float => Value::Float(0.0),
            Self::Text => Value::Text(String::new()),
            Self::Boolean => Value::Boolean(false),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality_is_strict() {
        assert_eq!(Value::Integer(42), Value::Integer(42));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Integer(1), Value::Float(1.0));
        assert_ne!(Value::Text("1".into()), Value::Integer(1));
    }

    #[test]
    fn test_type_compatibility() {
        let int_type = DataType::Integer;
        assert!(int_type.is_compatible(&Value::Integer(42)));
        assert!(int_type.is_compatible(&Value::Null));
        assert!(!int_type.is_compatible(&Value::Text("hello".into())));
        assert!(!DataType::Float.is_compatible(&Value::Integer(1)));
    }

    #[test]
    fn test_explicit_casts() {
        assert_eq!(Value::Integer(7).cast_to(&DataType::Text).unwrap(), Value::Text("7".into()));
        assert_eq!(Value::Text(" 12 ".into()).cast_to(&DataType::Integer).unwrap(), Value::Integer(12));
        assert_eq!(Value::Float(3.0).cast_to(&DataType::Integer).unwrap(), Value::Integer(3));
        assert_eq!(Value::Text("yes".into()).cast_to(&DataType::Boolean).unwrap(), Value::Boolean(true));
        assert_eq!(Value::Null.cast_to(&DataType::Float).unwrap(), Value::Null);

        assert!(Value::Float(3.5).cast_to(&DataType::Integer).is_err());
        assert!(Value::Text("abc".into()).cast_to(&DataType::Float).is_err());
        assert!(Value::Float(1.0).cast_to(&DataType::Boolean).is_err());
    }

    #[test]
    fn test_untagged_json_literals() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 5, 2.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Boolean(true),
                Value::Integer(5),
                Value::Float(2.5),
                Value::Text("x".into()),
            ]
        );
    }
}
