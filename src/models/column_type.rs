//! Column type system: the closed set of store types, single-value type
//! inference, and the generalization lattice used when schemas conflict.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ClickLinkError, Result};
use crate::models::value::Value;

/// Data type of a store column.
///
/// Rendered to and parsed from the store's spelling (`Int64`,
/// `Array(String)`, ...). `Array` nests one level in practice; deeper
/// nesting is folded to `String` by [`generalize`](ColumnType::generalize).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Date,
    DateTime,
    Array(Box<ColumnType>),
}

impl ColumnType {
    /// Whether this is one of the integer types (signed or unsigned).
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::UInt8
                | ColumnType::UInt16
                | ColumnType::UInt32
                | ColumnType::UInt64
                | ColumnType::Int8
                | ColumnType::Int16
                | ColumnType::Int32
                | ColumnType::Int64
        )
    }

    /// Whether this is a float type.
    pub fn is_float(&self) -> bool {
        matches!(self, ColumnType::Float32 | ColumnType::Float64)
    }

    fn is_signed(&self) -> bool {
        matches!(
            self,
            ColumnType::Int8 | ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64
        )
    }

    fn bit_width(&self) -> u32 {
        match self {
            ColumnType::UInt8 | ColumnType::Int8 => 8,
            ColumnType::UInt16 | ColumnType::Int16 => 16,
            ColumnType::UInt32 | ColumnType::Int32 | ColumnType::Float32 => 32,
            ColumnType::UInt64 | ColumnType::Int64 | ColumnType::Float64 => 64,
            _ => 0,
        }
    }

    /// Infer the column type for a single value.
    ///
    /// Fails for `Null` (no type information), for empty arrays (no element
    /// to infer from) and for arrays whose non-null elements infer to more
    /// than one distinct type. Nested records infer as `String` — they are
    /// stored as JSON text when they survive to the wire at all.
    pub fn infer(value: &Value, field: &str) -> Result<ColumnType> {
        match value {
            Value::Null => Err(ClickLinkError::TypeInference {
                field: field.to_string(),
                message: "value is null".to_string(),
            }),
            Value::Bool(_) => Ok(ColumnType::UInt8),
            Value::Int(_) => Ok(ColumnType::Int64),
            Value::UInt(_) => Ok(ColumnType::UInt64),
            Value::Float(_) => Ok(ColumnType::Float64),
            Value::String(_) => Ok(ColumnType::String),
            Value::Date(_) => Ok(ColumnType::Date),
            Value::DateTime(_) => Ok(ColumnType::DateTime),
            Value::Object(_) => Ok(ColumnType::String),
            Value::Array(elements) => {
                let mut candidates: Vec<ColumnType> = Vec::new();
                for element in elements {
                    if element.is_null() {
                        continue;
                    }
                    let inferred = ColumnType::infer(element, field)?;
                    if !candidates.contains(&inferred) {
                        candidates.push(inferred);
                    }
                }
                match candidates.len() {
                    0 => Err(ClickLinkError::TypeInference {
                        field: field.to_string(),
                        message: "cannot infer element type of an empty array".to_string(),
                    }),
                    1 => Ok(ColumnType::Array(Box::new(candidates.remove(0)))),
                    _ => Err(ClickLinkError::TypeInference {
                        field: field.to_string(),
                        message: format!(
                            "array contains values of contradicting types {}",
                            candidates
                                .iter()
                                .map(ColumnType::to_string)
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                    }),
                }
            }
        }
    }

    /// Lattice join: the narrowest type able to represent values of both
    /// `self` (the existing column type) and `new` (the incoming
    /// requirement). Total and commutative in effect; `String` is the
    /// universal fallback.
    pub fn generalize(&self, new: &ColumnType) -> ColumnType {
        use ColumnType::*;

        if self == new {
            return self.clone();
        }
        match (self, new) {
            (Array(a), Array(b)) => Array(Box::new(a.generalize(b))),
            (Array(_), _) | (_, Array(_)) => String,
            (a, b) if a.is_integer() && b.is_float() => b.clone(),
            (a, b) if a.is_float() && b.is_integer() => a.clone(),
            (a, b) if a.is_integer() && b.is_integer() => {
                if a.is_signed() == b.is_signed() {
                    if a.bit_width() >= b.bit_width() {
                        a.clone()
                    } else {
                        b.clone()
                    }
                } else {
                    // A strictly wider signed type covers the unsigned range;
                    // otherwise there is no integer join.
                    let (signed, unsigned) = if a.is_signed() { (a, b) } else { (b, a) };
                    if signed.bit_width() > unsigned.bit_width() {
                        signed.clone()
                    } else {
                        String
                    }
                }
            }
            (a, b) if a.is_float() && b.is_float() => {
                if a.bit_width() >= b.bit_width() {
                    a.clone()
                } else {
                    b.clone()
                }
            }
            (Date, DateTime) | (DateTime, Date) => DateTime,
            _ => String,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::UInt8 => write!(f, "UInt8"),
            ColumnType::UInt16 => write!(f, "UInt16"),
            ColumnType::UInt32 => write!(f, "UInt32"),
            ColumnType::UInt64 => write!(f, "UInt64"),
            ColumnType::Int8 => write!(f, "Int8"),
            ColumnType::Int16 => write!(f, "Int16"),
            ColumnType::Int32 => write!(f, "Int32"),
            ColumnType::Int64 => write!(f, "Int64"),
            ColumnType::Float32 => write!(f, "Float32"),
            ColumnType::Float64 => write!(f, "Float64"),
            ColumnType::String => write!(f, "String"),
            ColumnType::Date => write!(f, "Date"),
            ColumnType::DateTime => write!(f, "DateTime"),
            ColumnType::Array(inner) => write!(f, "Array({inner})"),
        }
    }
}

impl FromStr for ColumnType {
    type Err = ClickLinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UInt8" => Ok(ColumnType::UInt8),
            "UInt16" => Ok(ColumnType::UInt16),
            "UInt32" => Ok(ColumnType::UInt32),
            "UInt64" => Ok(ColumnType::UInt64),
            "Int8" => Ok(ColumnType::Int8),
            "Int16" => Ok(ColumnType::Int16),
            "Int32" => Ok(ColumnType::Int32),
            "Int64" => Ok(ColumnType::Int64),
            "Float32" => Ok(ColumnType::Float32),
            "Float64" => Ok(ColumnType::Float64),
            "String" => Ok(ColumnType::String),
            "Date" => Ok(ColumnType::Date),
            "DateTime" => Ok(ColumnType::DateTime),
            _ => {
                if let Some(inner) = s.strip_prefix("Array(").and_then(|s| s.strip_suffix(')')) {
                    Ok(ColumnType::Array(Box::new(inner.parse()?)))
                } else {
                    Err(ClickLinkError::Decode(format!(
                        "unsupported column type '{s}'"
                    )))
                }
            }
        }
    }
}

impl Serialize for ColumnType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let spelled = std::string::String::deserialize(deserializer)?;
        spelled.parse().map_err(serde::de::Error::custom)
    }
}
