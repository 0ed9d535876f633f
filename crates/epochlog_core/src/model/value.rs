//! Property values attached to entities.
//!
//! `PropertyValue` is a closed tagged union; `Measurement` is carried as an
//! opaque quantity/exponent/unit triple owned by the host's unit system.

use serde::{Deserialize, Serialize};

/// A measured quantity, e.g. `quantity=2.5, exponent=-3, base_unit="V"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub quantity: f64,
    pub exponent: i32,
    pub base_unit: String,
}

impl Measurement {
    pub fn new(quantity: f64, exponent: i32, base_unit: impl Into<String>) -> Self {
        Self {
            quantity,
            exponent,
            base_unit: base_unit.into(),
        }
    }
}

/// Dynamically typed scalar stored under a property key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Measurement(Measurement),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Measurement> for PropertyValue {
    fn from(value: Measurement) -> Self {
        Self::Measurement(value)
    }
}
