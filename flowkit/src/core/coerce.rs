//! Conversions between the atomic value types.
//!
//! Every atomic value classifies as one of five [`TypeTag`]s. [`convert`]
//! applies the fixed conversion table; [`coerce`] walks a caller preference
//! list and returns the first conversion that is defined.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

static LEADING_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[+-]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Null,
    Boolean,
    Integer,
    Number,
    String,
}

impl TypeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(Self::Null),
            "boolean" => Ok(Self::Boolean),
            "integer" => Ok(Self::Integer),
            "number" => Ok(Self::Number),
            "string" => Ok(Self::String),
            other => Err(format!(
                "unknown type {other:?} (expected null, boolean, integer, number or string)"
            )),
        }
    }
}

/// Type of an atomic value; `None` for arrays and objects.
pub fn classify(value: &Value) -> Option<TypeTag> {
    match value {
        Value::Null => Some(TypeTag::Null),
        Value::Bool(_) => Some(TypeTag::Boolean),
        Value::Number(number) if is_whole(number) => Some(TypeTag::Integer),
        Value::Number(_) => Some(TypeTag::Number),
        Value::String(_) => Some(TypeTag::String),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn is_whole(number: &Number) -> bool {
    number.is_i64()
        || number.is_u64()
        || number.as_f64().is_some_and(|f| f.fract() == 0.0)
}

/// Convert `value` to `to`. `None` where the table has no conversion: null
/// only converts to null, and strings that do not start with a number have no
/// numeric form.
pub fn convert(value: &Value, to: TypeTag) -> Option<Value> {
    let from = classify(value)?;
    if from == to {
        return Some(value.clone());
    }
    match (value, to) {
        (_, TypeTag::Null) => Some(Value::Null),
        (Value::Null, _) => None,
        (Value::Bool(flag), TypeTag::Integer | TypeTag::Number) => Some(Value::from(u8::from(*flag))),
        (Value::Bool(flag), TypeTag::String) => Some(Value::from(if *flag { "1" } else { "0" })),
        (Value::Number(number), TypeTag::Boolean) => {
            Some(Value::Bool(number.as_f64().is_some_and(|f| f != 0.0)))
        }
        (Value::Number(_), TypeTag::Number) => Some(value.clone()),
        (Value::Number(number), TypeTag::Integer) => number.as_f64().map(round_half_up),
        (Value::Number(number), TypeTag::String) => Some(Value::String(number_text(number))),
        (Value::String(text), TypeTag::Boolean) => Some(Value::Bool(string_flag(text))),
        (Value::String(text), TypeTag::Integer) => leading_number(text).map(round_half_up),
        (Value::String(text), TypeTag::Number) => leading_number(text).and_then(float_value),
        _ => None,
    }
}

/// First preferred type whose conversion is defined. An empty preference
/// list returns the value unchanged; non-atomic values never coerce.
pub fn coerce(value: &Value, preferred: &[TypeTag]) -> Option<Value> {
    classify(value)?;
    if preferred.is_empty() {
        return Some(value.clone());
    }
    preferred.iter().find_map(|to| convert(value, *to))
}

/// Head of a list, the value itself otherwise, `otherwise` when absent or empty.
pub fn first(value: Option<&Value>, otherwise: Value) -> Value {
    match value {
        None => otherwise,
        Some(Value::Array(items)) => items.first().cloned().unwrap_or(otherwise),
        Some(other) => other.clone(),
    }
}

/// Lists pass through, other values are wrapped, absent is `otherwise`.
pub fn list(value: Option<&Value>, otherwise: Vec<Value>) -> Vec<Value> {
    match value {
        None => otherwise,
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    }
}

fn string_flag(text: &str) -> bool {
    !matches!(text, "" | "0" | "off" | "false" | "no")
}

fn leading_number(text: &str) -> Option<f64> {
    LEADING_NUMBER_RE
        .find(text)
        .and_then(|found| found.as_str().trim().parse::<f64>().ok())
}

fn round_half_up(f: f64) -> Value {
    let rounded = (f + 0.5).floor();
    if rounded.abs() < 9.0e15 {
        Value::from(rounded as i64)
    } else {
        float_value(rounded).unwrap_or(Value::Null)
    }
}

fn float_value(f: f64) -> Option<Value> {
    Number::from_f64(f).map(Value::Number)
}

fn number_text(number: &Number) -> String {
    match number.as_f64() {
        Some(f) if number.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
            format!("{}", f as i64)
        }
        _ => number.to_string(),
    }
}
