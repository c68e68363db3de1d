//! Closed catalogue of named value predicates.
//!
//! Predicates run over `Option<&Value>` so that an absent key ("undefined") is
//! distinguishable from a present `null`. Adding a check means adding a variant.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static ABSOLUTE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").unwrap());
static QNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+:[^\s/]+$").unwrap());
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_]+([.-]?[A-Za-z0-9_]+)*@[A-Za-z0-9_]+([.-]?[A-Za-z0-9_]+)*(\.[A-Za-z0-9_]{2,3})+$")
        .unwrap()
});
static IPV4_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)\.([0-9]+)\.([0-9]+)\.([0-9]+)$").unwrap());
static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}(\.[0-9]+)?(Z|[+-][0-9]{2}:?[0-9]{2})$")
        .unwrap()
});

/// Element test used by [`Predicate::ArrayOf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Number,
    String,
    Object,
    Dictionary,
    Json,
    Atomic,
}

impl Element {
    fn predicate(self) -> Predicate {
        match self {
            Self::Number => Predicate::Number,
            Self::String => Predicate::String,
            Self::Object => Predicate::Object,
            Self::Dictionary => Predicate::Dictionary,
            Self::Json => Predicate::Json,
            Self::Atomic => Predicate::Atomic,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Number => "Number",
            Self::String => "String",
            Self::Object => "Object",
            Self::Dictionary => "Dictionary",
            Self::Json => "JSON",
            Self::Atomic => "Atomic",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Undefined,
    Null,
    /// Absent or `null`.
    Nullish,
    Boolean,
    True,
    False,
    Number,
    /// Number with a zero fractional part.
    Integer,
    String,
    /// Any non-primitive: arrays and objects.
    Object,
    /// Plain key/value objects only.
    Dictionary,
    Array,
    ArrayOf(Element),
    /// String starting with a `scheme:` prefix.
    AbsoluteUrl,
    /// `prefix:rest` with no whitespace or slash in `rest`.
    QName,
    EMail,
    IPv4,
    Timestamp,
    Json,
    /// Boolean, number, string or null.
    Atomic,
    Empty,
    Anything,
    Enumeration(Vec<Value>),
}

impl Predicate {
    /// Membership test against an array, or against a dictionary's values.
    ///
    /// Any other source yields an enumeration that accepts nothing.
    pub fn enumeration(source: &Value) -> Self {
        match source {
            Value::Array(items) => Self::Enumeration(items.clone()),
            Value::Object(map) => Self::Enumeration(map.values().cloned().collect()),
            _ => Self::Enumeration(Vec::new()),
        }
    }

    /// Parse a diagnostic name back into a predicate. The `is.` prefix is
    /// optional. Enumerations have no name form.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix("is.").unwrap_or(name);
        if let Some(element) = name.strip_prefix("Array.of.") {
            let element = match element {
                "Number" => Element::Number,
                "String" => Element::String,
                "Object" => Element::Object,
                "Dictionary" => Element::Dictionary,
                "JSON" => Element::Json,
                "Atomic" => Element::Atomic,
                _ => return None,
            };
            return Some(Self::ArrayOf(element));
        }
        let predicate = match name {
            "Undefined" => Self::Undefined,
            "Null" => Self::Null,
            "Nullish" => Self::Nullish,
            "Boolean" => Self::Boolean,
            "Boolean.True" | "True" => Self::True,
            "Boolean.False" | "False" => Self::False,
            "Number" => Self::Number,
            "Integer" => Self::Integer,
            "String" => Self::String,
            "Object" => Self::Object,
            "Dictionary" => Self::Dictionary,
            "Array" => Self::Array,
            "AbsoluteURL" => Self::AbsoluteUrl,
            "QName" => Self::QName,
            "EMail" => Self::EMail,
            "IPv4" => Self::IPv4,
            "Timestamp" => Self::Timestamp,
            "JSON" => Self::Json,
            "Atomic" => Self::Atomic,
            "Empty" => Self::Empty,
            "Anything" => Self::Anything,
            _ => return None,
        };
        Some(predicate)
    }

    /// Stable diagnostic name, e.g. `is.Array.of.String`.
    pub fn name(&self) -> String {
        let name = match self {
            Self::Undefined => "Undefined",
            Self::Null => "Null",
            Self::Nullish => "Nullish",
            Self::Boolean => "Boolean",
            Self::True => "Boolean.True",
            Self::False => "Boolean.False",
            Self::Number => "Number",
            Self::Integer => "Integer",
            Self::String => "String",
            Self::Object => "Object",
            Self::Dictionary => "Dictionary",
            Self::Array => "Array",
            Self::ArrayOf(element) => return format!("is.Array.of.{}", element.name()),
            Self::AbsoluteUrl => "AbsoluteURL",
            Self::QName => "QName",
            Self::EMail => "EMail",
            Self::IPv4 => "IPv4",
            Self::Timestamp => "Timestamp",
            Self::Json => "JSON",
            Self::Atomic => "Atomic",
            Self::Empty => "Empty",
            Self::Anything => "Anything",
            Self::Enumeration(_) => "Enumeration",
        };
        format!("is.{name}")
    }

    pub fn test(&self, value: Option<&Value>) -> bool {
        match self {
            Self::Undefined => value.is_none(),
            Self::Null => matches!(value, Some(Value::Null)),
            Self::Nullish => matches!(value, None | Some(Value::Null)),
            Self::Empty => is_empty(value),
            Self::Anything => true,
            _ => value.is_some_and(|value| self.test_present(value)),
        }
    }

    fn test_present(&self, value: &Value) -> bool {
        match self {
            Self::Undefined => false,
            Self::Null | Self::Nullish => value.is_null(),
            Self::Boolean => value.is_boolean(),
            Self::True => value == &Value::Bool(true),
            Self::False => value == &Value::Bool(false),
            Self::Number => value.as_f64().is_some_and(f64::is_finite),
            Self::Integer => is_integer(value),
            Self::String => value.is_string(),
            Self::Object => value.is_object() || value.is_array(),
            Self::Dictionary => value.is_object(),
            Self::Array => value.is_array(),
            Self::ArrayOf(element) => {
                let inner = element.predicate();
                value
                    .as_array()
                    .is_some_and(|items| items.iter().all(|item| inner.test_present(item)))
            }
            Self::AbsoluteUrl => matches_str(value, &ABSOLUTE_URL_RE),
            Self::QName => matches_str(value, &QNAME_RE),
            Self::EMail => matches_str(value, &EMAIL_RE),
            Self::IPv4 => is_ipv4(value),
            Self::Timestamp => matches_str(value, &TIMESTAMP_RE),
            // Anything representable as a serde_json value is JSON.
            Self::Json => true,
            Self::Atomic => !(value.is_object() || value.is_array()),
            Self::Empty => is_empty(Some(value)),
            Self::Anything => true,
            Self::Enumeration(members) => members.iter().any(|member| equal(member, value)),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

fn matches_str(value: &Value, re: &Regex) -> bool {
    value.as_str().is_some_and(|text| re.is_match(text))
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(number) if number.is_i64() || number.is_u64() => true,
        Value::Number(number) => number.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0),
        _ => false,
    }
}

fn is_ipv4(value: &Value) -> bool {
    let Some(captures) = value.as_str().and_then(|text| IPV4_RE.captures(text)) else {
        return false;
    };
    captures
        .iter()
        .skip(1)
        .flatten()
        .all(|octet| octet.as_str().parse::<u8>().is_ok())
}

/// Deep structural equality. Numbers compare by value, so `1` equals `1.0`.
pub fn equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_f64() || y.is_f64() => {
            x.as_f64() == y.as_f64()
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| equal(x, y)))
        }
        _ => a == b,
    }
}

/// Type-aware emptiness: absent, null, `false`, `0`, `""`, `[]` and `{}`.
pub fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(flag)) => !flag,
        Some(Value::Number(number)) => number.as_f64() == Some(0.0),
        Some(Value::String(text)) => text.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
    }
}

/// Truthiness used by cursors and conditions: absent, null, `false`, `0` and
/// `""` are false; everything else, including empty containers, is true.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}
