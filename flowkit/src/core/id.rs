//! Identifier case conversion and small id helpers.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::core::hash;

static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-_]").unwrap());
static ACRONYM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]+)([A-Z][^A-Z0-9]|$)").unwrap());
static UPPER_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([A-Z]+)([^A-Z])").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier must start with a letter: got {0:?}")]
    LeadingNonLetter(String),
    #[error("identifier must contain only letters, numbers, underscores and dashes: got {0:?}")]
    InvalidCharacter(String),
    #[error("cannot decode safe id {0:?}")]
    Decode(String),
}

fn check(identifier: &str) -> Result<(), IdError> {
    if !identifier.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(IdError::LeadingNonLetter(identifier.to_string()));
    }
    if identifier
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
    {
        return Err(IdError::InvalidCharacter(identifier.to_string()));
    }
    Ok(())
}

/// Split `CamelCase`, `dash-case` or `underscore_case` into lowercase parts.
///
/// Runs of capitals are kept together as one part (`HTMLParser` gives `html`,
/// `parser`). With `nonstrict` the identifier is not checked first.
pub fn parts(identifier: &str, nonstrict: bool) -> Result<Vec<String>, IdError> {
    if !nonstrict {
        check(identifier)?;
    }
    let spaced = SEPARATOR_RE.replace_all(identifier, " ");
    let spaced = ACRONYM_RE.replace_all(&spaced, " ${1} ${2}");
    let spaced = UPPER_RUN_RE.replace_all(&spaced, " ${1}${2}");
    Ok(spaced
        .to_lowercase()
        .split(' ')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn to_camel_case(identifier: &str, nonstrict: bool) -> Result<String, IdError> {
    let parts = parts(identifier, nonstrict)?;
    Ok(parts
        .iter()
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(head) => head.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect())
}

pub fn to_dash_case(identifier: &str, nonstrict: bool) -> Result<String, IdError> {
    Ok(parts(identifier, nonstrict)?.join("-"))
}

pub fn to_underscore_case(identifier: &str, nonstrict: bool) -> Result<String, IdError> {
    Ok(parts(identifier, nonstrict)?.join("_"))
}

/// Lowercase, map anything outside `[a-z0-9]` to `_`, collapse repeats.
pub fn slugify(identifier: &str) -> String {
    let mut out = String::with_capacity(identifier.len());
    for c in identifier.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Replace every character with `*`.
pub fn obscure(value: &str) -> String {
    value.chars().map(|_| '*').collect()
}

/// Encode arbitrary text as `_` followed by the hex of its UTF-8 bytes.
pub fn safe_encode(id: &str) -> String {
    format!("_{}", hex::encode(id.as_bytes()))
}

pub fn safe_decode(encoded: &str) -> Result<String, IdError> {
    let body = encoded
        .strip_prefix('_')
        .ok_or_else(|| IdError::Decode(encoded.to_string()))?;
    let bytes = hex::decode(body).map_err(|_| IdError::Decode(encoded.to_string()))?;
    String::from_utf8(bytes).map_err(|_| IdError::Decode(encoded.to_string()))
}

/// Everything after the first `#`, or the whole string when there is none.
pub fn code_from_string(id: &str) -> &str {
    match id.find('#') {
        Some(index) => &id[index + 1..],
        None => id,
    }
}

/// [`code_from_string`] applied to the `@id` attribute of an object.
pub fn code_from_attribute(value: &Value) -> String {
    value
        .get("@id")
        .and_then(Value::as_str)
        .map(code_from_string)
        .unwrap_or_default()
        .to_string()
}

pub fn uuid_v4() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `urn:flowkit:<prefix>:<remainder>`; a short random remainder when none is given.
pub fn urn(prefix: &str, remainder: Option<&str>) -> String {
    match remainder {
        Some(remainder) => format!("urn:flowkit:{prefix}:{remainder}"),
        None => format!("urn:flowkit:{prefix}:{}", hash::short(&uuid_v4())),
    }
}
