//! Validation engine: shapes flatten into rules, rules check records.

use serde_json::Value;
use tracing::debug;

use crate::core::predicate::Predicate;
use crate::core::record::{self, Record};
use crate::core::shape::{Field, Shape};
use crate::error::ValidationError;

/// Declarative constraint on one path.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Slash path such as `/a/b`.
    pub key: String,
    pub allows: Vec<Predicate>,
    pub required: bool,
    pub message: Option<String>,
}

/// Depth-first walk of `shape` producing one rule per leaf.
///
/// `required` applies to every rule produced by this call.
pub fn flatten(shape: &Shape, required: bool) -> Vec<Rule> {
    let mut rules = Vec::new();
    flatten_into(shape, "", required, &mut rules);
    rules
}

fn flatten_into(shape: &Shape, prefix: &str, required: bool, rules: &mut Vec<Rule>) {
    for (name, field) in shape.fields() {
        let key = format!("{prefix}/{name}");
        let (allows, message) = match field {
            Field::Leaf(predicate) => (vec![predicate.clone()], None),
            Field::LeafNull => (vec![Predicate::Null], None),
            Field::LeafChoice { allows, message } => (allows.clone(), message.clone()),
            Field::Nested(inner) => {
                flatten_into(inner, &key, required, rules);
                continue;
            }
        };
        rules.push(Rule {
            key,
            allows,
            required,
            message,
        });
    }
}

/// Check `record` against `rules` in order, stopping at the first violation.
///
/// Absent or null values of optional rules are skipped. A required rule whose
/// key is absent always fails. Otherwise the value must satisfy at least one
/// predicate in a non-empty `allows`.
pub fn validate(record: &Record, method: &str, rules: &[Rule]) -> Result<(), Box<ValidationError>> {
    for rule in rules {
        let got = record::lookup(record, &rule.key);
        if !rule.required && matches!(got, None | Some(Value::Null)) {
            continue;
        }
        let accepted = match got {
            None => false,
            Some(_) if rule.allows.is_empty() => true,
            Some(_) => rule.allows.iter().any(|predicate| predicate.test(got)),
        };
        if !accepted {
            let err = ValidationError {
                method: method.to_string(),
                rule: rule.clone(),
                got: got.cloned(),
                record: record.clone(),
            };
            debug!(
                method,
                key = %rule.key,
                expected = %err.expected(),
                required = rule.required,
                got = ?got,
                "validation failed"
            );
            return Err(Box::new(err));
        }
    }
    Ok(())
}

/// Predicate form of [`validate`]: true iff `record` satisfies `shape`.
pub fn isa(shape: &Shape, required: bool) -> impl Fn(&Record) -> bool + use<> {
    let rules = flatten(shape, required);
    move |record| validate(record, "isa", &rules).is_ok()
}
