//! Declarative record shapes.
//!
//! A [`Shape`] is an ordered list of named fields. Each field is a single
//! predicate, an explicit `null`, a choice of predicates with an optional
//! diagnostic message, or a nested shape. Shapes are flattened into rules by
//! [`crate::core::validate::flatten`].

use serde_json::Value;

use crate::core::predicate::Predicate;
use crate::error::FlowError;

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Leaf(Predicate),
    LeafNull,
    LeafChoice {
        allows: Vec<Predicate>,
        message: Option<String>,
    },
    Nested(Shape),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Shape {
    fields: Vec<(String, Field)>,
}

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `field` under `name`, replacing an earlier field of the same name
    /// in place.
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = field,
            None => self.fields.push((name, field)),
        }
        self
    }

    pub fn leaf(self, name: impl Into<String>, predicate: Predicate) -> Self {
        self.field(name, Field::Leaf(predicate))
    }

    pub fn null(self, name: impl Into<String>) -> Self {
        self.field(name, Field::LeafNull)
    }

    pub fn choice(
        self,
        name: impl Into<String>,
        allows: Vec<Predicate>,
        message: Option<&str>,
    ) -> Self {
        self.field(
            name,
            Field::LeafChoice {
                allows,
                message: message.map(str::to_string),
            },
        )
    }

    pub fn nested(self, name: impl Into<String>, shape: Shape) -> Self {
        self.field(name, Field::Nested(shape))
    }

    pub fn fields(&self) -> &[(String, Field)] {
        &self.fields
    }

    /// Top-level field names in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse the JSON form of a shape.
    ///
    /// Leaves are predicate names (`"is.Number"`), `null`, or arrays mixing
    /// predicate names, `null` and at most one message that does not name a
    /// predicate. Objects nest.
    pub fn from_json(value: &Value) -> Result<Self, FlowError> {
        let Value::Object(map) = value else {
            return Err(FlowError::configuration(format!(
                "shape must be an object, got {value}"
            )));
        };
        let mut shape = Self::new();
        for (name, entry) in map {
            let field = match entry {
                Value::Null => Field::LeafNull,
                Value::String(text) => Field::Leaf(parse_predicate(name, text)?),
                Value::Object(_) => Field::Nested(Self::from_json(entry)?),
                Value::Array(items) => parse_choice(name, items)?,
                other => {
                    return Err(FlowError::configuration(format!(
                        "shape field {name}: expected predicate name, null, array or object, got {other}"
                    )));
                }
            };
            shape = shape.field(name.clone(), field);
        }
        Ok(shape)
    }
}

fn parse_predicate(field: &str, name: &str) -> Result<Predicate, FlowError> {
    Predicate::from_name(name).ok_or_else(|| {
        FlowError::configuration(format!("shape field {field}: unknown predicate {name}"))
    })
}

fn parse_choice(field: &str, items: &[Value]) -> Result<Field, FlowError> {
    let mut allows = Vec::new();
    let mut message = None;
    for item in items {
        match item {
            Value::Null => allows.push(Predicate::Null),
            Value::String(text) => match Predicate::from_name(text) {
                Some(predicate) => allows.push(predicate),
                None => message = Some(text.clone()),
            },
            other => {
                return Err(FlowError::configuration(format!(
                    "shape field {field}: expected predicate name, null or message, got {other}"
                )));
            }
        }
    }
    Ok(Field::LeafChoice { allows, message })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builder_keeps_declaration_order_and_replaces_duplicates() {
        let shape = Shape::new()
            .leaf("b", Predicate::String)
            .null("a")
            .leaf("b", Predicate::Number);
        assert_eq!(shape.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(shape.fields()[0].1, Field::Leaf(Predicate::Number));
    }

    #[test]
    fn parses_json_shapes() {
        let shape = Shape::from_json(&json!({
            "id": "is.String",
            "gone": null,
            "count": ["is.Integer", null, "count must be whole"],
            "inner": {"flag": "Boolean"}
        }))
        .expect("parse");

        let expected = Shape::new()
            .leaf("id", Predicate::String)
            .null("gone")
            .choice(
                "count",
                vec![Predicate::Integer, Predicate::Null],
                Some("count must be whole"),
            )
            .nested("inner", Shape::new().leaf("flag", Predicate::Boolean));
        assert_eq!(shape, expected);
    }

    #[test]
    fn rejects_unknown_predicates_and_bad_leaves() {
        assert!(Shape::from_json(&json!({"a": "is.Nope"})).is_err());
        assert!(Shape::from_json(&json!({"a": 3})).is_err());
        assert!(Shape::from_json(&json!({"a": [3]})).is_err());
        assert!(Shape::from_json(&json!([])).is_err());
    }
}
