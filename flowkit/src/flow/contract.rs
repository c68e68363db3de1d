//! Step contracts: what a step reads, what it produces, how it is parameterized.
//!
//! A contract names its method (and optionally its module) and carries four
//! shapes. `required` and `requires` must be present on the incoming record,
//! `accepts` is checked only when present, and `produces` describes the keys
//! the step hands back. Rule lists are flattened once and cached.

use std::sync::OnceLock;

use serde_json::{Value, json};
use tracing::info;

use crate::core::predicate;
use crate::core::record::Record;
use crate::core::shape::Shape;
use crate::core::validate::{self, Rule};
use crate::error::ValidationError;

/// How a positional argument is bound onto the record by
/// [`crate::flow::params::Parameterized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Always overwrite; an undefined argument removes the key.
    AsIs,
    /// Nullish arguments fall back to the record's value; still undefined becomes null.
    Normal,
    /// Undefined leaves the record untouched; anything else, null included, overwrites.
    Otherwise,
}

#[derive(Debug)]
pub struct Contract {
    method: String,
    module: Option<String>,
    required: Shape,
    requires: Shape,
    accepts: Shape,
    produces: Option<Shape>,
    params: Vec<(String, Binding)>,
    input_rules: OnceLock<Vec<Rule>>,
    output_rules: OnceLock<Vec<Rule>>,
}

impl Contract {
    pub fn builder(method: impl Into<String>) -> ContractBuilder {
        ContractBuilder {
            method: method.into(),
            module: None,
            required: Shape::new(),
            requires: Shape::new(),
            accepts: Shape::new(),
            produces: None,
            params: Vec::new(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn produces(&self) -> Option<&Shape> {
        self.produces.as_ref()
    }

    pub fn params(&self) -> &[(String, Binding)] {
        &self.params
    }

    /// `required` and `requires` as required rules, then `accepts` as optional ones.
    pub fn input_rules(&self) -> &[Rule] {
        self.input_rules.get_or_init(|| {
            let mut rules = validate::flatten(&self.required, true);
            rules.extend(validate::flatten(&self.requires, true));
            rules.extend(validate::flatten(&self.accepts, false));
            rules
        })
    }

    /// `produces` as optional rules; empty when nothing is produced.
    pub fn output_rules(&self) -> &[Rule] {
        self.output_rules.get_or_init(|| {
            self.produces
                .as_ref()
                .map(|shape| validate::flatten(shape, false))
                .unwrap_or_default()
        })
    }

    /// Validate the record handed to the step.
    ///
    /// When the record has a truthy `trace` key, a `{method, module}` entry is
    /// appended to its `__trace` list first.
    pub fn check_input(&self, record: &mut Record) -> Result<(), Box<ValidationError>> {
        if predicate::is_truthy(record.get("trace")) {
            self.append_trace(record);
        }
        validate::validate(record, &self.method, self.input_rules())
    }

    pub fn check_output(&self, record: &Record) -> Result<(), Box<ValidationError>> {
        validate::validate(record, &self.method, self.output_rules())
    }

    fn append_trace(&self, record: &mut Record) {
        let module = self.module.as_deref().unwrap_or("unknown");
        let entry = json!({ "method": self.method, "module": module });
        match record.get_mut("__trace") {
            Some(Value::Array(entries)) => entries.push(entry),
            _ => {
                record.insert("__trace".to_string(), Value::Array(vec![entry]));
            }
        }
        info!(method = %self.method, module, "trace");
    }
}

pub struct ContractBuilder {
    method: String,
    module: Option<String>,
    required: Shape,
    requires: Shape,
    accepts: Shape,
    produces: Option<Shape>,
    params: Vec<(String, Binding)>,
}

impl ContractBuilder {
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn required(mut self, shape: Shape) -> Self {
        self.required = shape;
        self
    }

    pub fn requires(mut self, shape: Shape) -> Self {
        self.requires = shape;
        self
    }

    pub fn accepts(mut self, shape: Shape) -> Self {
        self.accepts = shape;
        self
    }

    pub fn produces(mut self, shape: Shape) -> Self {
        self.produces = Some(shape);
        self
    }

    /// Declare the next positional parameter.
    pub fn param(mut self, name: impl Into<String>, binding: Binding) -> Self {
        self.params.push((name.into(), binding));
        self
    }

    pub fn build(self) -> Contract {
        Contract {
            method: self.method,
            module: self.module,
            required: self.required,
            requires: self.requires,
            accepts: self.accepts,
            produces: self.produces,
            params: self.params,
            input_rules: OnceLock::new(),
            output_rules: OnceLock::new(),
        }
    }
}
