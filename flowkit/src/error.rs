//! Error kinds surfaced by validation and pipelines.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::core::record::Record;
use crate::core::validate::Rule;

/// A rule was violated. Carries the rule, the offending value (`None` when the
/// key was absent) and the record that was checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub method: String,
    pub rule: Rule,
    pub got: Option<Value>,
    pub record: Record,
}

impl ValidationError {
    /// `is.A | is.B` rendering of the rule's predicates.
    pub fn expected(&self) -> String {
        self.rule
            .allows
            .iter()
            .map(|predicate| predicate.name())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: invalid value at {}", self.method, self.rule.key)?;
        if let Some(message) = &self.rule.message {
            write!(f, " ({message})")?;
        }
        match &self.got {
            None => write!(f, ": required but absent"),
            Some(got) => write!(f, ": expected {} got {got}", self.expected()),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, Error)]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] Box<ValidationError>),

    /// A step's own failure, decorated with the record active when it started.
    /// `status` is an HTTP-style code when the step knows one.
    #[error("{message}")]
    Step {
        message: String,
        status: Option<u16>,
        record: Option<Record>,
    },

    /// Contradictory combinator options, reported when the combinator is built.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl FlowError {
    pub fn step(message: impl Into<String>) -> Self {
        Self::Step {
            message: message.into(),
            status: None,
            record: None,
        }
    }

    /// A step failure with a known status code.
    pub fn step_status(message: impl Into<String>, status: u16) -> Self {
        Self::Step {
            message: message.into(),
            status: Some(status),
            record: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Best-effort record attached to the error.
    pub fn record(&self) -> Option<&Record> {
        match self {
            Self::Validation(err) => Some(&err.record),
            Self::Step { record, .. } => record.as_ref(),
            Self::Configuration(_) => None,
        }
    }

    /// Attach `record` unless the error already carries one.
    pub fn with_record(self, record: Record) -> Self {
        match self {
            Self::Step {
                message,
                status,
                record: None,
            } => Self::Step {
                message,
                status,
                record: Some(record),
            },
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }

    /// Human-readable message, or `otherwise` when the error has none.
    pub fn message_or(&self, otherwise: &str) -> String {
        let message = self.to_string();
        if message.is_empty() {
            otherwise.to_string()
        } else {
            message
        }
    }

    /// Status code: a step's own status, 400 for validation failures and
    /// `otherwise` (500 when `None`) for everything else.
    pub fn status_or(&self, otherwise: Option<u16>) -> u16 {
        match self {
            Self::Step {
                status: Some(status),
                ..
            } => *status,
            Self::Validation(_) => 400,
            _ => otherwise.unwrap_or(500),
        }
    }

    pub fn status(&self) -> u16 {
        self.status_or(None)
    }

    /// Hundreds digit of [`FlowError::status`]: 4 for client errors, 5 for server errors.
    pub fn group(&self) -> u16 {
        self.status() / 100
    }

    /// Recover from errors selected by `selector`, handing `recover` the
    /// record the error carries (empty when it has none). Anything else is
    /// returned unchanged. Fits [`Pipeline::except`](crate::Pipeline::except).
    pub fn otherwise<F>(self, selector: &ErrorSelector, recover: F) -> Result<Record, FlowError>
    where
        F: FnOnce(Record, &FlowError) -> Record,
    {
        if !selector.matches(&self) {
            return Err(self);
        }
        let record = self.record().cloned().unwrap_or_default();
        Ok(recover(record, &self))
    }
}

/// Which errors [`FlowError::otherwise`] recovers from.
#[derive(Clone)]
pub enum ErrorSelector {
    /// Status group, e.g. `4`.
    Group(u16),
    /// Exact status code.
    Status(u16),
    Test(Arc<dyn Fn(&FlowError) -> bool + Send + Sync>),
}

impl ErrorSelector {
    /// Numbers below 10 select a group, anything larger an exact status.
    pub fn code(code: u16) -> Self {
        if code < 10 {
            Self::Group(code)
        } else {
            Self::Status(code)
        }
    }

    pub fn matches(&self, err: &FlowError) -> bool {
        match self {
            Self::Group(group) => err.group() == *group,
            Self::Status(status) => err.status() == *status,
            Self::Test(test) => test(err),
        }
    }
}

impl From<ValidationError> for FlowError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(Box::new(err))
    }
}
