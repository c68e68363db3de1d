//! Promise-style pipelines over JSON records.
//!
//! A pipeline threads a [`Record`] through asynchronous steps. Combinators add
//! branching, optional failure, retries, paging and bounded fan-out, and step
//! contracts validate what goes in and what comes out. The crate is split the
//! usual way:
//!
//! - **[`core`]**: Pure logic (record paths, predicates, shapes and validation,
//!   coercion, identifiers, hashing). No I/O.
//! - **[`io`]**: Configuration and file discovery.
//! - **[`flow`]**: Steps, the pipeline driver and its combinators.

pub mod core;
pub mod error;
pub mod flow;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::core::record::Record;
pub use crate::error::{ErrorSelector, FlowError, ValidationError};
pub use crate::flow::pipeline::Pipeline;
pub use crate::flow::step::{Control, SharedStep, Step, StepResult};
