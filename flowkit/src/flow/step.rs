//! The step abstraction and adapters from plain closures.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::core::record::Record;
use crate::error::FlowError;

/// Outcome of a successful step.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    /// Hand the record to the next step.
    Continue(Record),
    /// Skip the remaining steps and resolve successfully with this record.
    ShortCircuit(Record),
}

impl Control {
    pub fn record(&self) -> &Record {
        match self {
            Self::Continue(record) | Self::ShortCircuit(record) => record,
        }
    }

    pub fn into_record(self) -> Record {
        match self {
            Self::Continue(record) | Self::ShortCircuit(record) => record,
        }
    }

    pub fn is_short_circuit(&self) -> bool {
        matches!(self, Self::ShortCircuit(_))
    }
}

pub type StepResult = Result<Control, FlowError>;

/// One asynchronous transformation of a record.
///
/// Steps receive the record by value, so concurrent branches never share a
/// mutable record.
pub trait Step: Send + Sync {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &str {
        "step"
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult>;
}

pub type SharedStep = Arc<dyn Step>;

impl<S: Step + ?Sized> Step for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        (**self).run(record)
    }
}

/// Step built from an async `Record -> Result<Record>` closure. See [`from_fn`].
pub struct FnStep<F> {
    name: String,
    f: F,
}

/// Adapt an async closure producing the next record.
pub fn from_fn<F, Fut>(f: F) -> FnStep<F>
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Record, FlowError>> + Send + 'static,
{
    FnStep {
        name: "fn".to_string(),
        f,
    }
}

impl<F> FnStep<F> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<F, Fut> Step for FnStep<F>
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Record, FlowError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        (self.f)(record).map(|result| result.map(Control::Continue)).boxed()
    }
}

/// Step built from an async closure that decides its own [`Control`].
pub struct ControlFnStep<F> {
    name: String,
    f: F,
}

pub fn from_control_fn<F, Fut>(f: F) -> ControlFnStep<F>
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    ControlFnStep {
        name: "control".to_string(),
        f,
    }
}

impl<F> ControlFnStep<F> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<F, Fut> Step for ControlFnStep<F>
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        (self.f)(record).boxed()
    }
}

/// Step that mutates the record synchronously. See [`block`].
pub struct BlockStep<F> {
    name: String,
    f: F,
}

/// Run a synchronous mutation as a step. The closure works on its own copy
/// of the record; on error the pipeline attaches the record as it was before
/// the block ran.
pub fn block<F>(f: F) -> BlockStep<F>
where
    F: Fn(&mut Record) -> Result<(), FlowError> + Send + Sync,
{
    BlockStep {
        name: "block".to_string(),
        f,
    }
}

impl<F> BlockStep<F> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<F> Step for BlockStep<F>
where
    F: Fn(&mut Record) -> Result<(), FlowError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, mut record: Record) -> BoxFuture<'_, StepResult> {
        let result = (self.f)(&mut record).map(|()| Control::Continue(record));
        futures::future::ready(result).boxed()
    }
}
