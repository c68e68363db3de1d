//! Small combinators: branching, optional failure, additions, logging, timing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info};

use crate::core::record::{self, Record};
use crate::error::FlowError;
use crate::flow::contract::Contract;
use crate::flow::step::{Control, SharedStep, Step, StepResult};

pub type Test = Arc<dyn Fn(&Record) -> bool + Send + Sync>;
pub type Checker = Arc<dyn Fn(&FlowError) -> bool + Send + Sync>;

/// Split `"a/b:c,d"` into `(from, to)` pairs. A bare `from` targets its last
/// path segment.
pub(crate) fn key_pairs(spec: &str) -> Vec<(String, String)> {
    spec.split(',')
        .filter(|key| !key.is_empty())
        .map(|key| match key.split_once(':') {
            Some((from, to)) => (from.to_string(), to.to_string()),
            None => {
                let to = record::segments(key).last().copied().unwrap_or(key);
                (key.to_string(), to.to_string())
            }
        })
        .collect()
}

/// Copy the pairs in `spec` from `source` into `target`, deleting targets
/// whose source value is absent.
pub(crate) fn copy_keys(source: &Record, target: &mut Record, spec: &str) {
    for (from, to) in key_pairs(spec) {
        match record::lookup(source, &from) {
            Some(value) => record::set(target, &to, value.clone()),
            None => record::delete(target, &to),
        }
    }
}

#[derive(Clone)]
pub enum Condition {
    Value(bool),
    Test(Test),
}

impl Condition {
    pub fn test<F>(f: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Self::Test(Arc::new(f))
    }

    pub fn holds(&self, record: &Record) -> bool {
        match self {
            Self::Value(value) => *value,
            Self::Test(test) => test(record),
        }
    }
}

pub struct Conditional {
    test: Condition,
    if_true: Option<SharedStep>,
    if_false: Option<SharedStep>,
}

/// Run `if_true` or `if_false` depending on `test`. A missing branch passes
/// the record through.
pub fn conditional(
    test: Condition,
    if_true: Option<SharedStep>,
    if_false: Option<SharedStep>,
) -> Conditional {
    Conditional {
        test,
        if_true,
        if_false,
    }
}

impl Step for Conditional {
    fn name(&self) -> &str {
        "conditional"
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        let branch = if self.test.holds(&record) {
            self.if_true.as_ref()
        } else {
            self.if_false.as_ref()
        };
        match branch {
            Some(step) => step.run(record),
            None => futures::future::ready(Ok(Control::Continue(record))).boxed(),
        }
    }
}

pub struct Optional {
    step: SharedStep,
    checker: Option<Checker>,
}

/// Run `step`; on failure resolve with the record from before the step when
/// there is no checker or the checker accepts the error.
pub fn optional(step: SharedStep, checker: Option<Checker>) -> Optional {
    Optional { step, checker }
}

impl Step for Optional {
    fn name(&self) -> &str {
        "optional"
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        async move {
            let before = record.clone();
            match self.step.run(record).await {
                Ok(control) => Ok(control),
                Err(err) => {
                    let swallow = self.checker.as_ref().is_none_or(|checker| checker(&err));
                    if !swallow {
                        return Err(err.with_record(before));
                    }
                    debug!(step = self.step.name(), error = %err, "optional step failed");
                    Ok(Control::Continue(before))
                }
            }
        }
        .boxed()
    }
}

/// What [`add`] puts onto the record.
#[derive(Clone)]
pub enum Addition {
    /// Shallow-merge these keys over the record.
    Merge(Record),
    /// Set one key.
    Value(String, Value),
    /// Set one key to a value computed from the record.
    Computed(String, Arc<dyn Fn(&Record) -> Value + Send + Sync>),
    /// Copy `from:to` pairs within the record; absent sources delete targets.
    Keys(String),
    /// Shallow-merge a record computed from the record.
    MergeComputed(Arc<dyn Fn(&Record) -> Record + Send + Sync>),
}

pub struct Add {
    addition: Addition,
}

pub fn add(addition: Addition) -> Add {
    Add { addition }
}

impl Add {
    fn apply(&self, record: Record) -> Record {
        match &self.addition {
            Addition::Merge(extra) => record::update(&record, extra),
            Addition::Value(key, value) => {
                let mut out = record;
                out.insert(key.clone(), value.clone());
                out
            }
            Addition::Computed(key, f) => {
                let value = f(&record);
                let mut out = record;
                out.insert(key.clone(), value);
                out
            }
            Addition::Keys(spec) => {
                let mut out = record.clone();
                copy_keys(&record, &mut out, spec);
                out
            }
            Addition::MergeComputed(f) => {
                let extra = f(&record);
                record::update(&record, &extra)
            }
        }
    }
}

impl Step for Add {
    fn name(&self) -> &str {
        "add"
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        futures::future::ready(Ok(Control::Continue(self.apply(record)))).boxed()
    }
}

pub struct Validate {
    contract: Arc<Contract>,
}

/// Check the record against `contract`'s declared inputs.
pub fn validate(contract: Arc<Contract>) -> Validate {
    Validate { contract }
}

impl Step for Validate {
    fn name(&self) -> &str {
        self.contract.method()
    }

    fn run(&self, mut record: Record) -> BoxFuture<'_, StepResult> {
        let result = self
            .contract
            .check_input(&mut record)
            .map(|()| Control::Continue(record))
            .map_err(FlowError::from);
        futures::future::ready(result).boxed()
    }
}

pub struct Log {
    message: String,
    keys: String,
}

/// Emit one `info` event with `message` and the selected `from:to` keys.
pub fn log(message: impl Into<String>, keys: &str) -> Log {
    Log {
        message: message.into(),
        keys: keys.to_string(),
    }
}

impl Step for Log {
    fn name(&self) -> &str {
        "log"
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        let mut selected = Record::new();
        copy_keys(&record, &mut selected, &self.keys);
        let values = Value::Object(selected);
        info!(values = %values, "{}", self.message);
        futures::future::ready(Ok(Control::Continue(record))).boxed()
    }
}

pub struct Time {
    step: SharedStep,
    message: String,
}

/// Run `step` and log how long it took, whether it succeeded or not.
pub fn time(step: SharedStep, message: impl Into<String>) -> Time {
    Time {
        step,
        message: message.into(),
    }
}

impl Step for Time {
    fn name(&self) -> &str {
        "time"
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        async move {
            let start = Instant::now();
            let result = self.step.run(record).await;
            let delta = start.elapsed().as_secs_f64();
            info!(delta, ok = result.is_ok(), "{}", self.message);
            result
        }
        .boxed()
    }
}

pub struct Delay {
    duration: Duration,
}

pub fn delay(duration: Duration) -> Delay {
    Delay { duration }
}

impl Step for Delay {
    fn name(&self) -> &str {
        "delay"
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        async move {
            tokio::time::sleep(self.duration).await;
            Ok(Control::Continue(record))
        }
        .boxed()
    }
}

/// Yield to the scheduler once, then continue.
pub struct Tick;

pub fn tick() -> Tick {
    Tick
}

impl Step for Tick {
    fn name(&self) -> &str {
        "tick"
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        async move {
            tokio::task::yield_now().await;
            Ok(Control::Continue(record))
        }
        .boxed()
    }
}

pub struct Noop;

pub fn noop() -> Noop {
    Noop
}

impl Step for Noop {
    fn name(&self) -> &str {
        "noop"
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        futures::future::ready(Ok(Control::Continue(record))).boxed()
    }
}

pub struct Bail {
    condition: Condition,
}

/// Unconditionally end the pipeline successfully with the current record.
pub fn bail() -> Bail {
    bail_if(Condition::Value(true))
}

pub fn bail_if(condition: Condition) -> Bail {
    Bail { condition }
}

impl Step for Bail {
    fn name(&self) -> &str {
        "bail"
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        let control = if self.condition.holds(&record) {
            Control::ShortCircuit(record)
        } else {
            Control::Continue(record)
        };
        futures::future::ready(Ok(control)).boxed()
    }
}
