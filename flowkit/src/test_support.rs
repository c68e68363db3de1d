//! Test-only helpers: records from JSON, scripted steps and fixture directories.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};

use crate::core::record::Record;
use crate::error::FlowError;
use crate::flow::step::{Control, Step, StepResult};

/// Convert a `json!` object into a record. Anything else becomes an empty record.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(record) => record,
        _ => Record::new(),
    }
}

/// Step that sets one top-level key.
pub struct Assign {
    key: String,
    value: Value,
}

pub fn assign(key: &str, value: Value) -> Assign {
    Assign {
        key: key.to_string(),
        value,
    }
}

impl Step for Assign {
    fn name(&self) -> &str {
        "assign"
    }

    fn run(&self, mut record: Record) -> BoxFuture<'_, StepResult> {
        record.insert(self.key.clone(), self.value.clone());
        futures::future::ready(Ok(Control::Continue(record))).boxed()
    }
}

/// Step that always fails with `message`.
pub struct Failing {
    message: String,
}

pub fn failing(message: &str) -> Failing {
    Failing {
        message: message.to_string(),
    }
}

impl Step for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn run(&self, _record: Record) -> BoxFuture<'_, StepResult> {
        futures::future::ready(Err(FlowError::step(self.message.clone()))).boxed()
    }
}

/// Step that counts its calls and delegates to a synchronous mutation.
pub struct Counting<F> {
    calls: Arc<AtomicUsize>,
    f: F,
}

pub fn counting<F>(f: F) -> Counting<F>
where
    F: Fn(&mut Record) -> Result<(), FlowError> + Send + Sync,
{
    Counting {
        calls: Arc::new(AtomicUsize::new(0)),
        f,
    }
}

impl<F> Counting<F> {
    /// Shared call counter; keep it before handing the step to a pipeline.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl<F> Step for Counting<F>
where
    F: Fn(&mut Record) -> Result<(), FlowError> + Send + Sync,
{
    fn name(&self) -> &str {
        "counting"
    }

    fn run(&self, mut record: Record) -> BoxFuture<'_, StepResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = (self.f)(&mut record).map(|()| Control::Continue(record));
        futures::future::ready(result).boxed()
    }
}

/// Step that fails its first `failures` calls, then records the attempt
/// number under `attempts`.
pub struct Flaky {
    failures: usize,
    calls: Arc<AtomicUsize>,
}

pub fn flaky(failures: usize) -> Flaky {
    Flaky {
        failures,
        calls: Arc::new(AtomicUsize::new(0)),
    }
}

impl Flaky {
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Step for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn run(&self, mut record: Record) -> BoxFuture<'_, StepResult> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let result = if attempt <= self.failures {
            Err(FlowError::step(format!("flaky failure {attempt}")))
        } else {
            record.insert("attempts".to_string(), json!(attempt));
            Ok(Control::Continue(record))
        };
        futures::future::ready(result).boxed()
    }
}

/// Temporary directory holding `files` (relative path, contents). Parent
/// directories are created as needed.
pub fn fixture_dir(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    for (relative, contents) in files {
        let path = dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture parent");
        }
        fs::write(&path, contents).expect("write fixture");
    }
    dir
}
