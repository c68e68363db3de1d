//! Repeated fetches against a cursor-based source.
//!
//! Each round hands the `batch` step the record with `pager` set (null on the
//! first round, then the previous round's `cursor.next`). Rounds continue while
//! the batch result carries a truthy `cursor.next` and the accumulated outputs
//! are below `output_limit`.
//!
//! A bail from the batch, its series or the page hook ends the whole page
//! with that record; nothing accumulated so far is attached.

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::core::predicate;
use crate::core::record::{self, Record};
use crate::error::FlowError;
use crate::flow::series::{Series, SeriesBuilder};
use crate::flow::step::{Control, SharedStep, Step, StepResult};

pub struct Page {
    batch: SharedStep,
    series: Option<Series>,
    outputs: Option<String>,
    output_limit: usize,
    output_extend: bool,
    roll_self: bool,
    page: Option<SharedStep>,
}

impl Page {
    pub fn builder(batch: SharedStep) -> PageBuilder {
        PageBuilder {
            batch,
            series: None,
            outputs: None,
            output_limit: usize::MAX,
            output_extend: false,
            roll_self: false,
            page: None,
        }
    }

    fn collect(&self, batch: &Record, accumulator: &mut Vec<Value>) -> Result<(), FlowError> {
        let Some(key) = &self.outputs else {
            return Ok(());
        };
        match batch.get(key) {
            Some(Value::Array(items)) => {
                accumulator.extend(items.iter().cloned());
                Ok(())
            }
            _ => Err(FlowError::step(format!("page: {key} should always be an array"))
                .with_record(batch.clone())),
        }
    }
}

impl Step for Page {
    fn name(&self) -> &str {
        "page"
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        async move {
            let mut accumulator = match (&self.outputs, self.output_extend) {
                (Some(key), true) => match record.get(key) {
                    Some(Value::Array(items)) => items.clone(),
                    _ => Vec::new(),
                },
                _ => Vec::new(),
            };
            let mut rolling = record.clone();
            let mut pager = Value::Null;
            let mut round = 0usize;

            loop {
                round += 1;
                let mut current = rolling.clone();
                current.insert("pager".to_string(), pager);
                debug!(round, "fetch page");

                let mut batch = match self.batch.run(current).await? {
                    Control::Continue(batch) => batch,
                    bailed => return Ok(bailed),
                };
                if let Some(series) = &self.series {
                    batch = match series.run(batch).await? {
                        Control::Continue(batch) => batch,
                        bailed => return Ok(bailed),
                    };
                }
                self.collect(&batch, &mut accumulator)?;

                rolling = if self.roll_self {
                    batch.clone()
                } else {
                    record.clone()
                };
                if let Some(hook) = &self.page {
                    batch = match hook.run(batch).await? {
                        Control::Continue(batch) => batch,
                        bailed => return Ok(bailed),
                    };
                }

                let next = record::lookup(&batch, "cursor/next")
                    .filter(|next| predicate::is_truthy(Some(next)))
                    .cloned();
                match next {
                    Some(next) if accumulator.len() < self.output_limit => {
                        pager = next;
                        tokio::task::yield_now().await;
                    }
                    _ => break,
                }
            }

            if let Some(key) = &self.outputs {
                accumulator.truncate(self.output_limit);
                rolling.insert(key.clone(), Value::Array(accumulator));
            }
            Ok(Control::Continue(rolling))
        }
        .boxed()
    }
}

pub struct PageBuilder {
    batch: SharedStep,
    series: Option<SeriesBuilder>,
    outputs: Option<String>,
    output_limit: usize,
    output_extend: bool,
    roll_self: bool,
    page: Option<SharedStep>,
}

impl PageBuilder {
    /// Post-process every batch through a series. Its inputs default to
    /// `"jsons:json"` and its outputs always land in the page's outputs.
    pub fn series(mut self, series: SeriesBuilder) -> Self {
        self.series = Some(series);
        self
    }

    /// Accumulate the array at `key` from every round.
    pub fn outputs(mut self, key: impl Into<String>) -> Self {
        self.outputs = Some(key.into());
        self
    }

    pub fn output_limit(mut self, limit: usize) -> Self {
        self.output_limit = limit;
        self
    }

    /// Start accumulating from the array already on the record.
    pub fn output_extend(mut self, extend: bool) -> Self {
        self.output_extend = extend;
        self
    }

    pub fn roll_self(mut self, roll_self: bool) -> Self {
        self.roll_self = roll_self;
        self
    }

    /// Run after each round, before the cursor is checked.
    pub fn page(mut self, hook: SharedStep) -> Self {
        self.page = Some(hook);
        self
    }

    pub fn build(self) -> Result<Page, FlowError> {
        if self.output_limit == 0 {
            return Err(FlowError::configuration("page: output_limit must be at least 1"));
        }
        let series = match self.series {
            Some(builder) => {
                let builder = if builder.has_inputs() {
                    builder
                } else {
                    builder.inputs("jsons:json")
                };
                let outputs = self.outputs.as_deref().unwrap_or("outputs");
                Some(builder.outputs(outputs).build()?)
            }
            None => None,
        };
        Ok(Page {
            batch: self.batch,
            series,
            outputs: self.outputs,
            output_limit: self.output_limit,
            output_extend: self.output_extend,
            roll_self: self.roll_self,
            page: self.page,
        })
    }
}
