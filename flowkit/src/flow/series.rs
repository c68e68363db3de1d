//! Bounded fan-out over a list of inputs.
//!
//! Every input becomes a partial record that is merged over a snapshot of
//! the running record and handed to the item method. Up to `n` items are in
//! flight at once; outputs are collected in input order. An item that bails
//! ends the series and the pipeline around it with that item's record.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, TryFutureExt, TryStreamExt, stream};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core::record::{self, Record};
use crate::error::FlowError;
use crate::flow::step::{Control, SharedStep, Step, StepResult};
use crate::io::config::SeriesConfig;

pub type ItemMethod =
    Arc<dyn Fn(Record) -> BoxFuture<'static, Result<ItemOutput, FlowError>> + Send + Sync>;
pub type InputFn = Arc<dyn Fn(&Record) -> Vec<Value> + Send + Sync>;
pub type ValueFilter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&FlowError, &Record) -> Option<Value> + Send + Sync>;

/// What one item produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutput {
    Value(Value),
    /// The item short-circuited; the series stops and hands this record on.
    Bail(Record),
}

/// Why the item stream stopped early.
enum Halt {
    Failed(FlowError),
    Bailed(Record),
}

/// Where a series gets its inputs from.
#[derive(Clone)]
pub enum Inputs {
    /// `"from:to"`: each element of the sequence at `from` becomes `{to: element}`.
    Path { from: String, to: String },
    /// Computed from the record. Values are boxed under `input_field` when set,
    /// otherwise they must be objects.
    Function(InputFn),
    /// A fixed list; requires `input_field`.
    List(Vec<Value>),
}

#[derive(Clone)]
pub enum OutputSelector {
    Identity,
    /// Keep only these top-level keys of each output.
    Keys(Vec<String>),
    Function(Arc<dyn Fn(Value) -> Value + Send + Sync>),
}

impl OutputSelector {
    /// Comma-separated key projection.
    pub fn keys(spec: &str) -> Self {
        Self::Keys(
            spec.split(',')
                .filter(|key| !key.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    fn select(&self, value: Value) -> Value {
        match self {
            Self::Identity => value,
            Self::Keys(keys) => {
                let mut projected = Record::new();
                if let Value::Object(source) = &value {
                    for key in keys {
                        if let Some(found) = source.get(key) {
                            projected.insert(key.clone(), found.clone());
                        }
                    }
                }
                Value::Object(projected)
            }
            Self::Function(f) => f(value),
        }
    }
}

/// Adapt a step into an item method producing the step's record.
pub fn step_method(step: SharedStep) -> ItemMethod {
    Arc::new(move |record: Record| {
        let step = Arc::clone(&step);
        async move {
            Ok::<_, FlowError>(match step.run(record).await? {
                Control::Continue(record) => ItemOutput::Value(Value::Object(record)),
                Control::ShortCircuit(record) => ItemOutput::Bail(record),
            })
        }
        .boxed()
    })
}

pub struct Series {
    inputs: Inputs,
    input_field: Option<String>,
    input_filter: Option<ValueFilter>,
    index: Option<String>,
    n: usize,
    roll_self: bool,
    method: ItemMethod,
    output_selector: OutputSelector,
    output_filter: Option<ValueFilter>,
    outputs: String,
    output_flatten: bool,
    error: Option<ErrorHandler>,
    delay: Duration,
}

impl Series {
    pub fn builder() -> SeriesBuilder {
        SeriesBuilder::default()
    }

    pub fn outputs(&self) -> &str {
        &self.outputs
    }

    fn accepts_input(&self, value: &Value) -> bool {
        self.input_filter.as_ref().is_none_or(|filter| filter(value))
    }

    fn box_inputs(&self, values: Vec<Value>) -> Result<Vec<Record>, FlowError> {
        values
            .into_iter()
            .filter(|value| self.accepts_input(value))
            .map(|value| match (&self.input_field, value) {
                (Some(field), value) => {
                    let mut partial = Record::new();
                    partial.insert(field.clone(), value);
                    Ok(partial)
                }
                (None, Value::Object(partial)) => Ok(partial),
                (None, other) => Err(FlowError::configuration(format!(
                    "series: input {other} is not a record and no input_field is set"
                ))),
            })
            .collect()
    }

    fn partials(&self, record: &Record) -> Result<Vec<Record>, FlowError> {
        match &self.inputs {
            Inputs::Path { from, to } => {
                let values = match record::lookup(record, from) {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(values)) => values.clone(),
                    Some(other) => vec![other.clone()],
                };
                Ok(values
                    .into_iter()
                    .filter(|value| self.accepts_input(value))
                    .map(|value| {
                        let mut partial = Record::new();
                        partial.insert(to.clone(), value);
                        partial
                    })
                    .collect())
            }
            Inputs::Function(f) => self.box_inputs(f(record)),
            Inputs::List(values) => self.box_inputs(values.clone()),
        }
    }

    async fn run_item(
        &self,
        index: usize,
        partial: Record,
        rolling: Arc<Mutex<Record>>,
    ) -> Result<Value, Halt> {
        let mut item = rolling.lock().await.clone();
        item.extend(partial);
        if let Some(field) = &self.index {
            item.insert(field.clone(), json!(index));
        }
        let snapshot = item.clone();

        match (self.method)(item).await {
            Ok(ItemOutput::Bail(record)) => {
                debug!(index, "series item bailed");
                Err(Halt::Bailed(record))
            }
            Ok(ItemOutput::Value(value)) => {
                if self.roll_self {
                    if let Value::Object(next) = &value {
                        *rolling.lock().await = next.clone();
                    }
                }
                Ok(self.output_selector.select(value))
            }
            Err(err) => match &self.error {
                Some(handler) => {
                    warn!(index, error = %err, "series item failed; substituting handler value");
                    Ok(handler(&err, &snapshot).unwrap_or(Value::Null))
                }
                None => Err(Halt::Failed(err.with_record(snapshot))),
            },
        }
    }
}

impl Step for Series {
    fn name(&self) -> &str {
        "series"
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        async move {
            let partials = self.partials(&record)?;
            debug!(items = partials.len(), n = self.n, "series start");
            let rolling = Arc::new(Mutex::new(record));
            let delay = self.delay;

            // Items are paced before they enter the buffer, so starts stay
            // `delay` apart whatever `n` is.
            let collected: Result<Vec<Value>, Halt> =
                stream::iter(partials.into_iter().enumerate())
                    .then(|(index, partial)| async move {
                        if index > 0 && !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        (index, partial)
                    })
                    .map(|(index, partial)| self.run_item(index, partial, Arc::clone(&rolling)))
                    .buffered(self.n)
                    .try_collect()
                    .await;
            let results = match collected {
                Ok(results) => results,
                Err(Halt::Failed(err)) => return Err(err),
                Err(Halt::Bailed(record)) => return Ok(Control::ShortCircuit(record)),
            };

            let mut outputs: Vec<Value> = results
                .into_iter()
                .filter(|value| self.output_filter.as_ref().is_none_or(|filter| filter(value)))
                .collect();
            if self.output_flatten {
                outputs = outputs
                    .into_iter()
                    .flat_map(|value| match value {
                        Value::Array(inner) => inner,
                        other => vec![other],
                    })
                    .collect();
            }

            let mut out = rolling.lock().await.clone();
            out.insert(self.outputs.clone(), Value::Array(outputs));
            Ok(Control::Continue(out))
        }
        .boxed()
    }
}

/// Builder for [`Series`]. Contradictory options are reported by [`SeriesBuilder::build`].
pub struct SeriesBuilder {
    inputs: Option<Inputs>,
    path_spec: Option<String>,
    input_field: Option<String>,
    input_filter: Option<ValueFilter>,
    index: Option<String>,
    n: usize,
    roll_self: bool,
    method: Option<ItemMethod>,
    output_selector: OutputSelector,
    output_filter: Option<ValueFilter>,
    outputs: String,
    output_flatten: bool,
    error: Option<ErrorHandler>,
    delay: Duration,
}

impl Default for SeriesBuilder {
    fn default() -> Self {
        Self {
            inputs: None,
            path_spec: None,
            input_field: None,
            input_filter: None,
            index: None,
            n: 1,
            roll_self: false,
            method: None,
            output_selector: OutputSelector::Identity,
            output_filter: None,
            outputs: "outputs".to_string(),
            output_flatten: false,
            error: None,
            delay: Duration::ZERO,
        }
    }
}

impl SeriesBuilder {
    /// `"from:to"` path form.
    pub fn inputs(mut self, spec: impl Into<String>) -> Self {
        self.path_spec = Some(spec.into());
        self.inputs = None;
        self
    }

    pub fn inputs_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> Vec<Value> + Send + Sync + 'static,
    {
        self.inputs = Some(Inputs::Function(Arc::new(f)));
        self.path_spec = None;
        self
    }

    pub fn inputs_list(mut self, values: Vec<Value>) -> Self {
        self.inputs = Some(Inputs::List(values));
        self.path_spec = None;
        self
    }

    pub(crate) fn has_inputs(&self) -> bool {
        self.inputs.is_some() || self.path_spec.is_some()
    }

    pub fn input_field(mut self, field: impl Into<String>) -> Self {
        self.input_field = Some(field.into());
        self
    }

    pub fn input_filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.input_filter = Some(Arc::new(f));
        self
    }

    /// Store each item's position under `field`.
    pub fn index(mut self, field: impl Into<String>) -> Self {
        self.index = Some(field.into());
        self
    }

    pub fn n(mut self, n: usize) -> Self {
        self.n = n;
        self
    }

    /// Start each item from the previous item's output instead of the
    /// record the series started with.
    pub fn roll_self(mut self, roll_self: bool) -> Self {
        self.roll_self = roll_self;
        self
    }

    pub fn method<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Record) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, FlowError>> + Send + 'static,
    {
        self.method = Some(Arc::new(move |record: Record| {
            f(record).map_ok(ItemOutput::Value).boxed()
        }));
        self
    }

    pub fn step(mut self, step: SharedStep) -> Self {
        self.method = Some(step_method(step));
        self
    }

    pub fn output_selector(mut self, selector: OutputSelector) -> Self {
        self.output_selector = selector;
        self
    }

    pub fn output_filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.output_filter = Some(Arc::new(f));
        self
    }

    pub fn outputs(mut self, key: impl Into<String>) -> Self {
        self.outputs = key.into();
        self
    }

    pub fn output_flatten(mut self, flatten: bool) -> Self {
        self.output_flatten = flatten;
        self
    }

    /// Substitute the handler's value (null when it returns `None`) for a
    /// failed item instead of failing the series.
    pub fn error<F>(mut self, f: F) -> Self
    where
        F: Fn(&FlowError, &Record) -> Option<Value> + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(f));
        self
    }

    /// Wait `delay` between the starts of consecutive items.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Take `n` and the inter-item delay from configuration.
    pub fn configured(self, config: &SeriesConfig) -> Self {
        self.n(config.concurrency)
            .delay(Duration::from_millis(config.delay_ms))
    }

    pub fn build(self) -> Result<Series, FlowError> {
        if self.n == 0 {
            return Err(FlowError::configuration("series: n must be at least 1"));
        }
        let inputs = match (self.inputs, self.path_spec) {
            (_, Some(spec)) => match spec.split(':').collect::<Vec<_>>().as_slice() {
                [from, to] => Inputs::Path {
                    from: (*from).to_string(),
                    to: (*to).to_string(),
                },
                _ => {
                    return Err(FlowError::configuration(format!(
                        "series: string inputs must look like 'from:to', got '{spec}'"
                    )));
                }
            },
            (Some(Inputs::List(_)), None) if self.input_field.is_none() => {
                return Err(FlowError::configuration(
                    "series: list inputs require input_field",
                ));
            }
            (Some(inputs), None) => inputs,
            (None, None) => return Err(FlowError::configuration("series: inputs are required")),
        };
        let method: ItemMethod = match self.method {
            Some(method) => method,
            None => Arc::new(|record: Record| {
                futures::future::ready(Ok::<_, FlowError>(ItemOutput::Value(Value::Object(record))))
                    .boxed()
            }),
        };

        Ok(Series {
            inputs,
            input_field: self.input_field,
            input_filter: self.input_filter,
            index: self.index,
            n: self.n,
            roll_self: self.roll_self,
            method,
            output_selector: self.output_selector,
            output_filter: self.output_filter,
            outputs: self.outputs,
            output_flatten: self.output_flatten,
            error: self.error,
            delay: self.delay,
        })
    }
}
