//! The pipeline driver.
//!
//! A [`Pipeline`] is a lazy future over a record. Nothing runs until it is
//! awaited (directly, or through [`Pipeline::run`], [`Pipeline::finish`] or
//! [`Pipeline::end`]). Each chained step waits for its predecessor: a
//! continued record is handed to the step, a short-circuit or an error skips
//! it. Errors leaving a step carry the record the step started from.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use tracing::debug;

use crate::core::record::Record;
use crate::error::FlowError;
use crate::flow::combinators::{self, Addition, Condition};
use crate::flow::contract::Contract;
use crate::flow::page::Page;
use crate::flow::retry::Retry;
use crate::flow::series::Series;
use crate::flow::step::{self, Control, SharedStep, Step, StepResult};

#[must_use = "pipelines do nothing unless awaited"]
pub struct Pipeline {
    future: BoxFuture<'static, StepResult>,
}

/// How a settled pipeline's record is handed to the caller.
#[derive(Debug, Clone)]
pub enum Finish {
    /// The settled record as is.
    Settled,
    /// The given base record, ignoring what the pipeline produced.
    Base(Record),
    /// The base record with `from:to` (or `from`) pairs copied over from the
    /// settled record. Targets whose source is absent are deleted.
    Keys(Record, String),
    /// The base record with every key the contract produces copied over from
    /// the settled record, then checked against the produced shape.
    Produces(Record, Arc<Contract>),
}

impl Finish {
    pub fn apply(self, settled: Record) -> Result<Record, FlowError> {
        match self {
            Self::Settled => Ok(settled),
            Self::Base(base) => Ok(base),
            Self::Keys(mut base, keys) => {
                combinators::copy_keys(&settled, &mut base, &keys);
                Ok(base)
            }
            Self::Produces(base, contract) => project_produces(&settled, base, &contract),
        }
    }
}

fn project_produces(
    settled: &Record,
    mut base: Record,
    contract: &Contract,
) -> Result<Record, FlowError> {
    let Some(produces) = contract.produces() else {
        return Ok(base);
    };
    for key in produces.keys() {
        match settled.get(key) {
            Some(value) => {
                base.insert(key.to_string(), value.clone());
            }
            None => {
                return Err(FlowError::step(format!(
                    "{}: {key} is required to be a value",
                    contract.method()
                ))
                .with_record(settled.clone()));
            }
        }
    }
    contract.check_output(&base)?;
    Ok(base)
}

impl Pipeline {
    /// A pipeline that resolves immediately with `record`.
    pub fn make(record: Record) -> Self {
        Self::from_result(Ok(Control::Continue(record)))
    }

    pub fn empty() -> Self {
        Self::make(Record::new())
    }

    /// A pipeline that has already failed with `err`.
    pub fn failed(err: FlowError) -> Self {
        Self::from_result(Err(err))
    }

    fn from_result(result: StepResult) -> Self {
        Self {
            future: future::ready(result).boxed(),
        }
    }

    pub fn then(self, step: impl Step + 'static) -> Self {
        self.then_shared(Arc::new(step))
    }

    pub fn then_shared(self, step: SharedStep) -> Self {
        let previous = self.future;
        let future = async move {
            match previous.await? {
                Control::Continue(record) => {
                    let snapshot = record.clone();
                    debug!(step = step.name(), "run step");
                    step.run(record)
                        .await
                        .map_err(|err| err.with_record(snapshot))
                }
                short @ Control::ShortCircuit(_) => Ok(short),
            }
        };
        Self {
            future: future.boxed(),
        }
    }

    /// Handle a failure. The handler's record continues the chain; its error
    /// replaces the original one.
    pub fn except<F>(self, handler: F) -> Self
    where
        F: FnOnce(FlowError) -> Result<Record, FlowError> + Send + 'static,
    {
        let previous = self.future;
        let future = async move {
            match previous.await {
                Ok(control) => Ok(control),
                Err(err) => handler(err).map(Control::Continue),
            }
        };
        Self {
            future: future.boxed(),
        }
    }

    pub fn add(self, addition: Addition) -> Self {
        self.then(combinators::add(addition))
    }

    /// Validate the current record against `contract`'s inputs.
    pub fn validate(self, contract: Arc<Contract>) -> Self {
        self.then(combinators::validate(contract))
    }

    pub fn block<F>(self, f: F) -> Self
    where
        F: Fn(&mut Record) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        self.then(step::block(f))
    }

    pub fn each(self, series: Series) -> Self {
        self.then(series)
    }

    pub fn page(self, page: Page) -> Self {
        self.then(page)
    }

    pub fn retry(self, retry: Retry) -> Self {
        self.then(retry)
    }

    pub fn log(self, message: impl Into<String>, keys: &str) -> Self {
        self.then(combinators::log(message, keys))
    }

    pub fn conditional(
        self,
        test: Condition,
        if_true: Option<SharedStep>,
        if_false: Option<SharedStep>,
    ) -> Self {
        self.then(combinators::conditional(test, if_true, if_false))
    }

    pub fn optional(
        self,
        step: SharedStep,
        checker: Option<combinators::Checker>,
    ) -> Self {
        self.then(combinators::optional(step, checker))
    }

    pub fn delay(self, duration: Duration) -> Self {
        self.then(combinators::delay(duration))
    }

    /// Stop here, successfully, when `condition` holds.
    pub fn bail_if(self, condition: Condition) -> Self {
        self.then(combinators::bail_if(condition))
    }

    /// Drive the pipeline. A short-circuit resolves successfully.
    pub async fn run(self) -> Result<Record, FlowError> {
        self.future.await.map(Control::into_record)
    }

    pub async fn finish(self, finish: Finish) -> Result<Record, FlowError> {
        let settled = self.run().await?;
        finish.apply(settled)
    }

    /// Drive the pipeline and hand the outcome to `callback`.
    pub async fn end<F>(self, finish: Finish, callback: F)
    where
        F: FnOnce(Result<Record, FlowError>),
    {
        callback(self.finish(finish).await);
    }
}

impl IntoFuture for Pipeline {
    type Output = Result<Record, FlowError>;
    type IntoFuture = BoxFuture<'static, Result<Record, FlowError>>;

    fn into_future(self) -> Self::IntoFuture {
        self.run().boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{Value, json};

    use super::*;
    use crate::core::predicate::Predicate;
    use crate::core::shape::Shape;
    use crate::test_support::{assign, failing, record};

    #[tokio::test]
    async fn make_resolves_with_the_seed_record() {
        let out = Pipeline::make(record(json!({"a": 1}))).await.expect("run");
        assert_eq!(out, record(json!({"a": 1})));
        assert!(Pipeline::empty().await.expect("run").is_empty());
    }

    #[tokio::test]
    async fn steps_run_in_order() {
        let out = Pipeline::empty()
            .then(assign("a", json!(1)))
            .block(|rec: &mut Record| {
                let a = rec.get("a").and_then(Value::as_i64).unwrap_or_default();
                rec.insert("b".to_string(), json!(a + 1));
                Ok(())
            })
            .run()
            .await
            .expect("run");
        assert_eq!(out, record(json!({"a": 1, "b": 2})));
    }

    #[tokio::test]
    async fn errors_skip_remaining_steps_and_carry_the_record() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let err = Pipeline::make(record(json!({"n": 1})))
            .then(failing("broken"))
            .block(move |_: &mut Record| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .run()
            .await
            .expect_err("fails");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(err.to_string(), "broken");
        assert_eq!(err.record(), Some(&record(json!({"n": 1}))));
    }

    #[tokio::test]
    async fn bail_short_circuits_successfully() {
        let out = Pipeline::make(record(json!({"n": 1})))
            .bail_if(Condition::Value(true))
            .then(assign("after", json!(true)))
            .run()
            .await
            .expect("bail is not an error");
        assert_eq!(out, record(json!({"n": 1})));
    }

    #[tokio::test]
    async fn except_recovers_and_continues() {
        let out = Pipeline::empty()
            .then(failing("broken"))
            .except(|err| Ok(record(json!({"recovered": err.to_string()}))))
            .then(assign("after", json!(true)))
            .run()
            .await
            .expect("recovered");
        assert_eq!(out, record(json!({"recovered": "broken", "after": true})));

        let err = Pipeline::failed(FlowError::step("first"))
            .except(|_| Err(FlowError::step("second")))
            .run()
            .await
            .expect_err("rethrown");
        assert_eq!(err.to_string(), "second");
    }

    #[tokio::test]
    async fn finish_with_keys_copies_and_deletes() {
        let base = record(json!({"keep": 1, "gone": 2, "nested": {"x": 0}}));
        let out = Pipeline::make(record(json!({"a": {"b": 5}, "c": 6})))
            .finish(Finish::Keys(base, "a/b:nested/x,c,gone".to_string()))
            .await
            .expect("finish");
        assert_eq!(out, record(json!({"keep": 1, "nested": {"x": 5}, "c": 6})));
    }

    #[tokio::test]
    async fn finish_with_base_ignores_the_settled_record() {
        let base = record(json!({"base": true}));
        let out = Pipeline::make(record(json!({"other": 1})))
            .finish(Finish::Base(base.clone()))
            .await
            .expect("finish");
        assert_eq!(out, base);
    }

    #[tokio::test]
    async fn finish_with_produces_projects_and_validates() {
        let contract = Arc::new(
            Contract::builder("thing.make")
                .produces(
                    Shape::new()
                        .leaf("thing", Predicate::String)
                        .leaf("maybe", Predicate::String),
                )
                .build(),
        );
        let base = record(json!({"caller": 1}));

        let out = Pipeline::make(record(json!({"thing": "t", "maybe": null, "scratch": 9})))
            .finish(Finish::Produces(base.clone(), Arc::clone(&contract)))
            .await
            .expect("produced");
        assert_eq!(out, record(json!({"caller": 1, "thing": "t", "maybe": null})));

        let err = Pipeline::make(record(json!({"thing": "t"})))
            .finish(Finish::Produces(base.clone(), Arc::clone(&contract)))
            .await
            .expect_err("maybe missing");
        assert!(err.to_string().contains("maybe is required to be a value"));

        let err = Pipeline::make(record(json!({"thing": 3, "maybe": "m"})))
            .finish(Finish::Produces(base, contract))
            .await
            .expect_err("wrong type");
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn end_hands_the_outcome_to_the_callback() {
        let mut seen = None;
        Pipeline::make(record(json!({"a": 1})))
            .end(Finish::Settled, |result| seen = Some(result))
            .await;
        assert_eq!(seen.expect("called").expect("ok"), record(json!({"a": 1})));

        let mut failed = None;
        Pipeline::empty()
            .then(failing("nope"))
            .end(Finish::Settled, |result| failed = Some(result))
            .await;
        assert!(failed.expect("called").is_err());
    }
}
