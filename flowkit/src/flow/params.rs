//! Positional arguments bound onto the record before a step runs.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::core::record::Record;
use crate::error::FlowError;
use crate::flow::contract::{Binding, Contract};
use crate::flow::pipeline::Finish;
use crate::flow::step::{Control, SharedStep, Step, StepResult};

/// A step whose contract declares positional params.
#[derive(Clone)]
pub struct Parameterized {
    step: SharedStep,
    contract: Arc<Contract>,
}

impl Parameterized {
    pub fn new(step: SharedStep, contract: Arc<Contract>) -> Result<Self, FlowError> {
        if contract.params().is_empty() {
            return Err(FlowError::configuration(format!(
                "{}: no params declared",
                contract.method()
            )));
        }
        Ok(Self { step, contract })
    }

    /// Apply `args` to a copy of `record` in declared param order. `None` is
    /// an absent argument; extra arguments are ignored.
    pub fn bind_record(&self, record: &Record, args: &[Option<Value>]) -> Record {
        let mut bound = record.clone();
        for (index, (name, binding)) in self.contract.params().iter().enumerate() {
            let arg = args.get(index).cloned().flatten();
            match (binding, arg) {
                (Binding::AsIs, None) => {
                    bound.remove(name);
                }
                (Binding::AsIs | Binding::Otherwise, Some(value)) => {
                    bound.insert(name.clone(), value);
                }
                (Binding::Normal, Some(value)) if !value.is_null() => {
                    bound.insert(name.clone(), value);
                }
                (Binding::Normal, _) => {
                    bound.entry(name.clone()).or_insert(Value::Null);
                }
                (Binding::Otherwise, None) => {}
            }
        }
        bound
    }

    pub fn bind(&self, args: Vec<Option<Value>>) -> Bound {
        Bound {
            name: format!("{}.p", self.contract.method()),
            params: self.clone(),
            args,
        }
    }
}

/// A [`Parameterized`] step with its arguments fixed. Runs the wrapped step on
/// the bound record and copies the produced keys back onto the caller's record.
/// A bail from the wrapped step is passed on untouched.
pub struct Bound {
    name: String,
    params: Parameterized,
    args: Vec<Option<Value>>,
}

impl Step for Bound {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        async move {
            let bound = self.params.bind_record(&record, &self.args);
            debug!(step = %self.name, "run with bound params");
            let settled = match self.params.step.run(bound).await? {
                Control::Continue(settled) => settled,
                bailed => return Ok(bailed),
            };
            Finish::Produces(record, Arc::clone(&self.params.contract))
                .apply(settled)
                .map(Control::Continue)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Pipeline;
    use crate::core::predicate::Predicate;
    use crate::core::shape::Shape;
    use crate::flow::combinators::bail;
    use crate::flow::step::block;
    use crate::test_support::record;

    fn contract() -> Arc<Contract> {
        Arc::new(
            Contract::builder("greet")
                .param("as_is", Binding::AsIs)
                .param("normal", Binding::Normal)
                .param("otherwise", Binding::Otherwise)
                .produces(Shape::new().leaf("greeting", Predicate::String))
                .build(),
        )
    }

    fn greet() -> SharedStep {
        Arc::new(block(|rec: &mut Record| {
            let name = rec.get("normal").and_then(Value::as_str).unwrap_or("nobody");
            let greeting = format!("hello {name}");
            rec.insert("greeting".to_string(), json!(greeting));
            rec.insert("scratch".to_string(), json!(true));
            Ok(())
        }))
    }

    #[test]
    fn new_requires_declared_params() {
        let bare = Arc::new(Contract::builder("bare").build());
        assert!(matches!(
            Parameterized::new(greet(), bare),
            Err(FlowError::Configuration(_))
        ));
    }

    #[test]
    fn bindings_follow_their_policies() {
        let params = Parameterized::new(greet(), contract()).expect("params");
        let base = record(json!({"as_is": 1, "normal": "rec", "otherwise": 3}));

        let absent = params.bind_record(&base, &[]);
        assert_eq!(absent, record(json!({"normal": "rec", "otherwise": 3})));

        let nulls = params.bind_record(&base, &[Some(Value::Null), Some(Value::Null), Some(Value::Null)]);
        assert_eq!(
            nulls,
            record(json!({"as_is": null, "normal": "rec", "otherwise": null}))
        );

        let values = params.bind_record(
            &base,
            &[Some(json!("a")), Some(json!("b")), Some(json!("c")), Some(json!("extra"))],
        );
        assert_eq!(values, record(json!({"as_is": "a", "normal": "b", "otherwise": "c"})));

        let normal_without_fallback = params.bind_record(&Record::new(), &[None, None, None]);
        assert_eq!(normal_without_fallback, record(json!({"normal": null})));
    }

    #[tokio::test]
    async fn bound_step_projects_produces_onto_the_callers_record() {
        let params = Parameterized::new(greet(), contract()).expect("params");
        let bound = params.bind(vec![None, Some(json!("ada"))]);
        assert_eq!(bound.name(), "greet.p");

        let out = Pipeline::make(record(json!({"normal": "caller", "keep": 1})))
            .then(bound)
            .run()
            .await
            .expect("run");
        assert_eq!(
            out,
            record(json!({"normal": "caller", "keep": 1, "greeting": "hello ada"}))
        );
    }

    #[tokio::test]
    async fn a_bail_inside_the_bound_step_skips_projection_and_later_steps() {
        let contract = Arc::new(
            Contract::builder("stop")
                .param("reason", Binding::Otherwise)
                .produces(Shape::new().leaf("greeting", Predicate::String))
                .build(),
        );
        let params = Parameterized::new(Arc::new(bail()), contract).expect("params");
        let out = Pipeline::make(record(json!({"keep": 1})))
            .then(params.bind(vec![Some(json!("done"))]))
            .then(block(|rec: &mut Record| {
                rec.insert("after".to_string(), json!(true));
                Ok(())
            }))
            .run()
            .await
            .expect("run");
        assert_eq!(out, record(json!({"keep": 1, "reason": "done"})));
    }

    #[tokio::test]
    async fn without_produces_the_callers_record_is_unchanged() {
        let contract = Arc::new(
            Contract::builder("touch")
                .param("x", Binding::Otherwise)
                .build(),
        );
        let params = Parameterized::new(greet(), contract).expect("params");
        let out = params
            .bind(vec![Some(json!(1))])
            .run(record(json!({"a": 1})))
            .await
            .expect("run")
            .into_record();
        assert_eq!(out, record(json!({"a": 1})));
    }
}
