//! End-to-end pipeline scenarios.
//!
//! Chains series fan-out, retries, paging and parameterized steps through the
//! public `Pipeline` API and checks the settled records.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use flowkit::core::predicate::Predicate;
use flowkit::core::shape::Shape;
use flowkit::flow::combinators::{Addition, Condition, bail_if};
use flowkit::flow::contract::{Binding, Contract};
use flowkit::flow::page::Page;
use flowkit::flow::params::Parameterized;
use flowkit::flow::pipeline::Finish;
use flowkit::flow::retry::Retry;
use flowkit::flow::series::Series;
use flowkit::flow::step::{block, from_fn};
use flowkit::test_support::{assign, counting, record};
use flowkit::{ErrorSelector, FlowError, Pipeline, Record, SharedStep};
use serde_json::{Value, json};

fn squares(n: usize) -> Series {
    Series::builder()
        .inputs("values:value")
        .method(|rec: Record| async move {
            let value = rec.get("value").and_then(Value::as_i64).unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(10 * (6 - value) as u64)).await;
            Ok::<_, FlowError>(json!(value * value))
        })
        .outputs("squares")
        .n(n)
        .build()
        .expect("series")
}

#[tokio::test(start_paused = true)]
async fn series_squares_keep_input_order() {
    for n in [1, 3] {
        let out = Pipeline::make(record(json!({"values": [1, 2, 3, 4, 5]})))
            .each(squares(n))
            .run()
            .await
            .expect("run");
        assert_eq!(out.get("squares"), Some(&json!([1, 4, 9, 16, 25])), "n = {n}");
    }
}

#[tokio::test(start_paused = true)]
async fn retry_calls_an_always_failing_method_five_times() {
    let method = counting(|_| Err(FlowError::step("unavailable")));
    let calls = method.calls();
    let err = Pipeline::make(record(json!({"id": 7})))
        .retry(Retry::new(Arc::new(method)).delay(Duration::from_millis(250)))
        .run()
        .await
        .expect_err("exhausted");
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(err.to_string(), "unavailable");
    assert_eq!(err.record(), Some(&record(json!({"id": 7}))));
}

#[tokio::test]
async fn page_collects_three_pages_and_stops() {
    let batch = counting(|rec: &mut Record| {
        let page = rec.get("pager").and_then(Value::as_u64).unwrap_or(1);
        let next = if page < 3 { json!(page + 1) } else { Value::Null };
        rec.insert("rows".to_string(), json!([format!("row{page}")]));
        rec.insert("cursor".to_string(), json!({ "next": next }));
        Ok(())
    });
    let fetches = batch.calls();

    let out = Pipeline::make(record(json!({"table": "t"})))
        .page(
            Page::builder(Arc::new(batch))
                .outputs("rows")
                .build()
                .expect("page"),
        )
        .run()
        .await
        .expect("run");
    assert_eq!(out.get("rows"), Some(&json!(["row1", "row2", "row3"])));
    assert_eq!(fetches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn parameterized_step_inside_a_pipeline() {
    let contract = Arc::new(
        Contract::builder("user.label")
            .module("users")
            .param("name", Binding::Normal)
            .param("suffix", Binding::Otherwise)
            .required(Shape::new().leaf("name", Predicate::String))
            .produces(Shape::new().leaf("label", Predicate::String))
            .build(),
    );
    let label: SharedStep = Arc::new(block(|rec: &mut Record| {
        let name = rec.get("name").and_then(Value::as_str).unwrap_or_default();
        let suffix = rec.get("suffix").and_then(Value::as_str).unwrap_or("");
        let label = format!("{name}{suffix}");
        rec.insert("label".to_string(), json!(label));
        Ok(())
    }));
    let validated: SharedStep = {
        let contract = Arc::clone(&contract);
        Arc::new(from_fn(move |rec: Record| {
            let contract = Arc::clone(&contract);
            let label = Arc::clone(&label);
            async move {
                let rec = Pipeline::make(rec)
                    .validate(contract)
                    .then_shared(label)
                    .run()
                    .await?;
                Ok::<_, FlowError>(rec)
            }
        }))
    };
    let params = Parameterized::new(validated, contract).expect("params");

    let out = Pipeline::make(record(json!({"name": "ada", "trace": true})))
        .then(params.bind(vec![None, Some(json!("!"))]))
        .run()
        .await
        .expect("run");
    assert_eq!(out, record(json!({"name": "ada", "trace": true, "label": "ada!"})));

    let err = Pipeline::empty()
        .then(params.bind(vec![]))
        .run()
        .await
        .expect_err("name is null");
    assert!(err.is_validation());
}

#[tokio::test]
async fn mixed_chain_finishes_with_selected_keys() {
    let mut outcome = None;
    Pipeline::make(record(json!({"n": 3})))
        .add(Addition::Computed(
            "double".to_string(),
            Arc::new(|rec: &Record| json!(rec.get("n").and_then(Value::as_i64).unwrap_or_default() * 2)),
        ))
        .conditional(
            Condition::test(|rec: &Record| rec.get("double") == Some(&json!(6))),
            Some(Arc::new(block(|rec: &mut Record| {
                rec.insert("six".to_string(), json!(true));
                Ok(())
            }))),
            None,
        )
        .optional(Arc::new(flowkit::test_support::failing("ignored")), None)
        .log("done", "double,six")
        .end(Finish::Keys(record(json!({"caller": 1})), "double,six:flags/six".to_string()), |result| {
            outcome = Some(result);
        })
        .await;
    assert_eq!(
        outcome.expect("callback ran").expect("ok"),
        record(json!({"caller": 1, "double": 6, "flags": {"six": true}}))
    );
}

#[tokio::test(start_paused = true)]
async fn series_keeps_at_most_n_items_in_flight() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (current, high) = (Arc::clone(&in_flight), Arc::clone(&peak));
    let series = Series::builder()
        .inputs("values:value")
        .method(move |rec: Record| {
            let (current, high) = (Arc::clone(&current), Arc::clone(&high));
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                high.fetch_max(now, Ordering::SeqCst);
                let value = rec.get("value").and_then(Value::as_u64).unwrap_or_default();
                tokio::time::sleep(Duration::from_millis(5 * (8 - value))).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, FlowError>(json!(value))
            }
        })
        .n(2)
        .build()
        .expect("series");

    let out = Pipeline::make(record(json!({"values": [1, 2, 3, 4, 5, 6, 7]})))
        .then(series)
        .run()
        .await
        .expect("run");
    assert_eq!(out.get("outputs"), Some(&json!([1, 2, 3, 4, 5, 6, 7])));
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn a_bail_inside_a_series_item_ends_the_outer_pipeline() {
    let stop_at_two: SharedStep = Arc::new(bail_if(Condition::test(|rec: &Record| {
        rec.get("value") == Some(&json!(2))
    })));
    let series = Series::builder()
        .inputs("values:value")
        .step(stop_at_two)
        .build()
        .expect("series");
    let out = Pipeline::make(record(json!({"values": [1, 2, 3]})))
        .then(series)
        .then(assign("after", json!(true)))
        .run()
        .await
        .expect("bail is not an error");
    assert_eq!(out, record(json!({"values": [1, 2, 3], "value": 2})));
}

#[tokio::test]
async fn client_errors_are_recovered_by_status_group() {
    let not_found = block(|_: &mut Record| Err(FlowError::step_status("no such user", 404)));
    let out = Pipeline::make(record(json!({"user": "ada"})))
        .then(not_found)
        .except(|err| {
            err.otherwise(&ErrorSelector::code(4), |mut rec, err| {
                rec.insert("status".to_string(), json!(err.status()));
                rec
            })
        })
        .run()
        .await
        .expect("recovered");
    assert_eq!(out, record(json!({"user": "ada", "status": 404})));

    let err = Pipeline::make(Record::new())
        .then(block(|_: &mut Record| Err(FlowError::step("crashed"))))
        .except(|err| err.otherwise(&ErrorSelector::code(4), |rec, _| rec))
        .run()
        .await
        .expect_err("server errors pass through");
    assert_eq!(err.group(), 5);
}
