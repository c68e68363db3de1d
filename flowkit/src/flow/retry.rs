//! Re-run a step on failure.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::core::record::Record;
use crate::error::FlowError;
use crate::flow::step::{SharedStep, Step, StepResult};
use crate::io::config::RetryConfig;

pub type RetryTest = Arc<dyn Fn(&FlowError) -> bool + Send + Sync>;

/// Runs `method` against the record it was given, retrying up to `retries`
/// more times while `test` accepts the error. Every attempt starts from the
/// original record.
pub struct Retry {
    method: SharedStep,
    retries: u32,
    delay: Duration,
    test: Option<RetryTest>,
}

impl Retry {
    pub fn new(method: SharedStep) -> Self {
        Self {
            method,
            retries: 4,
            delay: Duration::from_secs(1),
            test: None,
        }
    }

    pub fn from_config(method: SharedStep, config: &RetryConfig) -> Self {
        Self::new(method)
            .retries(config.retries)
            .delay(Duration::from_millis(config.delay_ms))
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Only retry errors this accepts.
    pub fn test<F>(mut self, f: F) -> Self
    where
        F: Fn(&FlowError) -> bool + Send + Sync + 'static,
    {
        self.test = Some(Arc::new(f));
        self
    }
}

impl Step for Retry {
    fn name(&self) -> &str {
        "retry"
    }

    fn run(&self, record: Record) -> BoxFuture<'_, StepResult> {
        async move {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                let err = match self.method.run(record.clone()).await {
                    Ok(control) => return Ok(control),
                    Err(err) => err,
                };
                if attempt > self.retries {
                    warn!(step = self.method.name(), attempt, error = %err, "retries exhausted");
                    return Err(err);
                }
                if !self.test.as_ref().is_none_or(|test| test(&err)) {
                    return Err(err);
                }
                info!(step = self.method.name(), attempt, error = %err, "will retry");
                tokio::time::sleep(self.delay).await;
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;
    use crate::test_support::{counting, flaky, record};

    #[tokio::test(start_paused = true)]
    async fn always_failing_method_runs_one_plus_retries_times() {
        let method = counting(|_| Err(FlowError::step("down")));
        let calls = method.calls();
        let err = Retry::new(Arc::new(method))
            .run(Record::new())
            .await
            .expect_err("exhausted");
        assert_eq!(err.to_string(), "down");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn every_attempt_sees_the_original_record() {
        let method = flaky(2);
        let calls = method.calls();
        let out = Retry::new(Arc::new(method))
            .delay(Duration::ZERO)
            .run(record(json!({"n": 1})))
            .await
            .expect("third attempt succeeds")
            .into_record();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(out, record(json!({"n": 1, "attempts": 3})));
    }

    #[tokio::test]
    async fn test_rejection_stops_immediately() {
        let method = counting(|_| Err(FlowError::step("fatal")));
        let calls = method.calls();
        Retry::new(Arc::new(method))
            .delay(Duration::ZERO)
            .test(|err| !err.to_string().contains("fatal"))
            .run(Record::new())
            .await
            .expect_err("not retried");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn configured_retries_apply() {
        let method = counting(|_| Err(FlowError::step("down")));
        let calls = method.calls();
        let config = RetryConfig {
            retries: 1,
            delay_ms: 0,
        };
        Retry::from_config(Arc::new(method), &config)
            .run(Record::new())
            .await
            .expect_err("exhausted");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
