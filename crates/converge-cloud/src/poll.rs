//! Long-running operation poller
//!
//! Providers answer mutating calls with an operation handle that must be
//! polled to completion. The poller is an explicit state machine driven by
//! a pure transition function, so the terminal logic is testable apart
//! from the sleeps and the status calls.

use crate::error::{CallError, CloudError, Result};
use crate::retry::{with_retry, RetryPolicy, Sleeper};
use serde_json::Value;
use std::future::Future;

/// Poller states. `Polling` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Success,
    Failed,
    Cancelled,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Polling)
    }
}

/// Classification of one status response.
///
/// Classifiers must check for failure before completion, so a response
/// carrying both an error and a "done" marker fails.
#[derive(Debug, Clone)]
pub enum PollVerdict {
    Pending,
    Complete,
    Failed(String),
    Cancelled(String),
}

/// Pure transition function. Terminal states absorb all verdicts.
pub fn next_state(state: PollState, verdict: &PollVerdict) -> PollState {
    if state.is_terminal() {
        return state;
    }
    match verdict {
        PollVerdict::Pending => PollState::Polling,
        PollVerdict::Complete => PollState::Success,
        PollVerdict::Failed(_) => PollState::Failed,
        PollVerdict::Cancelled(_) => PollState::Cancelled,
    }
}

/// Poll an operation to a terminal state.
///
/// Each iteration issues one status call (itself retried under the policy
/// when rate limited), classifies the body, and either returns or sleeps
/// on the shared exponential+jitter schedule. Exhausting `max_attempts`
/// while still pending surfaces a timeout error; the poller never hangs.
pub async fn poll_operation<F, Fut, C>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    label: &str,
    mut status_call: F,
    classify: C,
) -> Result<Value>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<Value, CallError>>,
    C: Fn(&Value) -> PollVerdict,
{
    let mut state = PollState::Polling;

    for attempt in 1..=policy.max_attempts {
        let body = with_retry(policy, sleeper, label, &mut status_call).await?;

        let verdict = classify(&body);
        state = next_state(state, &verdict);
        tracing::debug!("{label}: poll attempt {attempt} -> {state:?}");

        match (state, verdict) {
            (PollState::Success, _) => return Ok(body),
            (PollState::Failed, PollVerdict::Failed(message)) => {
                return Err(CloudError::OperationFailed(message));
            }
            (PollState::Cancelled, PollVerdict::Cancelled(message)) => {
                return Err(CloudError::OperationCanceled(message));
            }
            _ => {
                if attempt < policy.max_attempts {
                    sleeper.sleep(policy.delay_for_attempt(attempt)).await;
                }
            }
        }
    }

    Err(CloudError::Timeout(format!(
        "{label}: operation still pending after {} poll attempts",
        policy.max_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::testing::RecordingSleeper;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn classify_status(body: &Value) -> PollVerdict {
        match body["status"].as_str() {
            Some("FAILED") => PollVerdict::Failed(
                body["message"].as_str().unwrap_or("operation failed").into(),
            ),
            Some("CANCEL_COMPLETE") => {
                PollVerdict::Cancelled("Operation Canceled by API or AWS.".into())
            }
            Some("SUCCESS") => PollVerdict::Complete,
            _ => PollVerdict::Pending,
        }
    }

    fn small_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(80),
        }
    }

    #[test]
    fn test_transitions_are_terminal() {
        let state = next_state(PollState::Polling, &PollVerdict::Complete);
        assert_eq!(state, PollState::Success);
        assert_eq!(next_state(state, &PollVerdict::Failed("x".into())), state);

        assert_eq!(
            next_state(PollState::Polling, &PollVerdict::Cancelled("c".into())),
            PollState::Cancelled
        );
    }

    #[tokio::test]
    async fn test_pending_then_success_sleeps_between_polls() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicUsize::new(0);
        let responses = [
            json!({"status": "PENDING"}),
            json!({"status": "PENDING"}),
            json!({"status": "SUCCESS", "resource": {"Id": "r-1"}}),
        ];

        let body = poll_operation(
            &small_policy(),
            &sleeper,
            "test",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let response = responses[n].clone();
                async move { Ok(response) }
            },
            classify_status,
        )
        .await
        .unwrap();

        assert_eq!(body["resource"]["Id"], "r-1");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_carries_upstream_message() {
        let sleeper = RecordingSleeper::default();
        let outcome = poll_operation(
            &small_policy(),
            &sleeper,
            "test",
            || async { Ok(json!({"status": "FAILED", "message": "Quota exceeded"})) },
            classify_status,
        )
        .await;

        match outcome {
            Err(CloudError::OperationFailed(message)) => assert_eq!(message, "Quota exceeded"),
            other => panic!("expected OperationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_is_a_distinct_failure() {
        let sleeper = RecordingSleeper::default();
        let outcome = poll_operation(
            &small_policy(),
            &sleeper,
            "test",
            || async { Ok(json!({"status": "CANCEL_COMPLETE"})) },
            classify_status,
        )
        .await;

        match outcome {
            Err(CloudError::OperationCanceled(message)) => {
                assert_eq!(message, "Operation Canceled by API or AWS.");
            }
            other => panic!("expected OperationCanceled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exhausted_polls_time_out() {
        let sleeper = RecordingSleeper::default();
        let outcome = poll_operation(
            &small_policy(),
            &sleeper,
            "test",
            || async { Ok(json!({"status": "IN_PROGRESS"})) },
            classify_status,
        )
        .await;

        assert!(matches!(outcome, Err(CloudError::Timeout(_))));
        // one fewer sleep than poll attempts; no sleep after the last poll
        assert_eq!(sleeper.delays.lock().unwrap().len(), 9);
    }
}
