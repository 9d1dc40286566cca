use super::*;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::Instant;

async fn flaky(calls: &AtomicU32, fail_times: u32, transient: bool) -> Result<u32, SynthesisError> {
    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
    if n <= fail_times {
        if transient {
            Err(SynthesisError::transient(format!("connection reset #{n}")))
        } else {
            Err(SynthesisError::fatal("voice not found"))
        }
    } else {
        Ok(n)
    }
}

#[test]
fn backoff_doubles_and_caps() {
    let p = RetryPolicy {
        max_attempts: 10,
        base_delay_ms: 100,
        max_delay_ms: 500,
    };
    assert_eq!(p.delay_after_failure(1), Duration::from_millis(100));
    assert_eq!(p.delay_after_failure(2), Duration::from_millis(200));
    assert_eq!(p.delay_after_failure(3), Duration::from_millis(400));
    assert_eq!(p.delay_after_failure(4), Duration::from_millis(500));
    assert_eq!(p.delay_after_failure(80), Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn succeeds_on_last_permitted_attempt() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(4).with_base_delay_ms(100);
    let started = Instant::now();

    let out = retry_transient(&policy, "synth", |_| flaky(&calls, 3, true)).await;

    assert_eq!(out.unwrap(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    // 100 + 200 + 400 ms of backoff on the virtual clock.
    assert_eq!(started.elapsed(), Duration::from_millis(700));
}

#[tokio::test(start_paused = true)]
async fn gives_up_when_budget_is_spent() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(4).with_base_delay_ms(10);

    let out = retry_transient(&policy, "synth", |_| flaky(&calls, 5, true)).await;

    let exhausted = out.unwrap_err();
    assert_eq!(exhausted.attempts, 4);
    assert!(exhausted.error.is_transient());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn fatal_failures_are_not_retried() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(4);

    let out = retry_transient(&policy, "synth", |_| flaky(&calls, 1, false)).await;

    assert_eq!(out.unwrap_err().attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_attempt_budget_still_calls_once() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(0);
    let out = retry_transient(&policy, "synth", |attempt| {
        assert_eq!(attempt, 1);
        flaky(&calls, 0, true)
    })
    .await;
    assert_eq!(out.unwrap(), 1);
}
