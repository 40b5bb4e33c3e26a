use corpus_domains::retry::{RetryConfig, retry_with_backoff};
use std::time::Duration;

fn quick(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        backoff_multiplier: 2,
    }
}

#[test]
fn succeeds_after_transient_failures() {
    let mut seen = Vec::new();
    let result: Result<u32, &str> = retry_with_backoff(&quick(5), |_| true, |attempt| {
        seen.push(attempt);
        if attempt < 2 { Err("flaky") } else { Ok(attempt) }
    });
    assert_eq!(result, Ok(2));
    assert_eq!(seen, vec![0, 1, 2]);
}

#[test]
fn returns_last_error_when_attempts_run_out() {
    let mut calls = 0;
    let result: Result<(), String> = retry_with_backoff(&quick(3), |_| true, |attempt| {
        calls += 1;
        Err(format!("attempt {attempt}"))
    });
    assert_eq!(result, Err("attempt 2".to_string()));
    assert_eq!(calls, 3);
}

#[test]
fn permanent_errors_are_not_retried() {
    let mut calls = 0;
    let result: Result<(), &str> = retry_with_backoff(&quick(5), |e| *e != "gone", |_| {
        calls += 1;
        Err("gone")
    });
    assert_eq!(result, Err("gone"));
    assert_eq!(calls, 1);
}

#[test]
fn zero_attempts_still_runs_once() {
    let mut calls = 0;
    let _: Result<(), ()> = retry_with_backoff(&quick(0), |_| true, |_| {
        calls += 1;
        Err(())
    });
    assert_eq!(calls, 1);
}

#[test]
fn delays_double_up_to_the_cap() {
    let config = RetryConfig {
        max_attempts: 10,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(5),
        backoff_multiplier: 2,
    };
    let delays: Vec<u64> = (0..5).map(|a| config.delay_for(a).as_secs()).collect();
    assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    assert_eq!(config.delay_for(200), Duration::from_secs(5));
    assert_eq!(RetryConfig::once().delay_for(3), Duration::ZERO);
}
