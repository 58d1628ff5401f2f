use std::time::Duration;

use crate::backoff::Backoff;
use crate::time::unix_now_secs;
use crate::BackoffPolicy;

fn policy(max_retries: usize) -> BackoffPolicy {
    BackoffPolicy {
        max_retries,
        timeout_ms: 100,
        base_delay_ms: 100,
        max_delay_ms: 1000,
    }
}

#[test]
fn test_backoff_grows_and_caps() {
    let mut backoff = Backoff::new(policy(0));

    let d1 = backoff.next_delay().unwrap();
    assert!(d1 >= Duration::from_millis(75) && d1 <= Duration::from_millis(125));

    let d2 = backoff.next_delay().unwrap();
    assert!(d2 >= Duration::from_millis(150) && d2 <= Duration::from_millis(250));

    // delays saturate at max_delay_ms (plus jitter)
    for _ in 0..10 {
        backoff.next_delay().unwrap();
    }
    let capped = backoff.next_delay().unwrap();
    assert!(capped <= Duration::from_millis(1250));
}

#[test]
fn test_backoff_bounded_retries_exhaust() {
    let mut backoff = Backoff::new(policy(2));
    assert!(backoff.next_delay().is_some());
    assert!(backoff.next_delay().is_some());
    assert!(backoff.next_delay().is_none());
    assert!(backoff.next_delay().is_none());
}

#[test]
fn test_backoff_zero_max_retries_is_unlimited() {
    let mut backoff = Backoff::new(policy(0));
    for _ in 0..50 {
        assert!(backoff.next_delay().is_some());
    }
}

#[test]
fn test_backoff_reset_restores_base_delay() {
    let mut backoff = Backoff::new(policy(0));
    backoff.next_delay();
    backoff.next_delay();
    backoff.next_delay();

    backoff.reset();
    assert_eq!(backoff.attempt(), 0);

    let d = backoff.next_delay().unwrap();
    assert!(d >= Duration::from_millis(75) && d <= Duration::from_millis(125));
}

#[test]
fn test_unix_now_secs_is_current() {
    // 2024-01-01T00:00:00Z
    assert!(unix_now_secs() > 1_704_067_200);
}
