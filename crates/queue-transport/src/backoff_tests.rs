//! Tests for idle backoff.

use super::*;

fn controller() -> BackoffController {
    BackoffController::new(Duration::from_millis(50), Duration::from_millis(1000))
}

#[test]
fn test_starts_at_zero() {
    assert_eq!(controller().current_wait(), Duration::ZERO);
}

#[test]
fn test_idle_observations_grow_linearly() {
    let mut backoff = controller();

    assert_eq!(backoff.observe(false), Duration::from_millis(50));
    assert_eq!(backoff.observe(false), Duration::from_millis(100));
    assert_eq!(backoff.observe(false), Duration::from_millis(150));
}

#[test]
fn test_wait_is_capped_at_ceiling() {
    let mut backoff = controller();

    for _ in 0..100 {
        backoff.observe(false);
    }

    assert_eq!(backoff.current_wait(), Duration::from_millis(1000));
}

#[test]
fn test_uneven_increment_stops_exactly_at_ceiling() {
    let mut backoff = BackoffController::new(Duration::from_millis(300), Duration::from_millis(1000));

    backoff.observe(false);
    backoff.observe(false);
    backoff.observe(false);
    assert_eq!(backoff.observe(false), Duration::from_millis(1000));
}

#[test]
fn test_seeing_a_message_resets() {
    let mut backoff = controller();
    backoff.observe(false);
    backoff.observe(false);

    assert_eq!(backoff.observe(true), Duration::ZERO);
    assert_eq!(backoff.observe(false), Duration::from_millis(50));
}

#[test]
fn test_from_settings() {
    let settings = TransportSettings {
        peek_interval_ms: 10,
        maximum_wait_time_when_idle_ms: 25,
        ..Default::default()
    };
    let mut backoff = BackoffController::from_settings(&settings);

    assert_eq!(backoff.observe(false), Duration::from_millis(10));
    assert_eq!(backoff.observe(false), Duration::from_millis(20));
    assert_eq!(backoff.observe(false), Duration::from_millis(25));
}

#[tokio::test(start_paused = true)]
async fn test_idle_observation_sleeps() {
    let mut backoff = controller();
    let start = tokio::time::Instant::now();

    backoff.observe_and_wait(false).await;
    backoff.observe_and_wait(false).await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(150), "slept {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(200), "slept {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_busy_observation_returns_immediately() {
    let mut backoff = controller();
    backoff.observe(false);
    let start = tokio::time::Instant::now();

    backoff.observe_and_wait(true).await;

    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(backoff.current_wait(), Duration::ZERO);
}

#[test]
fn test_reset() {
    let mut backoff = controller();
    backoff.observe(false);
    backoff.reset();
    assert_eq!(backoff.current_wait(), Duration::ZERO);
}
