// crates/rally-fetch/tests/backoff_props.rs
// ============================================================================
// Module: Backoff Schedule Tests
// Description: Exact and property-based checks of the backoff schedule.
// ============================================================================
//! ## Overview
//! Verifies the default schedule and that delays never shrink or exceed the cap.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::time::Duration;

use proptest::prelude::*;
use rally_fetch::RetryConfig;
use rally_fetch::backoff_delay;

#[test]
fn default_schedule_doubles_then_caps() {
    let config = RetryConfig::default();
    let delays: Vec<u64> = (1 ..= 5)
        .map(|attempt| u64::try_from(backoff_delay(attempt, &config).as_millis()).unwrap())
        .collect();
    assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 10_000]);
}

#[test]
fn fractional_multiplier_grows_by_half_then_caps() {
    let config = RetryConfig {
        delay_ms: 1_000,
        backoff_multiplier: 1.5,
        max_delay_ms: 4_000,
        ..RetryConfig::default()
    };
    let delays: Vec<Duration> = (1 ..= 5).map(|attempt| backoff_delay(attempt, &config)).collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(1_000),
            Duration::from_millis(1_500),
            Duration::from_millis(2_250),
            Duration::from_millis(3_375),
            Duration::from_millis(4_000),
        ]
    );
}

#[test]
fn huge_attempt_numbers_saturate_at_cap() {
    let config = RetryConfig::default();
    assert_eq!(backoff_delay(u32::MAX, &config), Duration::from_millis(10_000));
}

#[test]
fn retry_config_defaults_and_partial_toml_like_json() {
    let config: RetryConfig = serde_json::from_str(r#"{ "max_attempts": 5 }"#).unwrap();
    assert_eq!(config.max_attempts, 5);
    assert_eq!(config.delay_ms, 1_000);
    assert!((config.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    assert_eq!(config.max_delay_ms, 10_000);
    assert_eq!(config.timeout_ms, 30_000);
}

proptest! {
    #[test]
    fn delays_are_monotonic_and_capped(
        delay_ms in 0_u64 .. 100_000,
        multiplier in 1.0_f64 .. 10.0,
        max_delay_ms in 0_u64 .. 1_000_000,
        attempt in 1_u32 .. 64,
    ) {
        let config = RetryConfig {
            max_attempts: 3,
            delay_ms,
            backoff_multiplier: multiplier,
            max_delay_ms,
            timeout_ms: 1_000,
        };
        let current = backoff_delay(attempt, &config);
        let next = backoff_delay(attempt + 1, &config);
        prop_assert!(current <= next);
        prop_assert!(next <= Duration::from_millis(max_delay_ms));
    }
}
