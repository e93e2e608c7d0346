//! Exponential-backoff bookkeeping for automatic reconnection.
//!
//! After an unexpected drop the connection manager asks
//! [`ReconnectState::schedule`] for the next delay. The delay for attempt
//! `n` (zero based) is `base_delay * multiplier^n`, clamped to
//! `max_delay`. Once `max_attempts` have been scheduled no further delay is
//! handed out until [`ReconnectState::reset`] is called after a successful
//! connect or an explicit disconnect.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Backoff delay for the zero-based `attempt`.
pub fn delay_for_attempt(attempt: u32, config: &ReconnectConfig) -> Duration {
    let factor = config.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
    let ms = config.base_delay.as_millis() as f64 * factor;
    if !ms.is_finite() || ms >= config.max_delay.as_millis() as f64 {
        return config.max_delay;
    }
    Duration::from_millis(ms as u64)
}

/// Attempt counter owned by the connection manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconnectState {
    attempt: u32,
}

impl ReconnectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts scheduled since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the maximum number of attempts has been used up.
    pub fn is_exhausted(&self, config: &ReconnectConfig) -> bool {
        self.attempt >= config.max_attempts
    }

    /// Reserve the next attempt and return the delay to wait before it.
    ///
    /// Returns `None` when the attempt budget is exhausted; the counter is
    /// left unchanged in that case.
    pub fn schedule(&mut self, config: &ReconnectConfig) -> Option<Duration> {
        if self.is_exhausted(config) {
            return None;
        }
        let delay = delay_for_attempt(self.attempt, config);
        self.attempt += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_delay_is_base_delay() {
        let config = ReconnectConfig::default();
        assert_eq!(delay_for_attempt(0, &config), Duration::from_millis(1000));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let config = ReconnectConfig::default();
        let mut state = ReconnectState::new();
        let expected = [1000, 2000, 4000, 8000, 16000];

        for &expected_ms in &expected {
            let delay = state.schedule(&config).expect("attempt budget left");
            assert_eq!(delay.as_millis() as u64, expected_ms);
        }
        assert_eq!(state.attempt(), 5);
    }

    #[test]
    fn no_sixth_attempt_is_scheduled() {
        let config = ReconnectConfig::default();
        let mut state = ReconnectState::new();
        for _ in 0..5 {
            state.schedule(&config);
        }

        assert!(state.is_exhausted(&config));
        assert!(state.schedule(&config).is_none());
        assert_eq!(state.attempt(), 5);
    }

    #[test]
    fn reset_restarts_at_base_delay() {
        let config = ReconnectConfig::default();
        let mut state = ReconnectState::new();
        state.schedule(&config);
        state.schedule(&config);
        state.schedule(&config);

        state.reset();

        assert_eq!(state.attempt(), 0);
        assert_eq!(state.schedule(&config), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn delay_clamps_at_max() {
        let config = ReconnectConfig {
            max_delay: Duration::from_secs(10),
            max_attempts: 20,
            ..Default::default()
        };
        assert_eq!(delay_for_attempt(4, &config), Duration::from_secs(10));
        assert_eq!(delay_for_attempt(19, &config), Duration::from_secs(10));
    }

    #[test]
    fn custom_multiplier() {
        let config = ReconnectConfig {
            multiplier: 3.0,
            max_delay: Duration::from_secs(60),
            ..Default::default()
        };
        assert_eq!(delay_for_attempt(2, &config), Duration::from_secs(9));
    }
}
