use std::time::Duration;

use crate::RetryConfigOption;

/// Retry policy for [`OnceCell::get_or_init_with_config`](crate::OnceCell::get_or_init_with_config).
///
/// The delay before attempt `n + 1` is `initial_backoff * multiplier^(n - 1)`, capped at
/// `max_backoff` when one is set. No delay follows the final attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
  pub max_attempts: usize,
  pub initial_backoff: Duration,
  pub max_backoff: Option<Duration>,
  pub multiplier: u32,
}

impl Default for RetryConfig {
  fn default() -> Self {
    RetryConfig {
      max_attempts: 3,
      initial_backoff: Duration::from_millis(10),
      max_backoff: None,
      multiplier: 2,
    }
  }
}

impl RetryConfig {
  pub fn from(options: impl IntoIterator<Item = RetryConfigOption>) -> RetryConfig {
    let mut config = RetryConfig::default();
    for option in options {
      option.apply(&mut config);
    }
    config
  }

  /// Delay to apply after `backoff`, the delay that was just used.
  pub(crate) fn next_backoff(&self, backoff: Duration) -> Duration {
    let next = backoff.saturating_mul(self.multiplier);
    match self.max_backoff {
      Some(max_backoff) => next.min(max_backoff),
      None => next,
    }
  }

  pub(crate) fn first_backoff(&self) -> Duration {
    match self.max_backoff {
      Some(max_backoff) => self.initial_backoff.min(max_backoff),
      None => self.initial_backoff,
    }
  }
}
