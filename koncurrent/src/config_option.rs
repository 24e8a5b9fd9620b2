use std::time::Duration;

use crate::RetryConfig;

#[derive(Debug, Clone)]
pub enum RetryConfigOption {
  SetMaxAttempts(usize),
  SetInitialBackoff(Duration),
  SetMaxBackoff(Duration),
  SetMultiplier(u32),
}

impl RetryConfigOption {
  pub fn apply(&self, config: &mut RetryConfig) {
    match self {
      RetryConfigOption::SetMaxAttempts(max_attempts) => {
        config.max_attempts = *max_attempts;
      }
      RetryConfigOption::SetInitialBackoff(initial_backoff) => {
        config.initial_backoff = *initial_backoff;
      }
      RetryConfigOption::SetMaxBackoff(max_backoff) => {
        config.max_backoff = Some(*max_backoff);
      }
      RetryConfigOption::SetMultiplier(multiplier) => {
        config.multiplier = *multiplier;
      }
    }
  }

  pub fn with_max_attempts(max_attempts: usize) -> RetryConfigOption {
    RetryConfigOption::SetMaxAttempts(max_attempts)
  }

  pub fn with_initial_backoff(initial_backoff: Duration) -> RetryConfigOption {
    RetryConfigOption::SetInitialBackoff(initial_backoff)
  }

  pub fn with_max_backoff(max_backoff: Duration) -> RetryConfigOption {
    RetryConfigOption::SetMaxBackoff(max_backoff)
  }

  pub fn with_multiplier(multiplier: u32) -> RetryConfigOption {
    RetryConfigOption::SetMultiplier(multiplier)
  }
}
