use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::time::Duration;

use tokio::sync::OnceCell as TokioOnceCell;

use crate::{InitError, RetryConfig, RetryConfigOption};

/// Write-once cell with async, optionally retrying, initialisation.
///
/// Concurrent initialisers are serialised: one caller runs its initializer while the
/// others wait for the outcome. A stored value never changes afterwards.
///
/// ```
/// use koncurrent_rs::OnceCell;
///
/// # #[tokio::main]
/// # async fn main() {
/// let cell = OnceCell::new();
/// assert_eq!(*cell.get_or_init(|| async { 7 }).await, 7);
/// assert!(!cell.set(8));
/// assert_eq!(cell.get(), Some(&7));
/// # }
/// ```
pub struct OnceCell<T> {
  inner: TokioOnceCell<T>,
}

impl<T> OnceCell<T> {
  pub fn new() -> Self {
    Self {
      inner: TokioOnceCell::new(),
    }
  }

  /// Creates an already initialised cell.
  pub fn with_value(value: T) -> Self {
    Self {
      inner: TokioOnceCell::new_with(Some(value)),
    }
  }

  /// Stores `value` if the cell is empty and no initializer is running.
  ///
  /// Returns `false` and drops `value` otherwise; the existing value is kept.
  pub fn set(&self, value: T) -> bool {
    match self.inner.set(value) {
      Ok(()) => true,
      Err(err) => {
        tracing::trace!(initializing = err.is_initializing_err(), "OnceCell set rejected");
        false
      }
    }
  }

  pub fn get(&self) -> Option<&T> {
    self.inner.get()
  }

  pub fn try_get(&self) -> Option<&T> {
    self.get()
  }

  pub fn is_initialized(&self) -> bool {
    self.inner.initialized()
  }

  /// Returns the stored value, running `init` first if the cell is empty.
  ///
  /// Only one concurrent caller runs its initializer; the rest wait and observe its result.
  pub async fn get_or_init<F, Fut>(&self, init: F) -> &T
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>, {
    self.inner.get_or_init(init).await
  }

  pub async fn get_or_init_with(&self, value: T) -> &T {
    self.inner.get_or_init(|| async move { value }).await
  }

  /// Single fallible attempt. On error the cell stays empty and the next waiting caller
  /// gets to run its own initializer.
  pub async fn get_or_try_init<E, F, Fut>(&self, init: F) -> Result<&T, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>, {
    self.inner.get_or_try_init(init).await
  }

  /// Runs `init` up to `max_attempts` times, doubling the delay between failed
  /// attempts starting from `initial_backoff`.
  pub async fn get_or_init_with_retry<E, F, Fut>(
    &self,
    init: F,
    max_attempts: usize,
    initial_backoff: Duration,
  ) -> Result<&T, InitError<E>>
  where
    E: Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>, {
    let config = RetryConfig::from([
      RetryConfigOption::with_max_attempts(max_attempts),
      RetryConfigOption::with_initial_backoff(initial_backoff),
    ]);
    self.get_or_init_with_config(init, &config).await
  }

  /// Retrying initialisation under an explicit [`RetryConfig`].
  ///
  /// Callers that arrive while another caller is retrying wait for it rather than
  /// starting their own loop. When the running caller gives up, the next waiter runs a
  /// full loop of its own. If every attempt fails the cell stays empty.
  pub async fn get_or_init_with_config<E, F, Fut>(&self, init: F, config: &RetryConfig) -> Result<&T, InitError<E>>
  where
    E: Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>, {
    if let Some(value) = self.inner.get() {
      return Ok(value);
    }
    if config.max_attempts == 0 {
      return Err(InitError::NoAttempts);
    }
    self.inner.get_or_try_init(|| run_with_retry(init, config)).await
  }

  /// Returns a fresh, empty cell. `self` is left untouched.
  pub fn reset(&self) -> Self {
    Self::new()
  }

  pub fn into_inner(self) -> Option<T> {
    self.inner.into_inner()
  }
}

async fn run_with_retry<T, E, F, Fut>(mut init: F, config: &RetryConfig) -> Result<T, InitError<E>>
where
  E: Debug,
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>, {
  let mut backoff = config.first_backoff();
  let mut attempt = 1;
  loop {
    match init().await {
      Ok(value) => {
        if attempt > 1 {
          tracing::debug!(attempt, "OnceCell initializer succeeded after retrying");
        }
        return Ok(value);
      }
      Err(err) if attempt >= config.max_attempts => {
        tracing::warn!(attempts = attempt, error = ?err, "OnceCell initializer exhausted its attempts");
        return Err(InitError::Exhausted {
          attempts: attempt,
          source: err,
        });
      }
      Err(err) => {
        tracing::warn!(
          attempt,
          max_attempts = config.max_attempts,
          ?backoff,
          error = ?err,
          "OnceCell initializer failed, retrying"
        );
        tokio::time::sleep(backoff).await;
        backoff = config.next_backoff(backoff);
        attempt += 1;
      }
    }
  }
}

impl<T> Default for OnceCell<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Debug> Debug for OnceCell<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("OnceCell").field("value", &self.get()).finish()
  }
}
