use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::sync::{Shared, SharedArc};

/// Reference-counted mutable data behind a `tokio::sync::Mutex`.
///
/// The value is only reachable inside the closure passed to a lock method. The guard is
/// dropped when the closure returns or panics, so the lock is always released.
///
/// ```
/// use koncurrent_rs::ArcMutex;
///
/// # #[tokio::main]
/// # async fn main() {
/// let counter = ArcMutex::new(0);
/// let clone = counter.clone();
/// clone.with_lock(|value| *value += 1).await;
/// assert_eq!(counter.with_lock_result(|value| *value).await, 1);
/// # }
/// ```
pub struct ArcMutex<T> {
  inner: SharedArc<Mutex<T>>,
}

impl<T> ArcMutex<T> {
  /// Creates a handle with a reference count of one.
  pub fn new(value: T) -> Self {
    Self {
      inner: SharedArc::new(Mutex::new(value)),
    }
  }

  /// Waits for the lock and runs `f` on the guarded value.
  pub async fn with_lock<F>(&self, f: F)
  where
    F: FnOnce(&mut T), {
    self.with_lock_result(f).await
  }

  /// Like [`ArcMutex::with_lock`], returning what `f` returns.
  pub async fn with_lock_result<F, R>(&self, f: F) -> R
  where
    F: FnOnce(&mut T) -> R, {
    let mut guard = self.inner.lock().await;
    f(&mut guard)
  }

  /// Runs `f` and returns `true` if the lock is free right now.
  ///
  /// Returns `false` without calling `f` when another task holds the lock.
  pub fn try_with_lock<F>(&self, f: F) -> bool
  where
    F: FnOnce(&mut T), {
    match self.inner.try_lock() {
      Ok(mut guard) => {
        f(&mut guard);
        true
      }
      Err(_) => {
        tracing::trace!("ArcMutex::try_with_lock: lock is held");
        false
      }
    }
  }

  /// Waits up to `timeout` for the lock. A zero `timeout` behaves like `try_with_lock`.
  ///
  /// Returns `false` without calling `f` if the lock was not acquired in time.
  pub async fn try_lock_with_timeout<F>(&self, timeout: Duration, f: F) -> bool
  where
    F: FnOnce(&mut T), {
    if timeout.is_zero() {
      return self.try_with_lock(f);
    }
    match tokio::time::timeout(timeout, self.inner.lock()).await {
      Ok(mut guard) => {
        f(&mut guard);
        true
      }
      Err(_) => {
        tracing::trace!(?timeout, "ArcMutex::try_lock_with_timeout: timed out");
        false
      }
    }
  }

  /// Best-effort snapshot of whether the lock is held. Diagnostic only.
  pub fn is_locked(&self) -> bool {
    self.inner.try_lock().is_err()
  }

  pub fn ref_count(&self) -> usize {
    self.inner.ref_count()
  }

  /// `true` when both handles share the same data.
  pub fn ptr_eq(this: &Self, other: &Self) -> bool {
    SharedArc::ptr_eq(&this.inner, &other.inner)
  }

  /// Gives up this handle. Returns `true` if this call released the value.
  pub fn release(self) -> bool {
    self.inner.release()
  }

  /// Takes the value out when this is the only handle.
  pub fn try_unwrap(self) -> Result<T, Self> {
    Shared::try_unwrap(self.inner)
      .map(Mutex::into_inner)
      .map_err(|inner| Self { inner })
  }
}

impl<T> Clone for ArcMutex<T> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<T: Default> Default for ArcMutex<T> {
  fn default() -> Self {
    Self::new(T::default())
  }
}

impl<T> PartialEq for ArcMutex<T> {
  fn eq(&self, other: &Self) -> bool {
    Self::ptr_eq(self, other)
  }
}

impl<T> Eq for ArcMutex<T> {}

impl<T> Debug for ArcMutex<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("ArcMutex")
      .field("ref_count", &self.ref_count())
      .field("locked", &self.is_locked())
      .finish()
  }
}
