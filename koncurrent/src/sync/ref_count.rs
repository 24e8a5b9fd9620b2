use std::process;
use std::sync::atomic::{fence, AtomicUsize, Ordering};
use std::sync::Arc;

/// Same limit as `std::sync::Arc`: past this point the counter could wrap.
const MAX_REF_COUNT: usize = isize::MAX as usize;

/// Atomic count of live owning handles.
///
/// Increments are `Relaxed` because a new handle can only be created from an existing
/// one. The decrement that reaches zero is `Release` followed by an `Acquire` fence, so
/// every access made through other handles happens-before the release of the payload.
#[derive(Debug)]
pub(crate) struct RefCount {
  count: AtomicUsize,
}

impl RefCount {
  pub(crate) fn new() -> Self {
    Self {
      count: AtomicUsize::new(1),
    }
  }

  pub(crate) fn get(&self) -> usize {
    self.count.load(Ordering::Acquire)
  }

  pub(crate) fn increment(&self) {
    self.increment_by(1);
  }

  pub(crate) fn increment_by(&self, n: usize) {
    let prev = self.count.fetch_add(n, Ordering::Relaxed);
    if prev.checked_add(n).map_or(true, |count| count > MAX_REF_COUNT) {
      process::abort();
    }
  }

  /// Increments only while the count is non-zero. Used to upgrade weak handles.
  pub(crate) fn try_increment(&self) -> bool {
    let mut current = self.count.load(Ordering::Relaxed);
    loop {
      if current == 0 {
        return false;
      }
      if current > MAX_REF_COUNT {
        process::abort();
      }
      match self
        .count
        .compare_exchange_weak(current, current + 1, Ordering::Acquire, Ordering::Relaxed)
      {
        Ok(_) => return true,
        Err(actual) => current = actual,
      }
    }
  }

  /// Returns `true` for the single call that performs the 1 -> 0 transition.
  pub(crate) fn decrement(&self) -> bool {
    if self.count.fetch_sub(1, Ordering::Release) != 1 {
      return false;
    }
    fence(Ordering::Acquire);
    true
  }

  /// Claims sole ownership: succeeds only when the count is exactly 1 and leaves it at 0.
  pub(crate) fn try_claim_unique(&self) -> bool {
    self
      .count
      .compare_exchange(1, 0, Ordering::Acquire, Ordering::Relaxed)
      .is_ok()
  }
}

/// Shared state of a primitive whose owning handles are counted.
pub(crate) trait Releasable {
  fn ref_count(&self) -> &RefCount;

  /// Runs exactly once, on the thread that drops the last owning handle.
  fn on_release(&self);
}

/// Owning handle over shared state `S`.
///
/// The allocation itself is kept alive by `Arc`, so weak handles can keep observing
/// the state after the last owner is gone; the owner count decides when the
/// primitive is closed.
pub(crate) struct Owner<S: Releasable> {
  state: Arc<S>,
  owned: bool,
}

impl<S: Releasable> Owner<S> {
  pub(crate) fn new(state: S) -> Self {
    Self {
      state: Arc::new(state),
      owned: true,
    }
  }

  pub(crate) fn upgrade(state: &Arc<S>) -> Option<Self> {
    state.ref_count().try_increment().then(|| Self {
      state: Arc::clone(state),
      owned: true,
    })
  }

  pub(crate) fn state(&self) -> &Arc<S> {
    &self.state
  }

  pub(crate) fn ref_count(&self) -> usize {
    self.state.ref_count().get()
  }

  pub(crate) fn release(mut self) -> bool {
    self.relinquish()
  }

  fn relinquish(&mut self) -> bool {
    if !self.owned {
      return false;
    }
    self.owned = false;
    if self.state.ref_count().decrement() {
      self.state.on_release();
      true
    } else {
      false
    }
  }
}

impl<S: Releasable> Clone for Owner<S> {
  fn clone(&self) -> Self {
    self.state.ref_count().increment();
    Self {
      state: Arc::clone(&self.state),
      owned: true,
    }
  }
}

impl<S: Releasable> Drop for Owner<S> {
  fn drop(&mut self) {
    self.relinquish();
  }
}

#[cfg(test)]
mod tests;
