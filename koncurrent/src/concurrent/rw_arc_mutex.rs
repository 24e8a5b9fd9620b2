use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::sync::ref_count::{Owner, RefCount, Releasable};

/// Reference-counted data behind a `tokio::sync::RwLock`.
///
/// Many readers or one writer at a time; fairness is that of the tokio lock
/// (write-preferring FIFO).
///
/// Releasing the last owning handle closes the cell. Lock calls through a
/// [`WeakRwArcMutex`] then return `None` without waiting.
pub struct RwArcMutex<T> {
  owner: Owner<RwState<T>>,
}

/// Non-owning handle to a [`RwArcMutex`]. Does not count towards `ref_count`.
pub struct WeakRwArcMutex<T> {
  state: Arc<RwState<T>>,
}

struct RwState<T> {
  lock: RwLock<T>,
  ref_count: RefCount,
  closed: AtomicBool,
}

impl<T> Releasable for RwState<T> {
  fn ref_count(&self) -> &RefCount {
    &self.ref_count
  }

  fn on_release(&self) {
    self.closed.store(true, Ordering::Release);
    tracing::debug!("RwArcMutex closed: last owning handle released");
  }
}

impl<T> RwState<T> {
  fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  async fn read_if_open<F, R>(&self, f: F) -> Option<R>
  where
    F: FnOnce(&T) -> R, {
    if self.is_closed() {
      return None;
    }
    let guard = self.lock.read().await;
    if self.is_closed() {
      return None;
    }
    Some(f(&guard))
  }

  async fn write_if_open<F, R>(&self, f: F) -> Option<R>
  where
    F: FnOnce(&mut T) -> R, {
    if self.is_closed() {
      return None;
    }
    let mut guard = self.lock.write().await;
    if self.is_closed() {
      return None;
    }
    Some(f(&mut guard))
  }
}

impl<T> RwArcMutex<T> {
  /// Creates a handle with a reference count of one.
  pub fn new(value: T) -> Self {
    Self {
      owner: Owner::new(RwState {
        lock: RwLock::new(value),
        ref_count: RefCount::new(),
        closed: AtomicBool::new(false),
      }),
    }
  }

  /// Runs `f` under a shared read lock. Waits while a writer holds the lock.
  pub async fn with_read_lock<F, R>(&self, f: F) -> R
  where
    F: FnOnce(&T) -> R, {
    let guard = self.owner.state().lock.read().await;
    f(&guard)
  }

  /// Runs `f` under the exclusive write lock.
  pub async fn with_write_lock<F, R>(&self, f: F) -> R
  where
    F: FnOnce(&mut T) -> R, {
    let mut guard = self.owner.state().lock.write().await;
    f(&mut guard)
  }

  pub fn ref_count(&self) -> usize {
    self.owner.ref_count()
  }

  pub fn ptr_eq(this: &Self, other: &Self) -> bool {
    Arc::ptr_eq(this.owner.state(), other.owner.state())
  }

  pub fn downgrade(&self) -> WeakRwArcMutex<T> {
    WeakRwArcMutex {
      state: Arc::clone(self.owner.state()),
    }
  }

  /// Gives up this handle. The call that releases the last handle closes the cell and returns `true`.
  pub fn release(self) -> bool {
    self.owner.release()
  }
}

impl<T> WeakRwArcMutex<T> {
  /// Returns `None` once the cell is closed.
  pub async fn with_read_lock<F, R>(&self, f: F) -> Option<R>
  where
    F: FnOnce(&T) -> R, {
    self.state.read_if_open(f).await
  }

  pub async fn with_write_lock<F, R>(&self, f: F) -> Option<R>
  where
    F: FnOnce(&mut T) -> R, {
    self.state.write_if_open(f).await
  }

  pub fn is_closed(&self) -> bool {
    self.state.is_closed()
  }

  pub fn upgrade(&self) -> Option<RwArcMutex<T>> {
    Owner::upgrade(&self.state).map(|owner| RwArcMutex { owner })
  }
}

impl<T> Clone for RwArcMutex<T> {
  fn clone(&self) -> Self {
    Self {
      owner: self.owner.clone(),
    }
  }
}

impl<T> Clone for WeakRwArcMutex<T> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

impl<T: Default> Default for RwArcMutex<T> {
  fn default() -> Self {
    Self::new(T::default())
  }
}

impl<T> Debug for RwArcMutex<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    let state = self.owner.state();
    f.debug_struct("RwArcMutex")
      .field("ref_count", &state.ref_count.get())
      .field("closed", &state.is_closed())
      .finish()
  }
}

impl<T> Debug for WeakRwArcMutex<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("WeakRwArcMutex")
      .field("ref_count", &self.state.ref_count.get())
      .field("closed", &self.state.is_closed())
      .finish()
  }
}
