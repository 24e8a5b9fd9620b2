use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::sync::ref_count::{Owner, RefCount, Releasable};

/// Reusable rendezvous point for a fixed number of participants.
///
/// Each cycle completes when `capacity` calls to [`Barrier::wait`] have arrived; the
/// last arrival advances the generation and wakes the others. A waiter compares the
/// generation it captured on entry with the current one, so a wake-up that belongs to a
/// later cycle is never mistaken for its own.
///
/// Releasing the last owning handle breaks the barrier: every parked and future `wait`
/// returns `false` until [`Barrier::reset`].
///
/// ```
/// use koncurrent_rs::Barrier;
///
/// # #[tokio::main]
/// # async fn main() {
/// let barrier = Barrier::new(2);
/// let other = barrier.clone();
/// let (a, b) = tokio::join!(barrier.wait(), other.wait());
/// assert!(a && b);
/// assert_eq!(barrier.generation(), 1);
/// # }
/// ```
pub struct Barrier {
  owner: Owner<BarrierShared>,
}

/// Non-owning handle to a [`Barrier`], typically held by participants.
#[derive(Clone)]
pub struct WeakBarrier {
  shared: Arc<BarrierShared>,
}

#[derive(Debug)]
struct BarrierState {
  capacity: usize,
  waiting: usize,
  generation: u64,
  broken: bool,
  /// Bumped on every break, so waiters from before a break still see it after a `reset`.
  breaks: u64,
}

struct BarrierShared {
  state: Mutex<BarrierState>,
  notify: Notify,
  ref_count: RefCount,
}

/// Withdraws an arrival whose `wait` future is dropped before its cycle completes.
struct Arrival<'a> {
  shared: &'a BarrierShared,
  generation: u64,
  breaks: u64,
  settled: bool,
}

impl Drop for Arrival<'_> {
  fn drop(&mut self) {
    if self.settled {
      return;
    }
    let mut state = self.shared.lock_state();
    let current = !state.broken && state.breaks == self.breaks && state.generation == self.generation;
    if current && state.waiting > 0 {
      state.waiting -= 1;
      tracing::trace!(generation = self.generation, "Barrier arrival withdrawn");
    }
  }
}

impl Releasable for BarrierShared {
  fn ref_count(&self) -> &RefCount {
    &self.ref_count
  }

  fn on_release(&self) {
    let mut state = self.lock_state();
    let waiting = state.waiting;
    state.broken = true;
    state.breaks = state.breaks.wrapping_add(1);
    // Parked participants give up on this cycle, so none of them counts as waiting any more.
    state.waiting = 0;
    self.notify.notify_waiters();
    tracing::debug!(
      waiting,
      generation = state.generation,
      "Barrier broken: last owning handle released"
    );
  }
}

impl BarrierShared {
  fn lock_state(&self) -> MutexGuard<'_, BarrierState> {
    // No code path panics while holding the lock, but a poisoned state is still consistent.
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  async fn wait(&self) -> bool {
    let notified = self.notify.notified();
    tokio::pin!(notified);

    let (generation, breaks) = {
      let mut state = self.lock_state();
      if state.broken {
        return false;
      }
      let generation = state.generation;
      let breaks = state.breaks;
      state.waiting += 1;
      if state.waiting == state.capacity {
        state.waiting = 0;
        state.generation = state.generation.wrapping_add(1);
        self.notify.notify_waiters();
        tracing::debug!(generation, capacity = state.capacity, "Barrier cycle completed");
        return true;
      }
      // Registered while the state lock is held, so the completing arrival cannot slip past.
      notified.as_mut().enable();
      (generation, breaks)
    };

    let mut arrival = Arrival {
      shared: self,
      generation,
      breaks,
      settled: false,
    };
    loop {
      notified.as_mut().await;
      let state = self.lock_state();
      if state.broken || state.breaks != breaks {
        arrival.settled = true;
        return false;
      }
      if state.generation != generation {
        arrival.settled = true;
        return true;
      }
      notified.set(self.notify.notified());
      notified.as_mut().enable();
    }
  }

  fn is_broken(&self) -> bool {
    self.lock_state().broken
  }

  fn waiting(&self) -> usize {
    self.lock_state().waiting
  }
}

impl Barrier {
  /// Creates a barrier for `capacity` participants.
  ///
  /// # Panics
  ///
  /// Panics if `capacity` is zero.
  pub fn new(capacity: usize) -> Self {
    assert!(capacity > 0, "Barrier must have positive capacity");
    Self {
      owner: Owner::new(BarrierShared {
        state: Mutex::new(BarrierState {
          capacity,
          waiting: 0,
          generation: 0,
          broken: false,
          breaks: 0,
        }),
        notify: Notify::new(),
        ref_count: RefCount::new(),
      }),
    }
  }

  /// Waits until `capacity` participants have arrived in the current cycle.
  ///
  /// Returns `true` when the cycle completed and `false` if the barrier is or becomes
  /// broken. The arrival that completes a cycle returns immediately.
  pub async fn wait(&self) -> bool {
    self.owner.state().wait().await
  }

  /// Rearms the barrier for `capacity` participants and clears the broken flag.
  ///
  /// # Panics
  ///
  /// Panics if `capacity` is zero or if any participant is currently waiting.
  pub fn reset(&self, capacity: usize) {
    assert!(capacity > 0, "Barrier must have positive capacity");
    let mut state = self.owner.state().lock_state();
    let waiting = state.waiting;
    if waiting != 0 {
      drop(state);
      panic!("Barrier cannot be reset while {} participants are waiting", waiting);
    }
    state.capacity = capacity;
    state.broken = false;
  }

  pub fn capacity(&self) -> usize {
    self.owner.state().lock_state().capacity
  }

  /// Number of participants parked in the current cycle.
  pub fn waiting(&self) -> usize {
    self.owner.state().waiting()
  }

  pub fn generation(&self) -> u64 {
    self.owner.state().lock_state().generation
  }

  pub fn is_broken(&self) -> bool {
    self.owner.state().is_broken()
  }

  pub fn ref_count(&self) -> usize {
    self.owner.ref_count()
  }

  pub fn downgrade(&self) -> WeakBarrier {
    WeakBarrier {
      shared: Arc::clone(self.owner.state()),
    }
  }

  /// Gives up this handle. The call that releases the last handle breaks the barrier and returns `true`.
  pub fn release(self) -> bool {
    self.owner.release()
  }
}

impl WeakBarrier {
  /// Same contract as [`Barrier::wait`]; returns `false` once the barrier was released.
  pub async fn wait(&self) -> bool {
    self.shared.wait().await
  }

  pub fn waiting(&self) -> usize {
    self.shared.waiting()
  }

  pub fn is_broken(&self) -> bool {
    self.shared.is_broken()
  }

  pub fn upgrade(&self) -> Option<Barrier> {
    Owner::upgrade(&self.shared).map(|owner| Barrier { owner })
  }
}

impl Clone for Barrier {
  fn clone(&self) -> Self {
    Self {
      owner: self.owner.clone(),
    }
  }
}

impl Debug for Barrier {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    let state = self.owner.state().lock_state();
    f.debug_struct("Barrier")
      .field("capacity", &state.capacity)
      .field("waiting", &state.waiting)
      .field("ref_count", &self.ref_count())
      .field("broken", &state.broken)
      .finish()
  }
}

impl Debug for WeakBarrier {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    let state = self.shared.lock_state();
    f.debug_struct("WeakBarrier")
      .field("capacity", &state.capacity)
      .field("waiting", &state.waiting)
      .field("ref_count", &self.shared.ref_count.get())
      .field("broken", &state.broken)
      .finish()
  }
}

#[cfg(test)]
mod tests;
