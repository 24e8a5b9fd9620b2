use std::fmt::{self, Debug, Formatter};
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::sync::ref_count::{Owner, RefCount, Releasable};

/// Reference-counted condition variable.
///
/// Callers never hold a lock of their own: `wait` registers with the underlying
/// [`Notify`] and suspends until [`CondVar::signal`] or [`CondVar::broadcast`].
/// Dropping the last owning handle broadcasts, so tasks parked through a
/// [`WeakCondVar`] are never left waiting on an abandoned condition.
///
/// As with any condition variable, a wake-up carries no information about the
/// condition itself; callers re-check their predicate.
pub struct CondVar {
  owner: Owner<CondVarState>,
}

/// Non-owning handle to a [`CondVar`]. Does not count towards `ref_count`.
#[derive(Clone)]
pub struct WeakCondVar {
  state: Arc<CondVarState>,
}

struct CondVarState {
  notify: Notify,
  queue: Mutex<WaitQueue>,
  waiters: AtomicUsize,
  closed: AtomicBool,
  ref_count: RefCount,
}

#[derive(Debug, Default)]
struct WaitQueue {
  /// Waiters enabled on `notify` that no `signal` has been handed to yet.
  unsignalled: usize,
  broadcasts: u64,
}

/// One parked waiter. Settles the queue bookkeeping however the wait ends,
/// including when the future is dropped mid-wait.
struct ParkedWaiter<'a> {
  state: &'a CondVarState,
  notified: Option<Pin<Box<Notified<'a>>>>,
  broadcasts: u64,
  woken: bool,
}

impl ParkedWaiter<'_> {
  async fn notified(&mut self) {
    if let Some(notified) = self.notified.as_mut() {
      notified.await;
    }
  }
}

impl Drop for ParkedWaiter<'_> {
  fn drop(&mut self) {
    self.state.waiters.fetch_sub(1, Ordering::SeqCst);
    if self.woken {
      return;
    }
    let mut queue = self.state.lock_queue();
    // Dropped under the queue lock, so no `signal` can pick this waiter in between.
    let absorbed = self
      .notified
      .take()
      .and_then(|mut notified| notified.as_mut().now_or_never())
      .is_some();
    if !absorbed {
      queue.unsignalled = queue.unsignalled.saturating_sub(1);
    } else if queue.broadcasts == self.broadcasts {
      tracing::trace!("CondVar signal absorbed by an abandoned waiter, handing it on");
      self.state.hand_on(&mut queue);
    }
  }
}

impl Releasable for CondVarState {
  fn ref_count(&self) -> &RefCount {
    &self.ref_count
  }

  fn on_release(&self) {
    self.closed.store(true, Ordering::SeqCst);
    let waiters = self.waiters.load(Ordering::SeqCst);
    self.broadcast();
    tracing::debug!(waiters, "CondVar released: woke all parked waiters");
  }
}

impl CondVarState {
  fn new() -> Self {
    Self {
      notify: Notify::new(),
      queue: Mutex::new(WaitQueue::default()),
      waiters: AtomicUsize::new(0),
      closed: AtomicBool::new(false),
      ref_count: RefCount::new(),
    }
  }

  fn lock_queue(&self) -> MutexGuard<'_, WaitQueue> {
    self.queue.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn is_closed(&self) -> bool {
    self.closed.load(Ordering::SeqCst)
  }

  fn park(&self) -> Option<ParkedWaiter<'_>> {
    let mut queue = self.lock_queue();
    if self.is_closed() {
      return None;
    }
    let mut notified = Box::pin(self.notify.notified());
    notified.as_mut().enable();
    queue.unsignalled += 1;
    self.waiters.fetch_add(1, Ordering::SeqCst);
    Some(ParkedWaiter {
      state: self,
      notified: Some(notified),
      broadcasts: queue.broadcasts,
      woken: false,
    })
  }

  /// Parks until signalled or until `abort` completes.
  ///
  /// Returns `true` only for a signal or broadcast; an abort or a release of the
  /// condition yields `false`.
  async fn park_until<A>(&self, abort: A) -> bool
  where
    A: Future<Output = ()>, {
    let Some(mut parked) = self.park() else {
      return false;
    };
    let signalled = tokio::select! {
      biased;
      _ = parked.notified() => true,
      _ = abort => false,
    };
    if signalled {
      parked.woken = true;
      return !self.is_closed();
    }
    tracing::trace!("CondVar wait aborted before a signal arrived");
    false
  }

  /// Wakes one waiter that has not been handed a signal yet. With none, nothing is stored.
  fn hand_on(&self, queue: &mut WaitQueue) {
    if queue.unsignalled > 0 {
      queue.unsignalled -= 1;
      self.notify.notify_one();
    }
  }

  fn signal(&self) {
    let mut queue = self.lock_queue();
    self.hand_on(&mut queue);
  }

  fn broadcast(&self) {
    let mut queue = self.lock_queue();
    queue.broadcasts = queue.broadcasts.wrapping_add(1);
    queue.unsignalled = 0;
    self.notify.notify_waiters();
  }

  async fn wait(&self) {
    self.park_until(future::pending::<()>()).await;
  }

  async fn wait_with_timeout(&self, timeout: Duration) -> bool {
    self.park_until(tokio::time::sleep(timeout)).await
  }

  async fn wait_with_cancellation(&self, token: &CancellationToken) -> bool {
    if token.is_cancelled() {
      return false;
    }
    self.park_until(token.cancelled()).await
  }
}

impl CondVar {
  pub fn new() -> Self {
    Self {
      owner: Owner::new(CondVarState::new()),
    }
  }

  /// Suspends until signalled.
  pub async fn wait(&self) {
    self.owner.state().wait().await
  }

  /// Returns `true` if signalled before `timeout` elapsed, `false` on timeout.
  pub async fn wait_with_timeout(&self, timeout: Duration) -> bool {
    self.owner.state().wait_with_timeout(timeout).await
  }

  /// Returns `true` if signalled, `false` if `token` was cancelled first.
  ///
  /// Timeout and cancellation are indistinguishable from the return value; inspect
  /// the token when the cause matters.
  pub async fn wait_with_cancellation(&self, token: &CancellationToken) -> bool {
    self.owner.state().wait_with_cancellation(token).await
  }

  /// Wakes at most one parked waiter. No ordering guarantee about which.
  pub fn signal(&self) {
    self.owner.state().signal();
  }

  /// Wakes every parked waiter.
  pub fn broadcast(&self) {
    self.owner.state().broadcast();
  }

  /// Number of tasks currently parked. Diagnostic only.
  pub fn waiter_count(&self) -> usize {
    self.owner.state().waiters.load(Ordering::SeqCst)
  }

  pub fn ref_count(&self) -> usize {
    self.owner.ref_count()
  }

  pub fn downgrade(&self) -> WeakCondVar {
    WeakCondVar {
      state: Arc::clone(self.owner.state()),
    }
  }

  /// Gives up this handle. The call that releases the last handle broadcasts and returns `true`.
  pub fn release(self) -> bool {
    self.owner.release()
  }
}

impl WeakCondVar {
  /// Suspends until signalled. Returns immediately once the condition was released.
  pub async fn wait(&self) {
    self.state.wait().await
  }

  pub async fn wait_with_timeout(&self, timeout: Duration) -> bool {
    self.state.wait_with_timeout(timeout).await
  }

  pub async fn wait_with_cancellation(&self, token: &CancellationToken) -> bool {
    self.state.wait_with_cancellation(token).await
  }

  pub fn signal(&self) {
    self.state.signal();
  }

  pub fn broadcast(&self) {
    self.state.broadcast();
  }

  pub fn waiter_count(&self) -> usize {
    self.state.waiters.load(Ordering::SeqCst)
  }

  pub fn is_closed(&self) -> bool {
    self.state.is_closed()
  }

  pub fn upgrade(&self) -> Option<CondVar> {
    Owner::upgrade(&self.state).map(|owner| CondVar { owner })
  }
}

impl Default for CondVar {
  fn default() -> Self {
    Self::new()
  }
}

impl Clone for CondVar {
  fn clone(&self) -> Self {
    Self {
      owner: self.owner.clone(),
    }
  }
}

impl Debug for CondVar {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("CondVar")
      .field("ref_count", &self.ref_count())
      .field("waiters", &self.waiter_count())
      .finish()
  }
}

impl Debug for WeakCondVar {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("WeakCondVar")
      .field("ref_count", &self.state.ref_count.get())
      .field("waiters", &self.waiter_count())
      .field("closed", &self.is_closed())
      .finish()
  }
}
