use std::ops::Deref;

/// Shared ownership abstraction implemented by the reference-counted handles of this crate.
pub trait Shared<T>: Clone + Deref<Target = T> {
  /// Number of live owning handles. Diagnostic only; the value may be stale as soon as it is read.
  fn ref_count(&self) -> usize;

  /// Attempt to unwrap the shared value. Succeeds only for the sole remaining handle.
  fn try_unwrap(self) -> Result<T, Self> {
    Err(self)
  }
}
