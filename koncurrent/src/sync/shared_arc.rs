use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::NonNull;

use super::ref_count::RefCount;
use super::Shared;

/// Atomically reference-counted handle to shared immutable data.
///
/// Every handle counts towards [`SharedArc::ref_count`]. The payload is dropped exactly
/// once, by whichever handle performs the transition from one to zero, either through
/// [`SharedArc::release`] or by going out of scope.
///
/// ```
/// use koncurrent_rs::SharedArc;
///
/// let shared = SharedArc::new(String::from("hello"));
/// let clone = shared.clone();
/// assert_eq!(shared.ref_count(), 2);
/// assert!(SharedArc::ptr_eq(&shared, &clone));
///
/// assert!(!clone.release());
/// assert!(shared.release());
/// ```
pub struct SharedArc<T> {
  ptr: NonNull<ArcInner<T>>,
  _marker: PhantomData<ArcInner<T>>,
}

struct ArcInner<T> {
  ref_count: RefCount,
  data: T,
}

// SAFETY: handles on any thread share `&T` and the last one drops `T`, the same requirements as `std::sync::Arc`.
unsafe impl<T: Send + Sync> Send for SharedArc<T> {}
// SAFETY: see `Send`; `&SharedArc<T>` only hands out `&T` and atomic count updates.
unsafe impl<T: Send + Sync> Sync for SharedArc<T> {}

impl<T> SharedArc<T> {
  /// Creates a handle with a reference count of one.
  pub fn new(value: T) -> Self {
    let inner = Box::new(ArcInner {
      ref_count: RefCount::new(),
      data: value,
    });
    Self::from_inner(NonNull::from(Box::leak(inner)))
  }

  fn from_inner(ptr: NonNull<ArcInner<T>>) -> Self {
    Self {
      ptr,
      _marker: PhantomData,
    }
  }

  fn inner(&self) -> &ArcInner<T> {
    // SAFETY: this handle holds one count, so the allocation is not freed while `self` is borrowed.
    unsafe { self.ptr.as_ref() }
  }

  /// Borrows the shared data. Lock-free.
  pub fn get(&self) -> &T {
    &self.inner().data
  }

  /// Creates `n` additional handles with a single atomic add.
  ///
  /// Returns an empty vector when `n` is zero.
  pub fn clone_many(&self, n: usize) -> Vec<Self> {
    if n == 0 {
      return Vec::new();
    }
    self.inner().ref_count.increment_by(n);
    (0..n).map(|_| Self::from_inner(self.ptr)).collect()
  }

  pub fn ref_count(&self) -> usize {
    self.inner().ref_count.get()
  }

  /// `true` when both handles alias the same allocation. Identity, not value equality.
  pub fn ptr_eq(this: &Self, other: &Self) -> bool {
    this.ptr == other.ptr
  }

  /// Gives up this handle. Returns `true` if this call released the shared data.
  pub fn release(self) -> bool {
    let this = ManuallyDrop::new(self);
    // SAFETY: `this` is never dropped or used again, so its count is given up exactly once here.
    unsafe { Self::release_inner(this.ptr) }
  }

  /// # Safety
  ///
  /// `ptr` must come from a live handle that is not used again afterwards.
  unsafe fn release_inner(ptr: NonNull<ArcInner<T>>) -> bool {
    // SAFETY: the caller's count keeps the allocation alive until the decrement below.
    let inner = unsafe { ptr.as_ref() };
    if !inner.ref_count.decrement() {
      return false;
    }
    // SAFETY: the 1 -> 0 transition happens exactly once, so no other handle can reach `ptr`.
    // The allocation came from `Box::leak` in `new`.
    drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    tracing::trace!("SharedArc released its payload");
    true
  }
}

impl<T> Shared<T> for SharedArc<T> {
  fn ref_count(&self) -> usize {
    SharedArc::ref_count(self)
  }

  fn try_unwrap(self) -> Result<T, Self> {
    if !self.inner().ref_count.try_claim_unique() {
      return Err(self);
    }
    let this = ManuallyDrop::new(self);
    // SAFETY: the count went from 1 to 0 for this handle only, and `this` is never dropped,
    // so the allocation from `Box::leak` is reclaimed exactly once.
    let inner = unsafe { Box::from_raw(this.ptr.as_ptr()) };
    let ArcInner { data, .. } = *inner;
    Ok(data)
  }
}

impl<T> Clone for SharedArc<T> {
  fn clone(&self) -> Self {
    self.inner().ref_count.increment();
    Self::from_inner(self.ptr)
  }
}

impl<T> Drop for SharedArc<T> {
  fn drop(&mut self) {
    // SAFETY: `self` is going away and still holds its count.
    unsafe {
      Self::release_inner(self.ptr);
    }
  }
}

impl<T> Deref for SharedArc<T> {
  type Target = T;

  fn deref(&self) -> &Self::Target {
    self.get()
  }
}

impl<T> From<T> for SharedArc<T> {
  fn from(value: T) -> Self {
    Self::new(value)
  }
}

impl<T: Default> Default for SharedArc<T> {
  fn default() -> Self {
    Self::new(T::default())
  }
}

impl<T> PartialEq for SharedArc<T> {
  fn eq(&self, other: &Self) -> bool {
    Self::ptr_eq(self, other)
  }
}

impl<T> Eq for SharedArc<T> {}

impl<T> Debug for SharedArc<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("SharedArc").field("ref_count", &self.ref_count()).finish()
  }
}
