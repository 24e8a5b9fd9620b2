#[cfg(test)]
mod test {
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;
  use std::thread;

  use crate::sync::ref_count::{Owner, RefCount, Releasable};

  struct Probe {
    ref_count: RefCount,
    releases: AtomicUsize,
  }

  impl Probe {
    fn new() -> Self {
      Self {
        ref_count: RefCount::new(),
        releases: AtomicUsize::new(0),
      }
    }
  }

  impl Releasable for Probe {
    fn ref_count(&self) -> &RefCount {
      &self.ref_count
    }

    fn on_release(&self) {
      self.releases.fetch_add(1, Ordering::SeqCst);
    }
  }

  #[test]
  fn test_decrement_reports_only_the_final_transition() {
    let count = RefCount::new();
    count.increment_by(2);
    assert_eq!(count.get(), 3);
    assert!(!count.decrement());
    assert!(!count.decrement());
    assert!(count.decrement());
    assert_eq!(count.get(), 0);
  }

  #[test]
  fn test_try_increment_fails_at_zero() {
    let count = RefCount::new();
    assert!(count.try_increment());
    assert!(!count.decrement());
    assert!(count.decrement());
    assert!(!count.try_increment());
    assert_eq!(count.get(), 0);
  }

  #[test]
  fn test_try_claim_unique() {
    let count = RefCount::new();
    count.increment();
    assert!(!count.try_claim_unique());
    assert!(!count.decrement());
    assert!(count.try_claim_unique());
  }

  #[test]
  fn test_owner_release_runs_hook_once() {
    let owner = Owner::new(Probe::new());
    let state = Arc::clone(owner.state());
    let clones = (0..8).map(|_| owner.clone()).collect::<Vec<_>>();
    assert_eq!(owner.ref_count(), 9);

    let handles = clones
      .into_iter()
      .map(|clone| thread::spawn(move || clone.release()))
      .collect::<Vec<_>>();
    let released_by_clones = handles
      .into_iter()
      .map(|handle| handle.join().unwrap())
      .filter(|released| *released)
      .count();

    assert_eq!(released_by_clones, 0);
    assert!(owner.release());
    assert_eq!(state.releases.load(Ordering::SeqCst), 1);
    assert!(Owner::upgrade(&state).is_none());
  }

  #[test]
  fn test_owner_drop_counts_as_release() {
    let owner = Owner::new(Probe::new());
    let state = Arc::clone(owner.state());
    {
      let _clone = owner.clone();
    }
    assert_eq!(state.ref_count.get(), 1);
    drop(owner);
    assert_eq!(state.releases.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_upgrade_while_alive() {
    let owner = Owner::new(Probe::new());
    let upgraded = Owner::upgrade(owner.state()).unwrap();
    assert_eq!(owner.ref_count(), 2);
    assert!(!upgraded.release());
    assert!(owner.release());
  }
}
