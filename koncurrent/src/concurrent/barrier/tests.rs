#[cfg(test)]
mod test {
  use std::env;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  use rstest::*;
  use tokio::task::JoinHandle;
  use tracing_subscriber::EnvFilter;

  use crate::concurrent::{Barrier, WeakBarrier};
  use crate::sync::ref_count::Releasable;

  fn init_tracing() {
    env::set_var("RUST_LOG", "debug");
    let _ = tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env())
      .try_init();
  }

  async fn wait_for_parked(barrier: &WeakBarrier, expected: usize) {
    while barrier.waiting() < expected {
      tokio::task::yield_now().await;
    }
  }

  fn spawn_participant(barrier: &WeakBarrier, returned: &Arc<AtomicUsize>) -> JoinHandle<bool> {
    let barrier = barrier.clone();
    let returned = Arc::clone(returned);
    tokio::spawn(async move {
      let crossed = barrier.wait().await;
      returned.fetch_add(1, Ordering::SeqCst);
      crossed
    })
  }

  #[test]
  fn test_new_barrier() {
    let barrier = Barrier::new(3);
    assert_eq!(barrier.ref_count(), 1);
    assert_eq!(barrier.capacity(), 3);
    assert_eq!(barrier.waiting(), 0);
    assert_eq!(barrier.generation(), 0);
    assert!(!barrier.is_broken());
    assert_eq!(
      format!("{:?}", barrier),
      "Barrier { capacity: 3, waiting: 0, ref_count: 1, broken: false }"
    );
  }

  #[test]
  #[should_panic(expected = "positive capacity")]
  fn test_zero_capacity_panics() {
    let _ = Barrier::new(0);
  }

  #[test]
  fn test_clone_and_release() {
    let barrier = Barrier::new(2);
    let clone = barrier.clone();
    assert_eq!(barrier.ref_count(), 2);

    assert!(!clone.release());
    assert_eq!(barrier.ref_count(), 1);
    assert!(!barrier.is_broken());

    let weak = barrier.downgrade();
    assert!(barrier.release());
    assert!(weak.is_broken());
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_all_participants_cross_together() {
    init_tracing();
    let barrier = Barrier::new(3);
    let weak = barrier.downgrade();
    let returned = Arc::new(AtomicUsize::new(0));

    let first = spawn_participant(&weak, &returned);
    let second = spawn_participant(&weak, &returned);
    wait_for_parked(&weak, 2).await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(returned.load(Ordering::SeqCst), 0);
    assert_eq!(barrier.waiting(), 2);

    let third = spawn_participant(&weak, &returned);
    assert!(first.await.unwrap());
    assert!(second.await.unwrap());
    assert!(third.await.unwrap());
    assert_eq!(returned.load(Ordering::SeqCst), 3);
    assert_eq!(barrier.waiting(), 0);
    assert_eq!(barrier.generation(), 1);
  }

  #[tokio::test]
  async fn test_last_arrival_does_not_block() {
    let barrier = Barrier::new(1);
    assert!(barrier.wait().await);
    assert!(barrier.wait().await);
    assert_eq!(barrier.generation(), 2);
  }

  #[rstest]
  #[case(2, 5)]
  #[case(4, 10)]
  #[case(8, 3)]
  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_reusable_across_cycles(#[case] participants: usize, #[case] cycles: u64) {
    let barrier = Barrier::new(participants);
    let phase = Arc::new(AtomicUsize::new(0));

    let handles = (0..participants)
      .map(|_| {
        let barrier = barrier.clone();
        let phase = Arc::clone(&phase);
        tokio::spawn(async move {
          for cycle in 0..cycles as usize {
            phase.fetch_add(1, Ordering::SeqCst);
            assert!(barrier.wait().await);
            // Nobody can have started the next cycle before everyone finished this one.
            assert!(phase.load(Ordering::SeqCst) >= (cycle + 1) * participants);
            assert!(barrier.wait().await);
          }
        })
      })
      .collect::<Vec<_>>();

    for handle in handles {
      handle.await.unwrap();
    }
    assert_eq!(barrier.generation(), cycles * 2);
    assert_eq!(barrier.waiting(), 0);
  }

  #[tokio::test]
  async fn test_release_breaks_parked_participants() {
    init_tracing();
    let barrier = Barrier::new(3);
    let weak = barrier.downgrade();
    let returned = Arc::new(AtomicUsize::new(0));

    let first = spawn_participant(&weak, &returned);
    let second = spawn_participant(&weak, &returned);
    wait_for_parked(&weak, 2).await;

    assert!(barrier.release());
    assert_eq!(weak.waiting(), 0);
    assert!(!first.await.unwrap());
    assert!(!second.await.unwrap());
    assert!(weak.is_broken());
    assert_eq!(weak.waiting(), 0);

    // Broken for future callers too.
    assert!(!weak.wait().await);
    assert!(weak.upgrade().is_none());
  }

  #[tokio::test]
  async fn test_reset_after_break_rearms() {
    let barrier = Barrier::new(2);
    let keeper = barrier.clone();
    let weak = barrier.downgrade();

    let parked = tokio::spawn({
      let weak = weak.clone();
      async move { weak.wait().await }
    });
    wait_for_parked(&weak, 1).await;
    // Break the barrier the way a final release does, while handles are still around to reset it.
    keeper.owner.state().on_release();
    assert!(!parked.await.unwrap());
    assert_eq!(barrier.waiting(), 0);
    assert!(!barrier.wait().await);

    barrier.reset(2);
    assert!(!barrier.is_broken());
    let (a, b) = tokio::join!(barrier.wait(), keeper.wait());
    assert!(a && b);
  }

  #[tokio::test]
  async fn test_participant_from_before_a_break_stays_out_after_reset() {
    let barrier = Barrier::new(2);
    let weak = barrier.downgrade();
    let stale = tokio::spawn({
      let weak = weak.clone();
      async move { weak.wait().await }
    });
    wait_for_parked(&weak, 1).await;

    // Broken and rearmed before the parked participant gets to run again.
    barrier.owner.state().on_release();
    barrier.reset(2);
    assert_eq!(barrier.waiting(), 0);
    assert!(!stale.await.unwrap());
    assert_eq!(barrier.waiting(), 0);

    let other = barrier.clone();
    let (a, b) = tokio::join!(barrier.wait(), other.wait());
    assert!(a && b);
    assert_eq!(barrier.generation(), 1);
  }

  #[tokio::test]
  async fn test_reset_changes_capacity() {
    let barrier = Barrier::new(3);
    barrier.reset(2);
    assert_eq!(barrier.capacity(), 2);
    let other = barrier.clone();
    let (a, b) = tokio::join!(barrier.wait(), other.wait());
    assert!(a && b);
    assert_eq!(barrier.generation(), 1);
  }

  #[tokio::test]
  #[should_panic(expected = "cannot be reset")]
  async fn test_reset_while_waiting_panics() {
    let barrier = Barrier::new(2);
    let weak = barrier.downgrade();
    let _parked = tokio::spawn({
      let weak = weak.clone();
      async move { weak.wait().await }
    });
    wait_for_parked(&weak, 1).await;
    barrier.reset(3);
  }

  #[tokio::test]
  async fn test_cancelled_wait_withdraws_arrival() {
    let barrier = Barrier::new(2);
    let timed_out = tokio::time::timeout(Duration::from_millis(20), barrier.wait()).await;
    assert!(timed_out.is_err());
    assert_eq!(barrier.waiting(), 0);

    let other = barrier.clone();
    let (a, b) = tokio::join!(barrier.wait(), other.wait());
    assert!(a && b);
    assert_eq!(barrier.generation(), 1);
  }

  static_assertions::assert_impl_all!(Barrier: Send, Sync, Clone);
  static_assertions::assert_impl_all!(WeakBarrier: Send, Sync, Clone);
}
