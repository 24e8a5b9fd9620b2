//! Reference-counted concurrency primitives for tokio applications.
//!
//! Every primitive is a cheap handle over shared state. Cloning a handle adds an owner,
//! dropping or [releasing](SharedArc::release) one removes it, and the last owner tears the
//! shared state down.

pub mod concurrent;
pub mod config;
pub mod config_option;
pub mod error;
pub mod sync;

pub use concurrent::{ArcMutex, Barrier, CondVar, OnceCell, RwArcMutex, WeakBarrier, WeakCondVar, WeakRwArcMutex};
pub use config::RetryConfig;
pub use config_option::RetryConfigOption;
pub use error::InitError;
pub use sync::{Shared, SharedArc};

pub mod prelude {
  pub use super::{
    ArcMutex, Barrier, CondVar, InitError, OnceCell, RetryConfig, RetryConfigOption, RwArcMutex, Shared, SharedArc,
    WeakBarrier, WeakCondVar, WeakRwArcMutex,
  };
  pub use tokio_util::sync::CancellationToken;
}
