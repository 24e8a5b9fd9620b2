use thiserror::Error;

/// Failure of a retrying [`OnceCell`](crate::OnceCell) initialisation.
///
/// The cell stays empty in both cases, so a later call may try again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError<E> {
  #[error("no initialization attempt allowed (max_attempts = 0)")]
  NoAttempts,
  #[error("initialization failed after {attempts} attempts: {source}")]
  Exhausted {
    attempts: usize,
    #[source]
    source: E,
  },
}

impl<E> InitError<E> {
  /// The error returned by the final attempt, if any attempt was made.
  pub fn last_error(&self) -> Option<&E> {
    match self {
      InitError::NoAttempts => None,
      InitError::Exhausted { source, .. } => Some(source),
    }
  }

  pub fn into_last_error(self) -> Option<E> {
    match self {
      InitError::NoAttempts => None,
      InitError::Exhausted { source, .. } => Some(source),
    }
  }

  /// Number of times the initializer ran.
  pub fn attempts(&self) -> usize {
    match self {
      InitError::NoAttempts => 0,
      InitError::Exhausted { attempts, .. } => *attempts,
    }
  }
}
