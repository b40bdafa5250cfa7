use crate::error::RequestError;

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The caller-supplied signal that ends a run early.
///
/// Fires either when its token is cancelled or when its deadline passes,
/// whichever happens first. Observing it never interrupts work that has
/// already been launched; it only short-circuits the dispatcher's own waits.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
  token: CancellationToken,
  deadline: Option<Instant>,
}

impl CancelSignal {
  /// A signal that fires only when cancelled explicitly.
  pub fn new() -> Self {
    Self::default()
  }

  /// A signal that also fires once `timeout` has elapsed from now.
  pub fn with_timeout(timeout: Duration) -> Self {
    Self::with_deadline(Instant::now() + timeout)
  }

  pub fn with_deadline(deadline: Instant) -> Self {
    Self {
      token: CancellationToken::new(),
      deadline: Some(deadline),
    }
  }

  /// Wraps an existing token, e.g. one shared with other parts of an application.
  pub fn from_token(token: CancellationToken) -> Self {
    Self { token, deadline: None }
  }

  /// A signal that fires when this one does, and can also be cancelled on its own.
  pub fn child(&self) -> Self {
    Self {
      token: self.token.child_token(),
      deadline: self.deadline,
    }
  }

  pub fn cancel(&self) {
    tracing::debug!("CancelSignal: Cancellation requested.");
    self.token.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.check().is_some()
  }

  pub fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  /// Non-blocking poll. Returns the error describing why the signal fired,
  /// or `None` if it has not.
  pub fn check(&self) -> Option<RequestError> {
    if self.token.is_cancelled() {
      return Some(RequestError::Cancelled);
    }
    match self.deadline {
      Some(deadline) if Instant::now() >= deadline => Some(RequestError::DeadlineExceeded),
      _ => None,
    }
  }

  /// Resolves once the signal fires.
  pub async fn fired(&self) -> RequestError {
    match self.deadline {
      Some(deadline) => {
        tokio::select! {
          biased;
          _ = self.token.cancelled() => RequestError::Cancelled,
          _ = tokio::time::sleep_until(deadline) => RequestError::DeadlineExceeded,
        }
      }
      None => {
        self.token.cancelled().await;
        RequestError::Cancelled
      }
    }
  }
}
