use crate::cancel::CancelSignal;
use crate::error::{RequestError, Result};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

#[derive(Debug)]
struct GateState {
  limit: usize,
  active: usize,
  last_error: Option<RequestError>,
  cancellation_recorded: bool,
}

impl GateState {
  /// The first error recorded stays in front; later ones are folded in behind it.
  fn record(&mut self, err: RequestError) {
    self.last_error = Some(match self.last_error.take() {
      None => err,
      Some(first) => first.chain(&err),
    });
  }

  fn record_cancellation(&mut self, err: RequestError) {
    if !self.cancellation_recorded {
      self.cancellation_recorded = true;
      self.record(err);
    }
  }
}

/// Bounds how many units of work are admitted at once and collects their
/// failures into one governing error.
///
/// `active` and `last_error` are only touched under `state`; `signal` is woken
/// outside the lock after every release. Waiters register for the wakeup before
/// they inspect the state, so a release landing between the check and the
/// wait is never missed.
#[derive(Debug)]
pub(crate) struct WorkerGate {
  name: Arc<String>,
  state: Mutex<GateState>,
  signal: Notify,
}

impl WorkerGate {
  pub(crate) fn new(limit: usize, name: Arc<String>) -> Self {
    Self {
      name,
      state: Mutex::new(GateState {
        limit: limit.max(1),
        active: 0,
        last_error: None,
        cancellation_recorded: false,
      }),
      signal: Notify::new(),
    }
  }

  pub(crate) fn limit(&self) -> usize {
    self.state.lock().limit
  }

  pub(crate) fn active(&self) -> usize {
    self.state.lock().active
  }

  #[cfg(test)]
  pub(crate) fn last_error(&self) -> Option<RequestError> {
    self.state.lock().last_error.clone()
  }

  /// Waits for a free slot and takes it.
  ///
  /// Returns early, without admitting, once an error has been recorded or
  /// `cancel` fires. A cancellation observed here becomes a recorded error.
  pub(crate) async fn acquire(&self, cancel: &CancelSignal) -> Result<()> {
    loop {
      let notified = self.signal.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      {
        let mut state = self.state.lock();
        if let Some(err) = cancel.check() {
          state.record_cancellation(err);
        }
        if let Some(err) = &state.last_error {
          return Err(err.clone());
        }
        if state.active < state.limit {
          state.active += 1;
          trace!(gate = %*self.name, active = state.active, limit = state.limit, "Slot acquired.");
          return Ok(());
        }
        trace!(gate = %*self.name, active = state.active, "All slots taken. Waiting for a release.");
      }

      tokio::select! {
        _ = notified => {}
        err = cancel.fired() => {
          debug!(gate = %*self.name, "Cancellation observed while waiting for a slot.");
          self.state.lock().record_cancellation(err);
        }
      }
    }
  }

  /// Gives a slot back, recording `err` if the unit of work failed.
  ///
  /// Every release must match an earlier successful `acquire`.
  pub(crate) fn release(&self, err: Option<RequestError>) {
    {
      let mut state = self.state.lock();
      if let Some(err) = err {
        warn!(gate = %*self.name, error = %err, "Recording failure.");
        state.record(err);
      }
      debug_assert!(state.active > 0, "release called without a matching acquire");
      state.active = state.active.saturating_sub(1);
      trace!(gate = %*self.name, active = state.active, "Slot released.");
    }
    self.signal.notify_waiters();
  }

  /// Waits until nothing is admitted, an error has been recorded, or `cancel`
  /// fires. Returns the recorded error, if any.
  pub(crate) async fn drain(&self, cancel: &CancelSignal) -> Result<()> {
    loop {
      let notified = self.signal.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      {
        let mut state = self.state.lock();
        if let Some(err) = cancel.check() {
          state.record_cancellation(err);
        }
        if let Some(err) = &state.last_error {
          return Err(err.clone());
        }
        if state.active == 0 {
          return Ok(());
        }
        trace!(gate = %*self.name, active = state.active, "Draining. Waiting for in-flight work.");
      }

      tokio::select! {
        _ = notified => {}
        err = cancel.fired() => {
          debug!(gate = %*self.name, "Cancellation observed while draining.");
          self.state.lock().record_cancellation(err);
        }
      }
    }
  }
}
