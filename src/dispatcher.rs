use crate::cancel::CancelSignal;
use crate::config::{DispatcherConfig, HttpTransportConfig};
use crate::error::{RequestError, Result};
use crate::exchange::{ApiRequest, ApiResponse, ResponseSink};
use crate::gate::WorkerGate;
use crate::transport::{perform, HttpTransport, Transport};

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, info_span, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_RUN_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Fans a batch of requests out over a bounded number of concurrent tasks.
///
/// Each `run` gets its own `WorkerGate`, so a dispatcher can be reused (and
/// shared) without runs observing each other's state.
pub struct Dispatcher<T: Transport> {
  config: DispatcherConfig,
  name: Arc<String>,
  transport: Arc<T>,
}

impl<T: Transport> Clone for Dispatcher<T> {
  fn clone(&self) -> Self {
    Self {
      config: self.config.clone(),
      name: self.name.clone(),
      transport: self.transport.clone(),
    }
  }
}

impl<T: Transport> fmt::Debug for Dispatcher<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Dispatcher")
      .field("config", &self.config)
      .finish_non_exhaustive()
  }
}

impl Dispatcher<HttpTransport> {
  /// A dispatcher that sends requests over HTTP with reqwest.
  pub fn http(config: DispatcherConfig, http_config: &HttpTransportConfig) -> Result<Self> {
    Ok(Self::new(config, Arc::new(HttpTransport::new(http_config)?)))
  }
}

impl<T: Transport> Dispatcher<T> {
  pub fn new(config: DispatcherConfig, transport: Arc<T>) -> Self {
    Self {
      name: Arc::new(config.name.clone()),
      config,
      transport,
    }
  }

  pub fn config(&self) -> &DispatcherConfig {
    &self.config
  }

  pub fn worker_limit(&self) -> usize {
    self.config.effective_worker_limit()
  }

  /// Sends `requests[i]`, decoding its answer into `responses[i]`, with at most
  /// `worker_limit()` requests in flight.
  ///
  /// Items are admitted strictly in order; they complete in whatever order the
  /// network allows. The first failure (or the cancellation of `cancel`) stops
  /// further admissions and becomes the returned error, with later failures
  /// folded into it.
  ///
  /// Cancellation only stops the dispatcher from waiting. Requests already
  /// launched keep running after this returns and still fill their sinks.
  pub async fn run<Q, P>(
    &self,
    cancel: &CancelSignal,
    requests: Vec<Q>,
    responses: Vec<ResponseSink<P>>,
  ) -> Result<()>
  where
    Q: ApiRequest,
    P: ApiResponse,
  {
    if requests.len() != responses.len() {
      return Err(RequestError::MismatchedItems {
        requests: requests.len(),
        responses: responses.len(),
      });
    }

    let run_id = NEXT_RUN_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    self
      .run_items(cancel, requests, responses)
      .instrument(info_span!("dispatch_run", name = %*self.name, run_id))
      .await
  }

  async fn run_items<Q, P>(
    &self,
    cancel: &CancelSignal,
    requests: Vec<Q>,
    responses: Vec<ResponseSink<P>>,
  ) -> Result<()>
  where
    Q: ApiRequest,
    P: ApiResponse,
  {
    let gate = Arc::new(WorkerGate::new(self.worker_limit(), self.name.clone()));
    let total = requests.len();
    info!(items = total, limit = gate.limit(), "Dispatching requests.");

    for (index, (request, sink)) in requests.into_iter().zip(responses).enumerate() {
      if let Err(err) = gate.acquire(cancel).await {
        warn!(index, error = %err, "Dispatch stopped before admitting item.");
        return Err(RequestError::at_dispatch(index, err));
      }
      debug!(index, active = gate.active(), "Item admitted. Spawning request task.");

      let task_gate = gate.clone();
      let transport = self.transport.clone();
      tokio::spawn(
        async move {
          let outcome = AssertUnwindSafe(perform(&*transport, &request, &sink))
            .catch_unwind()
            .await;
          let failure = match outcome {
            Ok(Ok(())) => {
              debug!("Request completed.");
              None
            }
            Ok(Err(err)) => {
              debug!(error = %err, "Request failed.");
              Some(RequestError::for_item(index, err))
            }
            Err(_panic_payload) => {
              error!("Request task panicked.");
              Some(RequestError::for_item(index, RequestError::Panicked))
            }
          };
          task_gate.release(failure);
        }
        .instrument(info_span!("request_task", index)),
      );
    }

    let result = gate.drain(cancel).await;
    match &result {
      Ok(()) => info!(items = total, "All requests completed."),
      Err(err) => warn!(error = %err, in_flight = gate.active(), "Run finished with an error."),
    }
    result
  }
}

/// Sends every request over HTTP with the default transport settings.
pub async fn request<Q, P>(
  cancel: &CancelSignal,
  requests: Vec<Q>,
  responses: Vec<ResponseSink<P>>,
  config: DispatcherConfig,
) -> Result<()>
where
  Q: ApiRequest,
  P: ApiResponse,
{
  Dispatcher::http(config, &HttpTransportConfig::default())?
    .run(cancel, requests, responses)
    .await
}
