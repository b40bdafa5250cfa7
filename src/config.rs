use serde::Deserialize;

/// Worker limit used when none (or a non-positive one) is configured.
pub const DEFAULT_WORKER_LIMIT: usize = 4;

/// Options for a `Dispatcher`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
  /// Maximum number of requests in flight at once. Values `<= 0` fall back
  /// to `DEFAULT_WORKER_LIMIT`.
  pub worker_limit: isize,
  /// Used only to label log output.
  pub name: String,
}

impl Default for DispatcherConfig {
  fn default() -> Self {
    Self {
      worker_limit: DEFAULT_WORKER_LIMIT as isize,
      name: "request_orchestra".to_string(),
    }
  }
}

impl DispatcherConfig {
  /// Overrides the worker limit. Non-positive values are ignored.
  pub fn with_worker_limit(mut self, worker_limit: isize) -> Self {
    if worker_limit > 0 {
      self.worker_limit = worker_limit;
    }
    self
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn effective_worker_limit(&self) -> usize {
    if self.worker_limit > 0 {
      self.worker_limit as usize
    } else {
      DEFAULT_WORKER_LIMIT
    }
  }
}

/// Options for the reqwest-backed `HttpTransport`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
  /// Skip TLS certificate verification. Only meant for talking to internal
  /// services with self-signed certificates.
  pub accept_invalid_certs: bool,
  pub user_agent: Option<String>,
}
