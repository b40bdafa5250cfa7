use thiserror::Error;

/// Errors produced while dispatching a batch of requests.
///
/// The gate keeps exactly one of these as the governing error of a run and
/// hands clones of it to every waiter, hence `Clone`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
  #[error("invalid request parameter: {0}")]
  InvalidRequest(String),

  #[error("build request error: {0}")]
  BuildRequest(String),

  #[error("request error: {0}")]
  Transport(String),

  #[error("unmarshal response error: {reason}: {body}")]
  Decode { reason: String, body: String },

  #[error("invalid response: {code}, message: {message}")]
  Unsuccessful { code: i64, message: String },

  #[error("unit of work panicked")]
  Panicked,

  #[error("context canceled")]
  Cancelled,

  #[error("context deadline exceeded")]
  DeadlineExceeded,

  #[error("mismatched items: {requests} requests but {responses} response sinks")]
  MismatchedItems { requests: usize, responses: usize },

  #[error("item {index} failed: {source}")]
  Item {
    index: usize,
    #[source]
    source: Box<RequestError>,
  },

  #[error("request {index} error: {source}")]
  Dispatch {
    index: usize,
    #[source]
    source: Box<RequestError>,
  },

  /// An error recorded after `first`; only its message is kept.
  #[error("{later}: {first}")]
  Chained { later: String, first: Box<RequestError> },
}

impl RequestError {
  /// Tags an error with the index of the item that produced it.
  pub(crate) fn for_item(index: usize, source: RequestError) -> Self {
    RequestError::Item {
      index,
      source: Box::new(source),
    }
  }

  pub(crate) fn at_dispatch(index: usize, source: RequestError) -> Self {
    RequestError::Dispatch {
      index,
      source: Box::new(source),
    }
  }

  /// Folds `later` into `self`, keeping `self` as the original error.
  pub(crate) fn chain(self, later: &RequestError) -> Self {
    RequestError::Chained {
      later: later.to_string(),
      first: Box::new(self),
    }
  }

  /// Returns the first error recorded for a run, looking through chaining and
  /// the dispatch-time index wrap.
  pub fn governing(&self) -> &RequestError {
    match self {
      RequestError::Chained { first, .. } => first.governing(),
      RequestError::Dispatch { source, .. } => source.governing(),
      other => other,
    }
  }

  /// Index of the item whose failure governs this error, if one does.
  pub fn failed_item(&self) -> Option<usize> {
    match self.governing() {
      RequestError::Item { index, .. } => Some(*index),
      _ => None,
    }
  }

  /// `true` when the governing error is a cancellation or an expired deadline.
  pub fn is_cancellation(&self) -> bool {
    matches!(
      self.governing(),
      RequestError::Cancelled | RequestError::DeadlineExceeded
    )
  }
}

pub type Result<T> = std::result::Result<T, RequestError>;
