use crate::error::{RequestError, Result};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Describes one outgoing API call.
pub trait ApiRequest: Send + Sync + 'static {
  /// Checked before any network activity. An error here fails the item
  /// without sending anything.
  fn validate(&self) -> Result<()> {
    Ok(())
  }

  /// Base URL of the service, e.g. `https://api.example.com`.
  fn url(&self) -> String;

  /// Path appended to `url()`.
  fn uri(&self) -> String;

  fn method(&self) -> String {
    "GET".to_string()
  }

  fn headers(&self) -> HashMap<String, String> {
    HashMap::new()
  }

  fn body(&self) -> Option<Vec<u8>> {
    None
  }

  fn timeout(&self) -> Duration {
    Duration::from_secs(60)
  }
}

/// The decoded result of an `ApiRequest`.
pub trait ApiResponse: Send + 'static {
  /// Replaces `self` with the contents of `body`.
  fn decode(&mut self, body: &[u8]) -> Result<()>;

  fn is_ok(&self) -> bool;

  fn code(&self) -> i64;

  fn message(&self) -> String;
}

impl<R: ApiRequest + ?Sized> ApiRequest for Box<R> {
  fn validate(&self) -> Result<()> {
    (**self).validate()
  }

  fn url(&self) -> String {
    (**self).url()
  }

  fn uri(&self) -> String {
    (**self).uri()
  }

  fn method(&self) -> String {
    (**self).method()
  }

  fn headers(&self) -> HashMap<String, String> {
    (**self).headers()
  }

  fn body(&self) -> Option<Vec<u8>> {
    (**self).body()
  }

  fn timeout(&self) -> Duration {
    (**self).timeout()
  }
}

impl<P: ApiResponse + ?Sized> ApiResponse for Box<P> {
  fn decode(&mut self, body: &[u8]) -> Result<()> {
    (**self).decode(body)
  }

  fn is_ok(&self) -> bool {
    (**self).is_ok()
  }

  fn code(&self) -> i64 {
    (**self).code()
  }

  fn message(&self) -> String {
    (**self).message()
  }
}

/// The common `{ "code", "message", "data" }` JSON envelope.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Envelope {
  #[serde(default)]
  pub code: i64,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub data: serde_json::Value,
}

impl Envelope {
  /// Deserializes the `data` payload into `T`.
  pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
    serde_json::from_value(self.data.clone()).map_err(|e| RequestError::Decode {
      reason: e.to_string(),
      body: self.data.to_string(),
    })
  }
}

impl ApiResponse for Envelope {
  fn decode(&mut self, body: &[u8]) -> Result<()> {
    *self = decode_json(body)?;
    Ok(())
  }

  fn is_ok(&self) -> bool {
    self.code == 200 || self.code == 0
  }

  fn code(&self) -> i64 {
    self.code
  }

  fn message(&self) -> String {
    self.message.clone()
  }
}

/// Parses a JSON body, keeping the raw text in the error for diagnosis.
pub fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
  serde_json::from_slice(body).map_err(|e| RequestError::Decode {
    reason: format!("decode response error: {}", e),
    body: String::from_utf8_lossy(body).into_owned(),
  })
}

#[derive(Debug)]
struct SinkSlot<P> {
  response: P,
  filled: bool,
}

/// Shared slot a unit of work decodes its response into.
///
/// The caller keeps a clone and reads it after the run; the dispatcher moves
/// the other clone into the spawned task.
pub struct ResponseSink<P> {
  slot: Arc<Mutex<SinkSlot<P>>>,
}

impl<P> Clone for ResponseSink<P> {
  fn clone(&self) -> Self {
    Self {
      slot: self.slot.clone(),
    }
  }
}

impl<P: fmt::Debug> fmt::Debug for ResponseSink<P> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let slot = self.slot.lock();
    f.debug_struct("ResponseSink")
      .field("response", &slot.response)
      .field("filled", &slot.filled)
      .finish()
  }
}

impl<P: Default> Default for ResponseSink<P> {
  fn default() -> Self {
    Self::new(P::default())
  }
}

impl<P> ResponseSink<P> {
  pub fn new(response: P) -> Self {
    Self {
      slot: Arc::new(Mutex::new(SinkSlot {
        response,
        filled: false,
      })),
    }
  }

  /// `true` once a response body has been decoded into this sink.
  pub fn is_filled(&self) -> bool {
    self.slot.lock().filled
  }

  pub fn read<T>(&self, f: impl FnOnce(&P) -> T) -> T {
    f(&self.slot.lock().response)
  }

  pub fn snapshot(&self) -> P
  where
    P: Clone,
  {
    self.slot.lock().response.clone()
  }
}

impl<P: ApiResponse> ResponseSink<P> {
  /// Decodes `body` into the sink, then checks the decoded status.
  pub(crate) fn fill(&self, body: &[u8]) -> Result<()> {
    let mut slot = self.slot.lock();
    slot.response.decode(body)?;
    slot.filled = true;
    if slot.response.is_ok() {
      Ok(())
    } else {
      Err(RequestError::Unsuccessful {
        code: slot.response.code(),
        message: slot.response.message(),
      })
    }
  }
}
