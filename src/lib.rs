//! A Tokio-based fan-out for independent API requests: at most N in flight,
//! the first failure wins, and a caller-supplied signal cancels the wait.

mod cancel;
mod config;
mod dispatcher;
mod error;
mod exchange;
mod gate;
mod transport;

pub use cancel::CancelSignal;
pub use config::{DispatcherConfig, HttpTransportConfig, DEFAULT_WORKER_LIMIT};
pub use dispatcher::{request, Dispatcher};
pub use error::{RequestError, Result};
pub use exchange::{decode_json, ApiRequest, ApiResponse, Envelope, ResponseSink};
pub use transport::{build_api_url, perform, HttpTransport, Transport};
