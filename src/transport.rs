use crate::config::HttpTransportConfig;
use crate::error::{RequestError, Result};
use crate::exchange::{ApiRequest, ApiResponse, ResponseSink};

use std::fmt;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use tracing::{debug, trace};

/// Performs the network part of a unit of work and hands back the raw body.
pub trait Transport: Send + Sync + 'static {
  fn execute<'a>(&'a self, request: &'a dyn ApiRequest) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Joins a base URL and a path with exactly one `/` between them.
pub fn build_api_url(url: &str, uri: &str) -> String {
  format!("{}/{}", url.trim_matches('/'), uri.trim_matches('/'))
}

/// Runs one unit of work end to end: validate, execute, decode into `sink`,
/// and check the decoded status.
pub async fn perform<T, Q, P>(transport: &T, request: &Q, sink: &ResponseSink<P>) -> Result<()>
where
  T: Transport + ?Sized,
  Q: ApiRequest,
  P: ApiResponse,
{
  request.validate().map_err(|e| match e {
    RequestError::InvalidRequest(_) => e,
    other => RequestError::InvalidRequest(other.to_string()),
  })?;
  let body = transport.execute(request).await?;
  trace!(bytes = body.len(), "Response body received.");
  sink.fill(&body)
}

/// `Transport` backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct HttpTransport {
  client: Client,
}

impl fmt::Debug for HttpTransport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HttpTransport").finish_non_exhaustive()
  }
}

impl HttpTransport {
  pub fn new(config: &HttpTransportConfig) -> Result<Self> {
    let mut builder = Client::builder().danger_accept_invalid_certs(config.accept_invalid_certs);
    if let Some(user_agent) = &config.user_agent {
      builder = builder.user_agent(user_agent.clone());
    }
    let client = builder
      .build()
      .map_err(|e| RequestError::BuildRequest(format!("http client: {}", e)))?;
    Ok(Self { client })
  }

  /// Wraps a client configured elsewhere.
  pub fn from_client(client: Client) -> Self {
    Self { client }
  }

  fn build(&self, request: &dyn ApiRequest) -> Result<reqwest::RequestBuilder> {
    let url = build_api_url(&request.url(), &request.uri());
    let method = Method::from_bytes(request.method().to_uppercase().as_bytes())
      .map_err(|e| RequestError::BuildRequest(format!("method {:?}: {}", request.method(), e)))?;

    let mut headers = HeaderMap::new();
    for (name, value) in request.headers() {
      let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| RequestError::BuildRequest(format!("header name {:?}: {}", name, e)))?;
      let value = HeaderValue::from_str(&value)
        .map_err(|e| RequestError::BuildRequest(format!("header {}: {}", name, e)))?;
      headers.insert(name, value);
    }

    debug!(%method, %url, "Building request.");
    let mut builder = self
      .client
      .request(method, &url)
      .headers(headers)
      .timeout(request.timeout());
    if let Some(body) = request.body() {
      builder = builder.body(body);
    }
    Ok(builder)
  }
}

impl Transport for HttpTransport {
  fn execute<'a>(&'a self, request: &'a dyn ApiRequest) -> BoxFuture<'a, Result<Vec<u8>>> {
    async move {
      let builder = self.build(request)?;
      let response = builder
        .send()
        .await
        .map_err(|e| RequestError::Transport(e.to_string()))?;
      trace!(status = %response.status(), "Response received.");

      // The whole body is buffered; responses are expected to be small envelopes.
      let bytes = response
        .bytes()
        .await
        .map_err(|e| RequestError::Transport(format!("read response error: {}", e)))?;
      Ok(bytes.to_vec())
    }
    .boxed()
  }
}
