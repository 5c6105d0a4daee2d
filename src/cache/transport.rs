//! HTTP transport over reqwest.

use async_trait::async_trait;
use std::time::Duration;

use super::traits::{FetchError, FetchTransport, Request, Response};

/// Real network access. Any HTTP status is a response; only connection
/// level failures become [`FetchError`].
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("flick/", env!("CARGO_PKG_VERSION")))
      .timeout(timeout)
      .build()?;
    Ok(Self { client })
  }
}

#[async_trait]
impl FetchTransport for HttpTransport {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    let network = |e: reqwest::Error| FetchError::network(&request.url, e);

    let reply = self
      .client
      .request(request.method.clone(), request.url.clone())
      .send()
      .await
      .map_err(network)?;

    let status = reply.status().as_u16();
    let headers = reply
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = reply.bytes().await.map_err(network)?.to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}
