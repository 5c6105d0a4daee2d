//! Core types for the offline cache: requests, responses, transport.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// What kind of resource the page is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
  /// Top-level navigation (an HTML document)
  Document,
  /// Subresource: stylesheet, script, image, data
  Other,
}

/// An outgoing request as seen by the cache controller.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      destination: Destination::Other,
    }
  }

  /// A navigation request for a document.
  pub fn navigate(url: Url) -> Self {
    Self {
      destination: Destination::Document,
      ..Self::get(url)
    }
  }

  #[cfg(test)]
  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn is_navigation(&self) -> bool {
    self.destination == Destination::Document
  }

  /// Key used to store this request's response (fragment stripped).
  pub fn cache_key(&self) -> String {
    cache_key(&self.url)
  }
}

pub fn cache_key(url: &Url) -> String {
  let mut url = url.clone();
  url.set_fragment(None);
  url.to_string()
}

/// A fully buffered response. Cloning it is how a copy goes to the cache
/// while the caller keeps the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  /// Only plain 200 responses are stored.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// Network failure: the transport rejected, or every fallback was exhausted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
  #[error("network request to {url} failed: {reason}")]
  Network { url: String, reason: String },
}

impl FetchError {
  pub fn network(url: &Url, reason: impl ToString) -> Self {
    FetchError::Network {
      url: url.to_string(),
      reason: reason.to_string(),
    }
  }
}

/// The underlying network call that cache strategies wrap.
#[async_trait]
pub trait FetchTransport: Send + Sync {
  /// Resolve to a response for any HTTP status; reject only when no
  /// response could be obtained at all.
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh from the network
  Network,
  /// Cache hit, no network involved
  Cache,
  /// Cache hit while a background revalidation is in flight
  CacheStale,
  /// Network failed, serving the cached entry for this request
  Offline,
  /// Network failed, serving the cached root document instead
  OfflineFallback,
  /// Not intercepted (non-GET, or controller not yet active)
  Passthrough,
}

/// A response plus metadata about how it was obtained.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: CacheSource,
}

impl Served {
  pub fn new(response: Response, source: CacheSource) -> Self {
    Self { response, source }
  }
}
