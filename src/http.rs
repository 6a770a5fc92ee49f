//! HTTP request and response value objects.
//!
//! Requests and responses are plain values rather than one-shot streams:
//! `copy()` returns a fresh readable copy, so the controller can look a
//! request up in the cache and still dispatch it to the network, and can
//! return a response to the caller while storing a duplicate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
  Patch,
  Head,
  Options,
}

impl Default for Method {
  fn default() -> Self {
    Self::Get
  }
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Get => "GET",
      Self::Post => "POST",
      Self::Put => "PUT",
      Self::Delete => "DELETE",
      Self::Patch => "PATCH",
      Self::Head => "HEAD",
      Self::Options => "OPTIONS",
    }
  }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub url: Url,
  pub method: Method,
  pub headers: BTreeMap<String, String>,
  pub body: Option<Vec<u8>>,
  /// True for top-level document loads. Navigations fall back to the cached
  /// root page when the network is unreachable.
  pub navigate: bool,
}

impl Request {
  /// Create a plain GET request.
  pub fn get(url: Url) -> Self {
    Self {
      url,
      method: Method::Get,
      headers: BTreeMap::new(),
      body: None,
      navigate: false,
    }
  }

  /// Create a top-level navigation request.
  pub fn navigation(url: Url) -> Self {
    Self {
      navigate: true,
      ..Self::get(url)
    }
  }

  /// Return a fresh readable copy of this request.
  pub fn copy(&self) -> Self {
    self.clone()
  }

  /// Stable cache key for this request: SHA-256 of `METHOD:URL`, hex encoded.
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Origin classification of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
  /// Same-origin response; the only kind eligible for caching.
  Basic,
  /// Cross-origin response.
  Cors,
  /// Cross-origin response with no readable metadata.
  Opaque,
  /// Synthesized failure response.
  Error,
}

/// A response, either from the network or from the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
  pub kind: ResponseKind,
  /// Final URL the response was served from (empty when synthesized).
  pub url: String,
  pub status: u16,
  pub status_text: String,
  pub headers: BTreeMap<String, String>,
  pub body: Option<Vec<u8>>,
  /// Whether the network followed a redirect to produce this response.
  pub redirected: bool,
}

impl Response {
  /// Create a same-origin response with the given status.
  pub fn new(status: u16) -> Self {
    Self {
      kind: ResponseKind::Basic,
      url: String::new(),
      status,
      status_text: status_text_for(status).to_string(),
      headers: BTreeMap::new(),
      body: None,
      redirected: false,
    }
  }

  /// Synthesized timeout response returned when the network is unreachable
  /// and no cached fallback applies.
  pub fn timeout() -> Self {
    Self {
      kind: ResponseKind::Error,
      body: Some(b"Request Timeout".to_vec()),
      ..Self::new(408)
    }
  }

  pub fn with_kind(mut self, kind: ResponseKind) -> Self {
    self.kind = kind;
    self
  }

  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.url = url.into();
    self
  }

  pub fn with_body(mut self, body: Vec<u8>) -> Self {
    self.body = Some(body);
    self
  }

  /// Check if the status is in the 2xx range.
  pub fn ok(&self) -> bool {
    self.status >= 200 && self.status < 300
  }

  /// Whether this response may be written into a cache generation: exactly
  /// status 200, same-origin, and not the product of a redirect.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.kind == ResponseKind::Basic && !self.redirected
  }

  /// Return a fresh readable copy of this response.
  pub fn copy(&self) -> Self {
    self.clone()
  }
}

/// Get status text for a status code.
fn status_text_for(status: u16) -> &'static str {
  match status {
    200 => "OK",
    201 => "Created",
    204 => "No Content",
    301 => "Moved Permanently",
    302 => "Found",
    304 => "Not Modified",
    307 => "Temporary Redirect",
    308 => "Permanent Redirect",
    400 => "Bad Request",
    401 => "Unauthorized",
    403 => "Forbidden",
    404 => "Not Found",
    405 => "Method Not Allowed",
    408 => "Request Timeout",
    500 => "Internal Server Error",
    502 => "Bad Gateway",
    503 => "Service Unavailable",
    504 => "Gateway Timeout",
    _ => "Unknown",
  }
}
