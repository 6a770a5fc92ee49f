//! Network side of the cache controller.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::config::Config;
use crate::http::{Method, Request, Response, ResponseKind};

/// Trait for issuing a request to the network.
///
/// Implementations return either a response or a failure; the controller
/// never lets a failure escape a fetch event, so this is the only seam where
/// network errors exist.
#[async_trait]
pub trait Fetch: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// reqwest-backed fetcher that classifies responses against the app origin.
pub struct HttpFetcher {
  client: reqwest::Client,
  origin: Url,
}

impl HttpFetcher {
  pub fn new(config: &Config) -> Result<Self> {
    let mut builder = reqwest::Client::builder();
    // The app's service worker puts no bound on a network fetch; a timeout
    // is opt-in via config.
    if let Some(secs) = config.cache.timeout_secs {
      builder = builder.timeout(std::time::Duration::from_secs(secs));
    }

    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      origin: config.origin_url()?,
    })
  }
}

#[async_trait]
impl Fetch for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Delete => reqwest::Method::DELETE,
      Method::Patch => reqwest::Method::PATCH,
      Method::Head => reqwest::Method::HEAD,
      Method::Options => reqwest::Method::OPTIONS,
    };

    let mut builder = self.client.request(method, request.url.as_str());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let resp = builder
      .send()
      .await
      .map_err(|e| eyre!("Network fetch failed for {}: {}", request.url, e))?;

    let status = resp.status().as_u16();
    let final_url = Url::parse(resp.url().as_str())
      .map_err(|e| eyre!("Invalid response URL for {}: {}", request.url, e))?;
    let redirected = final_url != request.url;

    let headers = resp
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = resp
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body for {}: {}", request.url, e))?;

    let mut response = Response::new(status)
      .with_kind(classify(&self.origin, &final_url))
      .with_url(final_url.as_str())
      .with_body(body.to_vec());
    response.headers = headers;
    response.redirected = redirected;

    Ok(response)
  }
}

/// Classify a response by comparing its final URL against the app origin.
fn classify(origin: &Url, final_url: &Url) -> ResponseKind {
  if final_url.origin() == origin.origin() {
    ResponseKind::Basic
  } else {
    ResponseKind::Cors
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(url: &str) -> Url {
    Url::parse(url).unwrap()
  }

  #[test]
  fn test_classify_same_origin() {
    let origin = parse("https://araise.test");
    assert_eq!(
      classify(&origin, &parse("https://araise.test/dashboard")),
      ResponseKind::Basic
    );
  }

  #[test]
  fn test_classify_cross_origin() {
    let origin = parse("https://araise.test");
    assert_eq!(
      classify(&origin, &parse("https://fonts.example.com/roboto.woff2")),
      ResponseKind::Cors
    );
  }

  #[test]
  fn test_classify_scheme_and_port_matter() {
    let origin = parse("https://araise.test");
    assert_eq!(
      classify(&origin, &parse("http://araise.test/")),
      ResponseKind::Cors
    );
    assert_eq!(
      classify(&origin, &parse("https://araise.test:8443/")),
      ResponseKind::Cors
    );
  }
}
