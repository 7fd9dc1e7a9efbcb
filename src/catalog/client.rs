use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{header, Client};
use std::time::Duration;
use url::Url;

use crate::catalog::api_types::ApiAnimeListResponse;
use crate::config::Config;
use crate::error::TransportError;

/// The remote catalog endpoint.
///
/// One call, one request. Timeouts and cancellation belong to the
/// implementation.
#[async_trait]
pub trait CatalogClient: Send + Sync {
  async fn fetch(&self) -> Result<ApiAnimeListResponse, TransportError>;
}

/// Catalog client over HTTP
#[derive(Clone)]
pub struct HttpCatalogClient {
  client: Client,
  endpoint: Url,
}

impl HttpCatalogClient {
  pub fn new(config: &Config) -> Result<Self> {
    let endpoint = config
      .catalog
      .url
      .as_deref()
      .ok_or_else(|| eyre!("No catalog url configured. Set catalog.url in the config file."))?;
    let endpoint =
      Url::parse(endpoint).map_err(|e| eyre!("Invalid catalog url {}: {}", endpoint, e))?;

    let mut headers = header::HeaderMap::new();
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    if let Some(token) = Config::get_api_token() {
      let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| eyre!("Invalid API token: {}", e))?;
      headers.insert(header::AUTHORIZATION, value);
    }

    let client = Client::builder()
      .timeout(Duration::from_secs(config.catalog.timeout_secs))
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, endpoint })
  }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
  async fn fetch(&self) -> Result<ApiAnimeListResponse, TransportError> {
    tracing::debug!(endpoint = %self.endpoint, "fetching catalog");

    let response = self
      .client
      .get(self.endpoint.clone())
      .send()
      .await
      .map_err(TransportError::Request)?;

    let status = response.status();
    let body = response.bytes().await.map_err(TransportError::Request)?;

    if !status.is_success() {
      return Err(TransportError::Status {
        status: status.as_u16(),
        message: String::from_utf8_lossy(&body).trim().to_string(),
      });
    }

    // An empty 2xx body carries no collection.
    if body.iter().all(u8::is_ascii_whitespace) {
      return Ok(ApiAnimeListResponse::default());
    }

    serde_json::from_slice(&body).map_err(TransportError::Decode)
  }
}
