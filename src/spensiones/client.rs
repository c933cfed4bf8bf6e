// src/spensiones/client.rs
use crate::spensiones::models::BASE_URL;
use crate::utils::error::FetchError;
use reqwest::header;
use std::time::Duration;

const SPENSIONES_USER_AGENT: &str = "Mozilla/5.0 (compatible; spensiones_extractor)";
// Page the statistics app expects requests to come from.
const SPENSIONES_REFERER_PATH: &str = "/apps/centroEstadisticas/paginaCuadrosCCEE.php";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 150;

/// Retrieves raw documents. Implemented over HTTP by [`SpensionesClient`].
#[allow(async_fn_in_trait)]
pub trait Fetch {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub timeout: Duration,
    /// Pause before every request.
    pub request_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
        }
    }
}

pub struct SpensionesClient {
    http: reqwest::Client,
    request_delay: Duration,
}

impl SpensionesClient {
    /// Creates a reqwest client configured for the regulator's site.
    pub fn new(config: ClientConfig) -> Result<Self, FetchError> {
        let mut headers = header::HeaderMap::new();
        let referer = format!("{BASE_URL}{SPENSIONES_REFERER_PATH}");
        headers.insert(
            header::REFERER,
            header::HeaderValue::from_str(&referer).map_err(|e| FetchError::InvalidUrl {
                url: referer.clone(),
                reason: e.to_string(),
            })?,
        );

        let http = reqwest::Client::builder()
            .user_agent(SPENSIONES_USER_AGENT)
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            request_delay: config.request_delay,
        })
    }
}

impl Fetch for SpensionesClient {
    /// Downloads one document. Any non-2xx status is an error.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tracing::debug!("GET {}", url);

        // --- Basic Rate Limiting ---
        tokio::time::sleep(self.request_delay).await;

        let response = self
            .http
            .get(url)
            .header(header::ACCEPT, "text/html,application/vnd.ms-excel,*/*")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("HTTP error status: {} for URL: {}", status, url);
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(FetchError::NotFound(url.to_string()));
            }
            return Err(FetchError::Http(status));
        }

        let body = response.bytes().await?;
        tracing::debug!("Downloaded {} bytes from {}", body.len(), url);

        Ok(body.to_vec())
    }
}
