//! Client for the issuer endpoints reserved to consuming services.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use url::Url;

use common::prelude::{IdentityPermissionList, TokenCheckResponse};

pub const SERVICE_KEY_HEADER: &str = "x-service-key";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct IssuerClient {
    base: Url,
    client: Client,
}

impl IssuerClient {
    pub fn new(base: &Url, service_key: Option<&str>) -> Result<Self, IssuerError> {
        let mut default_headers = HeaderMap::new();
        if let Some(key) = service_key {
            let mut value =
                HeaderValue::from_str(key).map_err(|_| IssuerError::InvalidServiceKey)?;
            value.set_sensitive(true);
            default_headers.insert(SERVICE_KEY_HEADER, value);
        }
        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base: base.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `base` with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, IssuerError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| IssuerError::InvalidBaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Ask the issuer whether `token_id` is still live.
    ///
    /// `Ok(None)` means the issuer answered with something other than 200,
    /// which callers must treat as a rejection.
    pub async fn check_token(
        &self,
        token_id: &str,
    ) -> Result<Option<TokenCheckResponse>, IssuerError> {
        let url = self.endpoint(&["api", "tokens", token_id, "check"])?;
        let response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            tracing::debug!(token_id, status = %response.status(), "token check refused");
            return Ok(None);
        }
        Ok(Some(response.json().await?))
    }

    /// Fetch every current service account grant.
    pub async fn identity_permissions(&self) -> Result<IdentityPermissionList, IssuerError> {
        let url = self.endpoint(&["api", "identity-permissions"])?;
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(IssuerError::HttpStatus(
                response.status(),
                response.text().await.unwrap_or_default(),
            ));
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IssuerError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("issuer url cannot be a base: {0}")]
    InvalidBaseUrl(String),
    #[error("service key is not a valid header value")]
    InvalidServiceKey,
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
}
