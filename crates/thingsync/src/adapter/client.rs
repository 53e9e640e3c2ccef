use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use super::error::FetchError;

/// Trait for the HTTP side of the adapter
///
/// Every device interaction is a GET returning JSON. This trait allows for
/// mocking the client for testing purposes.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url` and parse the body as JSON.
    ///
    /// Non-2xx responses are errors; the body is not inspected.
    async fn get_json(&self, url: &str) -> Result<Value, FetchError>;
}

/// Real HTTP client implementation using reqwest
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        debug!("GET {}", parsed);
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[cfg(test)]
pub use mock::{MockHttpClient, MockResponse};
