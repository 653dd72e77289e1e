//! HTTP-backed effect pack

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::FetchError;
use crate::EffectSource;

/// Request timeout for a single resource
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Effect pack served below a base URL
#[derive(Debug, Clone)]
pub struct HttpSource {
    base: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(base: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.base, resource.trim_start_matches('/'))
    }
}

#[async_trait]
impl EffectSource for HttpSource {
    async fn fetch_text(&self, resource: &str) -> Result<String, FetchError> {
        let url = self.url(resource);
        debug!(%url, "fetching resource");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(resource.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                resource: resource.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }

    fn location(&self) -> String {
        self.base.clone()
    }
}
