use crate::config::SessionConfig;
use crate::error::InferenceError;
use crate::protocol::{ModelInfo, TagsResponse};
use crate::transport::ensure_success;
use reqwest::Client as HttpClient;
use std::time::Duration;
use tracing::debug;

/// Read-only checks against the backend's model listing.
///
/// The probe reports what it saw; deciding what that means for a session is
/// left to the caller.
#[derive(Debug, Clone)]
pub struct ServiceProbe {
    http: HttpClient,
    tags_url: String,
    timeout: Duration,
}

impl ServiceProbe {
    pub fn new(http: HttpClient, config: &SessionConfig) -> Self {
        Self {
            http,
            tags_url: config.endpoint("tags"),
            timeout: config.probe_timeout,
        }
    }

    /// True only when the listing endpoint answers with a success status.
    pub async fn check_reachable(&self) -> bool {
        match self
            .http
            .get(&self.tags_url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(url = %self.tags_url, status = %response.status(), "liveness check rejected");
                false
            }
            Err(err) => {
                debug!(url = %self.tags_url, error = %err, "liveness check failed");
                false
            }
        }
    }

    /// Exact, case-sensitive lookup of `name` in the model catalog. Any
    /// failure to fetch or parse the catalog counts as absence.
    pub async fn model_exists(&self, name: &str) -> bool {
        match self.list_models().await {
            Ok(models) => models.iter().any(|model| model.name == name),
            Err(err) => {
                debug!(model = name, error = %err, "model lookup failed");
                false
            }
        }
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, InferenceError> {
        let response = self
            .http
            .get(&self.tags_url)
            .timeout(self.timeout)
            .send()
            .await?;
        let body = ensure_success(response).await?.bytes().await?;

        let tags: TagsResponse = serde_json::from_slice(&body)
            .map_err(|e| InferenceError::Protocol(format!("undecodable model catalog: {e}")))?;
        Ok(tags.models)
    }
}
