use crate::options::GenerationOptions;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/api";
pub const DEFAULT_MODEL: &str = "gemma3:4b";

/// Everything an [`InferenceSession`](crate::InferenceSession) needs to talk
/// to the backend.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub base_url: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub options: GenerationOptions,
    /// Upper bound for each readiness probe round trip.
    pub probe_timeout: Duration,
    /// Upper bound for a whole non-streaming chat call.
    pub request_timeout: Duration,
    /// Longest silence tolerated between two chunks of a streamed body.
    pub stream_idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            options: GenerationOptions::default(),
            probe_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(120),
            stream_idle_timeout: Duration::from_secs(120),
        }
    }
}

impl SessionConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = normalize_base_url(base_url.as_ref());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", normalize_base_url(&self.base_url), path)
    }
}

pub(crate) fn normalize_base_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_local_backend() {
        let config = SessionConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434/api");
        assert_eq!(config.model, "gemma3:4b");
        assert!(config.system_prompt.is_none());
        assert!(config.options.serialize().is_empty());
    }

    #[test]
    fn endpoints_ignore_trailing_slashes() {
        let config = SessionConfig::new("gemma3:1b").base_url("http://127.0.0.1:9999/api//");
        assert_eq!(config.base_url, "http://127.0.0.1:9999/api");
        assert_eq!(config.endpoint("tags"), "http://127.0.0.1:9999/api/tags");

        let mut config = SessionConfig::default();
        config.base_url = "http://host/api/".to_string();
        assert_eq!(config.endpoint("chat"), "http://host/api/chat");
    }
}
