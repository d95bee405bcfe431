use thiserror::Error;

/// Every failure the client can report, either while initializing a session
/// or for a single generation call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("backend at {base_url} is not reachable")]
    Unreachable { base_url: String },

    #[error("model '{model}' does not exist on the backend")]
    ModelMissing { model: String },

    #[error("session is still initializing")]
    NotReady,

    #[error("a generation is already in progress")]
    Busy,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("backend returned an empty response")]
    EmptyResponse,

    #[error("backend error{}: {message}", status_suffix(.status))]
    Backend { status: Option<u16>, message: String },

    #[error("generation cancelled")]
    Cancelled,

    #[error("session closed")]
    Closed,
}

impl InferenceError {
    /// True for failures that leave the session permanently unusable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InferenceError::Unreachable { .. } | InferenceError::ModelMissing { .. }
        )
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" ({code})"),
        None => String::new(),
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            InferenceError::Protocol(err.to_string())
        } else {
            InferenceError::Transport(err.to_string())
        }
    }
}
