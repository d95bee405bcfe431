use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sampling and generation parameters forwarded to the backend.
///
/// Every field is optional. Unset fields are left out of the request so the
/// backend falls back to its own defaults; `Some(0)` is sent as an explicit
/// zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirostat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirostat_eta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirostat_tau: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_last_n: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tfs_z: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tuned preset the grammar helper ships with.
    pub fn recommended() -> Self {
        Self {
            min_p: Some(0.0),
            mirostat: Some(0),
            mirostat_eta: Some(0.1),
            mirostat_tau: Some(5.0),
            num_ctx: Some(2048),
            num_predict: Some(128),
            repeat_last_n: Some(64),
            repeat_penalty: Some(1.1),
            seed: Some(0),
            stop: None,
            temperature: Some(0.7),
            tfs_z: Some(1.0),
            top_k: Some(40),
            top_p: Some(0.9),
        }
    }

    pub fn min_p(mut self, value: f64) -> Self {
        self.min_p = Some(value);
        self
    }

    pub fn mirostat(mut self, mode: i64) -> Self {
        self.mirostat = Some(mode);
        self
    }

    pub fn mirostat_eta(mut self, value: f64) -> Self {
        self.mirostat_eta = Some(value);
        self
    }

    pub fn mirostat_tau(mut self, value: f64) -> Self {
        self.mirostat_tau = Some(value);
        self
    }

    pub fn num_ctx(mut self, tokens: i64) -> Self {
        self.num_ctx = Some(tokens);
        self
    }

    pub fn num_predict(mut self, tokens: i64) -> Self {
        self.num_predict = Some(tokens);
        self
    }

    pub fn repeat_last_n(mut self, tokens: i64) -> Self {
        self.repeat_last_n = Some(tokens);
        self
    }

    pub fn repeat_penalty(mut self, value: f64) -> Self {
        self.repeat_penalty = Some(value);
        self
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn stop(mut self, stop: impl Into<String>) -> Self {
        self.stop = Some(stop.into());
        self
    }

    pub fn temperature(mut self, value: f64) -> Self {
        self.temperature = Some(value);
        self
    }

    pub fn tfs_z(mut self, value: f64) -> Self {
        self.tfs_z = Some(value);
        self
    }

    pub fn top_k(mut self, k: i64) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn top_p(mut self, value: f64) -> Self {
        self.top_p = Some(value);
        self
    }

    /// Sparse key/value form of the options, holding only the fields that
    /// were set.
    pub fn serialize(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // A struct of plain numbers and strings always serializes to an
            // object; non-finite floats are the only thing serde_json rejects.
            _ => Map::new(),
        }
    }
}
