//! Streaming client for a local text-generation backend.
//!
//! An [`InferenceSession`] probes the backend once, then runs one chat
//! generation at a time, either streamed token by token or as a single reply.

pub mod config;
pub mod decoder;
pub mod error;
pub mod grammar;
pub mod history;
pub mod options;
pub mod probe;
pub mod protocol;
pub mod session;
pub mod transport;

#[cfg(test)]
mod mock_backend;

pub use config::{DEFAULT_BASE_URL, DEFAULT_MODEL, SessionConfig};
pub use error::InferenceError;
pub use options::GenerationOptions;
pub use probe::ServiceProbe;
pub use session::{Callbacks, InferenceSession, SessionState, StreamState};
