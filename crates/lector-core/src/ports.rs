//! Port traits for the orchestrator's external collaborators.
//!
//! Adapters implement these in the crates that own the infrastructure
//! (in-memory store, HTTP synthesis client, host configuration) and convert
//! their native errors at the boundary.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{PlaybackState, TabId};

// ── State persistence ──────────────────────────────────────────────

/// Failure talking to the durable state store.
#[derive(Debug, Error)]
#[error("state store failure: {0}")]
pub struct StateStoreError(pub String);

/// Durable per-tab playback state, keyed by [`TabId`].
///
/// The orchestrator is the sole writer. Stored state must survive an
/// orchestrator restart (the host's session storage in production; an
/// in-memory map in tests).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the state for a tab, if one exists.
    async fn load(&self, tab: TabId) -> Result<Option<PlaybackState>, StateStoreError>;

    /// Create or overwrite the state for a tab.
    async fn save(&self, tab: TabId, state: PlaybackState) -> Result<(), StateStoreError>;

    /// Remove the state for a tab. Removing an absent entry is a no-op.
    async fn remove(&self, tab: TabId) -> Result<(), StateStoreError>;
}

// ── Configuration ──────────────────────────────────────────────────

/// Read-only host configuration.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// The synthesis service API key, if one has been configured.
    async fn api_key(&self) -> Option<String>;
}

// ── Speech synthesis ───────────────────────────────────────────────

/// Encoded audio produced by the synthesis service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    /// Base64-encoded audio bytes, exactly as the service returned them.
    pub audio_base64: String,

    /// Producer-declared media type. Unreliable; the decode cascade treats
    /// it as a hint only.
    pub mime_type: Option<String>,
}

/// Failure classifications for the remote synthesis call.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// No API key configured; fatal for this request, surfaced to the user.
    #[error("API key is not set. Please set it in the extension options.")]
    MissingApiKey,

    /// The service answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Http { status: u16, message: String },

    /// The response body did not contain a usable audio payload.
    #[error("malformed synthesis response: {0}")]
    MalformedResponse(String),

    /// The service could not be reached.
    #[error("failed to reach synthesis service: {0}")]
    Network(String),
}

/// Remote text-to-speech collaborator.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` into encoded audio plus an optional media-type hint.
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError>;
}
