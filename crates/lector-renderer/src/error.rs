//! Renderer-side error types.

use thiserror::Error;

/// Failure while turning an encoded payload into playable samples.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64 audio data: {0}")]
    InvalidBase64(String),

    #[error("empty audio payload")]
    EmptyPayload,

    #[error("audio payload too short to interpret as PCM")]
    PcmTooShort,

    #[error("container probe failed: {0}")]
    Probe(String),

    #[error("no audio track found in container")]
    NoAudioTrack,

    #[error("audio decode failed: {0}")]
    Codec(String),

    /// Every strategy in the cascade declined or the terminal fallback failed.
    #[error("no decode strategy could interpret the audio data")]
    Exhausted,
}

/// Failure at the audio output boundary.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to open audio output: {0}")]
    OutputStream(String),

    #[error("seek not supported by the active output: {0}")]
    Seek(String),
}
