//! Core domain types, wire protocol, and port traits for lector.
//!
//! # Design Rules
//!
//! - Types here are transport-agnostic wire shapes and pure domain data; no
//!   infrastructure crate (HTTP, audio, channels) is referenced.
//! - Port traits define what the orchestrator needs from its collaborators
//!   (state persistence, configuration, speech synthesis); adapters live in
//!   the crates that own the infrastructure and convert their native errors
//!   at the boundary, never here.

pub mod domain;
pub mod ports;
pub mod protocol;

// Re-export key types for ergonomic access
pub use domain::{PlaybackPhase, PlaybackState, TabId};
pub use ports::{ConfigStore, SpeechSynthesizer, StateStore, SynthesisError, SynthesizedAudio};
pub use protocol::{PageMessage, RendererCommand, RendererEvent, UserCommand};
