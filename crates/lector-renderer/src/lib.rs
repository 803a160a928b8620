//! The renderer context: audio decoding and playback.
//!
//! This crate is the audio half of lector. It receives commands over the
//! messaging layer, turns base64 payloads into samples through a cascading
//! decode engine, and plays them through an [`output::AudioOutput`] (rodio
//! in production, mocks in tests). Lifecycle events (ready, duration, time
//! updates, ended, errors) flow back to the orchestrator tagged with the
//! owning tab.
//!
//! # Design rules
//!
//! - At most one playback session exists; a new `playAudio` supersedes it.
//! - The decode cascade trusts bytes over declared media types, except that
//!   a declared-PCM payload is never probed as a container.
//! - Transport commands on an ended session are silent no-ops.

pub mod decode;
pub mod engine;
pub mod error;
pub mod output;
pub mod pcm;
pub mod service;
pub mod session;
pub mod sniff;

pub use decode::{decode_base64_payload, Attempt, DecodeCascade, DecodeStrategy, DecodedAudio};
pub use engine::PlaybackEngine;
pub use error::{DecodeError, PlaybackError};
pub use output::{AudioOutput, OutputFactory, RodioOutput, RodioOutputFactory};
pub use session::PlaybackSession;
pub use sniff::{sniff_container, ContainerKind};
