//! The orchestrator context: coordination between page agents, the remote
//! synthesis service, and the renderer.
//!
//! Owns the per-tab playback state machine and the read-to-playback pipeline,
//! the single-flight renderer lifecycle, and the retry policies around every
//! unreliable hop. Peer failures degrade (audio without page UI, bounded
//! retries); only failures to produce playable audio abort a request.

pub mod config;
pub mod lanes;
pub mod lifecycle;
pub mod orchestrator;
pub mod platform;
pub mod store;
pub mod synthesis;

pub use config::{RetryPolicy, StaticConfig};
pub use lanes::TabLanes;
pub use lifecycle::{RendererLifecycle, RendererPlatform, RendererSetupError};
pub use orchestrator::Orchestrator;
pub use platform::{LocalRendererPlatform, PageDirectory};
pub use store::MemoryStateStore;
pub use synthesis::{HttpSynthesizer, DEFAULT_SYNTHESIS_ENDPOINT};
