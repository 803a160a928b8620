//! Per-tab playback domain model.
//!
//! One [`PlaybackState`] exists per tab while a read-aloud request is alive.
//! It is created when a request begins (phase `Loading`), mutated only by the
//! orchestrator in response to renderer events and user commands, and removed
//! when the tab closes or starts navigating.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Tab handle ─────────────────────────────────────────────────────

/// Opaque numeric handle identifying a page/tab context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab {}", self.0)
    }
}

impl From<u32> for TabId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// ── Playback state machine ─────────────────────────────────────────

/// Phase of a tab's playback lifecycle.
///
/// Transitions: `Idle → Loading → Playing ⇄ Paused`, with `Playing`/`Paused`
/// ending in `Ended` (natural completion) or `Error` (any failure), and
/// `Ended`/`Error` returning to `Loading` on a new read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPhase {
    /// No request in flight for this tab.
    Idle,

    /// A read request was accepted; synthesis/decode has not finished yet.
    Loading,

    /// Audio is playing.
    Playing,

    /// Audio is paused; decoded data is retained.
    Paused,

    /// Playback completed naturally.
    Ended,

    /// The pipeline failed; `error_message` carries the human-readable cause.
    Error,
}

/// Playback state for a single tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    /// The utterance being read.
    pub text: String,

    /// Current lifecycle phase.
    pub phase: PlaybackPhase,

    /// Seconds elapsed; monotonically non-decreasing while `Playing`, reset
    /// to 0 on `Ended` or a new request.
    pub time: f64,

    /// Total duration in seconds; 0 until the decode engine reports it.
    pub duration: f64,

    /// Playback rate multiplier. The UI constrains the range; the core
    /// accepts and applies any finite positive value.
    pub speed: f64,

    /// Human-readable failure message when `phase == Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PlaybackState {
    /// State for a freshly accepted read request.
    pub fn loading(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            phase: PlaybackPhase::Loading,
            time: 0.0,
            duration: 0.0,
            speed: 1.0,
            error_message: None,
        }
    }

    /// Transition to `Playing` at the start of a fresh dispatch.
    pub fn begin_playing(&mut self) {
        self.phase = PlaybackPhase::Playing;
        self.time = 0.0;
        self.duration = 0.0;
        self.error_message = None;
    }

    /// Transition to `Ended` after natural completion.
    pub fn finish(&mut self) {
        self.phase = PlaybackPhase::Ended;
        self.time = 0.0;
    }

    /// Transition to `Error` with a user-facing message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.phase = PlaybackPhase::Error;
        self.error_message = Some(message.into());
    }

    /// Whether audio is actively playing.
    pub fn is_playing(&self) -> bool {
        self.phase == PlaybackPhase::Playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_state_has_defaults() {
        let s = PlaybackState::loading("hello");
        assert_eq!(s.phase, PlaybackPhase::Loading);
        assert_eq!(s.speed, 1.0);
        assert_eq!(s.time, 0.0);
        assert_eq!(s.duration, 0.0);
        assert!(s.error_message.is_none());
    }

    #[test]
    fn begin_playing_resets_progress() {
        let mut s = PlaybackState::loading("hello");
        s.time = 3.5;
        s.duration = 9.0;
        s.begin_playing();
        assert_eq!(s.phase, PlaybackPhase::Playing);
        assert_eq!(s.time, 0.0);
        assert_eq!(s.duration, 0.0);
    }

    #[test]
    fn finish_resets_time_but_keeps_duration() {
        let mut s = PlaybackState::loading("hello");
        s.begin_playing();
        s.duration = 12.0;
        s.time = 12.0;
        s.finish();
        assert_eq!(s.phase, PlaybackPhase::Ended);
        assert_eq!(s.time, 0.0);
        assert_eq!(s.duration, 12.0);
    }

    #[test]
    fn fail_records_message() {
        let mut s = PlaybackState::loading("hello");
        s.fail("No text selected");
        assert_eq!(s.phase, PlaybackPhase::Error);
        assert_eq!(s.error_message.as_deref(), Some("No text selected"));
    }

    #[test]
    fn state_serializes_camel_case_with_lowercase_phase() {
        let s = PlaybackState::loading("hi");
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["phase"], "loading");
        assert_eq!(v["text"], "hi");
        assert!(v.get("errorMessage").is_none());
    }
}
