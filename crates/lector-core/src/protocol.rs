//! Wire protocol crossing the three execution contexts.
//!
//! Every message is a JSON object tagged with an `action` field. The reliable
//! messaging layer treats payloads as opaque [`serde_json::Value`]s; these
//! enums are the typed shapes each endpoint serializes from and deserializes
//! into.
//!
//! Renderer-bound messages additionally carry `target: "offscreen"` so the
//! renderer can ignore traffic addressed to other contexts; see
//! [`renderer_envelope`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{PlaybackState, TabId};

// ── Core → page agent ──────────────────────────────────────────────

/// Messages pushed from the orchestrator to the page agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PageMessage {
    /// Liveness probe; a live agent replies `{ok: true}`.
    Ping,

    /// Full state refresh for the widget.
    UpdateState { state: PlaybackState },

    /// Elapsed-time tick while playing.
    TimeUpdate { time: f64 },

    /// Total duration became known.
    UpdateDuration { duration: f64 },

    /// User-facing error text; the widget displays it for a bounded period.
    Error { message: String },
}

// ── Page agent → core ──────────────────────────────────────────────

/// User intents relayed by the page agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UserCommand {
    Play,
    Pause,
    StopAudio,
    /// Seek to an absolute position in seconds.
    Skip { value: f64 },
    /// Change the playback rate multiplier.
    Speed { value: f64 },
}

// ── Core → renderer ────────────────────────────────────────────────

/// Commands addressed to the renderer context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RendererCommand {
    /// Start playback for a tab, tearing down any previous session.
    PlayAudio {
        tab_id: TabId,
        /// Encoded audio bytes, base64 (possibly ragged; the renderer scrubs).
        audio_base64: String,
        speed: f64,
        /// Producer-declared media type; may be absent or unreliable.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },

    PauseAudio,
    ResumeAudio,

    /// Seek to an absolute position in seconds; ignored unless finite.
    SeekAudio { time: f64 },

    /// Update the playback rate; ignored unless finite.
    SetSpeed { value: f64 },

    /// Stop playback. With a tab id, acts only when it matches the owning
    /// tab; without one, stops whatever is playing.
    StopAudio {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab_id: Option<TabId>,
    },
}

/// Destination marker carried on every renderer-bound envelope.
pub const RENDERER_TARGET: &str = "offscreen";

/// Wrap a renderer command into its wire payload, adding the
/// `target: "offscreen"` marker the renderer filters on.
pub fn renderer_envelope(command: &RendererCommand) -> Value {
    let mut payload = serde_json::to_value(command).unwrap_or(Value::Null);
    if let Value::Object(ref mut map) = payload {
        map.insert("target".to_owned(), Value::String(RENDERER_TARGET.to_owned()));
    }
    payload
}

// ── Renderer → core ────────────────────────────────────────────────

/// Lifecycle events emitted by the renderer context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RendererEvent {
    /// One-shot readiness signal sent once the renderer has initialized.
    #[serde(rename = "offscreenReady")]
    Ready,

    /// Playback completed naturally.
    AudioEnded { tab_id: TabId },

    /// Periodic position report while playing.
    AudioTimeUpdate { current_time: f64, tab_id: TabId },

    /// Total duration became known after decoding.
    UpdateDuration { duration: f64, tab_id: TabId },

    /// No decode strategy succeeded, or playback faulted irrecoverably.
    AudioError { error: String, tab_id: TabId },
}

impl RendererEvent {
    /// The tab this event is routed to, if any.
    pub fn tab_id(&self) -> Option<TabId> {
        match self {
            Self::Ready => None,
            Self::AudioEnded { tab_id }
            | Self::AudioTimeUpdate { tab_id, .. }
            | Self::UpdateDuration { tab_id, .. }
            | Self::AudioError { tab_id, .. } => Some(*tab_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_messages_use_original_action_names() {
        let v = serde_json::to_value(PageMessage::Ping).unwrap();
        assert_eq!(v, json!({"action": "ping"}));

        let v = serde_json::to_value(PageMessage::TimeUpdate { time: 1.5 }).unwrap();
        assert_eq!(v, json!({"action": "timeUpdate", "time": 1.5}));
    }

    #[test]
    fn user_commands_round_trip() {
        let cmd: UserCommand =
            serde_json::from_value(json!({"action": "skip", "value": 15.0})).unwrap();
        assert_eq!(cmd, UserCommand::Skip { value: 15.0 });

        let cmd: UserCommand = serde_json::from_value(json!({"action": "stopAudio"})).unwrap();
        assert_eq!(cmd, UserCommand::StopAudio);
    }

    #[test]
    fn renderer_envelope_carries_target_marker() {
        let payload = renderer_envelope(&RendererCommand::PlayAudio {
            tab_id: TabId(7),
            audio_base64: "AAAA".to_owned(),
            speed: 1.0,
            mime_type: Some("audio/L16;rate=24000".to_owned()),
        });
        assert_eq!(payload["target"], "offscreen");
        assert_eq!(payload["action"], "playAudio");
        assert_eq!(payload["tabId"], 7);
        assert_eq!(payload["audioBase64"], "AAAA");
        assert_eq!(payload["mimeType"], "audio/L16;rate=24000");
    }

    #[test]
    fn stop_audio_omits_absent_tab_id() {
        let payload = renderer_envelope(&RendererCommand::StopAudio { tab_id: None });
        assert_eq!(payload["action"], "stopAudio");
        assert!(payload.get("tabId").is_none());
    }

    #[test]
    fn ready_event_uses_offscreen_ready_tag() {
        let v = serde_json::to_value(RendererEvent::Ready).unwrap();
        assert_eq!(v, json!({"action": "offscreenReady"}));
        assert_eq!(RendererEvent::Ready.tab_id(), None);
    }

    #[test]
    fn renderer_events_carry_tab_id() {
        let evt = RendererEvent::AudioTimeUpdate {
            current_time: 0.4,
            tab_id: TabId(7),
        };
        let v = serde_json::to_value(&evt).unwrap();
        assert_eq!(v["action"], "audioTimeUpdate");
        assert_eq!(v["currentTime"], 0.4);
        assert_eq!(v["tabId"], 7);
        assert_eq!(evt.tab_id(), Some(TabId(7)));
    }
}
