//! The playback engine: command handling over at most one live session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use lector_core::protocol::{RendererCommand, RendererEvent};
use lector_core::TabId;

use crate::decode::{decode_base64_payload, DecodeCascade};
use crate::output::OutputFactory;
use crate::session::PlaybackSession;

/// Holds the single playback slot and applies renderer commands to it.
///
/// Starting a new playback always tears down the previous session first, so
/// two tabs can never sound at once. Transport commands act on the live
/// session only; once playback ended naturally they become no-ops, which
/// keeps late-arriving user commands harmless.
pub struct PlaybackEngine {
    cascade: DecodeCascade,
    outputs: Arc<dyn OutputFactory>,
    events: mpsc::UnboundedSender<RendererEvent>,
    session: Option<PlaybackSession>,
}

impl PlaybackEngine {
    pub fn new(
        outputs: Arc<dyn OutputFactory>,
        events: mpsc::UnboundedSender<RendererEvent>,
    ) -> Self {
        Self {
            cascade: DecodeCascade::default(),
            outputs,
            events,
            session: None,
        }
    }

    pub fn handle(&mut self, command: RendererCommand) {
        match command {
            RendererCommand::PlayAudio {
                tab_id,
                audio_base64,
                speed,
                mime_type,
            } => self.play(tab_id, &audio_base64, speed, mime_type.as_deref()),
            RendererCommand::PauseAudio => {
                if let Some(session) = self.live_session() {
                    session.pause();
                }
            }
            RendererCommand::ResumeAudio => {
                if let Some(session) = self.live_session() {
                    session.resume();
                }
            }
            RendererCommand::SeekAudio { time } => {
                if let Some(session) = self.live_session() {
                    session.seek(time);
                }
            }
            RendererCommand::SetSpeed { value } => {
                if let Some(session) = self.live_session() {
                    session.set_speed(value);
                }
            }
            RendererCommand::StopAudio { tab_id } => self.stop(tab_id),
        }
    }

    /// Tear down whatever is playing. Called when the context shuts down.
    pub fn shutdown(&mut self) {
        self.teardown_session();
    }

    fn play(&mut self, tab_id: TabId, audio_base64: &str, speed: f64, mime_type: Option<&str>) {
        self.teardown_session();
        match self.start_playback(tab_id, audio_base64, speed, mime_type) {
            Ok(strategy) => info!(tab = %tab_id, strategy, "playback started"),
            Err(message) => {
                error!(tab = %tab_id, %message, "audio playback failed");
                let _ = self.events.send(RendererEvent::AudioError {
                    error: format!("Audio playback failed: {message}"),
                    tab_id,
                });
                self.teardown_session();
            }
        }
    }

    fn start_playback(
        &mut self,
        tab_id: TabId,
        audio_base64: &str,
        speed: f64,
        mime_type: Option<&str>,
    ) -> Result<&'static str, String> {
        let bytes = decode_base64_payload(audio_base64).map_err(|e| e.to_string())?;
        let (audio, strategy) = self
            .cascade
            .decode(&bytes, mime_type)
            .map_err(|e| e.to_string())?;
        let output = self.outputs.new_output().map_err(|e| e.to_string())?;

        let speed = if speed.is_finite() && speed > 0.0 {
            speed
        } else {
            1.0
        };
        let session = PlaybackSession::start(tab_id, &audio, speed, output, self.events.clone())
            .map_err(|e| e.to_string())?;
        self.session = Some(session);
        Ok(strategy)
    }

    fn stop(&mut self, target: Option<TabId>) {
        match (target, self.session.as_ref()) {
            // Targeted stop only acts when the tab owns the playback.
            (Some(tab), Some(session)) if session.tab_id() == tab => {
                debug!(tab = %tab, "stopping playback for owning tab");
                self.teardown_session();
            }
            (Some(tab), Some(session)) => {
                debug!(tab = %tab, owner = %session.tab_id(), "ignoring stop from non-owning tab");
            }
            (Some(_), None) => {}
            // Unconditional stop clears whatever is playing.
            (None, _) => self.teardown_session(),
        }
    }

    /// The current session, unless playback already ended naturally.
    fn live_session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref().filter(|s| !s.is_ended())
    }

    fn teardown_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.teardown();
        }
    }
}
