//! One playback session: a tab's audio from start to natural end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use lector_core::protocol::RendererEvent;
use lector_core::TabId;

use crate::decode::DecodedAudio;
use crate::error::PlaybackError;
use crate::output::AudioOutput;

/// Cadence of position reports while playing.
const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// A live (or naturally ended) playback for one tab.
///
/// On start the session reports the decoded duration once, then a ticker
/// task emits position updates every 100 ms until the output reports the
/// audio consumed, at which point exactly one ended event fires. All events
/// carry the owning tab id so the orchestrator can drop reports from
/// superseded sessions.
pub struct PlaybackSession {
    tab_id: TabId,
    output: Arc<dyn AudioOutput>,
    ended: Arc<AtomicBool>,
    ticker: tokio::task::JoinHandle<()>,
}

impl PlaybackSession {
    pub fn start(
        tab_id: TabId,
        audio: &DecodedAudio,
        speed: f64,
        output: Arc<dyn AudioOutput>,
        events: mpsc::UnboundedSender<RendererEvent>,
    ) -> Result<Self, PlaybackError> {
        let duration = audio.duration_secs();
        output.start(audio, speed)?;
        let _ = events.send(RendererEvent::UpdateDuration { duration, tab_id });

        let ended = Arc::new(AtomicBool::new(false));
        let ticker = tokio::spawn(run_ticker(
            tab_id,
            Arc::clone(&output),
            Arc::clone(&ended),
            events,
        ));

        Ok(Self {
            tab_id,
            output,
            ended,
            ticker,
        })
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// Whether playback already completed naturally.
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.output.pause();
    }

    pub fn resume(&self) {
        self.output.resume();
    }

    /// Seek to an absolute position in seconds. Non-finite values are
    /// ignored; negatives clamp to the start.
    pub fn seek(&self, seconds: f64) {
        if !seconds.is_finite() {
            debug!(tab = %self.tab_id, seconds, "ignoring non-finite seek");
            return;
        }
        let position = Duration::from_secs_f64(seconds.max(0.0));
        if let Err(e) = self.output.seek(position) {
            warn!(tab = %self.tab_id, error = %e, "seek failed");
        }
    }

    /// Update the playback rate. Non-finite values are ignored.
    pub fn set_speed(&self, value: f64) {
        if value.is_finite() {
            self.output.set_speed(value);
        } else {
            debug!(tab = %self.tab_id, value, "ignoring non-finite speed");
        }
    }

    /// Stop the ticker and release the output. Idempotent via the engine's
    /// take-and-drop ownership.
    pub fn teardown(self) {
        self.ticker.abort();
        self.output.stop();
    }
}

async fn run_ticker(
    tab_id: TabId,
    output: Arc<dyn AudioOutput>,
    ended: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<RendererEvent>,
) {
    let mut interval = tokio::time::interval(TIME_UPDATE_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately and reports position zero.
    loop {
        interval.tick().await;
        if output.is_finished() {
            if !ended.swap(true, Ordering::SeqCst) {
                debug!(tab = %tab_id, "playback ended naturally");
                let _ = events.send(RendererEvent::AudioEnded { tab_id });
            }
            output.stop();
            return;
        }
        let update = RendererEvent::AudioTimeUpdate {
            current_time: output.position().as_secs_f64(),
            tab_id,
        };
        if events.send(update).is_err() {
            // Event consumer gone; the context is tearing down.
            return;
        }
    }
}
