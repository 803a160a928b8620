//! Audio output boundary.
//!
//! Playback is hidden behind the object-safe [`AudioOutput`] port so the
//! engine and its tests never touch a sound device. The production adapter
//! drives rodio; its output stream is not `Send`, so a dedicated thread owns
//! it for the lifetime of the output while the handle crosses into async
//! code.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tracing::{debug, warn};

use crate::decode::DecodedAudio;
use crate::error::PlaybackError;

// ── Port ───────────────────────────────────────────────────────────

/// One playback device: accepts decoded samples and transport controls.
pub trait AudioOutput: Send + Sync {
    /// Begin playing `audio` from the start at the given rate.
    fn start(&self, audio: &DecodedAudio, speed: f64) -> Result<(), PlaybackError>;

    fn pause(&self);
    fn resume(&self);
    fn set_speed(&self, speed: f64);

    /// Seek to an absolute position.
    fn seek(&self, position: Duration) -> Result<(), PlaybackError>;

    /// Elapsed playback position.
    fn position(&self) -> Duration;

    /// Whether the queued audio has been fully consumed.
    fn is_finished(&self) -> bool;

    /// Discard queued audio and release the device binding.
    fn stop(&self);
}

/// Creates a fresh output per playback session.
pub trait OutputFactory: Send + Sync {
    fn new_output(&self) -> Result<Arc<dyn AudioOutput>, PlaybackError>;
}

// ── Rodio adapter ──────────────────────────────────────────────────

/// Production output backed by rodio.
///
/// The `OutputStream` must stay alive for audio to keep flowing and is not
/// `Send`, so a named thread holds it and parks on a shutdown channel whose
/// sender drops with this struct.
pub struct RodioOutput {
    handle: OutputStreamHandle,
    sink: Mutex<Option<Sink>>,
    _shutdown: std_mpsc::Sender<()>,
}

impl RodioOutput {
    pub fn new() -> Result<Self, PlaybackError> {
        let (init_tx, init_rx) = std_mpsc::channel();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

        thread::Builder::new()
            .name("lector-audio".to_owned())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    if init_tx.send(Ok(handle)).is_err() {
                        return;
                    }
                    // Hold the stream until the owning RodioOutput drops.
                    let _stream = stream;
                    let _ = shutdown_rx.recv();
                    debug!("audio output thread shutting down");
                }
                Err(e) => {
                    let _ = init_tx.send(Err(PlaybackError::OutputStream(e.to_string())));
                }
            })
            .map_err(|e| PlaybackError::OutputStream(e.to_string()))?;

        let handle = init_rx
            .recv()
            .map_err(|_| PlaybackError::OutputStream("audio thread exited during init".to_owned()))??;

        Ok(Self {
            handle,
            sink: Mutex::new(None),
            _shutdown: shutdown_tx,
        })
    }

    fn lock_sink(&self) -> std::sync::MutexGuard<'_, Option<Sink>> {
        // Sink methods don't panic; poisoning here is unreachable in practice.
        self.sink.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl AudioOutput for RodioOutput {
    fn start(&self, audio: &DecodedAudio, speed: f64) -> Result<(), PlaybackError> {
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| PlaybackError::OutputStream(e.to_string()))?;
        sink.append(SamplesBuffer::new(
            audio.channels,
            audio.sample_rate,
            audio.samples.clone(),
        ));
        sink.set_speed(speed as f32);
        sink.play();
        *self.lock_sink() = Some(sink);
        Ok(())
    }

    fn pause(&self) {
        if let Some(sink) = self.lock_sink().as_ref() {
            sink.pause();
        }
    }

    fn resume(&self) {
        if let Some(sink) = self.lock_sink().as_ref() {
            sink.play();
        }
    }

    fn set_speed(&self, speed: f64) {
        if let Some(sink) = self.lock_sink().as_ref() {
            sink.set_speed(speed as f32);
        }
    }

    fn seek(&self, position: Duration) -> Result<(), PlaybackError> {
        match self.lock_sink().as_ref() {
            Some(sink) => sink
                .try_seek(position)
                .map_err(|e| PlaybackError::Seek(e.to_string())),
            None => Ok(()),
        }
    }

    fn position(&self) -> Duration {
        self.lock_sink().as_ref().map_or(Duration::ZERO, Sink::get_pos)
    }

    fn is_finished(&self) -> bool {
        self.lock_sink().as_ref().is_none_or(Sink::empty)
    }

    fn stop(&self) {
        if let Some(sink) = self.lock_sink().take() {
            sink.stop();
        }
    }
}

/// Factory for production outputs. Opening a device can fail on headless
/// machines; the error is surfaced per session rather than at startup.
pub struct RodioOutputFactory;

impl OutputFactory for RodioOutputFactory {
    fn new_output(&self) -> Result<Arc<dyn AudioOutput>, PlaybackError> {
        match RodioOutput::new() {
            Ok(output) => Ok(Arc::new(output)),
            Err(e) => {
                warn!(error = %e, "could not open audio output device");
                Err(e)
            }
        }
    }
}
