//! The renderer context task.
//!
//! Runs the playback engine behind an envelope inbox: announces readiness
//! once on spawn, filters out traffic not marked for the renderer, decodes
//! commands, and acknowledges each one so the sender's request settles.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use lector_core::protocol::{RendererCommand, RendererEvent, RENDERER_TARGET};
use lector_messaging::Envelope;

use crate::engine::PlaybackEngine;
use crate::output::OutputFactory;

/// Spawn the renderer task; returns the sender side of its command inbox.
///
/// The readiness event is emitted from inside the task, before any command is
/// consumed, so a creator that subscribes to `events` before spawning never
/// misses it.
pub fn spawn(
    outputs: Arc<dyn OutputFactory>,
    events: mpsc::UnboundedSender<RendererEvent>,
) -> mpsc::UnboundedSender<Envelope> {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    tokio::spawn(run(command_rx, outputs, events));
    command_tx
}

async fn run(
    mut inbox: mpsc::UnboundedReceiver<Envelope>,
    outputs: Arc<dyn OutputFactory>,
    events: mpsc::UnboundedSender<RendererEvent>,
) {
    let _ = events.send(RendererEvent::Ready);
    info!("renderer context ready");

    let mut engine = PlaybackEngine::new(outputs, events);

    while let Some(envelope) = inbox.recv().await {
        if envelope.payload.get("target").and_then(Value::as_str) != Some(RENDERER_TARGET) {
            debug!(action = envelope.action(), "ignoring message for another target");
            continue;
        }

        match serde_json::from_value::<RendererCommand>(envelope.payload.clone()) {
            Ok(command) => {
                engine.handle(command);
                envelope.reply.settle(json!({"ok": true}));
            }
            Err(e) => {
                warn!(action = envelope.action(), error = %e, "unintelligible renderer command");
                envelope
                    .reply
                    .settle(json!({"ok": false, "error": e.to_string()}));
            }
        }
    }

    // Inbox closed: the context is being torn down.
    engine.shutdown();
    info!("renderer context stopped");
}
