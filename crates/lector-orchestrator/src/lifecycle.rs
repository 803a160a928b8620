//! Single-flight renderer lifecycle management.
//!
//! Many pipeline steps may simultaneously discover the renderer missing;
//! creating it twice would double audio playback. [`RendererLifecycle::ensure`]
//! collapses concurrent demand onto one creation attempt whose outcome every
//! caller observes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use lector_messaging::MessagePort;

/// What the lifecycle needs from the host to manage the renderer context.
#[async_trait]
pub trait RendererPlatform: Send + Sync {
    /// Whether a live renderer context currently exists.
    async fn renderer_exists(&self) -> bool;

    /// Create the renderer context. Readiness arrives separately via the
    /// broadcast; creation returning is not readiness.
    async fn create_renderer(&self) -> Result<(), RendererSetupError>;

    /// Subscribe to the renderer's one-shot readiness signal. Must be called
    /// before `create_renderer` to avoid missing an immediate signal.
    fn subscribe_ready(&self) -> broadcast::Receiver<()>;

    /// Port into the renderer's inbox, `None` while absent.
    async fn renderer_port(&self) -> Option<Arc<dyn MessagePort>>;
}

/// Failure to bring up the renderer context. Cloneable so one attempt's
/// outcome can be broadcast to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RendererSetupError {
    #[error("timed out waiting for renderer ready signal")]
    ReadyTimeout,

    #[error("failed to create renderer context: {0}")]
    Creation(String),
}

type AttemptOutcome = Option<Result<(), RendererSetupError>>;

/// Idempotent, concurrency-safe "make sure the renderer exists".
pub struct RendererLifecycle {
    platform: Arc<dyn RendererPlatform>,
    ready_timeout: Duration,
    // The in-flight attempt, observable by late joiners. The attempt task
    // clears this exactly once, at its terminal outcome, before broadcasting.
    inflight: Arc<Mutex<Option<watch::Receiver<AttemptOutcome>>>>,
}

impl RendererLifecycle {
    pub fn new(platform: Arc<dyn RendererPlatform>, ready_timeout: Duration) -> Self {
        Self {
            platform,
            ready_timeout,
            inflight: Arc::new(Mutex::new(None)),
        }
    }

    /// Return once a live renderer exists, joining any in-flight creation.
    ///
    /// N concurrent callers observe a single underlying creation and share
    /// its outcome. A failed attempt clears the guard, so the next call
    /// starts fresh.
    pub async fn ensure(&self) -> Result<(), RendererSetupError> {
        if self.platform.renderer_exists().await {
            return Ok(());
        }

        let mut outcome_rx = {
            let mut guard = self.inflight.lock().await;
            if let Some(rx) = guard.as_ref() {
                debug!("renderer creation already in flight, joining");
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                *guard = Some(rx.clone());

                let platform = Arc::clone(&self.platform);
                let inflight = Arc::clone(&self.inflight);
                let deadline = self.ready_timeout;
                tokio::spawn(async move {
                    let outcome = create_and_await_ready(platform, deadline).await;
                    // Clear before publishing: a waiter that sees the outcome
                    // must be able to retry immediately.
                    *inflight.lock().await = None;
                    let _ = tx.send(Some(outcome));
                });
                rx
            }
        };

        let settled = outcome_rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| RendererSetupError::Creation("renderer setup task aborted".to_owned()))?;
        match settled.as_ref() {
            Some(result) => result.clone(),
            None => Err(RendererSetupError::Creation(
                "renderer setup outcome missing".to_owned(),
            )),
        }
    }
}

async fn create_and_await_ready(
    platform: Arc<dyn RendererPlatform>,
    deadline: Duration,
) -> Result<(), RendererSetupError> {
    // Subscribe first: a renderer that signals ready immediately after
    // creation must not be missed.
    let mut ready = platform.subscribe_ready();

    info!("creating renderer context");
    platform.create_renderer().await?;

    match tokio::time::timeout(deadline, ready.recv()).await {
        Ok(Ok(())) => {
            info!("renderer context ready");
            Ok(())
        }
        Ok(Err(_)) | Err(_) => {
            warn!("renderer did not signal ready before the deadline");
            Err(RendererSetupError::ReadyTimeout)
        }
    }
}
