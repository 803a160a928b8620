//! In-process adapters binding the orchestrator to its peers.
//!
//! [`LocalRendererPlatform`] hosts the renderer as a task in the same
//! process: creation spawns the renderer service, the one-shot ready signal
//! is peeled off into the lifecycle broadcast, and every other renderer event
//! is forwarded to the orchestrator's event pump. [`PageDirectory`] is the
//! host-side view of tabs and their page agents.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use lector_core::protocol::RendererEvent;
use lector_core::TabId;
use lector_messaging::{ChannelPort, Envelope, MessagePort};
use lector_renderer::output::OutputFactory;

use crate::lifecycle::{RendererPlatform, RendererSetupError};

// ── Page directory ─────────────────────────────────────────────────

/// Host-side view of tabs and the agents living in them.
#[async_trait]
pub trait PageDirectory: Send + Sync {
    /// The tab's current URL, `None` when the tab no longer exists.
    async fn page_url(&self, tab: TabId) -> Option<String>;

    /// Port into the tab's page agent. `Some` whenever the tab exists; the
    /// port itself reports "no receiver" when no agent is injected.
    async fn agent_port(&self, tab: TabId) -> Option<Arc<dyn MessagePort>>;

    /// Inject the widget agent into the tab. `false` when injection is
    /// impossible (unsupported page, tab gone).
    async fn inject_agent(&self, tab: TabId) -> bool;
}

// ── Local renderer platform ────────────────────────────────────────

/// Runs the renderer context as an in-process task.
pub struct LocalRendererPlatform {
    outputs: Arc<dyn OutputFactory>,
    ready: broadcast::Sender<()>,
    events: mpsc::UnboundedSender<RendererEvent>,
    inbox: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
}

impl LocalRendererPlatform {
    /// Returns the platform plus the stream of renderer events (everything
    /// except the ready signal, which feeds the lifecycle broadcast instead).
    pub fn new(
        outputs: Arc<dyn OutputFactory>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<RendererEvent>) {
        let (ready, _) = broadcast::channel(4);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let platform = Arc::new(Self {
            outputs,
            ready,
            events: events_tx,
            inbox: Mutex::new(None),
        });
        (platform, events_rx)
    }

    /// Tear down the renderer context by closing its inbox.
    pub fn shutdown(&self) {
        self.inbox
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }

    fn live_inbox(&self) -> Option<mpsc::UnboundedSender<Envelope>> {
        self.inbox
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .filter(|tx| !tx.is_closed())
            .cloned()
    }
}

#[async_trait]
impl RendererPlatform for LocalRendererPlatform {
    async fn renderer_exists(&self) -> bool {
        self.live_inbox().is_some()
    }

    async fn create_renderer(&self) -> Result<(), RendererSetupError> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
        let command_tx = lector_renderer::service::spawn(Arc::clone(&self.outputs), raw_tx);
        *self
            .inbox
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(command_tx);

        // Split the renderer's event stream: the one-shot ready signal feeds
        // the lifecycle broadcast, everything else goes to the orchestrator.
        let ready = self.ready.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                if matches!(event, RendererEvent::Ready) {
                    let _ = ready.send(());
                } else if events.send(event).is_err() {
                    break;
                }
            }
            debug!("renderer event stream closed");
        });
        Ok(())
    }

    fn subscribe_ready(&self) -> broadcast::Receiver<()> {
        self.ready.subscribe()
    }

    async fn renderer_port(&self) -> Option<Arc<dyn MessagePort>> {
        self.live_inbox()
            .map(|tx| Arc::new(ChannelPort::new(tx)) as Arc<dyn MessagePort>)
    }
}
