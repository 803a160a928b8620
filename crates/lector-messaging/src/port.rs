//! Raw delivery abstractions the reliable layer is built on.
//!
//! A [`MessagePort`] is the unreliable primitive: it accepts an envelope or
//! reports a delivery fault, nothing more. [`Routes`] resolves a logical
//! [`Destination`] to a live port, doubling as the liveness probe: a dead
//! destination resolves to `None` before any delivery is attempted.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use lector_core::TabId;

// ── Destination ────────────────────────────────────────────────────

/// Logical address of a peer context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// The page agent living in a specific tab.
    Tab(TabId),
    /// The audio renderer context (at most one exists).
    Renderer,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tab(tab) => write!(f, "{tab}"),
            Self::Renderer => write!(f, "renderer"),
        }
    }
}

// ── Reply ticket ───────────────────────────────────────────────────

/// One-shot settlement handle delivered alongside each request.
///
/// The responder consumes the ticket with [`settle`](Self::settle); dropping
/// it unsettled tells the requester the peer vanished mid-request. Because
/// the underlying channel is one-shot and the ticket is consumed by value,
/// at most one settlement can ever occur; a late reply racing a timeout
/// finds the receiving side gone and is discarded.
#[derive(Debug)]
pub struct ReplyTicket(oneshot::Sender<Value>);

impl ReplyTicket {
    /// Create a ticket plus the receiver the requester awaits.
    pub fn new() -> (Self, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    /// Deliver the reply. Returns `false` if the requester already gave up
    /// (deadline expired or request cancelled).
    pub fn settle(self, reply: Value) -> bool {
        self.0.send(reply).is_ok()
    }
}

// ── Envelope ───────────────────────────────────────────────────────

/// A request in flight: the opaque tagged payload plus its reply ticket.
#[derive(Debug)]
pub struct Envelope {
    /// JSON object tagged with an `action` field; opaque to this layer.
    pub payload: Value,
    /// Settlement handle for the correlated reply.
    pub reply: ReplyTicket,
}

impl Envelope {
    /// The payload's `action` tag, for logging and error reporting.
    pub fn action(&self) -> &str {
        action_of(&self.payload)
    }
}

/// Extract the `action` tag from a payload, or `"?"` when absent.
pub(crate) fn action_of(payload: &Value) -> &str {
    payload.get("action").and_then(Value::as_str).unwrap_or("?")
}

// ── Port ───────────────────────────────────────────────────────────

/// Fault reported by a raw post attempt.
#[derive(Debug, Error)]
pub enum PostFault {
    /// The destination context exists but has no live receiver (agent not
    /// yet injected, renderer torn down). Recoverable by the caller.
    #[error("receiving end does not exist")]
    NoReceiver,

    /// Any other delivery fault; escalated to the caller as an error.
    #[error("delivery fault: {0}")]
    Channel(String),
}

/// Raw, unreliable message submission to one peer context.
pub trait MessagePort: Send + Sync {
    /// Hand the envelope to the peer's inbox.
    fn post(&self, envelope: Envelope) -> Result<(), PostFault>;
}

/// The standard in-process port: an unbounded channel into the peer's task.
///
/// A closed channel (peer task exited) surfaces as [`PostFault::NoReceiver`],
/// matching the "message port closed" classification.
pub struct ChannelPort {
    inbox: mpsc::UnboundedSender<Envelope>,
}

impl ChannelPort {
    pub fn new(inbox: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { inbox }
    }
}

impl MessagePort for ChannelPort {
    fn post(&self, envelope: Envelope) -> Result<(), PostFault> {
        self.inbox.send(envelope).map_err(|_| PostFault::NoReceiver)
    }
}

// ── Routing ────────────────────────────────────────────────────────

/// Resolve a destination to a live port.
///
/// Returning `None` is the liveness verdict: the addressing handle itself is
/// gone (tab closed, renderer never created). The reliable layer then skips
/// delivery entirely and reports the peer as unavailable.
#[async_trait]
pub trait Routes: Send + Sync {
    async fn resolve(&self, destination: Destination) -> Option<Arc<dyn MessagePort>>;
}
