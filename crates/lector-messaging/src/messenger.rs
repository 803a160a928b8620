//! The reliable request/reply wrapper.
//!
//! [`Messenger::request`] is the single entry point: probe the destination,
//! post the envelope, await the correlated reply under a deadline, and
//! classify the outcome:
//!
//! | Outcome | Result |
//! |---|---|
//! | Destination handle gone | `Ok(None)`, caller may recover |
//! | Post reports no receiver | `Ok(None)`, caller may recover |
//! | Peer dropped the ticket unsettled | `Ok(None)` |
//! | Reply within deadline | `Ok(Some(reply))` |
//! | Deadline expired | `Err(MessagingError::Timeout)` |
//! | Other delivery fault | `Err(MessagingError::Delivery)` |

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::port::{action_of, Destination, Envelope, PostFault, ReplyTicket, Routes};

/// Default bound on how long a request waits for its reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(4);

/// Failures surfaced by [`Messenger::request`].
#[derive(Debug, Error)]
pub enum MessagingError {
    /// No reply arrived before the deadline.
    #[error("timeout waiting for response from {destination} for action {action}")]
    Timeout {
        destination: Destination,
        action: String,
    },

    /// Delivery failed for a reason other than a missing receiver.
    #[error("failed to deliver '{action}' to {destination}: {detail}")]
    Delivery {
        destination: Destination,
        action: String,
        detail: String,
    },
}

/// Reliable request/reply messaging over a [`Routes`] table.
pub struct Messenger {
    routes: Arc<dyn Routes>,
}

impl Messenger {
    pub fn new(routes: Arc<dyn Routes>) -> Self {
        Self { routes }
    }

    /// Send `payload` to `destination` and await the correlated reply.
    ///
    /// `Ok(None)` means the peer is unavailable (dead handle, no receiver, or
    /// the responder vanished mid-request) — never an error, because the
    /// caller can usually recover by re-establishing the peer. This layer
    /// performs no retries of its own.
    pub async fn request(
        &self,
        destination: Destination,
        payload: Value,
        timeout: Duration,
    ) -> Result<Option<Value>, MessagingError> {
        let action = action_of(&payload).to_owned();
        debug!(%destination, action, "sending request");

        // Liveness probe on the addressing handle, not the peer itself.
        let Some(port) = self.routes.resolve(destination).await else {
            warn!(%destination, action, "destination no longer exists, skipping message");
            return Ok(None);
        };

        let (ticket, reply_rx) = ReplyTicket::new();
        if let Err(fault) = port.post(Envelope {
            payload,
            reply: ticket,
        }) {
            return match fault {
                PostFault::NoReceiver => {
                    warn!(%destination, action, "communication lost with destination");
                    Ok(None)
                }
                PostFault::Channel(detail) => Err(MessagingError::Delivery {
                    destination,
                    action,
                    detail,
                }),
            };
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(Some(reply)),
            // Responder dropped the ticket without settling: the receiving
            // end went away between delivery and reply.
            Ok(Err(_)) => {
                warn!(%destination, action, "peer dropped request without replying");
                Ok(None)
            }
            // Deadline expired; the ticket may still settle later, but the
            // receiver is dropped here so the late reply cannot land.
            Err(_) => Err(MessagingError::Timeout {
                destination,
                action,
            }),
        }
    }

    /// [`request`](Self::request) with the default 4 s deadline.
    pub async fn request_default(
        &self,
        destination: Destination,
        payload: Value,
    ) -> Result<Option<Value>, MessagingError> {
        self.request(destination, payload, DEFAULT_REQUEST_TIMEOUT)
            .await
    }
}

/// Whether a reply object acknowledges success (`{ok: true}`).
pub fn reply_is_ok(reply: &Value) -> bool {
    reply.get("ok").and_then(Value::as_bool) == Some(true)
}
