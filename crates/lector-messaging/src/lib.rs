//! Reliable request/reply messaging between isolated execution contexts.
//!
//! The three lector contexts (page agent, orchestrator, renderer) share no
//! memory and talk exclusively through asynchronous, potentially lossy
//! message passing. This crate wraps the raw "post a message, hope someone
//! answers" primitive with the reliability contract every caller needs:
//!
//! - a liveness probe on the addressing handle before delivery is attempted,
//! - a deadline timer per request,
//! - classification of "peer has no live receiver" as a recoverable `None`
//!   rather than an error,
//! - exactly-once settlement even when a reply races the deadline.
//!
//! Retry policy deliberately lives with the callers; this layer never retries
//! on its own.

pub mod messenger;
pub mod port;

pub use messenger::{reply_is_ok, Messenger, MessagingError, DEFAULT_REQUEST_TIMEOUT};
pub use port::{ChannelPort, Destination, Envelope, MessagePort, PostFault, ReplyTicket, Routes};
