// src/daemon/mod.rs

//! Handoff of pending dependents to a long-lived config daemon.
//!
//! A client [`crate::engine::CommitSession`] with a [`DaemonLink`] runs its
//! top-level pipeline locally but forwards every `set_dependents` call, and
//! the final drain, to the daemon. The daemon hosts its own session whose
//! pending queue is the single daemon-owned queue.
//!
//! - [`link`] provides the channel-backed client side.
//! - [`server`] provides the async host loop.

use crate::errors::Result;

pub mod link;
pub mod server;

pub use link::{ChannelLink, Envelope};
pub use server::ConfigDaemon;

/// Request sent from a client session to the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonRequest {
    /// Register the dependents of `caller` for `case` in the daemon queue.
    SetDependents {
        caller: String,
        case: String,
        tag: Option<String>,
    },
    /// Drain the daemon queue on behalf of the top-level invocation `caller`.
    CallDependents { caller: String },
    /// The client commit that registered through `caller` failed; drop
    /// whatever it left queued.
    Discard { caller: String },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonReply {
    Ack,
    /// Display names applied, in order.
    Applied(Vec<String>),
}

/// Client side of the daemon IPC channel.
///
/// `forward` blocks until the daemon has processed the request; sessions
/// call it from inside a running pipeline.
pub trait DaemonLink: Send {
    fn forward(&mut self, request: DaemonRequest) -> Result<DaemonReply>;
}
