// src/daemon/link.rs

use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::daemon::{DaemonLink, DaemonReply, DaemonRequest};
use crate::errors::{ConfdepError, Result};

/// One request in flight, with the channel its reply goes back on.
#[derive(Debug)]
pub struct Envelope {
    pub request: DaemonRequest,
    pub reply: oneshot::Sender<Result<DaemonReply>>,
}

/// [`DaemonLink`] over an in-process tokio channel.
///
/// `forward` uses `blocking_recv`, so it must run on a thread that is not
/// driving an async runtime (a `spawn_blocking` worker or a plain thread).
#[derive(Debug, Clone)]
pub struct ChannelLink {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelLink {
    pub fn new(tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { tx }
    }
}

impl DaemonLink for ChannelLink {
    fn forward(&mut self, request: DaemonRequest) -> Result<DaemonReply> {
        trace!(?request, "forwarding request to daemon");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                request,
                reply: reply_tx,
            })
            .map_err(|_| ConfdepError::Daemon("daemon is not running".to_string()))?;

        reply_rx
            .blocking_recv()
            .map_err(|_| ConfdepError::Daemon("daemon dropped the request".to_string()))?
    }
}
