// src/daemon/server.rs

use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::daemon::{ChannelLink, DaemonRequest, Envelope};
use crate::engine::{CommitSession, SessionRole};
use crate::errors::{ConfdepError, Result};

/// Long-lived host of the daemon-owned dependents queue.
///
/// Owns one [`CommitSession`] in [`SessionRole::DaemonHost`] for its whole
/// lifetime, so the cached graph survives across client commits. Requests
/// are served one at a time; each runs on a blocking worker because
/// subsystem pipelines block.
pub struct ConfigDaemon {
    session: CommitSession,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl fmt::Debug for ConfigDaemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigDaemon")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ConfigDaemon {
    /// Wrap `session` as the daemon host and return the link clients use.
    pub fn new(session: CommitSession) -> (Self, ChannelLink) {
        let (tx, rx) = mpsc::unbounded_channel();
        let daemon = Self {
            session: session.with_role(SessionRole::DaemonHost),
            rx,
        };
        (daemon, ChannelLink::new(tx))
    }

    /// Start the host loop on the current tokio runtime.
    pub fn spawn(session: CommitSession) -> (JoinHandle<Result<()>>, ChannelLink) {
        let (daemon, link) = Self::new(session);
        (tokio::spawn(daemon.run()), link)
    }

    /// Main loop.
    ///
    /// - Receives envelopes until every link is dropped or `Shutdown` arrives.
    /// - Hands each request to the session on a blocking worker.
    /// - Sends the result back; a client that went away is not an error.
    pub async fn run(self) -> Result<()> {
        let Self {
            mut session,
            mut rx,
        } = self;
        info!("config daemon started");

        while let Some(Envelope { request, reply }) = rx.recv().await {
            debug!(?request, "daemon received request");
            let shutdown = request == DaemonRequest::Shutdown;

            let (returned, result) = tokio::task::spawn_blocking(move || {
                let result = session.handle_request(request);
                (session, result)
            })
            .await
            .map_err(|e| ConfdepError::Daemon(format!("daemon worker failed: {e}")))?;
            session = returned;

            if let Err(e) = &result {
                warn!(error = %e, "daemon request failed");
            }
            if reply.send(result).is_err() {
                debug!("client went away before the reply was sent");
            }

            if shutdown {
                break;
            }
        }

        info!("config daemon stopped");
        Ok(())
    }
}
