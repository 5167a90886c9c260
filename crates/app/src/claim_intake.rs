//! Claim intake: the typed channel producers use to reach the source
//! registry.
//!
//! Producers (manual overrides, alerts, schedules, emergency stops) hold a
//! cloneable [`ClaimSubmitter`]; a single [`ClaimIntake`] task drains the
//! queue into the [`SourceRegistry`], so submissions are applied one at a
//! time in arrival order.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use greenhub_domain::channel::ChannelId;
use greenhub_domain::claim::{ControlClaim, SourceKind};
use greenhub_domain::error::ClaimError;

use crate::source_registry::SourceRegistry;

#[derive(Debug)]
enum Request {
    Submit {
        claim: ControlClaim,
        reply: oneshot::Sender<Result<(), ClaimError>>,
    },
    Withdraw {
        channel: ChannelId,
        source: SourceKind,
    },
}

/// Producer-side handle for submitting and withdrawing claims.
#[derive(Debug, Clone)]
pub struct ClaimSubmitter {
    sender: mpsc::Sender<Request>,
}

impl ClaimSubmitter {
    /// Queue a claim and wait until the registry accepted or rejected it.
    ///
    /// # Errors
    ///
    /// Returns the registry's [`ClaimError`], or [`ClaimError::IntakeClosed`]
    /// when the intake task has stopped.
    pub async fn submit(&self, claim: ControlClaim) -> Result<(), ClaimError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Request::Submit { claim, reply })
            .await
            .map_err(|_| ClaimError::IntakeClosed)?;
        response.await.map_err(|_| ClaimError::IntakeClosed)?
    }

    /// Queue the withdrawal of `source`'s claim on a channel.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::IntakeClosed`] when the intake task has stopped.
    pub async fn withdraw(&self, channel: ChannelId, source: SourceKind) -> Result<(), ClaimError> {
        self.sender
            .send(Request::Withdraw { channel, source })
            .await
            .map_err(|_| ClaimError::IntakeClosed)
    }
}

/// Consumer side: applies queued requests to the registry.
pub struct ClaimIntake {
    registry: Arc<SourceRegistry>,
    receiver: mpsc::Receiver<Request>,
}

impl ClaimIntake {
    /// Create the intake and its first submitter. `capacity` bounds the
    /// queue; producers wait when it is full.
    #[must_use]
    pub fn new(registry: Arc<SourceRegistry>, capacity: usize) -> (Self, ClaimSubmitter) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { registry, receiver }, ClaimSubmitter { sender })
    }

    /// Drain the queue until every submitter has been dropped.
    pub async fn run(mut self) {
        while let Some(request) = self.receiver.recv().await {
            self.handle(request);
        }
        tracing::debug!("claim intake closed");
    }

    fn handle(&self, request: Request) {
        match request {
            Request::Submit { claim, reply } => {
                let channel = claim.channel.id.clone();
                let source = claim.source;
                let result = self.registry.submit(claim);
                if let Err(err) = &result {
                    tracing::warn!(
                        channel = %channel,
                        source = ?source,
                        error = %err,
                        "claim rejected"
                    );
                }
                // the producer may have given up waiting
                let _ = reply.send(result);
            }
            Request::Withdraw { channel, source } => {
                self.registry.withdraw(&channel, source);
            }
        }
    }
}
