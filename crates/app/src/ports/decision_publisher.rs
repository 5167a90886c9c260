//! Decision publisher port: hands resolved decisions to whatever drives the
//! hardware.

use std::future::Future;

use greenhub_domain::error::GreenhubError;
use greenhub_domain::resolution::ResolvedDecision;

/// Publishes resolved decisions to interested subscribers.
pub trait DecisionPublisher {
    /// Publish a decision to all current subscribers.
    fn publish(
        &self,
        decision: ResolvedDecision,
    ) -> impl Future<Output = Result<(), GreenhubError>> + Send;
}

impl<T: DecisionPublisher + Send + Sync> DecisionPublisher for std::sync::Arc<T> {
    fn publish(
        &self,
        decision: ResolvedDecision,
    ) -> impl Future<Output = Result<(), GreenhubError>> + Send {
        (**self).publish(decision)
    }
}
