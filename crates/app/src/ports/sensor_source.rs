//! Sensor snapshot port: current readings, kept in memory by whoever
//! ingests them.

use greenhub_domain::error::EvaluationError;
use greenhub_domain::sensor::SensorSnapshot;

/// Provides a point-in-time copy of all sensor readings.
///
/// Called once per tick and per channel, so implementations must not block
/// on IO.
pub trait SensorSnapshotProvider {
    /// # Errors
    ///
    /// Returns [`EvaluationError::SnapshotUnavailable`] when no consistent
    /// snapshot can be taken.
    fn snapshot(&self) -> Result<SensorSnapshot, EvaluationError>;
}

impl<T: SensorSnapshotProvider> SensorSnapshotProvider for std::sync::Arc<T> {
    fn snapshot(&self) -> Result<SensorSnapshot, EvaluationError> {
        (**self).snapshot()
    }
}
