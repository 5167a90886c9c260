//! Sensor board: the in-memory snapshot ingestion writes to and evaluation
//! reads from.

use std::sync::{PoisonError, RwLock};

use greenhub_domain::error::EvaluationError;
use greenhub_domain::sensor::{SensorReading, SensorRef, SensorSnapshot};

use crate::ports::SensorSnapshotProvider;

#[derive(Debug, Default)]
pub struct SensorBoard {
    snapshot: RwLock<SensorSnapshot>,
}

impl SensorBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one reading. Out-of-order readings older than the stored one
    /// are ignored.
    pub fn record(&self, sensor: SensorRef, reading: SensorReading) {
        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        snapshot.insert(sensor, reading);
    }

    /// Replace every reading at once.
    pub fn replace(&self, snapshot: SensorSnapshot) {
        let mut current = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = snapshot;
    }
}

impl SensorSnapshotProvider for SensorBoard {
    fn snapshot(&self) -> Result<SensorSnapshot, EvaluationError> {
        Ok(self
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
