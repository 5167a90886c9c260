//! Event trigger: a threshold crossing that asserts a temporary `Logic`
//! claim.

use serde::{Deserialize, Serialize};

use crate::channel::DesiredState;
use crate::sensor::SensorRef;

/// Direction of a threshold crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    /// From below the threshold to at-or-above it.
    Rising,
    /// From above the threshold to at-or-below it.
    Falling,
}

/// Fires once per crossing, holding `state` for `hold_secs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTrigger {
    pub name: String,
    pub sensor_ref: SensorRef,
    pub edge: Edge,
    pub threshold: f64,
    pub hold_secs: u32,
    pub state: DesiredState,
}

impl EventTrigger {
    /// Whether moving from `previous` to `current` crosses the threshold in
    /// this trigger's direction.
    #[must_use]
    pub fn crossed(&self, previous: f64, current: f64) -> bool {
        match self.edge {
            Edge::Rising => previous < self.threshold && current >= self.threshold,
            Edge::Falling => previous > self.threshold && current <= self.threshold,
        }
    }
}
