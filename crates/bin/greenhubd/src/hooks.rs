//! Handles through which outside producers feed a running engine.
//!
//! Sensor ingestion writes readings to [`EngineHooks::sensors`]. Manual
//! override, alert and emergency handlers submit and withdraw claims through
//! [`EngineHooks::claims`]. Actuator drivers read commands from
//! [`EngineHooks::decisions`]. The daemon ships no transport for sensors or
//! claims yet, so until one is attached its channels resolve only timer
//! claims and the failsafe.

use std::sync::Arc;

use greenhub_app::claim_intake::ClaimSubmitter;
use greenhub_app::decision_bus::DecisionBus;
use greenhub_app::sensor_board::SensorBoard;

/// Producer-side handles of the engine. Dropping them closes the claim
/// intake.
#[derive(Clone)]
pub struct EngineHooks {
    pub sensors: Arc<SensorBoard>,
    pub claims: ClaimSubmitter,
    pub decisions: Arc<DecisionBus>,
}

impl EngineHooks {
    /// Hand the hooks to every attached producer.
    ///
    /// Returns how many producers were started.
    // TODO: start the MQTT sensor bridge and the manual override API here
    // once those adapters exist.
    #[allow(clippy::unused_self)]
    pub fn attach(&self) -> usize {
        tracing::info!("no sensor or claim producers attached");
        0
    }
}
