//! Copy-and-adapt: carry a configuration over to another channel, possibly
//! on different hardware.

use std::collections::BTreeMap;

use super::LogicConfiguration;
use crate::channel::ActuatorChannel;
use crate::error::AdaptationError;
use crate::id::DeviceId;
use crate::sensor::{SensorDescriptor, SensorRef};

/// Inputs for remapping sensor references onto the target device.
#[derive(Debug, Clone, Default)]
pub struct AdaptOptions {
    /// Explicit remapping, consulted first.
    pub sensor_map: BTreeMap<SensorRef, SensorRef>,
    /// Sensors of the source device, used to match by kind.
    pub source_sensors: Vec<SensorDescriptor>,
    /// Sensors available on the target device.
    pub target_sensors: Vec<SensorDescriptor>,
}

/// Rewrite `config` so it can drive `target`.
///
/// Sensor references bound to the source device are remapped, in order, via
/// the explicit map, a sensor with the same name on the target device, or
/// the only target sensor of the same kind. References to a third device
/// are kept. States are coerced to the target actuator kind.
///
/// # Errors
///
/// Returns [`AdaptationError`] listing every reference without a
/// counterpart on the target device.
pub fn adapt(
    config: &LogicConfiguration,
    source: &ActuatorChannel,
    target: &ActuatorChannel,
    options: &AdaptOptions,
) -> Result<LogicConfiguration, AdaptationError> {
    let mapper = Mapper {
        source_device: source.device_id(),
        target_device: target.device_id(),
        options,
    };
    let mut problems = Vec::new();
    let mut adapted = config.clone();

    for (index, condition) in adapted.conditions.iter_mut().enumerate() {
        match mapper.remap(&condition.sensor_ref) {
            Ok(sensor_ref) => condition.sensor_ref = sensor_ref,
            Err(problem) => problems.push(format!("conditions[{index}]: {problem}")),
        }
    }
    for (index, event) in adapted.events.iter_mut().enumerate() {
        match mapper.remap(&event.sensor_ref) {
            Ok(sensor_ref) => event.sensor_ref = sensor_ref,
            Err(problem) => problems.push(format!("events[{index}]: {problem}")),
        }
        event.state = target.kind.coerce_state(event.state);
    }
    if !problems.is_empty() {
        return Err(AdaptationError {
            source_channel: source.id.clone(),
            target_channel: target.id.clone(),
            problems,
        });
    }

    adapted.active_state = target.kind.coerce_state(adapted.active_state);
    adapted.failsafe_state = adapted
        .failsafe_state
        .map(|state| target.kind.coerce_state(state));
    Ok(adapted)
}

struct Mapper<'a> {
    source_device: &'a DeviceId,
    target_device: &'a DeviceId,
    options: &'a AdaptOptions,
}

impl Mapper<'_> {
    fn remap(&self, sensor_ref: &SensorRef) -> Result<SensorRef, String> {
        let qualified = sensor_ref.qualified(self.source_device);
        if let Some(mapped) = self
            .options
            .sensor_map
            .get(sensor_ref)
            .or_else(|| self.options.sensor_map.get(&qualified))
        {
            return Ok(mapped.clone());
        }

        let bound_to_source = match sensor_ref.device_id() {
            None => true,
            Some(device) => device == self.source_device,
        };
        if !bound_to_source {
            return Ok(sensor_ref.clone());
        }

        let found = self
            .target_by_name(sensor_ref.sensor())
            .or_else(|| self.target_by_kind(sensor_ref))
            .ok_or_else(|| {
                format!(
                    "no counterpart for sensor {qualified} on device {}",
                    self.target_device
                )
            })?;

        Ok(match sensor_ref.device_id() {
            None => found.unqualified(),
            Some(_) => found.qualified(self.target_device),
        })
    }

    fn target_by_name(&self, name: &str) -> Option<&SensorRef> {
        self.options
            .target_sensors
            .iter()
            .map(|descriptor| &descriptor.sensor_ref)
            .find(|candidate| candidate.sensor() == name)
    }

    fn target_by_kind(&self, sensor_ref: &SensorRef) -> Option<&SensorRef> {
        let kind = self
            .options
            .source_sensors
            .iter()
            .find(|descriptor| descriptor.sensor_ref.sensor() == sensor_ref.sensor())?
            .kind;
        let mut same_kind = self
            .options
            .target_sensors
            .iter()
            .filter(|descriptor| descriptor.kind == kind);
        match (same_kind.next(), same_kind.next()) {
            (Some(only), None) => Some(&only.sensor_ref),
            _ => None,
        }
    }
}
