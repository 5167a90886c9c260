//! Channel: one addressable actuator output on one device.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::DeviceId;

/// What kind of hardware sits behind a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorKind {
    Pump,
    Led,
    Heater,
    Fan,
    Valve,
    Relay,
}

impl ActuatorKind {
    /// Whether the actuator accepts an analog `0..=100` level.
    #[must_use]
    pub fn is_dimmable(self) -> bool {
        matches!(self, Self::Led | Self::Fan)
    }

    /// The off/closed state used when nothing else is known.
    #[must_use]
    pub fn conservative_state(self) -> DesiredState {
        if self.is_dimmable() {
            DesiredState::Level(0)
        } else {
            DesiredState::Binary(false)
        }
    }

    /// Check that `state` can be applied to this kind of actuator.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::LevelOutOfRange`] for levels above 100 and
    /// [`ValidationError::LevelOnBinaryActuator`] for levels on on/off hardware.
    pub fn check_state(self, state: DesiredState) -> Result<(), ValidationError> {
        match state {
            DesiredState::Binary(_) => Ok(()),
            DesiredState::Level(level) if level > DesiredState::MAX_LEVEL => {
                Err(ValidationError::LevelOutOfRange(level))
            }
            DesiredState::Level(_) if !self.is_dimmable() => {
                Err(ValidationError::LevelOnBinaryActuator { kind: self })
            }
            DesiredState::Level(_) => Ok(()),
        }
    }

    /// Coerce `state` into something this actuator accepts.
    ///
    /// On/off hardware treats any non-zero level as on; dimmable hardware
    /// maps on to full level.
    #[must_use]
    pub fn coerce_state(self, state: DesiredState) -> DesiredState {
        match (self.is_dimmable(), state) {
            (false, DesiredState::Level(level)) => DesiredState::Binary(level > 0),
            (true, DesiredState::Binary(on)) => {
                DesiredState::Level(if on { DesiredState::MAX_LEVEL } else { 0 })
            }
            (true, DesiredState::Level(level)) => {
                DesiredState::Level(level.min(DesiredState::MAX_LEVEL))
            }
            (false, DesiredState::Binary(_)) => state,
        }
    }

    /// Lowercase name, as accepted by [`FromStr`] and stored by adapters.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pump => "pump",
            Self::Led => "led",
            Self::Heater => "heater",
            Self::Fan => "fan",
            Self::Valve => "valve",
            Self::Relay => "relay",
        }
    }
}

impl fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActuatorKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pump" => Ok(Self::Pump),
            "led" | "light" => Ok(Self::Led),
            "heater" => Ok(Self::Heater),
            "fan" => Ok(Self::Fan),
            "valve" => Ok(Self::Valve),
            "relay" => Ok(Self::Relay),
            _ => Err(ValidationError::UnknownActuatorKind(s.to_string())),
        }
    }
}

/// A commanded actuator state: on/off or an analog level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DesiredState {
    Binary(bool),
    Level(u8),
}

impl DesiredState {
    pub const MAX_LEVEL: u8 = 100;

    /// Whether the actuator is driven at all.
    #[must_use]
    pub fn is_active(self) -> bool {
        match self {
            Self::Binary(on) => on,
            Self::Level(level) => level > 0,
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary(true) => f.write_str("on"),
            Self::Binary(false) => f.write_str("off"),
            Self::Level(level) => write!(f, "{level}%"),
        }
    }
}

/// Lookup key of a channel: the device and the GPIO pin it drives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId {
    pub device_id: DeviceId,
    pub gpio: u8,
}

impl ChannelId {
    #[must_use]
    pub fn new(device_id: DeviceId, gpio: u8) -> Self {
        Self { device_id, gpio }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device_id, self.gpio)
    }
}

/// A physical actuator output. Identity never changes once configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActuatorChannel {
    pub id: ChannelId,
    pub kind: ActuatorKind,
}

impl ActuatorChannel {
    #[must_use]
    pub fn new(device_id: DeviceId, gpio: u8, kind: ActuatorKind) -> Self {
        Self {
            id: ChannelId::new(device_id, gpio),
            kind,
        }
    }

    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        &self.id.device_id
    }
}

impl fmt::Display for ActuatorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str) -> DeviceId {
        DeviceId::new(id).unwrap()
    }

    #[test]
    fn should_use_off_as_conservative_state_for_binary_kinds() {
        assert_eq!(
            ActuatorKind::Valve.conservative_state(),
            DesiredState::Binary(false)
        );
        assert_eq!(
            ActuatorKind::Pump.conservative_state(),
            DesiredState::Binary(false)
        );
    }

    #[test]
    fn should_use_zero_level_as_conservative_state_for_dimmable_kinds() {
        assert_eq!(ActuatorKind::Led.conservative_state(), DesiredState::Level(0));
        assert_eq!(ActuatorKind::Fan.conservative_state(), DesiredState::Level(0));
    }

    #[test]
    fn should_reject_level_on_binary_actuator() {
        let result = ActuatorKind::Pump.check_state(DesiredState::Level(40));
        assert_eq!(
            result,
            Err(ValidationError::LevelOnBinaryActuator {
                kind: ActuatorKind::Pump
            })
        );
    }

    #[test]
    fn should_reject_level_above_hundred() {
        let result = ActuatorKind::Led.check_state(DesiredState::Level(101));
        assert_eq!(result, Err(ValidationError::LevelOutOfRange(101)));
    }

    #[test]
    fn should_accept_binary_state_on_any_actuator() {
        assert!(
            ActuatorKind::Led
                .check_state(DesiredState::Binary(true))
                .is_ok()
        );
        assert!(
            ActuatorKind::Relay
                .check_state(DesiredState::Binary(false))
                .is_ok()
        );
    }

    #[test]
    fn should_coerce_level_to_binary_for_on_off_hardware() {
        assert_eq!(
            ActuatorKind::Heater.coerce_state(DesiredState::Level(30)),
            DesiredState::Binary(true)
        );
        assert_eq!(
            ActuatorKind::Heater.coerce_state(DesiredState::Level(0)),
            DesiredState::Binary(false)
        );
        assert_eq!(
            ActuatorKind::Led.coerce_state(DesiredState::Binary(true)),
            DesiredState::Level(100)
        );
    }

    #[test]
    fn should_parse_actuator_kind_case_insensitively() {
        assert_eq!("PUMP".parse::<ActuatorKind>().unwrap(), ActuatorKind::Pump);
        assert_eq!("light".parse::<ActuatorKind>().unwrap(), ActuatorKind::Led);
        assert!("blender".parse::<ActuatorKind>().is_err());
    }

    #[test]
    fn should_parse_back_every_kind_name() {
        for kind in [
            ActuatorKind::Pump,
            ActuatorKind::Led,
            ActuatorKind::Heater,
            ActuatorKind::Fan,
            ActuatorKind::Valve,
            ActuatorKind::Relay,
        ] {
            assert_eq!(kind.as_str().parse::<ActuatorKind>(), Ok(kind));
        }
        assert_eq!(ActuatorKind::Led.as_str(), "led");
    }

    #[test]
    fn should_serialize_desired_state_untagged() {
        assert_eq!(
            serde_json::to_string(&DesiredState::Binary(true)).unwrap(),
            "true"
        );
        assert_eq!(serde_json::to_string(&DesiredState::Level(55)).unwrap(), "55");
        let parsed: DesiredState = serde_json::from_str("false").unwrap();
        assert_eq!(parsed, DesiredState::Binary(false));
    }

    #[test]
    fn should_display_channel_with_kind_device_and_pin() {
        let channel = ActuatorChannel::new(device("esp32-a"), 4, ActuatorKind::Valve);
        assert_eq!(channel.to_string(), "valve@esp32-a:4");
        assert_eq!(channel.id.to_string(), "esp32-a:4");
    }
}
