//! Sensor snapshot: the readings logic conditions are evaluated against.
//!
//! Snapshots are produced by external collaborators (MQTT bridge, node
//! polling); the engine only reads them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::DeviceId;
use crate::time::Timestamp;

/// Reference to one sensor value: `device/sensor` or a device-local `sensor`.
///
/// A device-local reference resolves against the device owning the channel
/// being evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SensorRef {
    device_id: Option<DeviceId>,
    sensor: String,
}

impl SensorRef {
    /// A reference qualified with its device.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSensorRef`] when `sensor` is empty or
    /// contains `/`.
    pub fn on_device(
        device_id: DeviceId,
        sensor: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let sensor = check_sensor_name(sensor.into())?;
        Ok(Self {
            device_id: Some(device_id),
            sensor,
        })
    }

    /// A reference to a sensor on the channel's own device.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSensorRef`] when `sensor` is empty or
    /// contains `/`.
    pub fn local(sensor: impl Into<String>) -> Result<Self, ValidationError> {
        let sensor = check_sensor_name(sensor.into())?;
        Ok(Self {
            device_id: None,
            sensor,
        })
    }

    #[must_use]
    pub fn device_id(&self) -> Option<&DeviceId> {
        self.device_id.as_ref()
    }

    #[must_use]
    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    /// The same sensor as a device-local reference.
    #[must_use]
    pub fn unqualified(&self) -> Self {
        Self {
            device_id: None,
            sensor: self.sensor.clone(),
        }
    }

    /// The same sensor qualified with `device_id`.
    #[must_use]
    pub fn qualified(&self, device_id: &DeviceId) -> Self {
        Self {
            device_id: Some(device_id.clone()),
            sensor: self.sensor.clone(),
        }
    }
}

fn check_sensor_name(sensor: String) -> Result<String, ValidationError> {
    if sensor.trim().is_empty() || sensor.contains('/') {
        return Err(ValidationError::InvalidSensorRef(sensor));
    }
    Ok(sensor)
}

impl fmt::Display for SensorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.device_id {
            Some(device) => write!(f, "{device}/{}", self.sensor),
            None => f.write_str(&self.sensor),
        }
    }
}

impl FromStr for SensorRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((device, sensor)) => {
                let device = DeviceId::new(device)
                    .map_err(|_| ValidationError::InvalidSensorRef(s.to_string()))?;
                Self::on_device(device, sensor)
            }
            None => Self::local(s),
        }
    }
}

impl TryFrom<String> for SensorRef {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SensorRef> for String {
    fn from(value: SensorRef) -> Self {
        value.to_string()
    }
}

/// Raw value reported by a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Number(f64),
    Text(String),
}

impl SensorValue {
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

/// Quality flag attached to a reading by the node or the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Good,
    Uncertain,
    Bad,
}

/// One sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub value: SensorValue,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub quality: Quality,
}

impl SensorReading {
    #[must_use]
    pub fn number(value: f64, timestamp: Timestamp) -> Self {
        Self {
            value: SensorValue::Number(value),
            timestamp,
            quality: Quality::Good,
        }
    }

    #[must_use]
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }
}

/// Point-in-time view of every known sensor value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    readings: HashMap<SensorRef, SensorReading>,
}

impl SensorSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reading, replacing an older one for the same sensor.
    ///
    /// Readings older than the stored one are ignored.
    pub fn insert(&mut self, sensor: SensorRef, reading: SensorReading) {
        match self.readings.get(&sensor) {
            Some(existing) if existing.timestamp > reading.timestamp => {}
            _ => {
                self.readings.insert(sensor, reading);
            }
        }
    }

    #[must_use]
    pub fn with(mut self, sensor: SensorRef, reading: SensorReading) -> Self {
        self.insert(sensor, reading);
        self
    }

    /// Look up a sensor as seen from a channel on `device_id`.
    ///
    /// Device-local references match either a local key or the key qualified
    /// with `device_id`.
    #[must_use]
    pub fn lookup(&self, sensor: &SensorRef, device_id: &DeviceId) -> Option<&SensorReading> {
        self.readings.get(sensor).or_else(|| {
            sensor
                .device_id()
                .is_none()
                .then(|| self.readings.get(&sensor.qualified(device_id)))
                .flatten()
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Physical quantity a sensor measures; used to remap references between
/// devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Humidity,
    SoilMoisture,
    Light,
    WaterLevel,
    Co2,
    Ph,
    Other,
}

/// A sensor a device exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    pub sensor_ref: SensorRef,
    pub kind: SensorKind,
}
