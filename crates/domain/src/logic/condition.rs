//! Condition: a sensor threshold test feeding the `Logic` source.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::DeviceId;
use crate::sensor::{Quality, SensorRef, SensorSnapshot, SensorValue};
use crate::time::Timestamp;

/// Readings older than this are treated as missing.
pub const DEFAULT_STALENESS_SECS: i64 = 300;

/// Comparison applied between a reading and a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Operator {
    /// Apply the operator to the raw value. No tolerance is applied.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Lt => value < threshold,
            Self::Gt => value > threshold,
            Self::Le => value <= threshold,
            Self::Ge => value >= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<" | "lt" => Ok(Self::Lt),
            ">" | "gt" => Ok(Self::Gt),
            "<=" | "le" | "lte" => Ok(Self::Le),
            ">=" | "ge" | "gte" => Ok(Self::Ge),
            "==" | "=" | "eq" => Ok(Self::Eq),
            "!=" | "ne" => Ok(Self::Ne),
            other => Err(ValidationError::UnknownOperator(other.to_string())),
        }
    }
}

/// How the conditions of one configuration combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionMode {
    /// Every condition must hold.
    #[default]
    All,
    /// At least one condition must hold.
    Any,
}

/// `sensor_ref operator threshold`, e.g. `temp1 > 25`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub sensor_ref: SensorRef,
    pub operator: Operator,
    pub threshold: f64,
}

impl Condition {
    #[must_use]
    pub fn new(sensor_ref: SensorRef, operator: Operator, threshold: f64) -> Self {
        Self {
            sensor_ref,
            operator,
            threshold,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.sensor_ref, self.operator, self.threshold)
    }
}

/// Why a condition could not be checked. Every fault fails the condition.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorFault {
    Missing { sensor: SensorRef },
    Stale { sensor: SensorRef, age_secs: i64 },
    BadQuality { sensor: SensorRef, quality: Quality },
    TypeMismatch { sensor: SensorRef, value: String },
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { sensor } => write!(f, "{sensor}: no reading"),
            Self::Stale { sensor, age_secs } => write!(f, "{sensor}: reading is {age_secs}s old"),
            Self::BadQuality { sensor, quality } => {
                write!(f, "{sensor}: quality is {quality:?}")
            }
            Self::TypeMismatch { sensor, value } => {
                write!(f, "{sensor}: non-numeric value `{value}`")
            }
        }
    }
}

/// Result of evaluating a condition list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionOutcome {
    pub satisfied: bool,
    /// Human-readable description of the conditions that held.
    pub matched: Vec<String>,
    pub faults: Vec<SensorFault>,
}

impl ConditionOutcome {
    /// Reason string attached to the `Logic` claim.
    #[must_use]
    pub fn reason(&self) -> String {
        if self.matched.is_empty() {
            "conditions met".to_string()
        } else {
            self.matched.join(", ")
        }
    }
}

/// Inputs that stay fixed while evaluating one channel.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub snapshot: &'a SensorSnapshot,
    /// Device owning the channel; resolves device-local references.
    pub device_id: &'a DeviceId,
    pub now: Timestamp,
    pub staleness: Duration,
}

/// Evaluate `conditions` against a snapshot.
///
/// Missing, stale, bad-quality and non-numeric readings fail their condition
/// and are reported in [`ConditionOutcome::faults`]; they never abort
/// evaluation. An empty list is vacuously satisfied under
/// [`ConditionMode::All`] and unsatisfied under [`ConditionMode::Any`].
#[must_use]
pub fn evaluate_conditions(
    mode: ConditionMode,
    conditions: &[Condition],
    ctx: &EvaluationContext<'_>,
) -> ConditionOutcome {
    let mut outcome = ConditionOutcome::default();
    let mut results = Vec::with_capacity(conditions.len());

    for condition in conditions {
        match check(condition, ctx) {
            Ok(true) => {
                outcome.matched.push(condition.to_string());
                results.push(true);
            }
            Ok(false) => results.push(false),
            Err(fault) => {
                outcome.faults.push(fault);
                results.push(false);
            }
        }
    }

    outcome.satisfied = match mode {
        ConditionMode::All => results.iter().all(|held| *held),
        ConditionMode::Any => results.iter().any(|held| *held),
    };
    outcome
}

fn check(condition: &Condition, ctx: &EvaluationContext<'_>) -> Result<bool, SensorFault> {
    let sensor = &condition.sensor_ref;
    let reading = ctx
        .snapshot
        .lookup(sensor, ctx.device_id)
        .ok_or_else(|| SensorFault::Missing {
            sensor: sensor.clone(),
        })?;

    if reading.quality != Quality::Good {
        return Err(SensorFault::BadQuality {
            sensor: sensor.clone(),
            quality: reading.quality,
        });
    }

    let age = ctx.now.signed_duration_since(reading.timestamp);
    if age > ctx.staleness {
        return Err(SensorFault::Stale {
            sensor: sensor.clone(),
            age_secs: age.num_seconds(),
        });
    }

    match &reading.value {
        SensorValue::Number(value) => Ok(condition.operator.compare(*value, condition.threshold)),
        SensorValue::Text(text) if matches!(condition.operator, Operator::Eq | Operator::Ne) => {
            match text.trim().parse::<f64>() {
                Ok(value) => Ok(condition.operator.compare(value, condition.threshold)),
                Err(_) => Err(SensorFault::TypeMismatch {
                    sensor: sensor.clone(),
                    value: text.clone(),
                }),
            }
        }
        SensorValue::Text(text) => Err(SensorFault::TypeMismatch {
            sensor: sensor.clone(),
            value: text.clone(),
        }),
    }
}
