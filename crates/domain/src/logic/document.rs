//! Logic document: the exchange format for import/export and cross-device
//! copies.
//!
//! Export goes through the typed [`LogicDocument`]. Import walks the raw JSON
//! instead, so that every offending field can be reported at once and, in
//! repair mode, well-formed entries can be salvaged from a damaged document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::condition::{Condition, ConditionMode, Operator};
use super::event::EventTrigger;
use super::timer::{DaySet, TimeOfDay, TimerWindow};
use super::{DEFAULT_INTERVAL_MS, LogicConfiguration, MIN_INTERVAL_MS};
use crate::channel::{ActuatorChannel, ActuatorKind, DesiredState};
use crate::claim::SourceKind;
use crate::error::{FieldIssue, SchemaValidationError};
use crate::id::DeviceId;
use crate::sensor::SensorRef;
use crate::time::Timestamp;

/// Current document schema version.
pub const SCHEMA_VERSION: u64 = 1;

/// Serializable form of one channel's logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicDocument {
    pub version: u64,
    pub device_id: DeviceId,
    pub gpio: u8,
    pub actuator: ActuatorSection,
    pub dependencies: Vec<DependencySection>,
    pub timers: Vec<TimerWindow>,
    pub events: Vec<EventTrigger>,
    pub configuration: ConfigurationSection,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorSection {
    #[serde(rename = "type")]
    pub kind: ActuatorKind,
    pub name: String,
    pub gpio: u8,
}

/// A sensor condition as written in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencySection {
    #[serde(rename = "type")]
    pub kind: String,
    pub sensor_ref: SensorRef,
    pub operator: Operator,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSection {
    pub enabled: bool,
    pub condition_mode: ConditionMode,
    /// Milliseconds.
    pub evaluation_interval: u64,
    pub failsafe_state: Option<DesiredState>,
    pub active_state: DesiredState,
    /// Priority overrides, strongest first.
    pub priority: Vec<SourceKind>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub last_modified: Option<Timestamp>,
}

const SENSOR_DEPENDENCY: &str = "sensor";

impl LogicDocument {
    /// Build the document for `config` driving `channel`.
    #[must_use]
    pub fn from_configuration(
        channel: &ActuatorChannel,
        config: &LogicConfiguration,
        metadata: DocumentMetadata,
    ) -> Self {
        Self {
            version: SCHEMA_VERSION,
            device_id: channel.id.device_id.clone(),
            gpio: channel.id.gpio,
            actuator: ActuatorSection {
                kind: channel.kind,
                name: channel.to_string(),
                gpio: channel.id.gpio,
            },
            dependencies: config
                .conditions
                .iter()
                .map(|c| DependencySection {
                    kind: SENSOR_DEPENDENCY.to_string(),
                    sensor_ref: c.sensor_ref.clone(),
                    operator: c.operator,
                    threshold: c.threshold,
                })
                .collect(),
            timers: config.timers.clone(),
            events: config.events.clone(),
            configuration: ConfigurationSection {
                enabled: config.enabled,
                condition_mode: config.condition_mode,
                evaluation_interval: config.evaluation_interval_ms,
                failsafe_state: config.failsafe_state,
                active_state: config.active_state,
                priority: config.priority_overrides.clone(),
            },
            metadata,
        }
    }

    /// Serialize to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if a threshold is not a finite number.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Strictly parse a document for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaValidationError`] listing every offending field; no
    /// partial configuration is produced.
    pub fn parse(
        document: &Value,
        target: &ActuatorChannel,
    ) -> Result<LogicConfiguration, SchemaValidationError> {
        let (config, warnings) = Reader::new(target).read(document)?;
        if warnings.is_empty() {
            Ok(config)
        } else {
            Err(SchemaValidationError {
                issues: warnings
                    .into_iter()
                    .map(|w| FieldIssue {
                        path: w.path,
                        problem: w.problem,
                    })
                    .collect(),
            })
        }
    }

    /// Parse a possibly damaged document, keeping what is well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaValidationError`] only when nothing can be salvaged
    /// (the document is not a JSON object).
    pub fn parse_with_repair(
        document: &Value,
        target: &ActuatorChannel,
    ) -> Result<RepairReport, SchemaValidationError> {
        let (config, warnings) = Reader::new(target).read(document)?;
        Ok(RepairReport { config, warnings })
    }
}

/// One problem found while repairing a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairWarning {
    pub path: String,
    pub problem: String,
    pub suggestion: String,
}

impl std::fmt::Display for RepairWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.path, self.problem, self.suggestion)
    }
}

/// Read-only preview of a repaired import. Nothing is applied until the
/// caller explicitly accepts it.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairReport {
    config: LogicConfiguration,
    warnings: Vec<RepairWarning>,
}

impl RepairReport {
    #[must_use]
    pub fn config(&self) -> &LogicConfiguration {
        &self.config
    }

    #[must_use]
    pub fn warnings(&self) -> &[RepairWarning] {
        &self.warnings
    }

    /// Whether the document needed no repair.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    #[must_use]
    pub fn into_configuration(self) -> LogicConfiguration {
        self.config
    }
}

struct Reader<'a> {
    target: &'a ActuatorChannel,
    warnings: Vec<RepairWarning>,
}

impl<'a> Reader<'a> {
    fn new(target: &'a ActuatorChannel) -> Self {
        Self {
            target,
            warnings: Vec::new(),
        }
    }

    fn warn(
        &mut self,
        path: impl Into<String>,
        problem: impl Into<String>,
        suggestion: impl Into<String>,
    ) {
        self.warnings.push(RepairWarning {
            path: path.into(),
            problem: problem.into(),
            suggestion: suggestion.into(),
        });
    }

    fn read(
        mut self,
        document: &Value,
    ) -> Result<(LogicConfiguration, Vec<RepairWarning>), SchemaValidationError> {
        let Some(root) = document.as_object() else {
            return Err(SchemaValidationError {
                issues: vec![FieldIssue {
                    path: "$".to_string(),
                    problem: "document must be a JSON object".to_string(),
                }],
            });
        };

        self.read_header(root);
        self.read_actuator(root.get("actuator"));

        let mut config = self.read_configuration(root.get("configuration"));
        config.conditions = self.read_list(
            root.get("dependencies"),
            "dependencies",
            Self::read_dependency,
        );
        config.timers = self.read_list(root.get("timers"), "timers", Self::read_timer);
        config.events = self.read_list(root.get("events"), "events", Self::read_event);

        if let Some(metadata) = root.get("metadata")
            && !metadata.is_object()
        {
            self.warn(
                "metadata",
                "expected an object",
                "metadata is ignored on import",
            );
        }

        Ok((config, self.warnings))
    }

    fn read_header(&mut self, root: &Map<String, Value>) {
        match root.get("version") {
            None => self.warn(
                "version",
                "missing required field",
                format!("set version to {SCHEMA_VERSION}"),
            ),
            Some(value) => match value.as_u64() {
                Some(version) if (1..=SCHEMA_VERSION).contains(&version) => {}
                Some(version) => self.warn(
                    "version",
                    format!("unsupported schema version {version}"),
                    format!("export the document again with schema version {SCHEMA_VERSION}"),
                ),
                None => self.warn(
                    "version",
                    "expected an integer",
                    format!("set version to {SCHEMA_VERSION}"),
                ),
            },
        }
        if let Some(value) = root.get("device_id")
            && value
                .as_str()
                .and_then(|s| DeviceId::new(s).ok())
                .is_none()
        {
            self.warn(
                "device_id",
                "expected a device id string",
                "the target channel's device is used",
            );
        }
        if let Some(value) = root.get("gpio")
            && as_u8(value).is_none()
        {
            self.warn(
                "gpio",
                "expected a pin number 0..=255",
                "the target channel's pin is used",
            );
        }
    }

    fn read_actuator(&mut self, actuator: Option<&Value>) {
        let target_kind = self.target.kind;
        let Some(actuator) = actuator else {
            self.warn(
                "actuator",
                "missing required field",
                format!("add an actuator section with type \"{target_kind}\""),
            );
            return;
        };
        let Some(actuator) = actuator.as_object() else {
            self.warn(
                "actuator",
                "expected an object",
                format!("assumed a {target_kind} actuator"),
            );
            return;
        };
        match actuator.get("type") {
            None => self.warn(
                "actuator.type",
                "missing required field",
                format!("set it to \"{target_kind}\""),
            ),
            Some(value) => match value.as_str().map(str::parse::<ActuatorKind>) {
                Some(Ok(kind)) if kind == target_kind => {}
                Some(Ok(kind)) => self.warn(
                    "actuator.type",
                    format!("document drives a {kind}, target channel is a {target_kind}"),
                    "states are coerced to the target actuator; use copy-and-adapt between different hardware",
                ),
                Some(Err(err)) => self.warn(
                    "actuator.type",
                    err.to_string(),
                    format!("set it to \"{target_kind}\""),
                ),
                None => self.warn(
                    "actuator.type",
                    "expected a string",
                    format!("set it to \"{target_kind}\""),
                ),
            },
        }
        if let Some(name) = actuator.get("name")
            && !name.is_string()
        {
            self.warn(
                "actuator.name",
                "expected a string",
                "name is ignored on import",
            );
        }
        if let Some(gpio) = actuator.get("gpio")
            && as_u8(gpio).is_none()
        {
            self.warn(
                "actuator.gpio",
                "expected a pin number 0..=255",
                "the target channel's pin is used",
            );
        }
    }

    fn read_configuration(&mut self, section: Option<&Value>) -> LogicConfiguration {
        let mut config = LogicConfiguration::default();
        let Some(section) = section else {
            self.warn(
                "configuration",
                "missing required field",
                "defaults are used for every setting",
            );
            return config;
        };
        let Some(section) = section.as_object() else {
            self.warn(
                "configuration",
                "expected an object",
                "defaults are used for every setting",
            );
            return config;
        };

        if let Some(value) = section.get("enabled") {
            match value.as_bool() {
                Some(enabled) => config.enabled = enabled,
                None => self.warn(
                    "configuration.enabled",
                    "expected a boolean",
                    "logic stays enabled",
                ),
            }
        }
        if let Some(value) = section.get("condition_mode") {
            match value.as_str() {
                Some("all") => config.condition_mode = ConditionMode::All,
                Some("any") => config.condition_mode = ConditionMode::Any,
                _ => self.warn(
                    "configuration.condition_mode",
                    "expected \"all\" or \"any\"",
                    "conditions are combined with \"all\"",
                ),
            }
        }
        if let Some(value) = section.get("evaluation_interval") {
            match value.as_u64() {
                Some(ms) if ms >= MIN_INTERVAL_MS => config.evaluation_interval_ms = ms,
                _ => self.warn(
                    "configuration.evaluation_interval",
                    format!("expected milliseconds >= {MIN_INTERVAL_MS}"),
                    format!("using {DEFAULT_INTERVAL_MS} ms"),
                ),
            }
        }
        if let Some(value) = section.get("failsafe_state")
            && !value.is_null()
        {
            config.failsafe_state = self.read_state(value, "configuration.failsafe_state");
        }
        if let Some(value) = section.get("active_state")
            && let Some(state) = self.read_state(value, "configuration.active_state")
        {
            config.active_state = state;
        }
        if let Some(value) = section.get("priority") {
            config.priority_overrides = self.read_priority(value);
        }
        config
    }

    fn read_state(&mut self, value: &Value, path: &str) -> Option<DesiredState> {
        let kind = self.target.kind;
        let state = match value {
            Value::Bool(on) => DesiredState::Binary(*on),
            Value::Number(_) => match as_u8(value) {
                Some(level) if level <= DesiredState::MAX_LEVEL => DesiredState::Level(level),
                _ => {
                    self.warn(
                        path,
                        "expected a level 0..=100",
                        "the setting is left at its default",
                    );
                    return None;
                }
            },
            _ => {
                self.warn(
                    path,
                    "expected a boolean or a level 0..=100",
                    "the setting is left at its default",
                );
                return None;
            }
        };
        if let Err(err) = kind.check_state(state) {
            let coerced = kind.coerce_state(state);
            self.warn(path, err.to_string(), format!("using {coerced}"));
            return Some(coerced);
        }
        Some(state)
    }

    fn read_priority(&mut self, value: &Value) -> Vec<SourceKind> {
        let Some(entries) = value.as_array() else {
            self.warn(
                "configuration.priority",
                "expected a list of sources",
                "no priority overrides are applied",
            );
            return Vec::new();
        };
        let mut sources = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let path = format!("configuration.priority[{index}]");
            match entry.as_str().map(str::parse::<SourceKind>) {
                Some(Ok(SourceKind::Default)) => {
                    self.warn(path, "the default source cannot override", "entry dropped");
                }
                Some(Ok(source)) if sources.contains(&source) => {
                    self.warn(
                        path,
                        format!("{source} is listed twice"),
                        "duplicate dropped",
                    );
                }
                Some(Ok(source)) => sources.push(source),
                Some(Err(err)) => self.warn(path, err.to_string(), "entry dropped"),
                None => self.warn(path, "expected a source name", "entry dropped"),
            }
        }
        sources
    }

    fn read_list<T>(
        &mut self,
        value: Option<&Value>,
        field: &str,
        read: fn(&mut Self, &Map<String, Value>, &str) -> Option<T>,
    ) -> Vec<T> {
        let Some(value) = value else {
            return Vec::new();
        };
        let Some(entries) = value.as_array() else {
            self.warn(field, "expected a list", format!("no {field} are imported"));
            return Vec::new();
        };
        let mut items = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let path = format!("{field}[{index}]");
            match entry.as_object() {
                Some(object) => {
                    if let Some(item) = read(self, object, &path) {
                        items.push(item);
                    }
                }
                None => self.warn(path, "expected an object", "entry dropped"),
            }
        }
        items
    }

    fn read_dependency(&mut self, entry: &Map<String, Value>, path: &str) -> Option<Condition> {
        let before = self.warnings.len();
        if let Some(kind) = entry.get("type")
            && kind.as_str() != Some(SENSOR_DEPENDENCY)
        {
            self.warn(
                format!("{path}.type"),
                "only sensor dependencies are supported",
                "entry dropped",
            );
        }
        let sensor_ref = self.required(
            entry,
            path,
            "sensor_ref",
            |v| v.as_str().and_then(|s| s.parse::<SensorRef>().ok()),
            "expected a sensor reference like \"device/sensor\"",
        );
        let operator = self.required(
            entry,
            path,
            "operator",
            |v| v.as_str().and_then(|s| s.parse::<Operator>().ok()),
            "expected one of <, >, <=, >=, ==, !=",
        );
        let threshold = self.required(entry, path, "threshold", Value::as_f64, "expected a number");
        if self.warnings.len() > before {
            return None;
        }
        Some(Condition::new(sensor_ref?, operator?, threshold?))
    }

    fn read_timer(&mut self, entry: &Map<String, Value>, path: &str) -> Option<TimerWindow> {
        let before = self.warnings.len();
        let start = self.required(entry, path, "start", parse_time, "expected HH:MM");
        let end = self.required(entry, path, "end", parse_time, "expected HH:MM");
        let days = match entry.get("days") {
            None | Some(Value::Null) => Some(DaySet::EVERY_DAY),
            Some(value) => self.read_days(value, &format!("{path}.days")),
        };
        let enabled = match entry.get("enabled") {
            None => Some(true),
            Some(value) => {
                let enabled = value.as_bool();
                if enabled.is_none() {
                    self.warn(
                        format!("{path}.enabled"),
                        "expected a boolean",
                        "entry dropped",
                    );
                }
                enabled
            }
        };
        if self.warnings.len() > before {
            return None;
        }
        Some(TimerWindow {
            start: start?,
            end: end?,
            days: days?,
            enabled: enabled?,
        })
    }

    fn read_days(&mut self, value: &Value, path: &str) -> Option<DaySet> {
        let Some(entries) = value.as_array() else {
            self.warn(path, "expected a list of weekdays", "entry dropped");
            return None;
        };
        let mut days = Vec::with_capacity(entries.len());
        for entry in entries {
            let raw = match entry {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            match DaySet::parse_day(&raw) {
                Ok(day) => days.push(day),
                Err(err) => {
                    self.warn(path, err.to_string(), "entry dropped");
                    return None;
                }
            }
        }
        Some(DaySet::of(&days))
    }

    fn read_event(&mut self, entry: &Map<String, Value>, path: &str) -> Option<EventTrigger> {
        let event: EventTrigger = match serde_json::from_value(Value::Object(entry.clone())) {
            Ok(event) => event,
            Err(err) => {
                self.warn(path, err.to_string(), "entry dropped");
                return None;
            }
        };
        if event.name.trim().is_empty() {
            self.warn(format!("{path}.name"), "must not be empty", "entry dropped");
            return None;
        }
        if let Err(err) = self.target.kind.check_state(event.state) {
            self.warn(format!("{path}.state"), err.to_string(), "entry dropped");
            return None;
        }
        Some(event)
    }

    fn required<T>(
        &mut self,
        entry: &Map<String, Value>,
        path: &str,
        field: &str,
        parse: impl Fn(&Value) -> Option<T>,
        expected: &str,
    ) -> Option<T> {
        let path = format!("{path}.{field}");
        match entry.get(field) {
            None => {
                self.warn(path, "missing required field", "entry dropped");
                None
            }
            Some(value) => {
                let parsed = parse(value);
                if parsed.is_none() {
                    self.warn(path, expected, "entry dropped");
                }
                parsed
            }
        }
    }
}

fn parse_time(value: &Value) -> Option<TimeOfDay> {
    value.as_str().and_then(|s| s.parse().ok())
}

fn as_u8(value: &Value) -> Option<u8> {
    value.as_u64().and_then(|n| u8::try_from(n).ok())
}
