//! Logic configuration: the rules governing automatic control of a channel.
//!
//! A configuration combines sensor [`Condition`]s (the `Logic` source),
//! time-of-day [`TimerWindow`]s (the `Timer` source) and threshold-crossing
//! [`EventTrigger`]s, plus the failsafe state and any explicit priority
//! overrides for the channel.

mod adapt;
mod condition;
mod diff;
mod document;
mod event;
mod timer;

pub use adapt::{AdaptOptions, adapt};
pub use condition::{
    Condition, ConditionMode, ConditionOutcome, DEFAULT_STALENESS_SECS, EvaluationContext,
    Operator, SensorFault, evaluate_conditions,
};
pub use diff::{ListChange, LogicDiff, SettingChange};
pub use document::{
    ActuatorSection, ConfigurationSection, DependencySection, DocumentMetadata, LogicDocument,
    RepairReport, RepairWarning, SCHEMA_VERSION,
};
pub use event::{Edge, EventTrigger};
pub use timer::{DaySet, TimeOfDay, TimerWindow, active_timer, any_timer_active};

use serde::{Deserialize, Serialize};

use crate::channel::{ActuatorKind, DesiredState};
use crate::claim::SourceKind;
use crate::error::ValidationError;

/// Tick interval used when a configuration does not set one.
pub const DEFAULT_INTERVAL_MS: u64 = 30_000;

/// Shortest accepted tick interval.
pub const MIN_INTERVAL_MS: u64 = 100;

/// Per-channel rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicConfiguration {
    pub enabled: bool,
    #[serde(default)]
    pub condition_mode: ConditionMode,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub timers: Vec<TimerWindow>,
    #[serde(default)]
    pub events: Vec<EventTrigger>,
    /// State claimed while conditions hold or a timer is active.
    pub active_state: DesiredState,
    pub evaluation_interval_ms: u64,
    /// `None` falls back to the actuator's conservative state.
    pub failsafe_state: Option<DesiredState>,
    /// Sources that win for this channel regardless of the priority table,
    /// consulted in order.
    #[serde(default)]
    pub priority_overrides: Vec<SourceKind>,
}

impl Default for LogicConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            condition_mode: ConditionMode::All,
            conditions: Vec::new(),
            timers: Vec::new(),
            events: Vec::new(),
            active_state: DesiredState::Binary(true),
            evaluation_interval_ms: DEFAULT_INTERVAL_MS,
            failsafe_state: None,
            priority_overrides: Vec::new(),
        }
    }
}

impl LogicConfiguration {
    /// Create a builder for constructing a [`LogicConfiguration`].
    #[must_use]
    pub fn builder() -> LogicConfigurationBuilder {
        LogicConfigurationBuilder::default()
    }

    /// The state the channel is driven to when nothing valid claims it.
    #[must_use]
    pub fn effective_failsafe(&self, kind: ActuatorKind) -> DesiredState {
        self.failsafe_state.unwrap_or_else(|| kind.conservative_state())
    }

    /// Whether the configuration has anything for the evaluation loop to do.
    #[must_use]
    pub fn has_automation(&self) -> bool {
        !self.conditions.is_empty() || !self.timers.is_empty() || !self.events.is_empty()
    }

    /// Check domain invariants against the actuator the configuration drives.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when:
    /// - the interval is below [`MIN_INTERVAL_MS`]
    /// - a configured state does not fit the actuator kind
    /// - an event trigger has an empty name
    /// - a priority override names the default source or repeats a source
    pub fn validate(&self, kind: ActuatorKind) -> Result<(), ValidationError> {
        if self.evaluation_interval_ms < MIN_INTERVAL_MS {
            return Err(ValidationError::IntervalTooShort {
                min_ms: MIN_INTERVAL_MS,
            });
        }
        kind.check_state(self.active_state)?;
        if let Some(failsafe) = self.failsafe_state {
            kind.check_state(failsafe)?;
        }
        for event in &self.events {
            if event.name.trim().is_empty() {
                return Err(ValidationError::EmptyTriggerName);
            }
            kind.check_state(event.state)?;
        }
        let mut seen = Vec::with_capacity(self.priority_overrides.len());
        for source in &self.priority_overrides {
            if !source.is_submittable() {
                return Err(ValidationError::ReservedSource("priority overrides"));
            }
            if seen.contains(source) {
                return Err(ValidationError::DuplicateOverride(*source));
            }
            seen.push(*source);
        }
        Ok(())
    }
}

/// Step-by-step builder for [`LogicConfiguration`].
#[derive(Debug, Default)]
pub struct LogicConfigurationBuilder {
    config: LogicConfiguration,
}

impl LogicConfigurationBuilder {
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    #[must_use]
    pub fn condition_mode(mut self, mode: ConditionMode) -> Self {
        self.config.condition_mode = mode;
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.config.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn timer(mut self, timer: TimerWindow) -> Self {
        self.config.timers.push(timer);
        self
    }

    #[must_use]
    pub fn event(mut self, event: EventTrigger) -> Self {
        self.config.events.push(event);
        self
    }

    #[must_use]
    pub fn active_state(mut self, state: DesiredState) -> Self {
        self.config.active_state = state;
        self
    }

    #[must_use]
    pub fn evaluation_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.evaluation_interval_ms = interval_ms;
        self
    }

    #[must_use]
    pub fn failsafe_state(mut self, state: DesiredState) -> Self {
        self.config.failsafe_state = Some(state);
        self
    }

    #[must_use]
    pub fn priority_override(mut self, source: SourceKind) -> Self {
        self.config.priority_overrides.push(source);
        self
    }

    /// Consume the builder, validate against `kind`, and return the
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if an invariant of
    /// [`LogicConfiguration::validate`] fails.
    pub fn build(self, kind: ActuatorKind) -> Result<LogicConfiguration, ValidationError> {
        self.config.validate(kind)?;
        Ok(self.config)
    }
}
