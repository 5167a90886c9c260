//! Structural diff between two logic configurations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::LogicConfiguration;
use super::condition::Condition;
use super::event::EventTrigger;
use super::timer::TimerWindow;

/// One positional change in an ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ListChange<T> {
    Added { index: usize, item: T },
    Removed { index: usize, item: T },
    Changed { index: usize, before: T, after: T },
}

/// A scalar setting that changed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingChange {
    pub field: String,
    pub before: Value,
    pub after: Value,
}

/// What changed between two versions of a configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogicDiff {
    pub conditions: Vec<ListChange<Condition>>,
    pub timers: Vec<ListChange<TimerWindow>>,
    pub events: Vec<ListChange<EventTrigger>>,
    pub settings: Vec<SettingChange>,
}

impl LogicDiff {
    /// Diff `next` against `previous`; with no previous version everything
    /// counts as added.
    #[must_use]
    pub fn between(previous: Option<&LogicConfiguration>, next: &LogicConfiguration) -> Self {
        let empty = LogicConfiguration {
            conditions: Vec::new(),
            timers: Vec::new(),
            events: Vec::new(),
            ..next.clone()
        };
        let base = previous.unwrap_or(&empty);

        let mut settings = Vec::new();
        let mut setting = |field: &str, before: Value, after: Value| {
            if before != after {
                settings.push(SettingChange {
                    field: field.to_string(),
                    before,
                    after,
                });
            }
        };
        setting("enabled", json(&base.enabled), json(&next.enabled));
        setting(
            "condition_mode",
            json(&base.condition_mode),
            json(&next.condition_mode),
        );
        setting(
            "active_state",
            json(&base.active_state),
            json(&next.active_state),
        );
        setting(
            "evaluation_interval_ms",
            json(&base.evaluation_interval_ms),
            json(&next.evaluation_interval_ms),
        );
        setting(
            "failsafe_state",
            json(&base.failsafe_state),
            json(&next.failsafe_state),
        );
        setting(
            "priority_overrides",
            json(&base.priority_overrides),
            json(&next.priority_overrides),
        );

        Self {
            conditions: diff_list(&base.conditions, &next.conditions),
            timers: diff_list(&base.timers, &next.timers),
            events: diff_list(&base.events, &next.events),
            settings,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
            && self.timers.is_empty()
            && self.events.is_empty()
            && self.settings.is_empty()
    }

    /// One-line human summary, e.g. `1 condition added, failsafe_state changed`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        summarize(&mut parts, "condition", &self.conditions);
        summarize(&mut parts, "timer", &self.timers);
        summarize(&mut parts, "event", &self.events);
        parts.extend(
            self.settings
                .iter()
                .map(|change| format!("{} changed", change.field)),
        );
        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

fn json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn diff_list<T: Clone + PartialEq>(before: &[T], after: &[T]) -> Vec<ListChange<T>> {
    let mut changes = Vec::new();
    for index in 0..before.len().max(after.len()) {
        match (before.get(index), after.get(index)) {
            (Some(b), Some(a)) if b != a => changes.push(ListChange::Changed {
                index,
                before: b.clone(),
                after: a.clone(),
            }),
            (None, Some(a)) => changes.push(ListChange::Added {
                index,
                item: a.clone(),
            }),
            (Some(b), None) => changes.push(ListChange::Removed {
                index,
                item: b.clone(),
            }),
            _ => {}
        }
    }
    changes
}

fn summarize<T>(parts: &mut Vec<String>, noun: &str, changes: &[ListChange<T>]) {
    let (mut added, mut removed, mut changed) = (0, 0, 0);
    for change in changes {
        match change {
            ListChange::Added { .. } => added += 1,
            ListChange::Removed { .. } => removed += 1,
            ListChange::Changed { .. } => changed += 1,
        }
    }
    for (count, verb) in [(added, "added"), (removed, "removed"), (changed, "changed")] {
        if count > 0 {
            let plural = if count == 1 { "" } else { "s" };
            parts.push(format!("{count} {noun}{plural} {verb}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::DesiredState;
    use crate::logic::Operator;

    fn condition(threshold: f64) -> Condition {
        Condition::new("temp1".parse().unwrap(), Operator::Gt, threshold)
    }

    fn timer(start: &str, end: &str) -> TimerWindow {
        TimerWindow::new(start.parse().unwrap(), end.parse().unwrap())
    }

    #[test]
    fn should_be_empty_for_identical_configurations() {
        let config = LogicConfiguration {
            conditions: vec![condition(25.0)],
            ..LogicConfiguration::default()
        };
        let diff = LogicDiff::between(Some(&config), &config);
        assert!(diff.is_empty());
        assert_eq!(diff.summary(), "no changes");
    }

    #[test]
    fn should_report_everything_as_added_for_first_version() {
        let config = LogicConfiguration {
            conditions: vec![condition(25.0)],
            timers: vec![timer("08:00", "18:00")],
            ..LogicConfiguration::default()
        };
        let diff = LogicDiff::between(None, &config);
        assert_eq!(diff.conditions.len(), 1);
        assert!(matches!(diff.conditions[0], ListChange::Added { index: 0, .. }));
        assert!(diff.settings.is_empty());
        assert_eq!(diff.summary(), "1 condition added, 1 timer added");
    }

    #[test]
    fn should_detect_changed_removed_and_setting_changes() {
        let before = LogicConfiguration {
            conditions: vec![condition(25.0), condition(30.0)],
            ..LogicConfiguration::default()
        };
        let after = LogicConfiguration {
            conditions: vec![condition(27.0)],
            failsafe_state: Some(DesiredState::Binary(true)),
            ..LogicConfiguration::default()
        };
        let diff = LogicDiff::between(Some(&before), &after);
        assert!(matches!(diff.conditions[0], ListChange::Changed { index: 0, .. }));
        assert!(matches!(diff.conditions[1], ListChange::Removed { index: 1, .. }));
        assert_eq!(diff.settings.len(), 1);
        assert_eq!(diff.settings[0].field, "failsafe_state");
        assert_eq!(diff.settings[0].after, serde_json::json!(true));
        assert_eq!(
            diff.summary(),
            "1 condition removed, 1 condition changed, failsafe_state changed"
        );
    }
}
