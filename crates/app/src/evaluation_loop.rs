//! Evaluation loop: one periodic task per channel.
//!
//! Each tick a [`ChannelEvaluator`] turns the channel's active logic and the
//! current sensor snapshot into `Timer` and `Logic` claims, resolves all live
//! claims through the [`FailsafeMonitor`], and emits the decision and its
//! audit entry only when the outcome changed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use greenhub_domain::audit::AuditLogEntry;
use greenhub_domain::channel::{ActuatorChannel, DesiredState};
use greenhub_domain::claim::{ControlClaim, SourceKind};
use greenhub_domain::error::{ClaimError, EvaluationError, GreenhubError};
use greenhub_domain::logic::{
    DEFAULT_INTERVAL_MS, DEFAULT_STALENESS_SECS, EvaluationContext, LogicConfiguration,
    active_timer, evaluate_conditions,
};
use greenhub_domain::resolution::{ResolvedDecision, resolve};
use greenhub_domain::sensor::{Quality, SensorRef, SensorSnapshot};
use greenhub_domain::time::{self, Timestamp};

use crate::active_configs::ActiveConfigs;
use crate::failsafe::{DEFAULT_FAILURE_THRESHOLD, FailsafeMonitor};
use crate::ports::{AuditSink, DecisionPublisher, SensorSnapshotProvider};
use crate::source_registry::SourceRegistry;

/// Engine-wide evaluation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Tick interval for channels whose logic does not set one.
    pub default_interval: Duration,
    /// Readings older than this fail their conditions.
    pub staleness: chrono::Duration,
    pub failsafe_threshold: u32,
    /// Offset used for timer windows; `None` uses the host's local time.
    pub utc_offset: Option<FixedOffset>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            staleness: chrono::Duration::seconds(DEFAULT_STALENESS_SECS),
            failsafe_threshold: DEFAULT_FAILURE_THRESHOLD,
            utc_offset: None,
        }
    }
}

/// Where a channel evaluator is in its tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Evaluating,
    Resolved,
}

/// Shared collaborators every channel evaluator is built from.
#[derive(Clone)]
pub struct EvaluationDeps<S, P, A> {
    pub registry: Arc<SourceRegistry>,
    pub configs: Arc<ActiveConfigs>,
    pub sensors: S,
    pub publisher: P,
    pub audit: A,
    pub settings: EngineSettings,
}

/// Evaluates one channel. Owns that channel's failsafe state and the last
/// decision it emitted.
pub struct ChannelEvaluator<S, P, A> {
    channel: ActuatorChannel,
    deps: EvaluationDeps<S, P, A>,
    monitor: FailsafeMonitor,
    phase: Phase,
    last_emitted: Option<ResolvedDecision>,
    event_values: HashMap<SensorRef, f64>,
    event_hold_until: Option<Timestamp>,
}

impl<S, P, A> ChannelEvaluator<S, P, A>
where
    S: SensorSnapshotProvider,
    P: DecisionPublisher,
    A: AuditSink,
{
    #[must_use]
    pub fn new(channel: ActuatorChannel, deps: EvaluationDeps<S, P, A>) -> Self {
        let monitor = FailsafeMonitor::new(deps.settings.failsafe_threshold);
        Self {
            channel,
            deps,
            monitor,
            phase: Phase::Idle,
            last_emitted: None,
            event_values: HashMap::new(),
            event_hold_until: None,
        }
    }

    #[must_use]
    pub fn channel(&self) -> &ActuatorChannel {
        &self.channel
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn last_emitted(&self) -> Option<&ResolvedDecision> {
        self.last_emitted.as_ref()
    }

    /// Tick period: the channel's configured interval, else the engine
    /// default.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.deps
            .configs
            .get(&self.channel.id)
            .map_or(self.deps.settings.default_interval, |config| {
                Duration::from_millis(config.evaluation_interval_ms)
            })
    }

    /// Run one evaluation at `now`.
    ///
    /// Returns the decision when it was emitted, `None` when the outcome did
    /// not change.
    ///
    /// # Errors
    ///
    /// Returns the publisher's or audit sink's error. The decision is then
    /// not remembered as emitted, so the next tick emits it again.
    pub async fn tick(
        &mut self,
        now: Timestamp,
    ) -> Result<Option<ResolvedDecision>, GreenhubError> {
        self.phase = Phase::Evaluating;
        let started = Instant::now();
        let config = self.deps.configs.get(&self.channel.id).unwrap_or_default();
        let budget = Duration::from_millis(config.evaluation_interval_ms);

        let automation = self.apply_automation(&config, now).and_then(|()| {
            let elapsed = started.elapsed();
            if elapsed > budget {
                return Err(EvaluationError::Timeout {
                    elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                });
            }
            Ok(())
        });
        // live claims are resolved even when automation failed
        let claims = self.deps.registry.claims(&self.channel.id, now);
        let resolved = resolve(&self.channel, &claims, &config.priority_overrides, now);
        let decision = self.monitor.guard(
            &self.channel,
            config.effective_failsafe(self.channel.kind),
            now,
            automation,
            resolved,
        );
        self.phase = Phase::Resolved;

        let emitted = self.emit(decision).await;
        self.phase = Phase::Idle;
        emitted
    }

    async fn emit(
        &mut self,
        decision: ResolvedDecision,
    ) -> Result<Option<ResolvedDecision>, GreenhubError> {
        let Some(entry) = AuditLogEntry::transition(self.last_emitted.as_ref(), &decision) else {
            return Ok(None);
        };
        tracing::info!(
            channel = %self.channel.id,
            event = %entry.event_type,
            source = ?decision.winning_source,
            state = %decision.final_state,
            reason = %decision.winning_reason,
            "decision changed"
        );
        self.deps.audit.append(entry).await?;
        self.deps.publisher.publish(decision.clone()).await?;
        self.last_emitted = Some(decision.clone());
        Ok(Some(decision))
    }

    /// Turn the configuration into `Timer` and `Logic` claims.
    fn apply_automation(
        &mut self,
        config: &LogicConfiguration,
        now: Timestamp,
    ) -> Result<(), EvaluationError> {
        if !config.enabled {
            self.withdraw(SourceKind::Timer);
            self.withdraw(SourceKind::Logic);
            self.event_hold_until = None;
            self.event_values.clear();
            return Ok(());
        }

        let wall_clock = time::wall_clock(now, self.deps.settings.utc_offset);
        match active_timer(&config.timers, wall_clock) {
            Some(window) => {
                let reason = format!("timer {window} active");
                self.claim(SourceKind::Timer, config.active_state, reason, now, None)?;
            }
            None => self.withdraw(SourceKind::Timer),
        }

        if config.conditions.is_empty() && config.events.is_empty() {
            self.withdraw(SourceKind::Logic);
            return Ok(());
        }

        let snapshot = match self.deps.sensors.snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.withdraw(SourceKind::Logic);
                return Err(err);
            }
        };

        self.fire_events(config, &snapshot, now)?;
        if self.event_hold_until.is_some_and(|until| until > now) {
            return Ok(());
        }
        self.event_hold_until = None;

        if config.conditions.is_empty() {
            self.withdraw(SourceKind::Logic);
            return Ok(());
        }
        let ctx = EvaluationContext {
            snapshot: &snapshot,
            device_id: self.channel.device_id(),
            now,
            staleness: self.deps.settings.staleness,
        };
        let outcome = evaluate_conditions(config.condition_mode, &config.conditions, &ctx);
        for fault in &outcome.faults {
            tracing::warn!(
                channel = %self.channel.id,
                %fault,
                "sensor fault, condition not satisfied"
            );
        }
        if outcome.satisfied {
            self.claim(
                SourceKind::Logic,
                config.active_state,
                outcome.reason(),
                now,
                None,
            )?;
        } else {
            self.withdraw(SourceKind::Logic);
        }
        Ok(())
    }

    /// Submit an expiring `Logic` claim for every event trigger whose sensor
    /// crossed its threshold since the previous tick.
    fn fire_events(
        &mut self,
        config: &LogicConfiguration,
        snapshot: &SensorSnapshot,
        now: Timestamp,
    ) -> Result<(), EvaluationError> {
        let device_id = self.channel.device_id();
        let staleness = self.deps.settings.staleness;
        let mut current = HashMap::with_capacity(config.events.len());
        for event in &config.events {
            let value = snapshot
                .lookup(&event.sensor_ref, device_id)
                .filter(|reading| reading.quality == Quality::Good)
                .filter(|reading| now.signed_duration_since(reading.timestamp) <= staleness)
                .and_then(|reading| reading.value.as_number());
            if let Some(value) = value {
                current.insert(event.sensor_ref.clone(), value);
            }
        }

        let mut fired = None;
        for event in &config.events {
            let (Some(previous), Some(value)) = (
                self.event_values.get(&event.sensor_ref),
                current.get(&event.sensor_ref),
            ) else {
                continue;
            };
            if event.crossed(*previous, *value) {
                fired = Some(event.clone());
            }
        }
        self.event_values = current;

        if let Some(event) = fired {
            let expiry = now + chrono::Duration::seconds(i64::from(event.hold_secs));
            tracing::info!(channel = %self.channel.id, event = %event.name, "event trigger fired");
            self.claim(
                SourceKind::Logic,
                event.state,
                format!("event {}", event.name),
                now,
                Some(expiry),
            )?;
            self.event_hold_until = Some(expiry);
        }
        Ok(())
    }

    fn claim(
        &self,
        source: SourceKind,
        state: DesiredState,
        reason: String,
        now: Timestamp,
        expiry: Option<Timestamp>,
    ) -> Result<(), EvaluationError> {
        let mut claim = ControlClaim::new(self.channel.clone(), source, state, reason, now);
        claim.expiry = expiry;
        match self.deps.registry.submit(claim) {
            Ok(()) => Ok(()),
            Err(ClaimError::InvalidState(err)) => Err(EvaluationError::InvalidConfiguration(err)),
            Err(err) => {
                tracing::warn!(
                    channel = %self.channel.id,
                    source = ?source,
                    error = %err,
                    "automation claim rejected"
                );
                Ok(())
            }
        }
    }

    fn withdraw(&self, source: SourceKind) {
        self.deps.registry.withdraw(&self.channel.id, source);
    }
}

/// Spawns and supervises the per-channel tasks.
pub struct EvaluationLoop<S, P, A> {
    deps: EvaluationDeps<S, P, A>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<S, P, A> EvaluationLoop<S, P, A>
where
    S: SensorSnapshotProvider + Clone + Send + Sync + 'static,
    P: DecisionPublisher + Clone + Send + Sync + 'static,
    A: AuditSink + Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(deps: EvaluationDeps<S, P, A>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            deps,
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Register `channel` and start ticking it. The first tick runs
    /// immediately.
    pub fn spawn_channel(&mut self, channel: ActuatorChannel) {
        self.deps.registry.register_channel(channel.clone());
        let evaluator = ChannelEvaluator::new(channel, self.deps.clone());
        let shutdown = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(run_channel(evaluator, shutdown)));
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every task to stop and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "channel task panicked");
            }
        }
    }
}

async fn run_channel<S, P, A>(
    mut evaluator: ChannelEvaluator<S, P, A>,
    mut shutdown: watch::Receiver<bool>,
)
where
    S: SensorSnapshotProvider,
    P: DecisionPublisher,
    A: AuditSink,
{
    let mut period = evaluator.interval();
    let mut ticker = ticker_starting(Instant::now(), period);
    tracing::debug!(channel = %evaluator.channel().id, period = ?period, "channel loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = evaluator.tick(time::now()).await {
                    tracing::error!(
                        channel = %evaluator.channel().id,
                        error = %err,
                        "failed to emit decision"
                    );
                }
                let wanted = evaluator.interval();
                if wanted != period {
                    period = wanted;
                    ticker = ticker_starting(Instant::now() + period, period);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!(channel = %evaluator.channel().id, "channel loop stopped");
}

fn ticker_starting(start: Instant, period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
