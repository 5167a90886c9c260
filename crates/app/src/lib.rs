//! # greenhub-app
//!
//! Application layer: the control engine and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `LogicVersionRepository`: append-only history of channel logic
//!   - `AuditSink`: durable record of decision transitions
//!   - `DecisionPublisher`: hand resolved decisions to actuator drivers
//!   - `SensorSnapshotProvider`: current sensor readings
//! - Run the engine: `SourceRegistry` fed through `ClaimIntake`,
//!   `FailsafeMonitor`, and the per-channel `EvaluationLoop`
//! - Provide **in-process infrastructure** (decision bus, sensor board,
//!   in-memory audit log) that doesn't need IO
//! - Orchestrate domain objects without knowing *how* persistence or IO works
//!
//! ## Dependency rule
//! Depends on `greenhub-domain` only (plus `tokio` for channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod active_configs;
pub mod audit_log;
pub mod claim_intake;
pub mod decision_bus;
pub mod evaluation_loop;
pub mod failsafe;
pub mod ports;
pub mod sensor_board;
pub mod services;
pub mod source_registry;
