//! # greenhub-domain
//!
//! Pure domain model for the greenhub actuator control engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Channels** (one addressable actuator output on one device)
//! - Define **Claims** (a desired state proposed by one control source)
//! - Define **Sensor snapshots** (the readings conditions are evaluated against)
//! - Define **Logic configurations** (conditions, timers, event triggers) and
//!   their versioned, diffable, exportable form
//! - Contain the pure decision rules: condition evaluation, timer matching,
//!   priority resolution and the audit trail they produce
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod audit;
pub mod channel;
pub mod claim;
pub mod logic;
pub mod resolution;
pub mod sensor;
pub mod version;
