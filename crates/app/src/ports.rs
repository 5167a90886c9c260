//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod audit_sink;
pub mod decision_publisher;
pub mod logic_version_repo;
pub mod sensor_source;

pub use audit_sink::AuditSink;
pub use decision_publisher::DecisionPublisher;
pub use logic_version_repo::LogicVersionRepository;
pub use sensor_source::SensorSnapshotProvider;
