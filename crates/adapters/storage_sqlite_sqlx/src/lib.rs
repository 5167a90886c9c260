//! # greenhub-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement `LogicVersionRepository` and `AuditSink` from `greenhub-app::ports`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `greenhub-app` (for port traits) and `greenhub-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod audit_log;
pub mod error;
pub mod logic_version_repo;
pub mod pool;

mod row;

pub use audit_log::SqliteAuditLog;
pub use error::StorageError;
pub use logic_version_repo::SqliteLogicVersionRepository;
pub use pool::{Config, Database};
