//! # greenhubd: greenhub daemon
//!
//! Composition root that wires all adapters together and runs the engine.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct repository implementations (adapters)
//! - Construct application services, injecting repositories via port traits
//! - Import the logic documents named in the configuration
//! - Start one evaluation task per channel and the claim intake
//! - Expose the sensor board and claim submitter as [`hooks::EngineHooks`]
//!   for sensor ingestion and claim producers
//! - Handle graceful shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;
mod hooks;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use greenhub_adapter_storage_sqlite_sqlx::{SqliteAuditLog, SqliteLogicVersionRepository};
use greenhub_app::active_configs::ActiveConfigs;
use greenhub_app::claim_intake::ClaimIntake;
use greenhub_app::decision_bus::DecisionBus;
use greenhub_app::evaluation_loop::{EvaluationDeps, EvaluationLoop};
use greenhub_app::ports::LogicVersionRepository;
use greenhub_app::sensor_board::SensorBoard;
use greenhub_app::services::logic_version_service::LogicVersionService;
use greenhub_app::source_registry::SourceRegistry;
use greenhub_domain::channel::ActuatorChannel;
use greenhub_domain::error::GreenhubError;
use greenhub_domain::resolution::ResolvedDecision;

use crate::config::Config;
use crate::hooks::EngineHooks;

const AUTHOR: &str = "greenhubd";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let db = greenhub_adapter_storage_sqlite_sqlx::Config {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await
    .context("failed to open database")?;
    let pool = db.pool().clone();

    // Repositories
    let version_repo = SqliteLogicVersionRepository::new(pool.clone());
    let audit_log = Arc::new(SqliteAuditLog::new(pool));

    // Services
    let configs = Arc::new(ActiveConfigs::new());
    let versions = LogicVersionService::new(
        version_repo,
        Arc::clone(&configs),
        config.engine.max_versions,
    );
    versions.load_active().await?;

    let channels: Vec<ActuatorChannel> = config
        .channels
        .iter()
        .map(config::ChannelConfig::actuator)
        .collect();
    for (channel, entry) in channels.iter().zip(&config.channels) {
        if let Some(path) = &entry.logic {
            import_logic(&versions, channel, path).await?;
        }
    }

    // Claims and decisions
    let registry = Arc::new(SourceRegistry::new());
    let (intake, claims) = ClaimIntake::new(Arc::clone(&registry), config.engine.claim_queue);
    let intake_task = tokio::spawn(intake.run());
    let bus = Arc::new(DecisionBus::new(256));
    let logger_task = tokio::spawn(log_decisions(bus.subscribe()));
    let hooks = EngineHooks {
        sensors: Arc::new(SensorBoard::new()),
        claims,
        decisions: Arc::clone(&bus),
    };

    let mut evaluation = EvaluationLoop::new(EvaluationDeps {
        registry,
        configs,
        sensors: Arc::clone(&hooks.sensors),
        publisher: Arc::clone(&bus),
        audit: audit_log,
        settings: config.engine_settings()?,
    });
    for channel in channels {
        evaluation.spawn_channel(channel);
    }
    let producers = hooks.attach();
    tracing::info!(
        channels = evaluation.channel_count(),
        producers,
        "greenhubd running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");

    evaluation.shutdown().await;
    drop(hooks);
    intake_task.await?;
    drop(bus);
    logger_task.await?;
    db.close().await;

    Ok(())
}

/// Import a channel's logic document. A document that fails strict parsing
/// is repaired where possible.
async fn import_logic<R: LogicVersionRepository>(
    versions: &LogicVersionService<R>,
    channel: &ActuatorChannel,
    path: &Path,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let document: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let version = match versions.import_schema(&document, channel, AUTHOR).await {
        Ok(version) => version,
        Err(GreenhubError::Schema(err)) => {
            tracing::warn!(
                channel = %channel.id,
                path = %path.display(),
                error = %err,
                "importing with repairs"
            );
            let report = versions.import_with_repair(&document, channel)?;
            versions.apply_repair(report, channel, AUTHOR).await?
        }
        Err(err) => return Err(err.into()),
    };
    tracing::info!(
        channel = %channel.id,
        version = %version.id,
        summary = %version.change_summary,
        "logic loaded"
    );
    Ok(())
}

async fn log_decisions(mut decisions: broadcast::Receiver<ResolvedDecision>) {
    loop {
        match decisions.recv().await {
            Ok(decision) => tracing::info!(
                channel = %decision.channel.id,
                state = %decision.final_state,
                source = ?decision.winning_source,
                reason = %decision.winning_reason,
                "actuator command"
            ),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "decision logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
