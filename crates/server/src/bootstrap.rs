use std::sync::Arc;

use onay_core::audit::AuditSink;
use onay_core::config::{AppConfig, ConfigError};
use onay_core::service::WorkflowService;
use onay_core::stages::StageConfigError;
use onay_core::store::WorkflowStore;
use onay_db::{connect_from_config, migrations, DbPool, SqlWorkflowStore};
use thiserror::Error;
use tracing::info;

use crate::api::SharedService;
use crate::audit::TracingAuditSink;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: SharedService,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("stage definitions could not be loaded: {0}")]
    Stages(#[from] StageConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let stages = config.workflow.stage_table()?;
    info!(
        event_name = "system.bootstrap.stages_loaded",
        correlation_id = "bootstrap",
        workflow_types = stages.len(),
        source = if config.workflow.definitions_path.is_some() { "file" } else { "builtin" },
        "stage definitions loaded"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let store: Arc<dyn WorkflowStore> = Arc::new(SqlWorkflowStore::new(db_pool.clone()));
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let service = WorkflowService::new(store, audit, Arc::new(stages))
        .with_max_decide_attempts(config.workflow.max_decide_attempts);

    Ok(Application { config, db_pool, service: Arc::new(service) })
}
