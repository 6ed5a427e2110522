//! Application context: configuration from the environment and explicit
//! construction of every component in dependency order
//! (store → registry → state manager → engine → scheduler → services).

use std::sync::Arc;
use std::time::Duration;

use db::DbPool;
use engine::{
    EngineConfig, ScheduleFire, Scheduler, SchedulerConfig, StateManager, WorkflowEngine,
};
use nodes::NodeRegistry;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{ExecutionService, ServiceError, TriggerRequest, WorkflowService};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Environment-driven configuration, all knobs optional with defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_port: u16,
    pub base_context: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub max_concurrent_executions: usize,
    pub workers_per_execution: usize,
    pub default_node_timeout: Duration,
    pub scheduler_tick: Duration,
    pub timezone: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            base_context: String::new(),
            database_url: "sqlite://flowmill.db?mode=rwc".to_string(),
            db_max_connections: 8,
            max_concurrent_executions: 10,
            workers_per_execution: 3,
            default_node_timeout: Duration::from_secs(30),
            scheduler_tick: Duration::from_secs(30),
            timezone: "UTC".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = env_parse("LISTEN_PORT") {
            config.listen_port = port;
        }
        if let Ok(base_context) = std::env::var("BASE_CONTEXT") {
            config.base_context = base_context;
        }
        if let Ok(database_url) = std::env::var("DATABASE_URL") {
            config.database_url = database_url;
        }
        if let Some(max) = env_parse("DB_MAX_CONNECTIONS") {
            config.db_max_connections = max;
        }
        if let Some(max) = env_parse("ENGINE_MAX_CONCURRENT_EXECUTIONS") {
            config.max_concurrent_executions = max;
        }
        if let Some(workers) = env_parse("ENGINE_WORKERS_PER_EXECUTION") {
            config.workers_per_execution = workers;
        }
        if let Some(secs) = env_parse("ENGINE_NODE_TIMEOUT_SECS") {
            config.default_node_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("SCHEDULER_TICK_SECS") {
            config.scheduler_tick = Duration::from_secs(secs);
        }
        if let Ok(timezone) = std::env::var("TIMEZONE") {
            config.timezone = timezone;
        }
        config
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrent_executions: self.max_concurrent_executions,
            workers_per_execution: self.workers_per_execution,
            default_node_timeout: self.default_node_timeout,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: self.scheduler_tick,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

// ---------------------------------------------------------------------------
// Application context
// ---------------------------------------------------------------------------

/// Everything the API surface and the CLI need, constructed once at startup.
pub struct AppContext {
    pub config: AppConfig,
    pub pool: DbPool,
    pub registry: Arc<NodeRegistry>,
    pub state: Arc<StateManager>,
    pub engine: WorkflowEngine,
    pub scheduler: Scheduler,
    pub workflows: Arc<WorkflowService>,
    pub executions: Arc<ExecutionService>,
}

impl AppContext {
    /// Wire every component, start the engine and the scheduler, and spawn
    /// the completion and trigger loops. The registry arrives populated
    /// (plugin registration happens at startup, before the context).
    pub fn initialize(
        config: AppConfig,
        pool: DbPool,
        registry: Arc<NodeRegistry>,
    ) -> Result<Arc<Self>, ServiceError> {
        let state = Arc::new(StateManager::new());
        let (engine, reports) = WorkflowEngine::new(Arc::clone(&registry), config.engine_config());
        let (scheduler, fires) = Scheduler::new(config.scheduler_config());

        let workflows = Arc::new(WorkflowService::new(
            pool.clone(),
            Arc::clone(&state),
            scheduler.clone(),
        ));
        let executions = Arc::new(ExecutionService::new(
            pool.clone(),
            Arc::clone(&state),
            engine.clone(),
            Arc::clone(&workflows),
        ));

        engine.start()?;
        scheduler.start()?;

        Arc::clone(&executions).spawn_completion_loop(reports);
        spawn_trigger_loop(Arc::clone(&executions), fires);

        info!("application context initialized");
        Ok(Arc::new(Self {
            config,
            pool,
            registry,
            state,
            engine,
            scheduler,
            workflows,
            executions,
        }))
    }

    /// Stop the scheduler first (no new triggers), then drain the engine.
    pub async fn shutdown(&self) {
        if let Err(e) = self.scheduler.stop().await {
            warn!(error = %e, "scheduler did not stop cleanly");
        }
        if let Err(e) = self.engine.stop().await {
            warn!(error = %e, "engine did not stop cleanly");
        }
        info!("application context shut down");
    }
}

/// Scheduler fires become schedule-typed triggers through the normal
/// trigger path.
fn spawn_trigger_loop(
    executions: Arc<ExecutionService>,
    mut fires: mpsc::UnboundedReceiver<ScheduleFire>,
) {
    tokio::spawn(async move {
        while let Some(fire) = fires.recv().await {
            let request = TriggerRequest {
                trigger_type: Some(engine::models::TriggerType::Schedule),
                trigger_by: Some("scheduler".to_string()),
                ..TriggerRequest::default()
            };
            match executions.trigger_execution(&fire.workflow_id, request).await {
                Ok(execution) => {
                    info!(
                        workflow_id = %fire.workflow_id,
                        execution_id = %execution.id,
                        "scheduled execution triggered"
                    );
                }
                Err(e) => {
                    warn!(workflow_id = %fire.workflow_id, error = %e, "scheduled trigger failed");
                }
            }
        }
    });
}
