//! Application state wiring
//!
//! `AppState` holds shared references to every collaborator; cloning is a
//! shallow `Arc` copy. Nothing here is a process-wide singleton — tests
//! instantiate a fresh broker per case.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use shared::error::AppResult;

use crate::auth::AuthVerifier;
use crate::config::Config;
use crate::db;
use crate::events::{EventBus, Hub, SqliteEventLog};
use crate::files::{FileStore, LocalFileStore};
use crate::sched::Scheduler;
use crate::service::{EntityService, FlowService, RequestService};
use crate::schema::SchemaCompiler;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pool: sqlx::SqlitePool,
    pub bus: EventBus,
    pub auth: AuthVerifier,
    pub scheduler: Scheduler,
    pub entity_svc: EntityService,
    pub request_svc: Arc<RequestService>,
    pub flow_svc: Arc<FlowService>,
    pub file_store: Arc<dyn FileStore>,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Initialize storage, event fabric, services and scheduler.
    ///
    /// Wiring order matters: the scheduler and the request/flow services
    /// reference each other, so the cross-links bind after construction.
    pub async fn new(config: Config) -> AppResult<Self> {
        let pool = db::connect(&config.database_url).await?;
        db::migrate(&pool).await?;

        // Event log may live in a separate database
        let event_pool = if config.event_log_url == config.database_url {
            pool.clone()
        } else {
            let p = db::connect(&config.event_log_url).await?;
            db::migrate(&p).await?;
            p
        };

        let hub = Arc::new(Hub::new(config.hub_queue_depth));
        let bus = EventBus::new(Arc::new(SqliteEventLog::new(event_pool)), hub);

        let shutdown = CancellationToken::new();
        let scheduler = Scheduler::start(pool.clone(), bus.clone(), shutdown.clone());

        let compiler = Arc::new(SchemaCompiler::new(
            config.schema_cache_capacity,
            Duration::from_secs(config.schema_cache_ttl_secs),
            config.schema_ref_allowlist.clone(),
        ));

        let entity_svc = EntityService::new(pool.clone());
        let request_svc = Arc::new(RequestService::new(
            pool.clone(),
            compiler,
            entity_svc.clone(),
            bus.clone(),
            scheduler.clone(),
            config.deadline_warning_secs,
        ));
        let flow_svc = Arc::new(FlowService::new(
            pool.clone(),
            bus.clone(),
            entity_svc.clone(),
            request_svc.clone(),
        ));
        request_svc.bind_flow_service(flow_svc.clone());
        scheduler.bind_request_service(request_svc.clone());

        let auth = AuthVerifier::new(config.jwt_secret.clone(), !config.is_production());
        let file_store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(
            config.storage_base_dir.clone(),
            config.storage_base_url.clone(),
        )?);

        Ok(Self {
            config,
            pool,
            bus,
            auth,
            scheduler,
            entity_svc,
            request_svc,
            flow_svc,
            file_store,
            shutdown,
        })
    }

    /// Recover flows and re-arm timed tasks; call once after `new`
    pub async fn start_background_tasks(&self) -> AppResult<()> {
        crate::service::recovery::recover_flows(&self.flow_svc, &self.request_svc).await?;
        self.scheduler
            .rearm(Duration::from_secs(
                self.config.deadline_warning_secs.max(0) as u64
            ))
            .await?;
        Ok(())
    }
}
