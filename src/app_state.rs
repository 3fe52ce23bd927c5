use actix_web::web;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::GproResult;
use crate::persona_admin::PersonaAdminService;
use crate::persona_query::PersonaQueryService;
use crate::relay::CompletionProvider;

// Shared state for every handler
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub personas: PersonaQueryService,
    pub admin: PersonaAdminService,
    pub provider: Arc<dyn CompletionProvider>,
}

impl AppState {
    pub fn new(config: AppConfig, pool: DbPool, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            config: Arc::new(config),
            personas: PersonaQueryService::new(pool.clone()),
            admin: PersonaAdminService::new(pool),
            provider,
        }
    }
}

/// Run a synchronous database call on actix's blocking pool.
pub async fn blocking<F, R>(f: F) -> GproResult<R>
where
    F: FnOnce() -> GproResult<R> + Send + 'static,
    R: Send + 'static,
{
    web::block(f).await?
}
