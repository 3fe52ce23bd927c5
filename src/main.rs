use actix_files as fs;
use actix_web::{web, App, HttpServer};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use gpro::app_state::AppState;
use gpro::config::{AppConfig, Cli};
use gpro::relay::{CompletionProvider, OpenAiProvider};
use gpro::routes::configure_routes;
use gpro::session::SessionStore;
use gpro::{db, logging};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(300);

fn to_io_error(e: gpro::errors::GproError) -> std::io::Error {
    std::io::Error::other(e.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    let loaded = AppConfig::load(&cli);
    let _log_guard = logging::init(&loaded.config.log_dir);
    loaded.log_notes();
    let config = loaded.config;

    tracing::info!(
        bind = %config.bind_address,
        database = %config.database_path.display(),
        model = %config.default_model,
        "Starting GPRO server"
    );
    if config.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; the chat relay will answer 503");
    }
    if config.admin_password.is_none() {
        tracing::warn!("GPRO_ADMIN_PASSWORD is not set; admin login is disabled");
    }

    let pool = db::init_db(&config.database_path).map_err(to_io_error)?;
    if config.seed_demo_data {
        db::seed_demo_data(&pool).map_err(to_io_error)?;
        tracing::info!("Demo catalogue seeded");
    }

    let provider: Arc<dyn CompletionProvider> =
        Arc::new(OpenAiProvider::new(&config).map_err(to_io_error)?);
    let sessions = web::Data::new(SessionStore::new(config.session_ttl_minutes));
    let bind_address = config.bind_address.clone();
    let uploads_dir = config.uploads_dir.clone();
    let app_state = web::Data::new(AppState::new(config, pool, provider));

    // Expired admin sessions are also dropped lazily on lookup
    let purge_store = sessions.clone();
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = purge_store.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Expired admin sessions removed");
            }
        }
    });

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(sessions.clone())
            .wrap(actix_web::middleware::Logger::default())
            .configure(configure_routes)
            // Persona avatars and other uploaded media
            .service(fs::Files::new("/public_uploads", uploads_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
