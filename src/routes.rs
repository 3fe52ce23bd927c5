use actix_web::web;

use crate::errors::GproError;
use crate::{admin_handlers, catalogue_handlers, dev_handlers, pages, relay_handlers};

/// Register every page and API route. Static directories are mounted by the
/// binary since their locations come from configuration.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        GproError::Validation(format!("Invalid payload: {}", err)).into()
    }))
    .service(
        web::scope("/api")
            .route("/health", web::get().to(catalogue_handlers::health_handler))
            // Public catalogue
            .route("/personas", web::get().to(catalogue_handlers::list_personas_handler))
            .route("/personas/{slug}", web::get().to(catalogue_handlers::get_persona_handler))
            .route("/categories", web::get().to(catalogue_handlers::list_categories_handler))
            .route(
                "/categories/{slug}/personas",
                web::get().to(catalogue_handlers::category_personas_handler),
            )
            // Chat relay
            .route("/ai/code", web::post().to(relay_handlers::relay_code_handler))
            // Back office
            .route("/admin/login", web::post().to(admin_handlers::login_handler))
            .route("/admin/logout", web::post().to(admin_handlers::logout_handler))
            .route("/admin/personas", web::get().to(admin_handlers::list_personas_handler))
            .route("/admin/personas", web::post().to(admin_handlers::create_persona_handler))
            .route("/admin/personas/import", web::post().to(admin_handlers::import_persona_handler))
            .route("/admin/personas/{id}", web::put().to(admin_handlers::update_persona_handler))
            .route("/admin/personas/{id}/status", web::post().to(admin_handlers::set_status_handler))
            .route("/admin/categories", web::post().to(admin_handlers::create_category_handler))
            .route(
                "/admin/categories/{id}/personas",
                web::put().to(admin_handlers::set_category_personas_handler),
            )
            .route("/admin/models", web::get().to(admin_handlers::list_models_handler))
            // Developer tools
            .route("/dev/assistants", web::get().to(dev_handlers::list_assistants_handler))
            .route("/dev/assistants/{slug}", web::get().to(dev_handlers::get_assistant_handler))
            .route("/dev/ftp/profiles", web::get().to(dev_handlers::list_profiles_handler))
            .route("/dev/ftp/profiles", web::post().to(dev_handlers::save_profile_handler))
            .route("/dev/ftp/deploy", web::post().to(dev_handlers::deploy_handler)),
    )
    .route("/", web::get().to(pages::landing))
    .route("/ai-team/{slug}", web::get().to(pages::ai_team_category));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::AppState;
    use crate::config::AppConfig;
    use crate::db::{test_pool, DbPool};
    use crate::relay::fake::{content_chunk, done_chunk, FakeProvider, Script};
    use crate::relay::CompletionProvider;
    use crate::session::{SessionStore, SESSION_COOKIE};
    use actix_web::cookie::Cookie;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    const PASSWORD: &str = "letmein";

    fn state(pool: DbPool, provider: Arc<dyn CompletionProvider>) -> web::Data<AppState> {
        let config = AppConfig {
            admin_password: Some(PASSWORD.to_string()),
            stall_timeout: Duration::from_secs(5),
            public_dir: "./does-not-exist".into(),
            ..AppConfig::default()
        };
        web::Data::new(AppState::new(config, pool, provider))
    }

    fn hello_world() -> Arc<FakeProvider> {
        Arc::new(FakeProvider::new(Script::Chunks(vec![
            Ok(content_chunk("Hello")),
            Ok(content_chunk(" world")),
            Ok(done_chunk()),
        ])))
    }

    macro_rules! app {
        ($state:expr, $sessions:expr) => {
            test::init_service(
                App::new()
                    .app_data($state.clone())
                    .app_data($sessions.clone())
                    .configure(configure_routes),
            )
            .await
        };
    }

    macro_rules! login {
        ($app:expr) => {{
            let req = test::TestRequest::post()
                .uri("/api/admin/login")
                .set_json(json!({ "password": PASSWORD }))
                .to_request();
            let resp = test::call_service($app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            resp.response()
                .cookies()
                .find(|c| c.name() == SESSION_COOKIE)
                .expect("session cookie")
                .into_owned()
        }};
    }

    #[actix_web::test]
    async fn test_public_persona_listing() {
        let (_dir, pool) = test_pool(true);
        let sessions = web::Data::new(SessionStore::new(60));
        let app = app!(state(pool, hello_world()), sessions);

        let req = test::TestRequest::get().uri("/api/personas").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let slugs: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["slug"].as_str().unwrap())
            .collect();
        assert_eq!(
            slugs,
            vec!["marketing-maven", "data-dana", "copy-carl", "legal-lena", "chef-chiara"]
        );

        let req = test::TestRequest::get().uri("/api/personas?ids=3,1&q=market").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn test_malformed_id_list_returns_empty_array() {
        let (_dir, pool) = test_pool(true);
        let sessions = web::Data::new(SessionStore::new(60));
        let app = app!(state(pool, hello_world()), sessions);

        let req = test::TestRequest::get()
            .uri("/api/personas?ids=5%3BDROP%20TABLE%20personas")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!([]));
    }

    #[actix_web::test]
    async fn test_persona_detail_and_missing_persona() {
        let (_dir, pool) = test_pool(true);
        let sessions = web::Data::new(SessionStore::new(60));
        let app = app!(state(pool, hello_world()), sessions);

        let req = test::TestRequest::get().uri("/api/personas/legal-lena").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["slug"], "legal-lena");
        assert_eq!(body["is_vip"], true);
        assert!(body.get("system_prompt").is_none());

        let req = test::TestRequest::get().uri("/api/personas/archived-arno").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_category_page_renders_and_unknown_is_404() {
        let (_dir, pool) = test_pool(true);
        let sessions = web::Data::new(SessionStore::new(60));
        let app = app!(state(pool, hello_world()), sessions);

        let req = test::TestRequest::get().uri("/ai-team/business?q=carl").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(html.contains("Copy Carl"));
        assert!(!html.contains("Legal Lena"));

        let req = test::TestRequest::get().uri("/ai-team/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_landing_falls_back_without_index() {
        let (_dir, pool) = test_pool(false);
        let sessions = web::Data::new(SessionStore::new(60));
        let app = app!(state(pool, hello_world()), sessions);

        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(html.contains("Landing page not found"));
    }

    #[actix_web::test]
    async fn test_relay_requires_admin_session() {
        let (_dir, pool) = test_pool(false);
        let sessions = web::Data::new(SessionStore::new(60));
        let fake = hello_world();
        let app = app!(state(pool, fake.clone()), sessions);

        let req = test::TestRequest::post()
            .uri("/api/ai/code")
            .set_json(json!({ "prompt": "hi" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(fake.calls(), 0);

        let req = test::TestRequest::post()
            .uri("/api/ai/code")
            .cookie(Cookie::new(SESSION_COOKIE, "forged"))
            .set_json(json!({ "prompt": "hi" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(fake.calls(), 0);
    }

    #[actix_web::test]
    async fn test_relay_streams_completion() {
        let (_dir, pool) = test_pool(false);
        let sessions = web::Data::new(SessionStore::new(60));
        let fake = hello_world();
        let app = app!(state(pool, fake.clone()), sessions);
        let cookie = login!(&app);

        let req = test::TestRequest::post()
            .uri("/api/ai/code")
            .cookie(cookie)
            .set_json(json!({ "prompt": "Say hello" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let body = test::read_body(resp).await;
        assert_eq!(
            std::str::from_utf8(&body).unwrap(),
            "data: {\"content\":\"Hello\"}\n\ndata: {\"content\":\" world\"}\n\ndata: {\"done\":true}\n\n"
        );
        assert_eq!(fake.calls(), 1);
    }

    #[actix_web::test]
    async fn test_relay_uses_persona_prompt() {
        let (_dir, pool) = test_pool(true);
        let sessions = web::Data::new(SessionStore::new(60));
        let fake = hello_world();
        let app = app!(state(pool, fake.clone()), sessions);
        let cookie = login!(&app);

        let req = test::TestRequest::post()
            .uri("/api/ai/code")
            .cookie(cookie)
            .set_json(json!({ "prompt": "Tiramisu?", "persona": "chef-chiara" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        test::read_body(resp).await;

        let requests = fake.requests.lock();
        assert_eq!(requests[0].messages[0].content, "You are a warm, encouraging Italian chef.");
    }

    #[actix_web::test]
    async fn test_relay_rejects_before_calling_provider() {
        let (_dir, pool) = test_pool(false);
        let sessions = web::Data::new(SessionStore::new(60));
        let fake = hello_world();
        let app = app!(state(pool, fake.clone()), sessions);
        let cookie = login!(&app);

        let req = test::TestRequest::post()
            .uri("/api/ai/code")
            .cookie(cookie.clone())
            .set_json(json!({ "prompt": "   " }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "No prompt provided");

        let req = test::TestRequest::post()
            .uri("/api/ai/code")
            .cookie(cookie)
            .set_payload("not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(fake.calls(), 0);
    }

    #[actix_web::test]
    async fn test_relay_without_api_key() {
        let (_dir, pool) = test_pool(false);
        let sessions = web::Data::new(SessionStore::new(60));
        let fake = Arc::new(FakeProvider::unconfigured());
        let app = app!(state(pool, fake.clone()), sessions);
        let cookie = login!(&app);

        let req = test::TestRequest::post()
            .uri("/api/ai/code")
            .cookie(cookie)
            .set_json(json!({ "prompt": "hi" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "API key not configured");
        assert_eq!(fake.calls(), 0);
    }

    #[actix_web::test]
    async fn test_login_and_logout() {
        let (_dir, pool) = test_pool(false);
        let sessions = web::Data::new(SessionStore::new(60));
        let app = app!(state(pool, hello_world()), sessions);

        let req = test::TestRequest::post()
            .uri("/api/admin/login")
            .set_json(json!({ "password": "wrong" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(sessions.is_empty());

        let cookie = login!(&app);
        assert_eq!(sessions.len(), 1);

        let req = test::TestRequest::post()
            .uri("/api/admin/logout")
            .cookie(cookie.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(sessions.is_empty());

        let req = test::TestRequest::get()
            .uri("/api/admin/personas")
            .cookie(cookie)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_admin_persona_lifecycle() {
        let (_dir, pool) = test_pool(true);
        let sessions = web::Data::new(SessionStore::new(60));
        let app = app!(state(pool, hello_world()), sessions);
        let cookie = login!(&app);

        let req = test::TestRequest::post()
            .uri("/api/admin/personas")
            .cookie(cookie.clone())
            .set_json(json!({
                "name": "Tax Tom",
                "expert": "Tax Advisor",
                "api_model": "gpt-4",
                "system_prompt": "You explain tax rules.",
                "temperature": 0.5,
                "active": true
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(resp).await;
        assert_eq!(created["slug"], "tax-tom");
        let id = created["id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri(&format!("/api/admin/personas/{}/status", id))
            .cookie(cookie.clone())
            .set_json(json!({ "active": false }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/api/personas/tax-tom").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri("/api/admin/personas")
            .cookie(cookie)
            .to_request();
        let all: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(all.as_array().unwrap().len(), 7);
    }

    #[actix_web::test]
    async fn test_handlers_leave_write_logging_to_services() {
        let (_dir, pool) = test_pool(true);
        let sessions = web::Data::new(SessionStore::new(60));
        let app = app!(state(pool, hello_world()), sessions);
        // Handlers run on this thread; database work runs on the blocking pool
        let messages = crate::logging::CapturedMessages::default();
        let _guard = tracing::subscriber::set_default(messages.subscriber());

        let cookie = login!(&app);
        let req = test::TestRequest::post()
            .uri("/api/admin/personas")
            .cookie(cookie)
            .set_json(json!({ "name": "Quiet Quinn", "api_model": "gpt-4" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        assert_eq!(messages.count("Admin session created"), 1);
        assert_eq!(messages.count("Persona created"), 0);
    }

    #[actix_web::test]
    async fn test_ftp_profiles_hide_password() {
        let (_dir, pool) = test_pool(false);
        let sessions = web::Data::new(SessionStore::new(60));
        let app = app!(state(pool, hello_world()), sessions);
        let cookie = login!(&app);

        let req = test::TestRequest::post()
            .uri("/api/dev/ftp/profiles")
            .cookie(cookie.clone())
            .set_json(json!({
                "name": "staging",
                "host": "ftp.example.com",
                "username": "deploy",
                "password": "hunter2"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/api/dev/ftp/profiles")
            .cookie(cookie.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        let text = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(text.contains("ftp.example.com"));
        assert!(!text.contains("hunter2"));

        let req = test::TestRequest::post()
            .uri("/api/dev/ftp/deploy")
            .cookie(cookie)
            .set_json(json!({ "profile_name": "production", "local_file": "index.html" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_assistant_fallback() {
        let (_dir, pool) = test_pool(false);
        let sessions = web::Data::new(SessionStore::new(60));
        let app = app!(state(pool, hello_world()), sessions);
        let cookie = login!(&app);

        let req = test::TestRequest::get()
            .uri("/api/dev/assistants/unknown")
            .cookie(cookie)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["slug"], "html5-dev");
        assert!(body["welcome_message"].as_str().is_some());
    }
}
