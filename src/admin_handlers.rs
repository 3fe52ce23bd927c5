use actix_web::cookie::{Cookie, SameSite};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app_state::{blocking, AppState};
use crate::errors::{GproError, GproResult};
use crate::model_catalog;
use crate::models::PersonaDraft;
use crate::persona_admin::CategoryDraft;
use crate::persona_query::IdSet;
use crate::session::{secrets_match, AdminGuard, SessionStore, SESSION_COOKIE};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct CategoryMembersRequest {
    pub persona_ids: Vec<i64>,
}

fn session_cookie(value: String) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .finish()
}

// Handler to open an admin session
pub async fn login_handler(
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    body: web::Json<LoginRequest>,
) -> GproResult<HttpResponse> {
    let expected = state
        .config
        .admin_password
        .as_deref()
        .ok_or_else(|| GproError::Config("Admin login is disabled".to_string()))?;

    if !secrets_match(&body.password, expected) {
        tracing::warn!("Rejected admin login");
        return Err(GproError::Unauthorized);
    }

    let session = sessions.create();

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(session.token.clone()))
        .json(json!({
            "success": true,
            "expires_at": session.expires_at,
        })))
}

// Handler to close the current admin session
pub async fn logout_handler(
    admin: AdminGuard,
    sessions: web::Data<SessionStore>,
) -> GproResult<HttpResponse> {
    sessions.remove(&admin.session.token);

    let mut cookie = session_cookie(String::new());
    cookie.make_removal();

    Ok(HttpResponse::Ok().cookie(cookie).json(json!({ "success": true })))
}

// Handler to list every persona, inactive ones included
pub async fn list_personas_handler(
    _admin: AdminGuard,
    state: web::Data<AppState>,
) -> GproResult<HttpResponse> {
    let admin = state.admin.clone();
    let personas = blocking(move || admin.list_all()).await?;
    Ok(HttpResponse::Ok().json(personas))
}

// Handler to create a persona
pub async fn create_persona_handler(
    _admin: AdminGuard,
    state: web::Data<AppState>,
    draft: web::Json<PersonaDraft>,
) -> GproResult<HttpResponse> {
    let admin = state.admin.clone();
    let draft = draft.into_inner();
    let persona = blocking(move || admin.create(draft)).await?;
    Ok(HttpResponse::Created().json(persona))
}

// Handler to update a persona
pub async fn update_persona_handler(
    _admin: AdminGuard,
    state: web::Data<AppState>,
    id: web::Path<i64>,
    draft: web::Json<PersonaDraft>,
) -> GproResult<HttpResponse> {
    let admin = state.admin.clone();
    let id = id.into_inner();
    let draft = draft.into_inner();
    let persona = blocking(move || admin.update(id, draft)).await?;
    Ok(HttpResponse::Ok().json(persona))
}

// Handler to activate or hide a persona
pub async fn set_status_handler(
    _admin: AdminGuard,
    state: web::Data<AppState>,
    id: web::Path<i64>,
    body: web::Json<StatusRequest>,
) -> GproResult<HttpResponse> {
    let admin = state.admin.clone();
    let id = id.into_inner();
    let active = body.active;
    let persona = blocking(move || admin.set_status(id, active)).await?;
    Ok(HttpResponse::Ok().json(persona))
}

// Handler to create a persona from an exported JSON template
pub async fn import_persona_handler(
    _admin: AdminGuard,
    state: web::Data<AppState>,
    template: web::Json<Value>,
) -> GproResult<HttpResponse> {
    let admin = state.admin.clone();
    let template = template.into_inner();
    let persona = blocking(move || admin.import_template(template)).await?;
    Ok(HttpResponse::Created().json(persona))
}

// Handler to create a category
pub async fn create_category_handler(
    _admin: AdminGuard,
    state: web::Data<AppState>,
    draft: web::Json<CategoryDraft>,
) -> GproResult<HttpResponse> {
    let admin = state.admin.clone();
    let draft = draft.into_inner();
    let category = blocking(move || admin.create_category(draft)).await?;
    Ok(HttpResponse::Created().json(category))
}

// Handler to replace the personas assigned to a category
pub async fn set_category_personas_handler(
    _admin: AdminGuard,
    state: web::Data<AppState>,
    id: web::Path<i64>,
    body: web::Json<CategoryMembersRequest>,
) -> GproResult<HttpResponse> {
    if body.persona_ids.iter().any(|id| *id <= 0) {
        return Err(GproError::Validation("Persona ids must be positive".to_string()));
    }
    let ids = IdSet::from_ids(body.persona_ids.iter().copied());
    let admin = state.admin.clone();
    let category_id = id.into_inner();
    let assigned = blocking(move || admin.set_category_personas(category_id, &ids)).await?;
    Ok(HttpResponse::Ok().json(json!({
        "category_id": category_id,
        "assigned": assigned,
    })))
}

// Handler to list the model catalogue offered in the persona editor
pub async fn list_models_handler(_admin: AdminGuard) -> GproResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(model_catalog::get_all_models()))
}
