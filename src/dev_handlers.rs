use actix_web::{web, HttpResponse};
use serde::Serialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::assistants::{get_all_assistants, resolve_assistant, AssistantPreset};
use crate::deploy::{deploy_file, DeployRequest, FtpProfile};
use crate::errors::{GproError, GproResult};
use crate::session::AdminGuard;

#[derive(Debug, Serialize)]
pub struct AssistantView {
    #[serde(flatten)]
    pub preset: AssistantPreset,
    pub welcome_message: String,
}

// Handler to list the developer assistant presets
pub async fn list_assistants_handler(_admin: AdminGuard) -> GproResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(get_all_assistants()))
}

// Handler to get one preset; unknown slugs fall back to the default assistant
pub async fn get_assistant_handler(
    _admin: AdminGuard,
    slug: web::Path<String>,
) -> GproResult<HttpResponse> {
    let preset = resolve_assistant(Some(slug.as_str()));
    let welcome_message = preset.welcome_message();
    Ok(HttpResponse::Ok().json(AssistantView {
        preset,
        welcome_message,
    }))
}

// Handler to list the FTP profiles saved in this session
pub async fn list_profiles_handler(admin: AdminGuard) -> GproResult<HttpResponse> {
    let profiles = admin.session.deploy_profiles.lock().list();
    Ok(HttpResponse::Ok().json(profiles))
}

// Handler to save an FTP profile into this session
pub async fn save_profile_handler(
    admin: AdminGuard,
    profile: web::Json<FtpProfile>,
) -> GproResult<HttpResponse> {
    let mut profile = profile.into_inner();
    profile.name = profile.name.trim().to_string();
    profile.host = profile.host.trim().to_string();
    profile.validate()?;

    let name = profile.name.clone();
    let replaced = admin.session.deploy_profiles.lock().save(profile);
    tracing::info!(profile = %name, replaced, "FTP profile saved");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "name": name,
        "replaced": replaced,
    })))
}

// Handler to upload a workspace file with a saved profile
pub async fn deploy_handler(
    admin: AdminGuard,
    state: web::Data<AppState>,
    request: web::Json<DeployRequest>,
) -> GproResult<HttpResponse> {
    let request = request.into_inner();
    // Clone out so the lock is not held across the upload
    let profile = admin
        .session
        .deploy_profiles
        .lock()
        .get(&request.profile_name)
        .ok_or_else(|| GproError::NotFound("Unknown FTP profile".to_string()))?;

    let report = deploy_file(
        &profile,
        &state.config.workspace_dir,
        &request.local_file,
        &request.remote_file,
    )
    .await?;

    Ok(HttpResponse::Ok().json(report))
}
