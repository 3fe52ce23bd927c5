use actix_web::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use actix_web::web::Bytes;
use actix_web::{web, HttpResponse};
use futures::stream::StreamExt;

use crate::app_state::{blocking, AppState};
use crate::errors::{GproError, GproResult};
use crate::relay::{spawn_relay, CompletionRequest, CompletionSettings, RelayRequest};
use crate::session::AdminGuard;

/// `POST /api/ai/code`: stream a chat completion back as server-sent events.
///
/// The guard runs before the body is read, so anonymous callers are turned
/// away without any provider traffic. Validation failures and a missing API
/// key are reported as plain JSON errors; once the stream has started every
/// outcome arrives as an SSE event.
pub async fn relay_code_handler(
    _admin: AdminGuard,
    state: web::Data<AppState>,
    body: Bytes,
) -> GproResult<HttpResponse> {
    let request: RelayRequest = serde_json::from_slice(&body)?;

    let persona_slug = request
        .persona
        .as_deref()
        .map(str::trim)
        .filter(|slug| !slug.is_empty())
        .map(str::to_string);
    let settings = match persona_slug {
        Some(slug) => {
            let personas = state.personas.clone();
            let persona = blocking(move || personas.get_by_slug(&slug)).await?;
            CompletionSettings::from_persona(&persona, &state.config.default_model)
        }
        None => CompletionSettings::defaults(&state.config.default_model),
    };

    let completion = CompletionRequest::build(&request, &settings, state.config.history_limit)?;
    if !state.provider.is_configured() {
        return Err(GproError::Config("API key not configured".to_string()));
    }

    let events = spawn_relay(state.provider.clone(), completion, state.config.stall_timeout);

    Ok(HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/event-stream"))
        .insert_header((CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(events.map(|event| Ok::<Bytes, actix_web::Error>(event.to_sse_frame()))))
}
