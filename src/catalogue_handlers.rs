use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::app_state::{blocking, AppState};
use crate::errors::GproResult;
use crate::persona_query::PersonaFilter;

// Query string for persona listings
#[derive(Debug, Deserialize)]
pub struct PersonaListQuery {
    pub q: Option<String>,
    pub alpha: Option<String>,
    pub ids: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryPersonasQuery {
    pub q: Option<String>,
    pub alpha: Option<String>,
}

// Handler to list visible personas; `ids` switches to the id-set path
pub async fn list_personas_handler(
    state: web::Data<AppState>,
    query: web::Query<PersonaListQuery>,
) -> GproResult<HttpResponse> {
    let query = query.into_inner();
    let filter = PersonaFilter::from_params(query.q.as_deref(), query.alpha.as_deref());
    let personas = state.personas.clone();

    let cards = blocking(move || match query.ids {
        Some(raw_ids) => personas.search_by_id_list(&raw_ids, &filter),
        None if filter.is_empty() => personas.list_front(),
        None => personas.search_front(&filter),
    })
    .await?;

    Ok(HttpResponse::Ok().json(cards))
}

// Handler to get one visible persona
pub async fn get_persona_handler(
    state: web::Data<AppState>,
    slug: web::Path<String>,
) -> GproResult<HttpResponse> {
    let slug = slug.into_inner();
    let personas = state.personas.clone();
    let detail = blocking(move || personas.persona_detail(&slug)).await?;
    Ok(HttpResponse::Ok().json(detail))
}

// Handler to list categories with their persona counts
pub async fn list_categories_handler(state: web::Data<AppState>) -> GproResult<HttpResponse> {
    let personas = state.personas.clone();
    let categories = blocking(move || personas.categories_front()).await?;
    Ok(HttpResponse::Ok().json(categories))
}

// Handler to list the personas of one category
pub async fn category_personas_handler(
    state: web::Data<AppState>,
    slug: web::Path<String>,
    query: web::Query<CategoryPersonasQuery>,
) -> GproResult<HttpResponse> {
    let slug = slug.into_inner();
    let filter = PersonaFilter::from_params(query.q.as_deref(), query.alpha.as_deref());
    let personas = state.personas.clone();

    let (category, cards) = blocking(move || personas.category_personas(&slug, &filter)).await?;
    Ok(HttpResponse::Ok().json(json!({
        "category": category,
        "personas": cards,
    })))
}

pub async fn health_handler() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "gpro",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
