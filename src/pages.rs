use actix_files::NamedFile;
use actix_web::http::header::ContentType;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::app_state::{blocking, AppState};
use crate::errors::{GproError, GproResult};
use crate::models::{Category, CategorySummary, PersonaCard};
use crate::persona_query::PersonaFilter;

const LANDING_FALLBACK: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>GPRO</title>
  </head>
  <body>
    <h1>Landing page not found</h1>
    <p>Place an <code>index.html</code> in the public directory.</p>
  </body>
</html>"#;

#[derive(Debug, Deserialize)]
pub struct CategoryPageQuery {
    pub q: Option<String>,
}

/// Escape text for HTML element content and quoted attribute values.
pub fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

// Landing page: the static index.html, or a minimal placeholder
pub async fn landing(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let index = state.config.public_dir.join("index.html");
    match NamedFile::open_async(&index).await {
        Ok(file) => file.into_response(&req),
        Err(e) => {
            tracing::warn!(path = %index.display(), "Landing page unavailable: {}", e);
            HttpResponse::Ok()
                .content_type(ContentType::html())
                .body(LANDING_FALLBACK)
        }
    }
}

// Category listing page with optional search
pub async fn ai_team_category(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<CategoryPageQuery>,
) -> GproResult<HttpResponse> {
    let slug = path.into_inner();
    let filter = PersonaFilter::from_params(query.q.as_deref(), None);
    let term = filter.term.clone().unwrap_or_default();

    let personas = state.personas.clone();
    let lookup = blocking(move || {
        let categories = personas.categories_front()?;
        let (category, cards) = personas.category_personas(&slug, &filter)?;
        Ok((categories, category, cards))
    })
    .await;

    match lookup {
        Ok((categories, category, cards)) => Ok(HttpResponse::Ok()
            .content_type(ContentType::html())
            .body(render_category_page(&category, &categories, &cards, &term))),
        Err(GproError::NotFound(message)) => {
            tracing::debug!("{}", message);
            Ok(HttpResponse::NotFound()
                .content_type(ContentType::html())
                .body(render_not_found()))
        }
        Err(e) => Err(e),
    }
}

fn render_card(card: &PersonaCard) -> String {
    let vip = if card.is_vip {
        r#"<span class="badge vip">VIP</span>"#
    } else {
        ""
    };
    format!(
        r#"      <article class="persona-card" data-slug="{slug}">
        <img src="/public_uploads/{image}" alt="{name}" loading="lazy" />
        <h3>{name} {vip}</h3>
        <p>{expert}</p>
      </article>"#,
        slug = html_escape(&card.slug),
        image = html_escape(&card.image),
        name = html_escape(&card.name),
        expert = html_escape(&card.expert),
        vip = vip,
    )
}

pub fn render_category_page(
    category: &Category,
    categories: &[CategorySummary],
    cards: &[PersonaCard],
    term: &str,
) -> String {
    let options = categories
        .iter()
        .map(|c| {
            format!(
                r#"<option value="/ai-team/{slug}"{selected}>{name} ({count})</option>"#,
                slug = html_escape(&c.slug),
                selected = if c.id == category.id { " selected" } else { "" },
                name = html_escape(&c.name),
                count = c.persona_count,
            )
        })
        .collect::<Vec<_>>()
        .join("\n          ");

    let grid = if cards.is_empty() {
        r#"      <p class="empty">No AI personas found.</p>"#.to_string()
    } else {
        cards.iter().map(render_card).collect::<Vec<_>>().join("\n")
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>AI Team - {name}</title>
  </head>
  <body>
    <section id="inner-page">
      <h1>AI Team - {name}</h1>
      <form class="form-filter" onsubmit="location.href=this.category.value; return false;">
        <select name="category">
          {options}
        </select>
        <button type="submit">Filter</button>
      </form>
      <form method="get" action="/ai-team/{slug}">
        <input type="text" name="q" value="{term}" placeholder="Search personas..." />
        <button type="submit">Search</button>
      </form>
    </section>
    <section class="persona-grid">
{grid}
    </section>
  </body>
</html>"#,
        name = html_escape(&category.name),
        slug = html_escape(&category.slug),
        term = html_escape(term),
        options = options,
        grid = grid,
    )
}

fn render_not_found() -> String {
    r#"<!DOCTYPE html>
<html lang="en">
  <head><meta charset="utf-8" /><title>Not found</title></head>
  <body><h1>404</h1><p>This category does not exist.</p></body>
</html>"#
        .to_string()
}
