use rusqlite::{params, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::DbPool;
use crate::errors::{GproError, GproResult};
use crate::model_catalog;
use crate::models::{slugify, Category, Persona, PersonaDraft, PERSONA_COLUMNS};
use crate::persona_query::IdSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryDraft {
    #[serde(default)]
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub item_order: Option<i64>,
}

/// Back-office persona management. Unlike the query service this sees
/// inactive personas too.
#[derive(Clone)]
pub struct PersonaAdminService {
    pool: DbPool,
}

impl PersonaAdminService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn list_all(&self) -> GproResult<Vec<Persona>> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM personas ORDER BY item_order ASC, name COLLATE FOLD ASC, id ASC",
            PERSONA_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let personas = stmt
            .query_map([], Persona::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(personas)
    }

    pub fn get(&self, id: i64) -> GproResult<Persona> {
        let conn = self.pool.get()?;
        fetch(&conn, id)
    }

    /// Insert a new persona. The slug is derived from the name when empty and
    /// the rank defaults to one past the current highest.
    pub fn create(&self, draft: PersonaDraft) -> GproResult<Persona> {
        let slug = validate_draft(&draft)?;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        ensure_slug_free(&tx, &slug, None)?;
        let item_order = match draft.item_order {
            Some(order) => order,
            None => tx.query_row("SELECT COALESCE(MAX(item_order), 0) + 1 FROM personas", [], |r| r.get(0))?,
        };

        let now = chrono::Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO personas
             (slug, name, expert, description, image, welcome_message, item_order, status,
              api_model, system_prompt, temperature, frequency_penalty, presence_penalty,
              use_voice, use_vision, use_image_generation, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)",
            params![
                slug,
                draft.name.trim(),
                draft.expert,
                draft.description,
                draft.image,
                draft.welcome_message,
                item_order,
                draft.active,
                draft.api_model,
                draft.system_prompt,
                draft.temperature,
                draft.frequency_penalty,
                draft.presence_penalty,
                draft.use_voice,
                draft.use_vision,
                draft.use_image_generation,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        let persona = fetch(&tx, id)?;
        tx.commit()?;

        tracing::info!(id, slug = %persona.slug, "Persona created");
        Ok(persona)
    }

    /// Replace every editable field of an existing persona.
    pub fn update(&self, id: i64, draft: PersonaDraft) -> GproResult<Persona> {
        let slug = validate_draft(&draft)?;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let current = fetch(&tx, id)?;
        ensure_slug_free(&tx, &slug, Some(id))?;

        tx.execute(
            "UPDATE personas SET
                slug = ?1, name = ?2, expert = ?3, description = ?4, image = ?5,
                welcome_message = ?6, item_order = ?7, status = ?8, api_model = ?9,
                system_prompt = ?10, temperature = ?11, frequency_penalty = ?12,
                presence_penalty = ?13, use_voice = ?14, use_vision = ?15,
                use_image_generation = ?16, updated_at = ?17
             WHERE id = ?18",
            params![
                slug,
                draft.name.trim(),
                draft.expert,
                draft.description,
                draft.image,
                draft.welcome_message,
                draft.item_order.unwrap_or(current.item_order),
                draft.active,
                draft.api_model,
                draft.system_prompt,
                draft.temperature,
                draft.frequency_penalty,
                draft.presence_penalty,
                draft.use_voice,
                draft.use_vision,
                draft.use_image_generation,
                chrono::Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        let persona = fetch(&tx, id)?;
        tx.commit()?;

        tracing::info!(id, slug = %persona.slug, "Persona updated");
        Ok(persona)
    }

    /// Show or hide a persona on the public listings.
    pub fn set_status(&self, id: i64, active: bool) -> GproResult<Persona> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE personas SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![active, chrono::Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(GproError::NotFound(format!("Persona {} not found", id)));
        }
        tracing::info!(id, active, "Persona visibility changed");
        fetch(&conn, id)
    }

    /// Create a persona from an exported template document. Keys starting
    /// with `_` are template metadata and ignored.
    pub fn import_template(&self, template: Value) -> GproResult<Persona> {
        let Value::Object(fields) = template else {
            return Err(GproError::Validation("Template must be a JSON object".to_string()));
        };
        let cleaned: serde_json::Map<String, Value> = fields
            .into_iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .collect();

        let draft: PersonaDraft = serde_json::from_value(Value::Object(cleaned))
            .map_err(|e| GproError::Validation(format!("Invalid template: {}", e)))?;
        self.create(draft)
    }

    pub fn create_category(&self, draft: CategoryDraft) -> GproResult<Category> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(GproError::Validation("Category name is required".to_string()));
        }
        let slug = match draft.slug.trim() {
            "" => slugify(name),
            given => slugify(given),
        };
        if slug.is_empty() {
            return Err(GproError::Validation("Category slug is empty".to_string()));
        }

        let conn = self.pool.get()?;
        let taken: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM categories WHERE slug = ?1)",
            params![slug],
            |r| r.get(0),
        )?;
        if taken {
            return Err(GproError::Validation(format!("Category slug '{}' already in use", slug)));
        }

        let item_order: i64 = match draft.item_order {
            Some(order) => order,
            None => conn.query_row("SELECT COALESCE(MAX(item_order), 0) + 1 FROM categories", [], |r| r.get(0))?,
        };
        conn.execute(
            "INSERT INTO categories (slug, name, item_order) VALUES (?1, ?2, ?3)",
            params![slug, name, item_order],
        )?;

        Ok(Category {
            id: conn.last_insert_rowid(),
            slug,
            name: name.to_string(),
        })
    }

    /// Replace the category's membership with exactly `persona_ids`.
    pub fn set_category_personas(&self, category_id: i64, persona_ids: &IdSet) -> GproResult<usize> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM categories WHERE id = ?1)",
            params![category_id],
            |r| r.get(0),
        )?;
        if !exists {
            return Err(GproError::NotFound(format!("Category {} not found", category_id)));
        }

        if !persona_ids.is_empty() {
            let known: i64 = tx.query_row(
                "SELECT COUNT(*) FROM personas WHERE id IN (SELECT value FROM json_each(?1))",
                params![persona_ids.to_json()],
                |r| r.get(0),
            )?;
            if known as usize != persona_ids.len() {
                return Err(GproError::Validation("Unknown persona id in membership list".to_string()));
            }
        }

        tx.execute("DELETE FROM persona_categories WHERE category_id = ?1", params![category_id])?;
        for persona_id in persona_ids.iter() {
            tx.execute(
                "INSERT INTO persona_categories (category_id, persona_id) VALUES (?1, ?2)",
                params![category_id, persona_id],
            )?;
        }
        tx.commit()?;

        tracing::info!(category_id, members = persona_ids.len(), "Category membership replaced");
        Ok(persona_ids.len())
    }
}

fn fetch(conn: &rusqlite::Connection, id: i64) -> GproResult<Persona> {
    let sql = format!("SELECT {} FROM personas WHERE id = ?1", PERSONA_COLUMNS);
    conn.query_row(&sql, params![id], Persona::from_row)
        .optional()?
        .ok_or_else(|| GproError::NotFound(format!("Persona {} not found", id)))
}

fn ensure_slug_free(tx: &Transaction<'_>, slug: &str, except_id: Option<i64>) -> GproResult<()> {
    let owner: Option<i64> = tx
        .query_row("SELECT id FROM personas WHERE slug = ?1", params![slug], |r| r.get(0))
        .optional()?;
    match owner {
        Some(owner) if Some(owner) != except_id => {
            Err(GproError::Validation(format!("Slug '{}' already in use", slug)))
        }
        _ => Ok(()),
    }
}

// Checks shared by create and update; returns the normalized slug
fn validate_draft(draft: &PersonaDraft) -> GproResult<String> {
    if draft.name.trim().is_empty() {
        return Err(GproError::Validation("Persona name is required".to_string()));
    }
    let slug = match draft.slug.trim() {
        "" => slugify(&draft.name),
        given => slugify(given),
    };
    if slug.is_empty() {
        return Err(GproError::Validation("Persona slug is empty".to_string()));
    }
    if !(0.0..=2.0).contains(&draft.temperature) {
        return Err(GproError::Validation("Temperature must be between 0 and 2".to_string()));
    }
    for (label, value) in [
        ("Frequency penalty", draft.frequency_penalty),
        ("Presence penalty", draft.presence_penalty),
    ] {
        if !(-2.0..=2.0).contains(&value) {
            return Err(GproError::Validation(format!("{} must be between -2 and 2", label)));
        }
    }
    if !model_catalog::is_known_model(&draft.api_model) {
        tracing::warn!(model = %draft.api_model, "Persona uses a model missing from the catalogue");
    }
    Ok(slug)
}
