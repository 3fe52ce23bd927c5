use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use std::collections::BTreeSet;

use crate::db::DbPool;
use crate::errors::{GproError, GproResult};
use crate::models::{Category, CategorySummary, Persona, PersonaCard, PersonaDetail, PERSONA_COLUMNS};

lazy_static! {
    // ASCII digits only: `\d` would also admit other scripts' numerals
    static ref ID_LIST: Regex = Regex::new(r"^[0-9]+(,[0-9]+)*$").unwrap();
}

const CARD_SELECT: &str = "SELECT p.id, p.slug, p.name, p.expert, p.image, p.item_order, \
     EXISTS (SELECT 1 FROM persona_credit_packs k WHERE k.persona_id = p.id) AS is_vip \
     FROM personas p";

const CARD_ORDER: &str = "ORDER BY p.item_order ASC, p.name COLLATE FOLD ASC, p.id ASC";

/// A validated, de-duplicated set of positive persona ids.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdSet(BTreeSet<i64>);

impl IdSet {
    pub fn from_ids<I: IntoIterator<Item = i64>>(ids: I) -> Self {
        IdSet(ids.into_iter().filter(|id| *id > 0).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &i64> {
        self.0.iter()
    }

    /// JSON array text for binding the whole set as one SQL parameter.
    pub fn to_json(&self) -> String {
        serde_json::Value::from(self.0.iter().copied().collect::<Vec<i64>>()).to_string()
    }
}

/// Parse a comma separated id list such as `"5,9,12"`.
///
/// Spaces are ignored. Anything else that is not a list of positive integers
/// (stray characters, empty segments, zero, overflow) yields `None`.
pub fn parse_id_list(raw: &str) -> Option<IdSet> {
    let compact: String = raw.chars().filter(|c| *c != ' ').collect();
    if !ID_LIST.is_match(&compact) {
        return None;
    }

    let mut ids = BTreeSet::new();
    for part in compact.split(',') {
        let id: i64 = part.parse().ok()?;
        if id <= 0 {
            return None;
        }
        ids.insert(id);
    }
    Some(IdSet(ids))
}

/// Leading-letter filter: exactly one alphabetic character, otherwise ignored.
pub fn normalize_letter(raw: Option<&str>) -> Option<char> {
    let trimmed = raw?.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_alphabetic() => Some(c),
        _ => None,
    }
}

/// Free-text term: trimmed, empty means "no term".
pub fn normalize_term(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Optional free-text and leading-letter restrictions for a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonaFilter {
    pub term: Option<String>,
    pub letter: Option<char>,
}

impl PersonaFilter {
    pub fn from_params(q: Option<&str>, alpha: Option<&str>) -> Self {
        Self {
            term: normalize_term(q),
            letter: normalize_letter(alpha),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.term.is_none() && self.letter.is_none()
    }
}

// WHERE clause accumulator; every value is bound, never spliced into SQL
struct CardQuery {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl CardQuery {
    fn active() -> Self {
        Self {
            clauses: vec!["p.status = 1".to_string()],
            values: Vec::new(),
        }
    }

    fn bind(&mut self, value: Value) -> usize {
        self.values.push(value);
        self.values.len()
    }

    // One bound JSON array, so the set size never meets SQLite's variable limit
    fn restrict_to(&mut self, ids: &IdSet) {
        let n = self.bind(Value::Text(ids.to_json()));
        self.clauses.push(format!("p.id IN (SELECT value FROM json_each(?{}))", n));
    }

    fn apply(&mut self, filter: &PersonaFilter) {
        if let Some(letter) = filter.letter {
            let n = self.bind(Value::Text(letter.to_string()));
            self.clauses.push(format!("starts_with_ci(p.name, ?{})", n));
        }
        if let Some(term) = &filter.term {
            let n = self.bind(Value::Text(term.clone()));
            self.clauses.push(format!(
                "(contains_ci(p.name, ?{n}) OR contains_ci(p.expert, ?{n}) OR contains_ci(p.description, ?{n}))"
            ));
        }
    }

    fn sql(&self) -> String {
        format!("{} WHERE {} {}", CARD_SELECT, self.clauses.join(" AND "), CARD_ORDER)
    }
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<PersonaCard> {
    Ok(PersonaCard {
        id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        expert: row.get(3)?,
        image: row.get(4)?,
        item_order: row.get(5)?,
        is_vip: row.get(6)?,
    })
}

/// Read-only access to the visible persona catalogue.
#[derive(Clone)]
pub struct PersonaQueryService {
    pool: DbPool,
}

impl PersonaQueryService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn run(&self, query: CardQuery) -> GproResult<Vec<PersonaCard>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&query.sql())?;
        let cards = stmt
            .query_map(params_from_iter(query.values.iter()), card_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cards)
    }

    /// All active personas in rank order.
    pub fn list_front(&self) -> GproResult<Vec<PersonaCard>> {
        self.run(CardQuery::active())
    }

    /// Catalogue-wide search by free text and/or leading letter.
    pub fn search_front(&self, filter: &PersonaFilter) -> GproResult<Vec<PersonaCard>> {
        let mut query = CardQuery::active();
        query.apply(filter);
        self.run(query)
    }

    /// Active personas whose id is in `ids`, in rank order.
    pub fn list_by_ids(&self, ids: &IdSet) -> GproResult<Vec<PersonaCard>> {
        self.search_by_ids(ids, &PersonaFilter::default())
    }

    /// Id-set listing further restricted by the filter.
    pub fn search_by_ids(&self, ids: &IdSet, filter: &PersonaFilter) -> GproResult<Vec<PersonaCard>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = CardQuery::active();
        query.restrict_to(ids);
        query.apply(filter);
        self.run(query)
    }

    /// Id-set listing from untrusted text. A malformed list is not an error:
    /// it selects nothing and no query is executed.
    pub fn search_by_id_list(&self, raw_ids: &str, filter: &PersonaFilter) -> GproResult<Vec<PersonaCard>> {
        match parse_id_list(raw_ids) {
            Some(ids) => self.search_by_ids(&ids, filter),
            None => {
                tracing::debug!("Rejected malformed id list {:?}", raw_ids);
                Ok(Vec::new())
            }
        }
    }

    /// Full active persona row, including its AI settings.
    pub fn get_by_slug(&self, slug: &str) -> GproResult<Persona> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {} FROM personas WHERE slug = ?1 AND status = 1 LIMIT 1", PERSONA_COLUMNS);
        conn.query_row(&sql, params![slug], Persona::from_row)
            .optional()?
            .ok_or_else(|| GproError::NotFound(format!("Persona '{}' not found", slug)))
    }

    /// Visitor-facing view of an active persona.
    pub fn persona_detail(&self, slug: &str) -> GproResult<PersonaDetail> {
        let persona = self.get_by_slug(slug)?;
        let conn = self.pool.get()?;
        let is_vip: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM persona_credit_packs WHERE persona_id = ?1)",
            params![persona.id],
            |row| row.get(0),
        )?;
        Ok(PersonaDetail::from_persona(persona, is_vip))
    }

    /// Active categories in rank order with the number of visible personas.
    pub fn categories_front(&self) -> GproResult<Vec<CategorySummary>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.slug, c.name,
                    (SELECT COUNT(*) FROM persona_categories pc
                       JOIN personas p ON p.id = pc.persona_id
                      WHERE pc.category_id = c.id AND p.status = 1) AS persona_count
               FROM categories c
              WHERE c.status = 1
              ORDER BY c.item_order ASC, c.name COLLATE FOLD ASC",
        )?;
        let categories = stmt
            .query_map([], |row| {
                Ok(CategorySummary {
                    id: row.get(0)?,
                    slug: row.get(1)?,
                    name: row.get(2)?,
                    persona_count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    pub fn category_by_slug(&self, slug: &str) -> GproResult<Category> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, slug, name FROM categories WHERE slug = ?1 AND status = 1 LIMIT 1",
            params![slug],
            |row| {
                Ok(Category {
                    id: row.get(0)?,
                    slug: row.get(1)?,
                    name: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| GproError::NotFound(format!("Category '{}' not found", slug)))
    }

    /// Ids of every persona attached to the category, visible or not.
    pub fn category_persona_ids(&self, category_id: i64) -> GproResult<IdSet> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT persona_id FROM persona_categories WHERE category_id = ?1")?;
        let ids = stmt
            .query_map(params![category_id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(IdSet::from_ids(ids))
    }

    /// Category page: resolve the slug, then list its personas through the
    /// id-set path with the optional filter applied.
    pub fn category_personas(&self, slug: &str, filter: &PersonaFilter) -> GproResult<(Category, Vec<PersonaCard>)> {
        let category = self.category_by_slug(slug)?;
        let ids = self.category_persona_ids(category.id)?;
        let cards = self.search_by_ids(&ids, filter)?;
        Ok((category, cards))
    }
}
