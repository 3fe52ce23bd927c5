use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};
use std::cmp::Ordering;
use std::path::Path;

use crate::errors::GproResult;

pub type DbPool = Pool<SqliteConnectionManager>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS personas (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    slug                 TEXT    NOT NULL UNIQUE,
    name                 TEXT    NOT NULL,
    expert               TEXT    NOT NULL DEFAULT '',
    description          TEXT    NOT NULL DEFAULT '',
    image                TEXT    NOT NULL DEFAULT 'default-avatar.png',
    welcome_message      TEXT    NOT NULL DEFAULT '',
    item_order           INTEGER NOT NULL DEFAULT 999,
    status               INTEGER NOT NULL DEFAULT 1,
    api_model            TEXT    NOT NULL DEFAULT 'gpt-4o',
    system_prompt        TEXT    NOT NULL DEFAULT '',
    temperature          REAL    NOT NULL DEFAULT 0.7,
    frequency_penalty    REAL    NOT NULL DEFAULT 0,
    presence_penalty     REAL    NOT NULL DEFAULT 0,
    use_voice            INTEGER NOT NULL DEFAULT 0,
    use_vision           INTEGER NOT NULL DEFAULT 0,
    use_image_generation INTEGER NOT NULL DEFAULT 0,
    created_at           TEXT    NOT NULL,
    updated_at           TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_personas_listing ON personas (status, item_order, name);

CREATE TABLE IF NOT EXISTS categories (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    slug       TEXT    NOT NULL UNIQUE,
    name       TEXT    NOT NULL,
    item_order INTEGER NOT NULL DEFAULT 999,
    status     INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS persona_categories (
    category_id INTEGER NOT NULL REFERENCES categories (id) ON DELETE CASCADE,
    persona_id  INTEGER NOT NULL REFERENCES personas (id) ON DELETE CASCADE,
    PRIMARY KEY (category_id, persona_id)
);

CREATE TABLE IF NOT EXISTS persona_credit_packs (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    persona_id INTEGER NOT NULL REFERENCES personas (id) ON DELETE CASCADE,
    name       TEXT    NOT NULL,
    credits    INTEGER NOT NULL DEFAULT 0
);
";

/// Connection customizer: per-connection pragmas plus the case-insensitive
/// matching functions the persona queries rely on.
#[derive(Debug)]
struct SqliteConnectionCustomizer;

impl CustomizeConnection<Connection, rusqlite::Error> for SqliteConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        register_match_functions(conn)
    }
}

/// Lowercase one character at a time, so a substring folds to exactly the
/// same text as its span inside the whole string.
pub fn fold_case(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).collect()
}

/// Name ordering: case-folded text first, raw bytes as the tiebreak.
pub fn compare_folded(a: &str, b: &str) -> Ordering {
    fold_case(a).cmp(&fold_case(b)).then_with(|| a.cmp(b))
}

/// `contains_ci(haystack, needle)`, `starts_with_ci(haystack, prefix)` and
/// the `FOLD` collation used for name ordering.
///
/// SQLite's LIKE only folds ASCII and treats `%`/`_` in user input as
/// wildcards; these compare the literal text with Unicode lowercasing.
pub fn register_match_functions(conn: &Connection) -> Result<(), rusqlite::Error> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("contains_ci", 2, flags, |ctx| {
        let haystack: Option<String> = ctx.get(0)?;
        let needle: Option<String> = ctx.get(1)?;
        Ok(match (haystack, needle) {
            (Some(h), Some(n)) => fold_case(&h).contains(&fold_case(&n)),
            _ => false,
        })
    })?;

    conn.create_scalar_function("starts_with_ci", 2, flags, |ctx| {
        let haystack: Option<String> = ctx.get(0)?;
        let prefix: Option<String> = ctx.get(1)?;
        Ok(match (haystack, prefix) {
            (Some(h), Some(p)) => fold_case(&h).starts_with(&fold_case(&p)),
            _ => false,
        })
    })?;

    conn.create_collation("FOLD", compare_folded)?;

    Ok(())
}

/// Open (or create) the database file, apply the schema and return a pool.
pub fn init_db(db_path: &Path) -> GproResult<DbPool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    tracing::info!(path = %db_path.display(), "Initializing database");

    let manager = SqliteConnectionManager::file(db_path);
    let pool = Pool::builder()
        .max_size(8)
        .connection_customizer(Box::new(SqliteConnectionCustomizer))
        .build(manager)?;

    {
        let conn = pool.get()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;
    }

    tracing::info!("Database initialized successfully");
    Ok(pool)
}

/// Insert the demo catalogue. Existing rows (matched by slug) are left alone.
pub fn seed_demo_data(pool: &DbPool) -> GproResult<()> {
    let conn = pool.get()?;
    let now = chrono::Utc::now().to_rfc3339();

    // (slug, name, expert, description, item_order, status, system prompt)
    let personas = [
        ("marketing-maven", "Marketing Maven", "Marketing Strategist",
         "Plans campaigns, positioning and launch messaging.", 1, 1,
         "You are a senior marketing strategist. Give concrete, actionable campaign advice."),
        ("data-dana", "Data Dana", "Data Scientist",
         "Explains statistics and builds analysis plans.", 2, 1,
         "You are a pragmatic data scientist. Explain methods plainly and show your reasoning."),
        ("copy-carl", "Copy Carl", "Copywriter",
         "Writes landing pages, ads and product descriptions for market launches.", 3, 1,
         "You are a conversion-focused copywriter."),
        ("legal-lena", "Legal Lena", "Contract Reviewer",
         "Reviews contracts and highlights risky clauses.", 4, 1,
         "You are a careful contract reviewer. You do not give formal legal advice."),
        ("chef-chiara", "Chef Chiara", "Italian Chef",
         "Recipes, menus and kitchen technique.", 5, 1,
         "You are a warm, encouraging Italian chef."),
        ("archived-arno", "Archived Arno", "Market Analyst",
         "Retired persona kept for history.", 6, 0,
         "You are a market analyst."),
    ];

    for (slug, name, expert, description, item_order, status, prompt) in &personas {
        conn.execute(
            "INSERT OR IGNORE INTO personas
             (slug, name, expert, description, item_order, status, system_prompt, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![slug, name, expert, description, item_order, status, prompt, now],
        )?;
    }

    let categories = [
        ("business", "Business", 1),
        ("lifestyle", "Lifestyle", 2),
        ("analytics", "Analytics", 3),
    ];
    for (slug, name, item_order) in &categories {
        conn.execute(
            "INSERT OR IGNORE INTO categories (slug, name, item_order) VALUES (?1, ?2, ?3)",
            params![slug, name, item_order],
        )?;
    }

    let memberships = [
        ("business", "marketing-maven"),
        ("business", "copy-carl"),
        ("business", "legal-lena"),
        ("business", "archived-arno"),
        ("analytics", "data-dana"),
        ("analytics", "archived-arno"),
        ("lifestyle", "chef-chiara"),
    ];
    for (category, persona) in &memberships {
        conn.execute(
            "INSERT OR IGNORE INTO persona_categories (category_id, persona_id)
             SELECT c.id, p.id FROM categories c, personas p WHERE c.slug = ?1 AND p.slug = ?2",
            params![category, persona],
        )?;
    }

    conn.execute(
        "INSERT INTO persona_credit_packs (persona_id, name, credits)
         SELECT p.id, 'Pro pack', 500 FROM personas p
         WHERE p.slug = 'legal-lena'
           AND NOT EXISTS (SELECT 1 FROM persona_credit_packs k WHERE k.persona_id = p.id)",
        [],
    )?;

    tracing::debug!("Demo catalogue seeded");
    Ok(())
}

/// Temporary database for unit tests; keep the `TempDir` alive while the
/// pool is in use.
#[cfg(test)]
pub(crate) fn test_pool(seed: bool) -> (tempfile::TempDir, DbPool) {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = init_db(&dir.path().join("test.db")).unwrap();
    if seed {
        seed_demo_data(&pool).unwrap();
    }
    (dir, pool)
}
