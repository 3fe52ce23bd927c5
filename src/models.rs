use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PERSONA_IMAGE: &str = "default-avatar.png";
pub const DEFAULT_PERSONA_MODEL: &str = "gpt-4o";

lazy_static! {
    static ref NON_SLUG_CHARS: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

// Columns selected for a full persona row, in `Persona::from_row` order
pub const PERSONA_COLUMNS: &str = "id, slug, name, expert, description, image, welcome_message, \
     item_order, status, api_model, system_prompt, temperature, frequency_penalty, \
     presence_penalty, use_voice, use_vision, use_image_generation";

// Define the structure for a persona (a configured AI chat character)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Persona {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub expert: String,
    pub description: String,
    pub image: String,
    pub welcome_message: String,
    pub item_order: i64,
    pub active: bool,

    // AI behavior
    pub api_model: String,
    pub system_prompt: String,
    pub temperature: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,

    // Feature toggles
    pub use_voice: bool,
    pub use_vision: bool,
    pub use_image_generation: bool,
}

impl Persona {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            slug: row.get(1)?,
            name: row.get(2)?,
            expert: row.get(3)?,
            description: row.get(4)?,
            image: row.get(5)?,
            welcome_message: row.get(6)?,
            item_order: row.get(7)?,
            active: row.get(8)?,
            api_model: row.get(9)?,
            system_prompt: row.get(10)?,
            temperature: row.get(11)?,
            frequency_penalty: row.get(12)?,
            presence_penalty: row.get(13)?,
            use_voice: row.get(14)?,
            use_vision: row.get(15)?,
            use_image_generation: row.get(16)?,
        })
    }
}

// Card shown on listing pages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaCard {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub expert: String,
    pub image: String,
    pub item_order: i64,
    pub is_vip: bool,
}

// Visitor-facing persona detail; never carries the system prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaDetail {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub expert: String,
    pub description: String,
    pub image: String,
    pub welcome_message: String,
    pub api_model: String,
    pub use_voice: bool,
    pub use_vision: bool,
    pub use_image_generation: bool,
    pub is_vip: bool,
}

impl PersonaDetail {
    pub fn from_persona(persona: Persona, is_vip: bool) -> Self {
        Self {
            id: persona.id,
            slug: persona.slug,
            name: persona.name,
            expert: persona.expert,
            description: persona.description,
            image: persona.image,
            welcome_message: persona.welcome_message,
            api_model: persona.api_model,
            use_voice: persona.use_voice,
            use_vision: persona.use_vision,
            use_image_generation: persona.use_image_generation,
            is_vip,
        }
    }
}

// Input for creating or replacing a persona from the back office or a
// template file. Unknown keys (including `_`-prefixed template metadata)
// are ignored by serde.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersonaDraft {
    pub slug: String,
    pub name: String,
    pub expert: String,
    pub description: String,
    pub image: String,
    pub welcome_message: String,
    pub item_order: Option<i64>,
    #[serde(alias = "status", deserialize_with = "flexible_bool")]
    pub active: bool,
    #[serde(alias = "API_MODEL")]
    pub api_model: String,
    #[serde(alias = "prompt")]
    pub system_prompt: String,
    pub temperature: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    #[serde(alias = "use_google_voice", deserialize_with = "flexible_bool")]
    pub use_voice: bool,
    #[serde(deserialize_with = "flexible_bool")]
    pub use_vision: bool,
    #[serde(alias = "use_dalle", deserialize_with = "flexible_bool")]
    pub use_image_generation: bool,
}

// Template files store flags as "0"/"1" strings; accept those, numbers and bools
fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Number(n) => Ok(n.as_f64().map(|v| v != 0.0).unwrap_or(false)),
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(D::Error::custom(format!("invalid flag value: {}", other))),
        },
        serde_json::Value::Null => Ok(false),
        other => Err(D::Error::custom(format!("invalid flag value: {}", other))),
    }
}

impl Default for PersonaDraft {
    fn default() -> Self {
        Self {
            slug: String::new(),
            name: String::new(),
            expert: String::new(),
            description: String::new(),
            image: DEFAULT_PERSONA_IMAGE.to_string(),
            welcome_message: String::new(),
            item_order: None,
            active: true,
            api_model: DEFAULT_PERSONA_MODEL.to_string(),
            system_prompt: String::new(),
            temperature: 0.7,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            use_voice: false,
            use_vision: false,
            use_image_generation: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub slug: String,
    pub name: String,
}

// Category entry for the filter dropdown, with its number of visible personas
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategorySummary {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub persona_count: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

// One turn of a browser-held conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// Lowercase a display name into a URL slug ("Marketing Maven!" -> "marketing-maven").
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    NON_SLUG_CHARS
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Generate a random alphanumeric token of the given length.
pub fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Marketing Maven"), "marketing-maven");
        assert_eq!(slugify("  C++ / Rust Guru!! "), "c-rust-guru");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_random_token_generation() {
        let a = random_token(48);
        let b = random_token(48);

        assert_eq!(a.len(), 48);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_template_keys_map_onto_draft() {
        let json = r#"{
            "_comment": "exported template",
            "name": "Marketing Maven",
            "expert": "Marketing Expert",
            "API_MODEL": "gpt-4o-mini",
            "prompt": "You are a marketing expert.",
            "temperature": 0.5,
            "status": "1",
            "use_vision": 0,
            "use_dalle": "1"
        }"#;
        let draft: PersonaDraft = serde_json::from_str(json).unwrap();

        assert_eq!(draft.name, "Marketing Maven");
        assert_eq!(draft.api_model, "gpt-4o-mini");
        assert_eq!(draft.system_prompt, "You are a marketing expert.");
        assert!(draft.use_image_generation);
        assert!(!draft.use_vision);
        assert!(draft.active);
        assert_eq!(draft.image, DEFAULT_PERSONA_IMAGE);
    }

    #[test]
    fn test_inactive_template_status() {
        let draft: PersonaDraft = serde_json::from_str(r#"{"name":"Hidden","status":"0"}"#).unwrap();
        assert!(!draft.active);

        let bad: Result<PersonaDraft, _> = serde_json::from_str(r#"{"name":"X","status":"maybe"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_chat_turn_roles() {
        let turn: ChatTurn = serde_json::from_str(r#"{"role":"assistant","content":"hi"}"#).unwrap();
        assert_eq!(turn.role, Role::Assistant);

        let system: Result<ChatTurn, _> = serde_json::from_str(r#"{"role":"system","content":"x"}"#);
        assert!(system.is_err());
    }
}
