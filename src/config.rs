use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_DATABASE_FILE: &str = "gpro.db";
pub const DEFAULT_PROVIDER_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_API_MODEL: &str = "gpt-4";
pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const DEFAULT_STALL_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 720;

// Command line overrides for the environment configuration
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "gpro", about = "GPRO persona portal server")]
pub struct Cli {
    /// Address to listen on, e.g. 0.0.0.0:8080
    #[arg(long)]
    pub bind: Option<String>,

    /// SQLite database file
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Insert the demo persona catalogue on startup
    #[arg(long, default_value_t = false)]
    pub seed: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub database_path: PathBuf,
    pub seed_demo_data: bool,

    // Chat completion provider
    pub provider_url: String,
    pub api_key: Option<String>,
    pub default_model: String,
    pub history_limit: usize,
    pub stall_timeout: Duration,
    pub request_timeout: Duration,

    // Back office
    pub admin_password: Option<String>,
    pub session_ttl_minutes: i64,

    // Filesystem locations
    pub public_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            seed_demo_data: false,
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            api_key: None,
            default_model: DEFAULT_API_MODEL.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            stall_timeout: Duration::from_secs(DEFAULT_STALL_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            admin_password: None,
            session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            public_dir: PathBuf::from("./public"),
            uploads_dir: PathBuf::from("./public_uploads"),
            workspace_dir: PathBuf::from("./workspace"),
            log_dir: PathBuf::from("./logs"),
        }
    }
}

/// Result of startup configuration. Nothing is logged while loading since
/// the subscriber is only installed once `log_dir` is known.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub env_file: Option<PathBuf>,
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Replay what happened while loading, once tracing is up.
    pub fn log_notes(&self) {
        match &self.env_file {
            Some(path) => tracing::info!(path = %path.display(), "Loaded .env file"),
            None => tracing::debug!("No .env file loaded"),
        }
        for warning in &self.warnings {
            warn!("{}", warning);
        }
    }
}

impl AppConfig {
    /// Load `.env`, read the process environment, then apply CLI overrides.
    pub fn load(cli: &Cli) -> LoadedConfig {
        let env_file = dotenv::dotenv().ok();
        let (mut config, warnings) = Self::read_lookup(|key| env::var(key).ok());
        config.apply_cli(cli);
        LoadedConfig {
            config,
            env_file,
            warnings,
        }
    }

    /// Build a config from any key lookup (the environment in production,
    /// a map in tests), dropping the warnings.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::read_lookup(lookup).0
    }

    /// Build a config and collect a warning for every malformed value.
    pub fn read_lookup<F>(lookup: F) -> (Self, Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut warnings = Vec::new();

        let config = Self {
            bind_address: text("GPRO_BIND").unwrap_or(defaults.bind_address),
            database_path: text("GPRO_DATABASE")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            seed_demo_data: false,
            provider_url: text("GPRO_PROVIDER_URL").unwrap_or(defaults.provider_url),
            api_key: text("OPENAI_API_KEY"),
            default_model: text("GPRO_API_MODEL").unwrap_or(defaults.default_model),
            history_limit: parse_or(
                &mut warnings,
                "GPRO_HISTORY_LIMIT",
                text("GPRO_HISTORY_LIMIT"),
                DEFAULT_HISTORY_LIMIT,
            ),
            stall_timeout: Duration::from_secs(parse_or(
                &mut warnings,
                "GPRO_STALL_TIMEOUT",
                text("GPRO_STALL_TIMEOUT"),
                DEFAULT_STALL_TIMEOUT_SECS,
            )),
            request_timeout: Duration::from_secs(parse_or(
                &mut warnings,
                "GPRO_REQUEST_TIMEOUT",
                text("GPRO_REQUEST_TIMEOUT"),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            admin_password: text("GPRO_ADMIN_PASSWORD"),
            session_ttl_minutes: parse_or(
                &mut warnings,
                "GPRO_SESSION_TTL_MINUTES",
                text("GPRO_SESSION_TTL_MINUTES"),
                DEFAULT_SESSION_TTL_MINUTES,
            ),
            public_dir: text("GPRO_PUBLIC_DIR").map(PathBuf::from).unwrap_or(defaults.public_dir),
            uploads_dir: text("GPRO_UPLOADS_DIR").map(PathBuf::from).unwrap_or(defaults.uploads_dir),
            workspace_dir: text("GPRO_WORKSPACE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_dir),
            log_dir: text("GPRO_LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
        };
        (config, warnings)
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(bind) = &cli.bind {
            self.bind_address = bind.clone();
        }
        if let Some(database) = &cli.database {
            self.database_path = database.clone();
        }
        if cli.seed {
            self.seed_demo_data = true;
        }
    }
}

fn parse_or<T>(warnings: &mut Vec<String>, key: &str, value: Option<String>, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match value {
        None => default,
        Some(raw) => match raw.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warnings.push(format!("Ignoring malformed {}={:?}, using {}", key, raw, default));
                default
            }
        },
    }
}
