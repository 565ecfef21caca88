//! Unified configuration for sitecraft.
//!
//! Settings are layered: built-in defaults → `sitecraft.toml` → `SITECRAFT_*`
//! environment variables → CLI flags (applied by `main.rs`).
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! public_url = "https://sites.example.com"
//!
//! [database]
//! path = ".sitecraft/sitecraft.db"
//!
//! [storage]
//! root = ".sitecraft/blobs"
//! max_upload_bytes = 10485760
//!
//! [auth]
//! session_ttl_hours = 720
//! cookie_secure = true
//!
//! [ai]
//! default_provider = "anthropic"
//!
//! [ai.providers.anthropic]
//! kind = "anthropic"
//! model = "claude-sonnet-4-5"
//! api_key_env = "ANTHROPIC_API_KEY"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "sitecraft.toml";

/// Ten years.
pub const MAX_SESSION_TTL_HOURS: i64 = 87_600;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub auth: AuthSettings,
    pub ai: AiSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Absolute base URL used in vCard exports and editor links.
    pub public_url: Option<String>,
    /// Enables permissive CORS for a locally served editor.
    pub dev_mode: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3141,
            public_url: None,
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".sitecraft/sitecraft.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub root: PathBuf,
    pub max_upload_bytes: usize,
    pub allowed_types: Vec<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".sitecraft/blobs"),
            max_upload_bytes: 10 * 1024 * 1024,
            allowed_types: [
                "image/png",
                "image/jpeg",
                "image/gif",
                "image/webp",
                "image/svg+xml",
                "application/pdf",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub session_ttl_hours: i64,
    pub cookie_secure: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            session_ttl_hours: 720,
            cookie_secure: false,
        }
    }
}

/// Wire protocol spoken by an AI provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions, or any compatible endpoint via `base_url`.
    Openai,
    Anthropic,
    Gemini,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Openai => write!(f, "openai"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::Gemini => write!(f, "gemini"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key; the key itself never lives in config.
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub default_provider: Option<String>,
    pub timeout_secs: u64,
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Default for AiSettings {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderSettings {
                kind: ProviderKind::Openai,
                model: "gpt-4o-mini".to_string(),
                base_url: None,
                api_key_env: "OPENAI_API_KEY".to_string(),
                max_tokens: default_max_tokens(),
            },
        );
        providers.insert(
            "anthropic".to_string(),
            ProviderSettings {
                kind: ProviderKind::Anthropic,
                model: "claude-sonnet-4-5".to_string(),
                base_url: None,
                api_key_env: "ANTHROPIC_API_KEY".to_string(),
                max_tokens: default_max_tokens(),
            },
        );
        providers.insert(
            "gemini".to_string(),
            ProviderSettings {
                kind: ProviderKind::Gemini,
                model: "gemini-2.0-flash".to_string(),
                base_url: None,
                api_key_env: "GEMINI_API_KEY".to_string(),
                max_tokens: default_max_tokens(),
            },
        );
        Self {
            default_provider: None,
            timeout_secs: 60,
            providers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// When set, logs also go to a daily rolling file in this directory.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from an explicit file, or `sitecraft.toml` in the
    /// working directory when present, then apply environment overrides.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match explicit_path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid sitecraft configuration")
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Apply `SITECRAFT_*` overrides using the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SITECRAFT_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("SITECRAFT_PORT") {
            self.server.port = v.parse().context("SITECRAFT_PORT must be a port number")?;
        }
        if let Some(v) = lookup("SITECRAFT_PUBLIC_URL") {
            self.server.public_url = Some(v);
        }
        if let Some(v) = lookup("SITECRAFT_DEV_MODE") {
            self.server.dev_mode = parse_bool(&v).context("SITECRAFT_DEV_MODE must be a boolean")?;
        }
        if let Some(v) = lookup("SITECRAFT_DB_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("SITECRAFT_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(v);
        }
        if let Some(v) = lookup("SITECRAFT_MAX_UPLOAD_BYTES") {
            self.storage.max_upload_bytes = v
                .parse()
                .context("SITECRAFT_MAX_UPLOAD_BYTES must be a byte count")?;
        }
        if let Some(v) = lookup("SITECRAFT_SESSION_TTL_HOURS") {
            self.auth.session_ttl_hours = v
                .parse()
                .context("SITECRAFT_SESSION_TTL_HOURS must be a number of hours")?;
        }
        if let Some(v) = lookup("SITECRAFT_COOKIE_SECURE") {
            self.auth.cookie_secure =
                parse_bool(&v).context("SITECRAFT_COOKIE_SECURE must be a boolean")?;
        }
        if let Some(v) = lookup("SITECRAFT_AI_DEFAULT_PROVIDER") {
            self.ai.default_provider = Some(v);
        }
        if let Some(v) = lookup("SITECRAFT_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("SITECRAFT_LOG_JSON") {
            self.logging.json = parse_bool(&v).context("SITECRAFT_LOG_JSON must be a boolean")?;
        }
        if let Some(v) = lookup("SITECRAFT_LOG_DIR") {
            self.logging.dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.session_ttl_hours <= 0 {
            anyhow::bail!("auth.session_ttl_hours must be positive");
        }
        if self.auth.session_ttl_hours > MAX_SESSION_TTL_HOURS {
            anyhow::bail!(
                "auth.session_ttl_hours must be at most {} (ten years)",
                MAX_SESSION_TTL_HOURS
            );
        }
        if self.storage.max_upload_bytes == 0 {
            anyhow::bail!("storage.max_upload_bytes must be positive");
        }
        if let Some(name) = &self.ai.default_provider
            && !self.ai.providers.contains_key(name)
        {
            anyhow::bail!(
                "ai.default_provider '{}' has no [ai.providers.{}] entry",
                name,
                name
            );
        }
        Ok(())
    }

    /// Base URL for absolute links, falling back to the bound address.
    pub fn public_url(&self) -> String {
        match &self.server.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.server.host, self.server.port),
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("'{}' is not a boolean", other),
    }
}
