use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Non-secret settings, read from `config.toml`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub imap_server: String,
    pub imap_port: u16,
    pub mailbox: String,
    pub search_query: String,
    pub db_path: Option<String>,
    pub bind_addr: String,
    pub fetch_limit: usize,
    pub model: String,
    pub api_base: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            imap_server: "imap.gmail.com".to_string(),
            imap_port: 993,
            mailbox: "INBOX".to_string(),
            search_query: r#"X-GM-RAW "category:primary""#.to_string(),
            db_path: None,
            bind_addr: "127.0.0.1:5000".to_string(),
            fetch_limit: 10,
            model: "gemini-2.0-flash".to_string(),
            api_base: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

/// Secrets, taken from the process environment only.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub app_password: String,
    pub gemini_api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("app_password", &"[REDACTED]")
            .field("gemini_api_key", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("{key} is not set in the environment"))
        };
        Ok(Self {
            email: get("EMAIL")?,
            app_password: get("APP_PASSWORD")?,
            gemini_api_key: get("GEMINI_API_KEY")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    pub credentials: Credentials,
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("mail_triage"))
}

pub fn config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

pub fn default_db_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("emails.db");
    Ok(p)
}

/// Read settings from `path`, writing a template with the defaults if it is missing.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        let sample = Settings::default();
        let tom = toml::to_string_pretty(&sample)?;
        fs::write(path, tom)?;
        log::info!("Created template config at {}", path.display());
        return Ok(sample);
    }
    let s = fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&s)?;
    Ok(settings)
}

pub fn load_config() -> Result<Config> {
    let settings = load_settings_from(&config_path()?)?;
    let credentials = Credentials::from_env()?;
    Ok(Config {
        settings,
        credentials,
    })
}

/// Settings only; enough for commands that never touch the network.
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&config_path()?)
}

pub fn resolve_db_path(settings: &Settings) -> Result<PathBuf> {
    if let Some(p) = &settings.db_path {
        Ok(PathBuf::from(p))
    } else {
        default_db_path()
    }
}
