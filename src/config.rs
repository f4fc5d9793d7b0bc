//! Application configuration
//!
//! Layered as built-in defaults, then an optional TOML file, then
//! `LEDGER__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

pub const CONFIG_PATH_ENV: &str = "LEDGER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/ledger.toml";
const ENV_PREFIX: &str = "LEDGER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub guard: GuardConfig,
    pub anchor: AnchorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://ledger.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Run a full check before accepting requests
    pub verify_on_startup: bool,
    /// Seconds between background checks, 0 disables them
    pub check_interval_secs: u64,
    /// Mutating paths served even while locked
    pub allow_paths: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            verify_on_startup: true,
            check_interval_secs: 300,
            allow_paths: vec![
                "/login".to_string(),
                "/logout".to_string(),
                "/refresh".to_string(),
                "/admin/audit/verify".to_string(),
                "/admin/audit/anchor".to_string(),
                "/admin/audit/reset".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    pub witness_timeout_secs: u64,
    /// Seconds between automatic anchors, 0 disables them
    pub auto_anchor_interval_secs: u64,
    pub operator: String,
    pub local_file: LocalFileConfig,
    pub git: GitConfig,
    pub paste: PasteConfig,
    pub opentimestamps: OpenTimestampsConfig,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            witness_timeout_secs: 10,
            auto_anchor_interval_secs: 0,
            operator: "system".to_string(),
            local_file: LocalFileConfig::default(),
            git: GitConfig::default(),
            paste: PasteConfig::default(),
            opentimestamps: OpenTimestampsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalFileConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for LocalFileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("anchors/ledger-anchors.jsonl"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub enabled: bool,
    pub program: PathBuf,
    pub repo_path: PathBuf,
    pub file_name: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: PathBuf::from("git"),
            repo_path: PathBuf::from("anchors/git"),
            file_name: "ledger-anchor.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasteConfig {
    pub enabled: bool,
    pub api_url: String,
    pub login_url: String,
    pub api_dev_key: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for PasteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://pastebin.com/api/api_post.php".to_string(),
            login_url: "https://pastebin.com/api/api_login.php".to_string(),
            api_dev_key: String::new(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenTimestampsConfig {
    pub enabled: bool,
    pub calendar_url: String,
    pub proofs_dir: PathBuf,
}

impl Default for OpenTimestampsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            calendar_url: "https://alice.btc.calendar.opentimestamps.org".to_string(),
            proofs_dir: PathBuf::from("anchors/ots"),
        }
    }
}

impl AppConfig {
    /// Load using `LEDGER_CONFIG` or the default file location
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let defaults = config::Config::try_from(&AppConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if path.exists() {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(
                config::File::from(path.to_path_buf()).format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("guard.allow_paths"),
        );

        let config = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
