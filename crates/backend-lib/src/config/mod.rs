// ============================
// crates/backend-lib/src/config/mod.rs
// ============================
//! Configuration management.
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};


/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "boardsync.toml";

/// Prefix of environment variables read into [`Settings`]
pub const ENV_PREFIX: &str = "BOARDSYNC_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Data directory for the flat-file store
    pub data_dir: PathBuf,
    /// Log level
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Comma separated CORS allow-list, `*` mirrors any origin
    pub cors_origins: String,
    /// Static admin credential; admin endpoints are closed when unset
    pub admin_token: Option<String>,
    /// Maximum JSON request body size
    pub max_body_bytes: usize,
    /// Maximum room file upload size
    pub max_file_bytes: usize,
    /// Maximum websocket frame size
    pub max_ws_message_bytes: usize,
    /// Per-connection buffer for presence events and broadcasts; a connection
    /// that lets it fill up is dropped
    pub reliable_queue_depth: usize,
    /// Per-connection buffer for volatile broadcasts before frames are dropped
    pub volatile_queue_depth: usize,
    pub storage: StorageSettings,
    pub seed: SeedSettings,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Which persistence adapter backs the REST surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    FlatFile,
    Postgres,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

/// Start-up seeding of a demo teacher and student link
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedSettings {
    pub enabled: bool,
    pub teacher_name: String,
    pub teacher_email: Option<String>,
    pub teacher_id: Option<String>,
    pub teacher_token: Option<String>,
    pub student_name: String,
    pub permalink: Option<String>,
    pub room_id: Option<String>,
    pub room_key: Option<String>,
    /// Origin of the whiteboard front-end, used to print links
    pub app_origin: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3002)),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            cors_origins: "*".to_string(),
            admin_token: None,
            max_body_bytes: 2 * 1024 * 1024,
            max_file_bytes: 4 * 1024 * 1024,
            max_ws_message_bytes: 4 * 1024 * 1024,
            reliable_queue_depth: 256,
            volatile_queue_depth: 64,
            storage: StorageSettings::default(),
            seed: SeedSettings::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::FlatFile,
            database_url: None,
            max_connections: 5,
        }
    }
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            teacher_name: "Test Teacher".to_string(),
            teacher_email: None,
            teacher_id: None,
            teacher_token: None,
            student_name: "Test Student".to_string(),
            permalink: None,
            room_id: None,
            room_key: None,
            app_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the default file and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load settings with an explicit TOML file.
    ///
    /// Later sources win: defaults, TOML file, `boardsync.json`, `BOARDSYNC_*`
    /// variables (nested keys split on `__`), then the bare `DATABASE_URL`,
    /// `ADMIN_TOKEN`, `CORS_ORIGIN` and `PORT` variables. A bare
    /// `DATABASE_URL` selects the Postgres backend unless a backend was
    /// configured explicitly.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let configured = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Json::file("boardsync.json"))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        let backend_configured = configured.contains("storage.backend");

        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(configured)
            .merge(
                Env::raw()
                    .only(&["database_url", "admin_token", "cors_origin"])
                    .map(|key| {
                        if key == "database_url" {
                            "storage.database_url".into()
                        } else if key == "cors_origin" {
                            "cors_origins".into()
                        } else {
                            key.into()
                        }
                    }),
            );

        let mut settings: Settings = figment.extract()?;

        if !backend_configured && std::env::var("DATABASE_URL").is_ok_and(|url| !url.is_empty()) {
            settings.storage.backend = StorageBackend::Postgres;
        }

        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(port) => settings.bind_addr = SocketAddr::from(([0, 0, 0, 0], port)),
                Err(_) => bail!("PORT must be a valid port number, got {port:?}"),
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            bail!("log_level must be one of {LOG_LEVELS:?}, got {:?}", self.log_level);
        }
        if self.storage.backend == StorageBackend::Postgres
            && self.storage.database_url.as_deref().map_or(true, str::is_empty)
        {
            bail!("storage.backend = postgres requires storage.database_url");
        }
        if self.storage.max_connections == 0 {
            bail!("storage.max_connections must be greater than zero");
        }
        if self.max_body_bytes == 0 || self.max_file_bytes == 0 || self.max_ws_message_bytes == 0 {
            bail!("size limits must be greater than zero");
        }
        if self.reliable_queue_depth == 0 || self.volatile_queue_depth == 0 {
            bail!("queue depths must be greater than zero");
        }
        Ok(())
    }

    /// Parsed CORS allow-list; `None` means any origin is mirrored
    pub fn cors_origin_list(&self) -> Option<Vec<String>> {
        let origins: Vec<String> = self
            .cors_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            None
        } else {
            Some(origins)
        }
    }

    /// The admin credential, ignoring an empty value
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref().filter(|t| !t.is_empty())
    }
}
