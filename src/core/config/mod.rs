use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::portal::types::ScopeValue;

pub const DEFAULT_CONFIG_FILE: &str = "portal.toml";

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub drive: DriveConfig,
    pub auth: AuthConfig,
    pub portal: PortalConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin of the web client. Access links point here.
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            region: "auto".to_string(),
            bucket: "evidence".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub linked_client_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            linked_client_ttl_minutes: 480,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Scope of a control that has no override row for a client.
    pub default_scope: ScopeValue,
    pub download_url_ttl_secs: u64,
    pub max_upload_bytes: usize,
    /// Links never expire when unset.
    pub access_link_ttl_hours: Option<u32>,
    pub append_on_resubmit: bool,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            default_scope: ScopeValue::Default,
            download_url_ttl_secs: 60,
            max_upload_bytes: 25 * 1024 * 1024,
            access_link_ttl_hours: None,
            append_on_resubmit: false,
        }
    }
}

impl AppConfig {
    /// Defaults, then `portal.toml` (or `$PORTAL_CONFIG`), then `PORTAL_*`
    /// variables with `__` between sections, e.g. `PORTAL_SERVER__PORT`.
    pub fn figment() -> Figment {
        let file = std::env::var("PORTAL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file));
        if let Ok(url) = std::env::var("DATABASE_URL") {
            figment = figment.merge(Serialized::default("database.url", url));
        }
        figment.merge(Env::prefixed("PORTAL_").split("__"))
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }

    /// Settings the server cannot start without.
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("database.url is not set (PORTAL_DATABASE__URL or DATABASE_URL)".to_string());
        }
        if self.auth.jwt_secret.is_empty() {
            return Err("auth.jwt_secret is not set (PORTAL_AUTH__JWT_SECRET)".to_string());
        }
        if self.drive.access_key.is_empty() || self.drive.secret_key.is_empty() {
            return Err("drive credentials are not set".to_string());
        }
        Ok(())
    }
}
