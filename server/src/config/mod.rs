use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{GameServerError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub http: HttpConfig,
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub forum: ForumConfig,
    pub war_status: WarStatusConfig,
    pub auth: AuthConfig,
    pub ticks: TickConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/realmwar".to_string(),
            max_connections: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForumConfig {
    pub verify_url: String,
    pub timeout_secs: u64,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            verify_url: "http://localhost:9000/api/verify".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarStatusConfig {
    pub feed_url: String,
    pub timeout_secs: u64,
}

impl Default for WarStatusConfig {
    fn default() -> Self {
        Self {
            feed_url: "http://localhost:9000/api/war-status".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token_secret: String,
    pub token_ttl_hours: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // Overridden by AUTH_TOKEN_SECRET in any real deployment.
            token_secret: "change-me-to-a-32-byte-minimum-secret".to_string(),
            token_ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    pub walker_secs: u64,
    pub health_secs: u64,
    pub spells_secs: u64,
    pub world_time_secs: u64,
    pub territory_secs: u64,
    pub spawns_secs: u64,
    pub flush_secs: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            walker_secs: 1,
            health_secs: 1,
            spells_secs: 1,
            world_time_secs: 10,
            territory_secs: 15,
            spawns_secs: 5,
            flush_secs: 5,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            forum: ForumConfig::default(),
            war_status: WarStatusConfig::default(),
            auth: AuthConfig::default(),
            ticks: TickConfig::default(),
        }
    }
}

impl GameConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| GameServerError::Config(format!("Failed to read config file: {}", e)))?;

        let config: GameConfig = toml::from_str(&content)
            .map_err(|e| GameServerError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Loads the file named by `CONFIG_PATH` (falling back to defaults when
    /// unset) and applies environment overrides for deployment secrets.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("CONFIG_PATH") {
            Ok(path) => Self::load_from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            config.cache.url = url;
        }
        if let Ok(secret) = std::env::var("AUTH_TOKEN_SECRET") {
            config.auth.token_secret = secret;
        }
        if let Ok(url) = std::env::var("FORUM_VERIFY_URL") {
            config.forum.verify_url = url;
        }
        if let Ok(url) = std::env::var("WAR_STATUS_URL") {
            config.war_status.feed_url = url;
        }
        if let Ok(port) = std::env::var("SERVER_PORT") {
            config.http.port = port
                .parse()
                .map_err(|_| GameServerError::Config("SERVER_PORT is not a port".to_string()))?;
        }
        if let Ok(port) = std::env::var("GATEWAY_PORT") {
            config.gateway.port = port
                .parse()
                .map_err(|_| GameServerError::Config("GATEWAY_PORT is not a port".to_string()))?;
        }

        Ok(config)
    }

    pub fn forum_timeout(&self) -> Duration {
        Duration::from_secs(self.forum.timeout_secs)
    }

    pub fn war_status_timeout(&self) -> Duration {
        Duration::from_secs(self.war_status.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_content = r#"
[http]
host = "127.0.0.1"
port = 3000

[gateway]
port = 3001

[database]
url = "postgres://db:5432/game"
max_connections = 32

[forum]
verify_url = "https://forum.example/api/verify"

[ticks]
territory_secs = 30
        "#;

        let config: GameConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.http.port, 3000);
        assert_eq!(config.gateway.port, 3001);
        assert_eq!(config.database.max_connections, 32);
        assert_eq!(config.ticks.territory_secs, 30);
        // Unspecified sections keep their defaults.
        assert_eq!(config.ticks.walker_secs, 1);
        assert_eq!(config.auth.token_ttl_hours, 24);
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let config: GameConfig = toml::from_str("").unwrap();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.ticks.flush_secs, 5);
    }
}
