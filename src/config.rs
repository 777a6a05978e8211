use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;
use std::io;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub database_url: String,
    pub status_message: String,
    /// Register slash commands in this guild only (fast iteration while developing).
    pub dev_guild_id: Option<u64>,
}

/// Values read from the optional TOML config file. Environment variables win over these.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    discord_token: Option<String>,
    database_url: Option<String>,
    status_message: Option<String>,
    dev_guild_id: Option<u64>,
}

const DEFAULT_CONFIG_PATH: &str = "userwatch.toml";
const DEFAULT_DATABASE_URL: &str = "data/userwatch.db";
const DEFAULT_STATUS_MESSAGE: &str = "Watching for familiar faces";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        let file = Self::load_file()?;
        Self::build(file)
    }

    fn load_file() -> anyhow::Result<FileConfig> {
        Self::load_file_from(env::var("USERWATCH_CONFIG").ok())
    }

    /// An explicit path must exist. The default path may be absent.
    fn load_file_from(explicit: Option<String>) -> anyhow::Result<FileConfig> {
        let path = explicit
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound && explicit.is_none() => {
                return Ok(FileConfig::default());
            }
            Err(e) => return Err(anyhow::anyhow!("Cannot read config file {}: {}", path, e)),
        };
        toml::from_str(&content).map_err(|e| anyhow::anyhow!("Invalid config file {}: {}", path, e))
    }

    fn build(file: FileConfig) -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .ok()
                .or(file.discord_token)
                .ok_or_else(|| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            database_url: env::var("DATABASE_URL")
                .ok()
                .or(file.database_url)
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            status_message: env::var("STATUS_MESSAGE")
                .ok()
                .or(file.status_message)
                .unwrap_or_else(|| DEFAULT_STATUS_MESSAGE.to_string()),
            dev_guild_id: env::var("DEV_GUILD_ID")
                .ok()
                .and_then(|id| id.parse().ok())
                .or(file.dev_guild_id)
                .filter(|id| *id != 0),
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("database_url", &self.database_url)
            .field("status_message", &self.status_message)
            .field("dev_guild_id", &self.dev_guild_id)
            .finish()
    }
}

/// Embed description limit is 4096 characters
pub const DISCORD_EMBED_LIMIT: usize = 4096;
/// Embed field values are capped at 1024 characters
pub const DISCORD_EMBED_FIELD_LIMIT: usize = 1024;
/// An embed carries at most 25 fields
pub const DISCORD_EMBED_MAX_FIELDS: usize = 25;
