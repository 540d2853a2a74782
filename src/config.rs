use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_relays")]
    pub relays: Vec<String>,

    #[serde(default)]
    pub identity: IdentityConfig,

    /// Minutes between automatic sync cycles.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_minutes: u32,

    #[serde(default = "default_feed_list_width")]
    pub feed_list_width: u16,

    #[serde(default = "default_article_list_width")]
    pub article_list_width: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub signer: SignerChoice,

    /// Public key (npub); informational, the signer is authoritative.
    pub npub: Option<String>,

    /// Private key (nsec or hex) for the local signer.
    pub nsec: Option<String>,

    /// Socket of the session signer daemon; a default is derived when unset.
    pub bus_socket: Option<PathBuf>,

    /// NIP-46 bunker URL for the remote signer.
    pub bunker_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerChoice {
    #[default]
    Local,
    Bus,
    Remote,
}

impl IdentityConfig {
    /// Whether enough is configured to attempt a connection.
    pub fn is_configured(&self) -> bool {
        match self.signer {
            SignerChoice::Local => self.nsec.as_deref().is_some_and(|s| !s.is_empty()),
            SignerChoice::Bus => true,
            SignerChoice::Remote => {
                self.bunker_url.as_deref().is_some_and(|s| !s.is_empty())
            }
        }
    }

    pub fn bus_socket_path(&self) -> PathBuf {
        self.bus_socket.clone().unwrap_or_else(|| {
            dirs::runtime_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("nostr-signer.sock")
        })
    }
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feedstr");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("feeds.db").to_string_lossy().to_string()
}

fn default_relays() -> Vec<String> {
    [
        "wss://relay.damus.io",
        "wss://nos.lol",
        "wss://relay.snort.social",
        "wss://relay.nostr.band",
        "wss://nostr-pub.wellorder.net",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_sync_interval() -> u32 {
    15
}

fn default_feed_list_width() -> u16 {
    30
}

fn default_article_list_width() -> u16 {
    40
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            relays: default_relays(),
            identity: IdentityConfig::default(),
            sync_interval_minutes: default_sync_interval(),
            feed_list_width: default_feed_list_width(),
            article_list_width: default_article_list_width(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("feedstr")
            .join("config.toml")
    }
}
