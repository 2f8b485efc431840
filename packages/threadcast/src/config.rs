use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// =============================================================================
// Tunable config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [live]
//                    token_ttl_secs = 3600
//
//   env var:         THREADCAST_LIVE__TOKEN_TTL_SECS=3600   (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub live: LiveFileConfig,
    #[serde(default)]
    pub posts: PostsFileConfig,
}

/// Listener settings (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Live connection tunables (lives under `[live]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LiveFileConfig {
    /// Frames queued per connection before sends to it start failing.
    #[serde(default = "default_send_channel_capacity")]
    pub send_channel_capacity: usize,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

impl Default for LiveFileConfig {
    fn default() -> Self {
        Self {
            send_channel_capacity: default_send_channel_capacity(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

/// Post validation (lives under `[posts]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostsFileConfig {
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

impl Default for PostsFileConfig {
    fn default() -> Self {
        Self {
            max_content_chars: default_max_content_chars(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_send_channel_capacity() -> usize {
    100
}
fn default_token_ttl_secs() -> u64 {
    86400
}
fn default_max_content_chars() -> usize {
    2000
}

/// Build a figment that layers: defaults → config.toml → THREADCAST_* env vars.
///
///   `THREADCAST_SERVER__PORT=8080`  →  `server.port = 8080`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("THREADCAST_").split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig)
// =============================================================================

#[derive(Clone, Debug)]
pub struct LiveConfig {
    pub send_channel_capacity: usize,
    pub token_ttl: Duration,
}

impl LiveConfig {
    pub fn from_file(fc: &LiveFileConfig) -> Self {
        Self {
            send_channel_capacity: fc.send_channel_capacity.max(1),
            token_ttl: Duration::from_secs(fc.token_ttl_secs.max(1)),
        }
    }
}

// =============================================================================
// Directory layout (fixed by --data-dir, not tunable via figment)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ThreadcastConfig {
    pub data_dir: PathBuf,
}

impl ThreadcastConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("could not find home directory")?
                .join(".threadcast"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}
