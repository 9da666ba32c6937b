use std::{env, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_PATH: &str = "config.yml";

/// Process-wide configuration, built once at startup and threaded into the
/// components that need it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub kestra: KestraConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

/// Connection settings for the upstream Kestra instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KestraConfig {
    pub base_url: String,
    /// Basic-auth credential in `user:password` form, sent as-is.
    pub credential: String,
    pub timeout_ms: u64,
}

impl Default for KestraConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            credential: "admin@kestra.io:Admin1234".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// Load `config.yml` if present, otherwise start from defaults, then apply
    /// environment overrides (`PORT`, `KESTRA_URL`, `KESTRA_AUTH`,
    /// `KESTRA_TIMEOUT_MS`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config: Config = if path.exists() {
            let file = BufReader::new(
                File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
            );
            serde_yaml::from_reader(file)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        if let Ok(port) = env::var("PORT") {
            config.server.port = port.parse().context("Invalid PORT")?;
        }
        if let Ok(base_url) = env::var("KESTRA_URL") {
            config.kestra.base_url = base_url;
        }
        if let Ok(credential) = env::var("KESTRA_AUTH") {
            config.kestra.credential = credential;
        }
        if let Ok(timeout_ms) = env::var("KESTRA_TIMEOUT_MS") {
            config.kestra.timeout_ms = timeout_ms.parse().context("Invalid KESTRA_TIMEOUT_MS")?;
        }
        Ok(config)
    }
}
