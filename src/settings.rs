use std::env;
use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::CLIENT_NAME;

const CONFIG_NAME: &str = "config.toml";

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub bind_addr: String,
    #[serde(default = "default_origins")]
    pub allowed_origins: Vec<String>,
    pub plaid: Plaid,
}

#[derive(Debug, Deserialize)]
pub struct Plaid {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub secret: String,
    pub env: String,
}

impl Settings {
    /// Layers defaults, the config file and `FINBOARD_*` variables, in that
    /// order. The plain `PLAID_*` variables only fill in the defaults.
    pub fn new(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut s = Config::builder()
            .set_default("data_dir", "data")?
            .set_default("bind_addr", "127.0.0.1:8000")?
            .set_default("plaid.client_id", env::var("PLAID_CLIENT_ID").unwrap_or_default())?
            .set_default("plaid.secret", env::var("PLAID_SECRET").unwrap_or_default())?
            .set_default(
                "plaid.env",
                env::var("PLAID_ENV").unwrap_or_else(|_| "sandbox".to_string()),
            )?;

        s = match config_path {
            Some(path) => s.add_source(File::with_name(path)),
            None => match default_config_path() {
                Some(path) => s.add_source(File::from(path).required(false)),
                None => s,
            },
        };

        s.add_source(
            Environment::with_prefix("FINBOARD")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize()
    }
}

fn default_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

pub(crate) fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CLIENT_NAME).join(CONFIG_NAME))
}
