use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    pub store: StoreSettings,
}

/// Network location of the backing store, as configured.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreSettings {
    pub host: String,
    pub port: u16,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("store.host", "127.0.0.1")?
            .set_default("store.port", 6379)?
            // Start with defaults
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local configuration file (not tracked by git)
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from environment variables (with prefix KEYBUS)
            .add_source(Environment::with_prefix("KEYBUS").separator("_"))
            .build()?;

        s.try_deserialize()
    }
}
