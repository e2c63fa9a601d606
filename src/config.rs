// Settings for the proxy client, the search pipeline and the HTTP server.
// Sources, lowest priority first: built-in defaults, config.toml, APP_* env vars.

use std::time::Duration;

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::gateway::{DEFAULT_PROXY_URL, DEFAULT_USER_AGENT};
use crate::listing::DEFAULT_LISTING_BASE_URL;

const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0:4000";
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_DELAY_MS: u64 = 2000;
const DEFAULT_SLEEP_TIME_MS: u64 = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_address: String,
    pub proxy_url: String,
    pub listing_base_url: String,
    pub user_agent: String,
    /// Retries after the first 503 before giving up.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Pause between consecutive page requests.
    pub sleep_time_ms: u64,
    /// Directory with the built frontend, served at `/` when set.
    pub static_dir: Option<String>,
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let builder = Config::builder()
            .set_default("server_address", DEFAULT_SERVER_ADDRESS)?
            .set_default("proxy_url", DEFAULT_PROXY_URL)?
            .set_default("listing_base_url", DEFAULT_LISTING_BASE_URL)?
            .set_default("user_agent", DEFAULT_USER_AGENT)?
            .set_default("max_retries", i64::from(DEFAULT_MAX_RETRIES))?
            .set_default("retry_delay_ms", DEFAULT_RETRY_DELAY_MS as i64)?
            .set_default("sleep_time_ms", DEFAULT_SLEEP_TIME_MS as i64)?
            .add_source(File::with_name("config").required(false))
            // e.g. APP_SLEEP_TIME_MS=0
            .add_source(Environment::with_prefix("APP").try_parsing(true));

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn sleep_time(&self) -> Duration {
        Duration::from_millis(self.sleep_time_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            listing_base_url: DEFAULT_LISTING_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            sleep_time_ms: DEFAULT_SLEEP_TIME_MS,
            static_dir: None,
        }
    }
}
