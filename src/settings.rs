use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::currency::CurrencyFormat;
use crate::window::TimeWindow;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub clinic_email: Option<String>,
    #[serde(default = "default_window")]
    pub default_window: TimeWindow,
    #[serde(default)]
    pub currency: CurrencyFormat,
}

fn default_max_connections() -> u32 {
    5
}

fn default_log_filter() -> String {
    "clinic_portal=info".to_string()
}

fn default_window() -> TimeWindow {
    TimeWindow::Monthly
}

impl Settings {
    /// `.env`, then `clinic-portal.toml`, then `PORTAL__*` variables.
    /// `DATABASE_URL` is accepted as the database URL default.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL").unwrap_or_default();
        let settings = Config::builder()
            .set_default("database_url", database_url)?
            .add_source(File::with_name("clinic-portal").required(false))
            .add_source(Environment::with_prefix("PORTAL").separator("__"))
            .build()
            .context("failed to read configuration")?;

        let settings: Settings = settings
            .try_deserialize()
            .context("invalid configuration")?;

        if settings.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL must be set to the clinic portal Postgres instance");
        }

        Ok(settings)
    }
}
