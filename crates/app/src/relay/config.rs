//! Environment-driven configuration with the service's stock defaults.

use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};

pub(crate) const DEFAULT_BIND: &str = "0.0.0.0:8081";
pub(crate) const DEFAULT_STORAGE_DIR: &str = "imagesfile";
pub(crate) const DEFAULT_DETECT_URL: &str = "http://127.0.0.1:8082/predict";
pub(crate) const DEFAULT_DETECT_SERVICE: &str = "detection_600";
pub(crate) const DEFAULT_DETECT_CONFIDENCE: f64 = 0.3;
pub(crate) const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
pub(crate) const DEFAULT_WEATHER_CITY: &str = "Hiroshima";
pub(crate) const DEFAULT_SUBJECTS: &str = "Person,Face";

/// Runtime settings, read once at startup and never reloaded.
#[derive(Clone, Debug)]
pub(crate) struct RelayConfig {
    pub(crate) bind: String,
    pub(crate) storage_dir: PathBuf,
    pub(crate) detect_url: String,
    pub(crate) detect_service: String,
    pub(crate) detect_confidence: f64,
    pub(crate) detect_upload: bool,
    pub(crate) subjects: Vec<String>,
    pub(crate) webhook_url: Option<String>,
    pub(crate) weather_url: String,
    pub(crate) weather_city: String,
    pub(crate) weather_api_key: Option<String>,
    pub(crate) upstream_timeout: Option<Duration>,
}

impl RelayConfig {
    /// Read every setting from the environment, falling back to the stock
    /// defaults. Blank values count as unset.
    pub(crate) fn from_env() -> Result<Self> {
        let detect_confidence = match var("LOOKOUT_DETECT_CONFIDENCE") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid LOOKOUT_DETECT_CONFIDENCE {raw:?}"))?,
            None => DEFAULT_DETECT_CONFIDENCE,
        };
        let upstream_timeout = match var("LOOKOUT_UPSTREAM_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .with_context(|| format!("invalid LOOKOUT_UPSTREAM_TIMEOUT_SECS {raw:?}"))?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };
        let subjects = split_csv(
            &var("LOOKOUT_SUBJECTS").unwrap_or_else(|| DEFAULT_SUBJECTS.to_string()),
        );
        if subjects.is_empty() {
            bail!("LOOKOUT_SUBJECTS must name at least one label");
        }

        Ok(Self {
            bind: var("LOOKOUT_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            storage_dir: var("LOOKOUT_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR)),
            detect_url: var("LOOKOUT_DETECT_URL").unwrap_or_else(|| DEFAULT_DETECT_URL.to_string()),
            detect_service: var("LOOKOUT_DETECT_SERVICE")
                .unwrap_or_else(|| DEFAULT_DETECT_SERVICE.to_string()),
            detect_confidence,
            detect_upload: var("LOOKOUT_DETECT_UPLOAD")
                .map(|raw| flag(&raw))
                .unwrap_or(false),
            subjects,
            webhook_url: var("DISCORD_WEBHOOK"),
            weather_url: var("LOOKOUT_WEATHER_URL")
                .unwrap_or_else(|| DEFAULT_WEATHER_URL.to_string()),
            weather_city: var("LOOKOUT_WEATHER_CITY")
                .unwrap_or_else(|| DEFAULT_WEATHER_CITY.to_string()),
            weather_api_key: var("OPENWEATHER_API_KEY"),
            upstream_timeout,
        })
    }
}

/// Read a variable, treating unset and blank as the same thing.
fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn flag(raw: &str) -> bool {
    matches!(
        raw.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
