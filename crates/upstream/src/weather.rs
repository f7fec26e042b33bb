//! Current-weather lookup against an OpenWeather-style endpoint.

use serde::Deserialize;
use thiserror::Error;

/// Label reported when the provider has no condition to offer.
pub const UNKNOWN_WEATHER: &str = "Unknown";

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather request failed")]
    Request(#[from] reqwest::Error),
    #[error("weather response was not valid JSON")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    #[serde(default)]
    weather: Vec<WeatherCondition>,
}

#[derive(Debug, Deserialize)]
struct WeatherCondition {
    main: String,
}

/// Fetches the current condition label for one configured city.
#[derive(Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    base_url: String,
    city: String,
    api_key: String,
}

impl WeatherClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        city: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            city: city.into(),
            api_key: api_key.into(),
        }
    }

    /// Return the current condition label, or [`UNKNOWN_WEATHER`] when the
    /// provider answers without one (an unknown city does exactly that).
    pub async fn current_label(&self) -> Result<String, WeatherError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("q", self.city.as_str()), ("appid", self.api_key.as_str())])
            .send()
            .await?;
        let body = response.text().await?;
        let decoded: WeatherResponse = serde_json::from_str(&body)?;
        Ok(decoded
            .weather
            .first()
            .map(|condition| condition.main.clone())
            .unwrap_or_else(|| UNKNOWN_WEATHER.to_string()))
    }
}
