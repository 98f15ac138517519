use serde::Deserialize;
use serde_json::Value;

use crate::error::ToolError;

#[derive(Debug, Clone, Deserialize)]
pub struct GetWeatherInput {
    pub latitude: f64,
    pub longitude: f64,
}

/// Forecast lookup against an Open-Meteo compatible endpoint.
pub struct GetWeatherExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl GetWeatherExecutor {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub async fn execute(&self, input: GetWeatherInput) -> Result<Value, ToolError> {
        if !(-90.0..=90.0).contains(&input.latitude) || !(-180.0..=180.0).contains(&input.longitude)
        {
            return Err(ToolError::InvalidArguments(format!(
                "coordinates out of range: {}, {}",
                input.latitude, input.longitude
            )));
        }

        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", input.latitude.to_string()),
                ("longitude", input.longitude.to_string()),
                ("current", "temperature_2m".to_string()),
                ("hourly", "temperature_2m".to_string()),
                ("daily", "sunrise,sunset".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Upstream(format!("weather request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ToolError::Upstream(format!("weather service returned {}", status)));
        }

        resp.json()
            .await
            .map_err(|e| ToolError::Upstream(format!("invalid weather response: {}", e)))
    }
}
