//! Weather tool: deterministic mock conditions per city.

use async_trait::async_trait;
use waypoint_core::error::ToolError;
use waypoint_core::tool::{Tool, ToolResult};

use crate::{required_str, stable_hash};

pub struct GetWeatherTool;

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get current weather for a city: temperature, conditions, humidity and wind."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City name"
                },
                "units": {
                    "type": "string",
                    "enum": ["metric", "imperial"],
                    "description": "Temperature units (default: metric)",
                    "default": "metric"
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let city = required_str(&arguments, "city")?;
        let units = arguments["units"].as_str().unwrap_or("metric");
        let weather = mock_weather(city, units);
        let data = serde_json::to_value(&weather).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "get_weather".into(),
            reason: e.to_string(),
        })?;
        Ok(ToolResult::json(data))
    }
}

#[derive(serde::Serialize)]
struct WeatherData {
    city: String,
    temperature: f64,
    units: String,
    conditions: String,
    humidity: u32,
    wind_speed: f64,
    wind_direction: String,
}

fn mock_weather(city: &str, units: &str) -> WeatherData {
    let hash = stable_hash(city);

    let conditions_list = [
        "Clear skies",
        "Partly cloudy",
        "Overcast",
        "Light rain",
        "Heavy rain",
        "Thunderstorms",
        "Snow",
        "Foggy",
    ];
    let wind_dirs = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

    let base_temp_c = ((hash % 40) as f64) - 5.0;
    let (temperature, unit_label) = if units == "imperial" {
        (base_temp_c * 9.0 / 5.0 + 32.0, "°F")
    } else {
        (base_temp_c, "°C")
    };

    WeatherData {
        city: city.to_string(),
        temperature: (temperature * 10.0).round() / 10.0,
        units: unit_label.to_string(),
        conditions: conditions_list[(hash as usize / 7) % conditions_list.len()].to_string(),
        humidity: 30 + (hash % 60),
        wind_speed: ((hash % 30) as f64) + 5.0,
        wind_direction: wind_dirs[(hash as usize / 3) % wind_dirs.len()].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_returns_weather() {
        let result = GetWeatherTool
            .execute(serde_json::json!({"city": "Tokyo"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("Tokyo"));
        assert!(result.output.contains("temperature"));
    }

    #[tokio::test]
    async fn imperial_units() {
        let result = GetWeatherTool
            .execute(serde_json::json!({"city": "New York", "units": "imperial"}))
            .await
            .unwrap();
        assert!(result.output.contains("°F"));
    }

    #[tokio::test]
    async fn deterministic_results() {
        let r1 = GetWeatherTool.execute(serde_json::json!({"city": "London"})).await.unwrap();
        let r2 = GetWeatherTool.execute(serde_json::json!({"city": "London"})).await.unwrap();
        assert_eq!(r1.output, r2.output);
    }

    #[tokio::test]
    async fn missing_city_returns_error() {
        assert!(GetWeatherTool.execute(serde_json::json!({})).await.is_err());
    }
}
