use super::{Tool, required_str};
use crate::types::JsonMap;
use serde_json::{Value, json};
use std::thread;
use std::time::Duration;

const SIMULATED_LATENCY: Duration = Duration::from_millis(50);

pub struct GetWeather;

impl Tool for GetWeather {
    fn name(&self) -> &'static str {
        "get_weather"
    }

    fn description(&self) -> &'static str {
        "Get a weather forecast for a city."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": { "type": "string" }
            },
            "required": ["city"]
        })
    }

    fn call(&self, args: &JsonMap) -> anyhow::Result<JsonMap> {
        let city = required_str(args, "city")?;
        thread::sleep(SIMULATED_LATENCY);

        let mut out = JsonMap::new();
        out.insert("city".into(), json!(city));
        out.insert("forecast".into(), json!("Sunny"));
        out.insert("temp_c".into(), json!(27));
        Ok(out)
    }
}
