pub use self::get_weather::GetWeather;
pub use self::lookup_kb::LookupKb;

mod get_weather;
mod lookup_kb;

use crate::types::JsonMap;
use anyhow::anyhow;
use serde_json::Value;

/// A side-effecting function the model may call by name.
///
/// Tools are synchronous. The turn driver runs them on the blocking pool, one
/// at a time.
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON-Schema object describing the accepted arguments.
    fn parameters(&self) -> Value;

    fn call(&self, args: &JsonMap) -> anyhow::Result<JsonMap>;
}

pub(crate) fn required_str<'a>(args: &'a JsonMap, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing required string argument '{}'", key))
}
