use crate::tools::Tool;
use crate::types::JsonMap;
use anyhow::bail;
use serde_json::{Value, json};

/// Returns its arguments under `echo`.
pub struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn description(&self) -> &'static str {
        "Echo the arguments back."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object" })
    }

    fn call(&self, args: &JsonMap) -> anyhow::Result<JsonMap> {
        let mut out = JsonMap::new();
        out.insert("echo".into(), Value::Object(args.clone()));
        Ok(out)
    }
}

/// Always fails.
pub struct FailingTool;

impl Tool for FailingTool {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn description(&self) -> &'static str {
        "Fails every time."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object" })
    }

    fn call(&self, _args: &JsonMap) -> anyhow::Result<JsonMap> {
        bail!("backend unavailable")
    }
}

/// Panics instead of returning.
pub struct PanickingTool;

impl Tool for PanickingTool {
    fn name(&self) -> &'static str {
        "explode"
    }

    fn description(&self) -> &'static str {
        "Panics."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object" })
    }

    fn call(&self, _args: &JsonMap) -> anyhow::Result<JsonMap> {
        panic!("kaboom")
    }
}
