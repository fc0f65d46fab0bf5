use crate::tools::{GetWeather, LookupKb, Tool};
use crate::types::JsonMap;
use serde_json::{Value, json};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<[Arc<dyn Tool>]>,
    schemas: Arc<Value>,
}

impl ToolRegistry {
    /// The tools every conversation gets.
    pub fn new() -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(GetWeather), Arc::new(LookupKb)];
        Self::with_tools(tools)
    }

    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        // Single source of truth for the "tools" schema the LLM sees
        let schemas = Value::Array(
            tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name(),
                            "description": t.description(),
                            "parameters": t.parameters(),
                        }
                    })
                })
                .collect(),
        );
        Self {
            tools: tools.into(),
            schemas: Arc::new(schemas),
        }
    }

    pub fn schemas(&self) -> &Value {
        &self.schemas
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Parse `raw_arguments` and run the named tool.
    ///
    /// Never fails: unparsable arguments become an empty map, and unknown
    /// tools, tool errors and tool panics become an `error` result.
    pub fn dispatch(&self, name: &str, raw_arguments: &str) -> (JsonMap, JsonMap) {
        let args = parse_arguments(name, raw_arguments);

        let Some(tool) = self.get(name) else {
            warn!(tool = name, "model requested an unknown tool");
            return (args, error_result(format!("Unknown tool: {}", name), None));
        };

        let shown = Value::Object(args.clone());
        debug!(tool = name, args = %shown, "dispatching tool");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| tool.call(&args)));
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(tool = name, error = %e, "tool failed");
                error_result(format!("Tool {} failed", name), Some(e.to_string()))
            }
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                warn!(tool = name, panic = %detail, "tool panicked");
                error_result(format!("Tool {} failed", name), Some(detail))
            }
        };
        (args, result)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_arguments(name: &str, raw: &str) -> JsonMap {
    if raw.trim().is_empty() {
        return JsonMap::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(tool = name, arguments = %other, "tool arguments are not an object, using {{}}");
            JsonMap::new()
        }
        Err(e) => {
            warn!(tool = name, error = %e, raw, "unparsable tool arguments, using {{}}");
            JsonMap::new()
        }
    }
}

pub(crate) fn error_result(error: String, detail: Option<String>) -> JsonMap {
    let mut out = JsonMap::new();
    out.insert("error".into(), Value::String(error));
    if let Some(detail) = detail {
        out.insert("detail".into(), Value::String(detail));
    }
    out
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}
