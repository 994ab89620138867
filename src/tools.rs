//! Tool routing — maps named tool calls onto the registry and executor.
//!
//! Every tool takes a JSON object of arguments and answers with a JSON value.
//! Registry and validation faults are returned as [`ToolError`];
//! [`Dispatcher::call_text`] renders them as `Error: <message>` for the
//! MCP server.

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::executor::{ScriptExecutor, ValidationError};
use crate::registry::{
    ArgValue, NewScript, RegistryBackend, RegistryError, RegistryStore, ScriptDefinition,
    ScriptUpdate,
};

/// Errors raised by a tool call.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {message}")]
    BadRequest { tool: String, message: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Description of one tool, as listed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RunScriptParams {
    /// Script name to execute
    script_name: String,
    /// Script arguments (object format)
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RunRawParams {
    /// Script text; `{{name}}` placeholders are filled from args
    script: String,
    /// Script arguments (object format)
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ListParams {
    /// Filter by category (optional)
    #[serde(default)]
    category: Option<String>,
    /// Keyword search over name and description (optional)
    #[serde(default)]
    search: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ScriptNameParams {
    /// Script name
    script_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct UpdateParams {
    /// Script to update
    script_name: String,
    #[serde(flatten)]
    update: ScriptUpdate,
}

/// One row of `list_scripts` output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSummary {
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub usage: String,
    pub args_count: usize,
}

impl From<&ScriptDefinition> for ScriptSummary {
    fn from(def: &ScriptDefinition) -> Self {
        Self {
            name: def.name.clone(),
            description: def.description.clone(),
            category: def.category.clone(),
            usage: def.usage.clone(),
            args_count: def.args.len(),
        }
    }
}

fn input_schema<T: JsonSchema>() -> Value {
    let schema = SchemaSettings::draft07()
        .with(|s| s.inline_subschemas = true)
        .into_generator()
        .into_root_schema_for::<T>();
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// Every tool the dispatcher answers to.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "run_script",
            description: "Execute a registered script",
            input_schema: input_schema::<RunScriptParams>(),
        },
        ToolSpec {
            name: "run_raw_script",
            description: "Execute unregistered script text",
            input_schema: input_schema::<RunRawParams>(),
        },
        ToolSpec {
            name: "list_scripts",
            description: "Get list of registered scripts",
            input_schema: input_schema::<ListParams>(),
        },
        ToolSpec {
            name: "get_script_info",
            description: "Get detailed information about a specific script",
            input_schema: input_schema::<ScriptNameParams>(),
        },
        ToolSpec {
            name: "add_script",
            description: "Register a new script",
            input_schema: input_schema::<NewScript>(),
        },
        ToolSpec {
            name: "update_script",
            description: "Update fields of a registered script",
            input_schema: input_schema::<UpdateParams>(),
        },
        ToolSpec {
            name: "remove_script",
            description: "Remove a registered script",
            input_schema: input_schema::<ScriptNameParams>(),
        },
    ]
}

/// Routes tool calls to one registry and one executor.
pub struct Dispatcher<B: RegistryBackend> {
    store: RegistryStore<B>,
    executor: ScriptExecutor,
}

impl<B: RegistryBackend> Dispatcher<B> {
    pub fn new(store: RegistryStore<B>, executor: ScriptExecutor) -> Self {
        debug!(scripts = store.len(), "dispatcher ready");
        Self { store, executor }
    }

    #[cfg(test)]
    pub fn store(&self) -> &RegistryStore<B> {
        &self.store
    }

    /// Run tool `name` and return its JSON result.
    pub async fn call(&mut self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        debug!(tool = %name, "tool call");
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };

        match name {
            "run_script" => {
                let p: RunScriptParams = parse(name, arguments)?;
                let script = self
                    .store
                    .get(&p.script_name)
                    .ok_or_else(|| RegistryError::NotFound(p.script_name.clone()))?;
                let args = ArgValue::map_from_json(&p.args).map_err(|m| bad(name, m))?;
                let result = self.executor.run(script, args).await?;

                let mut value = serde_json::to_value(&result)?;
                value["scriptName"] = json!(p.script_name);
                Ok(value)
            }
            "run_raw_script" => {
                let p: RunRawParams = parse(name, arguments)?;
                let args = ArgValue::map_from_json(&p.args).map_err(|m| bad(name, m))?;
                let result = self.executor.execute(&p.script, &args).await;
                Ok(serde_json::to_value(&result)?)
            }
            "list_scripts" => {
                let p: ListParams = parse(name, arguments)?;
                let summaries: Vec<ScriptSummary> = self
                    .store
                    .list(p.category.as_deref(), p.search.as_deref())
                    .into_iter()
                    .map(ScriptSummary::from)
                    .collect();
                Ok(serde_json::to_value(summaries)?)
            }
            "get_script_info" => {
                let p: ScriptNameParams = parse(name, arguments)?;
                let script = self
                    .store
                    .get(&p.script_name)
                    .ok_or(RegistryError::NotFound(p.script_name))?;
                Ok(serde_json::to_value(script)?)
            }
            "add_script" => {
                let p: NewScript = parse(name, arguments)?;
                let script = self.store.add(p)?;
                Ok(json!({
                    "success": true,
                    "message": format!("Script '{}' added", script.name),
                    "script": script,
                }))
            }
            "update_script" => {
                let p: UpdateParams = parse(name, arguments)?;
                let script = self.store.update(&p.script_name, p.update)?;
                Ok(json!({
                    "success": true,
                    "message": format!("Script '{}' updated", script.name),
                    "script": script,
                }))
            }
            "remove_script" => {
                let p: ScriptNameParams = parse(name, arguments)?;
                let removed = self.store.remove(&p.script_name)?;
                Ok(json!({
                    "success": true,
                    "message": format!("Script '{}' removed", removed.name),
                }))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    /// Like [`call`](Self::call), rendered as text: pretty JSON on success,
    /// `Error: <message>` on failure. The flag is true for failures.
    pub async fn call_text(&mut self, name: &str, arguments: Value) -> (String, bool) {
        match self.call(name, arguments).await {
            Ok(value) => (
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
                false,
            ),
            Err(e) => (format!("Error: {e}"), true),
        }
    }
}

fn parse<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| bad(tool, e.to_string()))
}

fn bad(tool: &str, message: String) -> ToolError {
    ToolError::BadRequest {
        tool: tool.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Interpreter;
    use crate::registry::MemoryBackend;
    use std::time::Duration;

    fn dispatcher() -> Dispatcher<MemoryBackend> {
        let store = RegistryStore::open(MemoryBackend::new()).unwrap();
        let executor = ScriptExecutor::new(
            Interpreter::new("sh", vec!["-c".to_string()]),
            Duration::from_secs(5),
        );
        Dispatcher::new(store, executor)
    }

    async fn add_echo(d: &mut Dispatcher<MemoryBackend>) {
        d.call(
            "add_script",
            json!({
                "name": "greet",
                "script": "echo Hello {{who}} x{{times}}",
                "description": "Say hello",
                "args": [
                    {"name": "who", "type": "string", "description": "Name", "required": true},
                    {"name": "times", "type": "number", "description": "Count", "defaultValue": 1}
                ],
                "category": "demo"
            }),
        )
        .await
        .unwrap();
    }

    #[test]
    fn test_tool_specs_have_object_schemas() {
        let specs = tool_specs();
        assert_eq!(specs.len(), 7);
        let run = specs.iter().find(|s| s.name == "run_script").unwrap();
        assert_eq!(run.input_schema["type"], "object");
        assert!(run.input_schema["properties"]["script_name"].is_object());
        assert_eq!(run.input_schema["required"], json!(["script_name"]));

        let add = specs.iter().find(|s| s.name == "add_script").unwrap();
        assert!(add.input_schema["properties"]["args"].is_object());

        let listed = serde_json::to_value(&specs[0]).unwrap();
        assert!(listed.get("inputSchema").is_some());
    }

    #[tokio::test]
    async fn test_run_script_by_name() {
        let mut d = dispatcher();
        add_echo(&mut d).await;

        let out = d
            .call("run_script", json!({"script_name": "greet", "args": {"who": "Ada"}}))
            .await
            .unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["output"], "Hello Ada x1");
        assert_eq!(out["scriptName"], "greet");
        assert!(out["executionTime"].is_u64());
    }

    #[tokio::test]
    async fn test_run_script_unknown_name() {
        let mut d = dispatcher();
        let err = d
            .call("run_script", json!({"script_name": "nope"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Script 'nope' not found");
    }

    #[tokio::test]
    async fn test_run_script_validation_failure() {
        let mut d = dispatcher();
        add_echo(&mut d).await;
        let (text, is_error) = d
            .call_text("run_script", json!({"script_name": "greet", "args": {"who": 3}}))
            .await;
        assert!(is_error);
        assert_eq!(
            text,
            "Error: Validation failed: Argument 'who' should be string, got number"
        );
    }

    #[tokio::test]
    async fn test_run_script_rejects_nested_args() {
        let mut d = dispatcher();
        add_echo(&mut d).await;
        let err = d
            .call(
                "run_script",
                json!({"script_name": "greet", "args": {"who": {"first": "Ada"}}}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::BadRequest { .. }));
    }

    #[tokio::test]
    async fn test_run_raw_script_skips_validation() {
        let mut d = dispatcher();
        let out = d
            .call("run_raw_script", json!({"script": "echo {{n}}", "args": {"n": 5}}))
            .await
            .unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["output"], "5");
    }

    #[tokio::test]
    async fn test_run_raw_script_failure_is_a_result() {
        let mut d = dispatcher();
        let out = d
            .call("run_raw_script", json!({"script": "echo nope >&2"}))
            .await
            .unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["error"], "nope");
    }

    #[tokio::test]
    async fn test_list_scripts_filters() {
        let mut d = dispatcher();
        add_echo(&mut d).await;

        let all = d.call("list_scripts", Value::Null).await.unwrap();
        assert_eq!(all.as_array().unwrap().len(), 3);

        let ui = d.call("list_scripts", json!({"category": "ui"})).await.unwrap();
        assert_eq!(ui.as_array().unwrap().len(), 1);
        assert_eq!(ui[0]["name"], "show_notification");
        assert_eq!(ui[0]["argsCount"], 2);

        let both = d
            .call("list_scripts", json!({"category": "ui", "search": "front"}))
            .await
            .unwrap();
        assert!(both.as_array().unwrap().is_empty());

        let search = d.call("list_scripts", json!({"search": "HELLO"})).await.unwrap();
        assert_eq!(search[0]["name"], "greet");
    }

    #[tokio::test]
    async fn test_get_script_info() {
        let mut d = dispatcher();
        let info = d
            .call("get_script_info", json!({"script_name": "get_frontmost_app"}))
            .await
            .unwrap();
        assert_eq!(info["category"], "system");
        assert!(info["createdAt"].is_string());
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let mut d = dispatcher();
        add_echo(&mut d).await;

        d.call(
            "update_script",
            json!({"script_name": "greet", "description": "Greets someone"}),
        )
        .await
        .unwrap();
        assert_eq!(d.store().get("greet").unwrap().description, "Greets someone");

        d.call("remove_script", json!({"script_name": "greet"}))
            .await
            .unwrap();
        assert!(d.store().get("greet").is_none());

        let (text, is_error) = d
            .call_text("remove_script", json!({"script_name": "greet"}))
            .await;
        assert!(is_error);
        assert_eq!(text, "Error: Script 'greet' not found");
    }

    #[tokio::test]
    async fn test_add_duplicate_is_error_text() {
        let mut d = dispatcher();
        add_echo(&mut d).await;
        let (text, is_error) = d
            .call_text(
                "add_script",
                json!({"name": "greet", "script": "x", "description": "y"}),
            )
            .await;
        assert!(is_error);
        assert_eq!(text, "Error: Script 'greet' already exists");
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_arguments() {
        let mut d = dispatcher();
        let (text, _) = d.call_text("explode", json!({})).await;
        assert_eq!(text, "Error: Unknown tool: explode");

        let err = d.call("get_script_info", json!({})).await.unwrap_err();
        assert!(err.to_string().starts_with("Invalid arguments for get_script_info"));
    }
}
