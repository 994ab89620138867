//! Script definitions, parameter schemas and argument values.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Arguments supplied to a script invocation, keyed by parameter name.
pub type ArgMap = BTreeMap<String, ArgValue>;

/// A single argument value.
///
/// Serialized untagged, so `"hi"`, `42`, `true` and `null` are stored and
/// received as plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ArgValue {
    Null,
    Boolean(bool),
    Number(Number),
    String(String),
}

impl ArgValue {
    /// Name of the runtime type, as reported in validation errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            ArgValue::Null => "null",
            ArgValue::Boolean(_) => "boolean",
            ArgValue::Number(_) => "number",
            ArgValue::String(_) => "string",
        }
    }

    /// Convert a JSON value received over the wire.
    pub fn from_json(name: &str, value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(ArgValue::Null),
            Value::Bool(b) => Ok(ArgValue::Boolean(*b)),
            Value::Number(n) => Ok(ArgValue::Number(n.clone())),
            Value::String(s) => Ok(ArgValue::String(s.clone())),
            Value::Array(_) => Err(format!("Argument '{name}' has unsupported type array")),
            Value::Object(_) => Err(format!("Argument '{name}' has unsupported type object")),
        }
    }

    /// Convert a whole JSON object into an argument map.
    pub fn map_from_json(value: &Value) -> Result<ArgMap, String> {
        match value {
            Value::Null => Ok(ArgMap::new()),
            Value::Object(obj) => obj
                .iter()
                .map(|(k, v)| Ok((k.clone(), ArgValue::from_json(k, v)?)))
                .collect(),
            other => Err(format!("Arguments must be an object, got {other}")),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::String(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::String(s)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Boolean(b)
    }
}

impl From<i64> for ArgValue {
    fn from(n: i64) -> Self {
        ArgValue::Number(n.into())
    }
}

impl From<i32> for ArgValue {
    fn from(n: i32) -> Self {
        ArgValue::Number(n.into())
    }
}

/// Plain textual form: strings unquoted, integral numbers without a
/// fractional part.
impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Null => write!(f, "null"),
            ArgValue::Boolean(b) => write!(f, "{b}"),
            ArgValue::String(s) => write!(f, "{s}"),
            ArgValue::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    write!(f, "{n}")
                } else {
                    match n.as_f64() {
                        Some(x) if x.fract() == 0.0 && x.abs() < 1e15 => write!(f, "{x:.0}"),
                        Some(x) => write!(f, "{x}"),
                        None => write!(f, "{n}"),
                    }
                }
            }
        }
    }
}

/// Declared type of a script parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
}

impl ParamType {
    /// Whether `value` carries this type.
    pub fn accepts(self, value: &ArgValue) -> bool {
        matches!(
            (self, value),
            (ParamType::String, ArgValue::String(_))
                | (ParamType::Number, ArgValue::Number(_))
                | (ParamType::Boolean, ArgValue::Boolean(_))
        )
    }
}

impl FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(ParamType::String),
            "number" => Ok(ParamType::Number),
            "boolean" => Ok(ParamType::Boolean),
            _ => Err(format!("Unknown parameter type: {s}")),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::String => write!(f, "string"),
            ParamType::Number => write!(f, "number"),
            ParamType::Boolean => write!(f, "boolean"),
        }
    }
}

/// One declared script parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParamSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<ArgValue>,
}

impl ParamSchema {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: true,
            default_value: None,
        }
    }

    pub fn optional(
        name: &str,
        param_type: ParamType,
        description: &str,
        default_value: Option<ArgValue>,
    ) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: false,
            default_value,
        }
    }
}

/// A registered script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDefinition {
    pub name: String,
    pub script: String,
    pub description: String,
    #[serde(default)]
    pub args: Vec<ParamSchema>,
    #[serde(default)]
    pub usage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Hand-written entries may leave the timestamps out; they read as now.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Request to register a new script.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NewScript {
    /// Unique script name
    pub name: String,
    /// Script template; `{{param}}` placeholders are substituted at run time
    pub script: String,
    /// What the script does
    pub description: String,
    /// Declared parameters
    #[serde(default)]
    pub args: Vec<ParamSchema>,
    /// Usage example (defaults to `name()`)
    #[serde(default)]
    pub usage: Option<String>,
    /// Grouping label
    #[serde(default)]
    pub category: Option<String>,
}

impl NewScript {
    pub(crate) fn into_definition(self, now: DateTime<Utc>) -> ScriptDefinition {
        let usage = self.usage.unwrap_or_else(|| format!("{}()", self.name));
        ScriptDefinition {
            name: self.name,
            script: self.script,
            description: self.description,
            args: self.args,
            usage,
            category: self.category,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of an existing script. Absent fields are left as they are;
/// `"category": null` removes the category.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ScriptUpdate {
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<ParamSchema>>,
    #[serde(default)]
    pub usage: Option<String>,
    /// New category; `null` clears it
    #[serde(default, deserialize_with = "present")]
    #[schemars(with = "Option<String>")]
    pub category: Option<Option<String>>,
}

/// Wrap any value that is present, `null` included, so it can be told apart
/// from a missing field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl ScriptUpdate {
    pub(crate) fn apply(self, def: &mut ScriptDefinition) {
        if let Some(script) = self.script {
            def.script = script;
        }
        if let Some(description) = self.description {
            def.description = description;
        }
        if let Some(args) = self.args {
            def.args = args;
        }
        if let Some(usage) = self.usage {
            def.usage = usage;
        }
        if let Some(category) = self.category {
            def.category = category;
        }
    }
}

/// Check the structural rules of a definition: a non-empty name, unique
/// parameter names, and defaults that match their declared type.
pub(crate) fn check_definition(name: &str, args: &[ParamSchema]) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Script name must not be empty".to_string());
    }

    let mut seen = HashSet::new();
    for param in args {
        if !seen.insert(param.name.as_str()) {
            return Err(format!(
                "Parameter '{}' is declared more than once in '{name}'",
                param.name
            ));
        }
        if let Some(default) = &param.default_value {
            if !param.param_type.accepts(default) {
                return Err(format!(
                    "Default for '{}' should be {}, got {}",
                    param.name,
                    param.param_type,
                    default.type_name()
                ));
            }
        }
    }

    Ok(())
}

/// The scripts a fresh registry starts with.
pub fn builtin_scripts(now: DateTime<Utc>) -> Vec<ScriptDefinition> {
    vec![
        ScriptDefinition {
            name: "show_notification".to_string(),
            script: r#"display notification "{{message}}" with title "{{title}}""#.to_string(),
            description: "Display macOS notification".to_string(),
            args: vec![
                ParamSchema::required("message", ParamType::String, "Notification message"),
                ParamSchema::optional(
                    "title",
                    ParamType::String,
                    "Notification title",
                    Some("Notification".into()),
                ),
            ],
            usage: r#"show_notification(message="Hello", title="My App")"#.to_string(),
            category: Some("ui".to_string()),
            created_at: now,
            updated_at: now,
        },
        ScriptDefinition {
            name: "get_frontmost_app".to_string(),
            script: "tell application \"System Events\" to get name of first application process whose frontmost is true".to_string(),
            description: "Get the frontmost application name".to_string(),
            args: Vec::new(),
            usage: "get_frontmost_app()".to_string(),
            category: Some("system".to_string()),
            created_at: now,
            updated_at: now,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arg_value_type_names() {
        assert_eq!(ArgValue::from("x").type_name(), "string");
        assert_eq!(ArgValue::from(3).type_name(), "number");
        assert_eq!(ArgValue::from(true).type_name(), "boolean");
        assert_eq!(ArgValue::Null.type_name(), "null");
    }

    #[test]
    fn test_arg_value_display() {
        assert_eq!(ArgValue::from(42).to_string(), "42");
        assert_eq!(ArgValue::from(false).to_string(), "false");
        assert_eq!(ArgValue::from("plain").to_string(), "plain");
        let float: ArgValue = serde_json::from_value(json!(1.5)).unwrap();
        assert_eq!(float.to_string(), "1.5");
        let integral: ArgValue = serde_json::from_value(json!(5.0)).unwrap();
        assert_eq!(integral.to_string(), "5");
    }

    #[test]
    fn test_arg_value_untagged_roundtrip() {
        let map: ArgMap =
            serde_json::from_value(json!({"a": "s", "b": 2, "c": true, "d": null})).unwrap();
        assert_eq!(map["a"], ArgValue::from("s"));
        assert_eq!(map["b"], ArgValue::from(2));
        assert_eq!(map["c"], ArgValue::from(true));
        assert_eq!(map["d"], ArgValue::Null);
    }

    #[test]
    fn test_map_from_json_rejects_nested() {
        let err = ArgValue::map_from_json(&json!({"list": [1, 2]})).unwrap_err();
        assert!(err.contains("'list'"));
        assert!(err.contains("array"));
        assert!(ArgValue::map_from_json(&json!("nope")).is_err());
        assert!(ArgValue::map_from_json(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_param_type_from_str() {
        assert_eq!("String".parse::<ParamType>(), Ok(ParamType::String));
        assert_eq!("boolean".parse::<ParamType>(), Ok(ParamType::Boolean));
        assert!("object".parse::<ParamType>().is_err());
    }

    #[test]
    fn test_param_schema_wire_format() {
        let param: ParamSchema = serde_json::from_value(json!({
            "name": "title",
            "type": "string",
            "description": "Title",
            "defaultValue": "Notification"
        }))
        .unwrap();
        assert_eq!(param.param_type, ParamType::String);
        assert!(!param.required);
        assert_eq!(param.default_value, Some(ArgValue::from("Notification")));

        let back = serde_json::to_value(&param).unwrap();
        assert_eq!(back["defaultValue"], json!("Notification"));
        assert_eq!(back["type"], json!("string"));
    }

    #[test]
    fn test_definition_reads_iso_timestamps() {
        let def: ScriptDefinition = serde_json::from_value(json!({
            "name": "x",
            "script": "return 1",
            "description": "d",
            "args": [],
            "usage": "x()",
            "createdAt": "2025-01-02T03:04:05.678Z",
            "updatedAt": "2025-01-02T03:04:05.678Z"
        }))
        .unwrap();
        assert_eq!(def.created_at.to_rfc3339(), "2025-01-02T03:04:05.678+00:00");
        assert!(def.category.is_none());
    }

    #[test]
    fn test_definition_without_timestamps_reads_as_now() {
        let before = Utc::now();
        let def: ScriptDefinition = serde_json::from_value(json!({
            "name": "hand_written",
            "script": "beep",
            "description": "Written by hand"
        }))
        .unwrap();
        assert!(def.created_at >= before);
        assert!(def.updated_at >= before);
        assert_eq!(def.usage, "");
    }

    #[test]
    fn test_update_category_set_keep_and_clear() {
        let mut def = builtin_scripts(Utc::now()).remove(0);
        assert_eq!(def.category.as_deref(), Some("ui"));

        let keep: ScriptUpdate = serde_json::from_value(json!({"description": "d"})).unwrap();
        assert!(keep.category.is_none());
        keep.apply(&mut def);
        assert_eq!(def.category.as_deref(), Some("ui"));

        let set: ScriptUpdate = serde_json::from_value(json!({"category": "alerts"})).unwrap();
        set.apply(&mut def);
        assert_eq!(def.category.as_deref(), Some("alerts"));

        let clear: ScriptUpdate = serde_json::from_value(json!({"category": null})).unwrap();
        assert_eq!(clear.category, Some(None));
        clear.apply(&mut def);
        assert!(def.category.is_none());
    }

    #[test]
    fn test_new_script_default_usage() {
        let req = NewScript {
            name: "beep".to_string(),
            script: "beep".to_string(),
            description: "Beep once".to_string(),
            args: Vec::new(),
            usage: None,
            category: None,
        };
        let def = req.into_definition(Utc::now());
        assert_eq!(def.usage, "beep()");
        assert_eq!(def.created_at, def.updated_at);
    }

    #[test]
    fn test_check_definition() {
        assert!(check_definition("ok", &[]).is_ok());
        assert!(check_definition("   ", &[]).is_err());

        let dup = vec![
            ParamSchema::required("a", ParamType::String, ""),
            ParamSchema::required("a", ParamType::Number, ""),
        ];
        assert!(check_definition("x", &dup).unwrap_err().contains("more than once"));

        let bad_default = vec![ParamSchema::optional(
            "n",
            ParamType::Number,
            "",
            Some("ten".into()),
        )];
        let err = check_definition("x", &bad_default).unwrap_err();
        assert_eq!(err, "Default for 'n' should be number, got string");
    }

    #[test]
    fn test_builtin_scripts() {
        let scripts = builtin_scripts(Utc::now());
        let names: Vec<_> = scripts.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["show_notification", "get_frontmost_app"]);
        for s in &scripts {
            assert!(check_definition(&s.name, &s.args).is_ok());
        }
    }
}
