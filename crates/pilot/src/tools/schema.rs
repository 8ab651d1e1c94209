use serde_json::{json, Map, Value};

use crate::errors::{ToolError, ToolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Boolean,
    Integer { min: i64 },
    /// One of a fixed set of lowercase words
    Choice(&'static [&'static str]),
    /// A source, by name or by numeric scene item id
    SourceRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }

    fn json_schema(&self) -> Value {
        let mut schema = match self.kind {
            ParamKind::String => json!({ "type": "string" }),
            ParamKind::Boolean => json!({ "type": "boolean" }),
            ParamKind::Integer { min } => json!({ "type": "integer", "minimum": min }),
            ParamKind::Choice(options) => json!({ "type": "string", "enum": options }),
            ParamKind::SourceRef => json!({ "type": ["string", "integer"] }),
        };
        schema["description"] = json!(self.description);
        schema
    }
}

pub fn input_schema(params: &[ParamSpec]) -> Value {
    let properties: Map<String, Value> = params
        .iter()
        .map(|p| (p.name.to_string(), p.json_schema()))
        .collect();
    let required: Vec<&str> = params.iter().filter(|p| p.required).map(|p| p.name).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Name(String),
    Id(i64),
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceRef::Name(name) => write!(f, "'{}'", name),
            SourceRef::Id(id) => write!(f, "id {}", id),
        }
    }
}

/// Arguments that passed validation, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArgs {
    tool: String,
    values: Map<String, Value>,
}

impl ToolArgs {
    fn missing(&self, name: &str) -> ToolError {
        ToolError::MissingParameter {
            tool: self.tool.clone(),
            param: name.to_string(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> ToolResult<&str> {
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing(name))
    }

    pub fn bool(&self, name: &str) -> ToolResult<bool> {
        self.get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| self.missing(name))
    }

    pub fn source(&self, name: &str) -> ToolResult<SourceRef> {
        match self.get(name) {
            Some(Value::String(s)) => Ok(SourceRef::Name(s.clone())),
            Some(value) => value
                .as_i64()
                .map(SourceRef::Id)
                .ok_or_else(|| self.missing(name)),
            None => Err(self.missing(name)),
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("a boolean ({})", b),
        Value::Number(n) => format!("a number ({})", n),
        Value::String(s) => format!("a string ({:?})", s),
        Value::Array(_) => "an array".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}

fn invalid(param: &str, expected: &str, found: &Value) -> ToolError {
    ToolError::InvalidType {
        param: param.to_string(),
        expected: expected.to_string(),
        found: describe(found),
    }
}

fn check(spec: &ParamSpec, value: &Value) -> ToolResult<Value> {
    match spec.kind {
        ParamKind::String => value
            .as_str()
            .map(|s| json!(s))
            .ok_or_else(|| invalid(spec.name, "a string", value)),
        ParamKind::Boolean => value
            .as_bool()
            .map(|b| json!(b))
            .ok_or_else(|| invalid(spec.name, "a boolean", value)),
        ParamKind::Integer { min } => {
            let n = value
                .as_i64()
                .ok_or_else(|| invalid(spec.name, "an integer", value))?;
            if n < min {
                return Err(ToolError::OutOfRange {
                    param: spec.name.to_string(),
                    detail: format!("{} is below the minimum of {}", n, min),
                });
            }
            Ok(json!(n))
        }
        ParamKind::Choice(options) => {
            let s = value
                .as_str()
                .ok_or_else(|| invalid(spec.name, "a string", value))?;
            let normalized = s.trim().to_lowercase();
            if options.contains(&normalized.as_str()) {
                Ok(json!(normalized))
            } else {
                Err(ToolError::OutOfRange {
                    param: spec.name.to_string(),
                    detail: format!("'{}' is not one of: {}", s, options.join(", ")),
                })
            }
        }
        ParamKind::SourceRef => match value {
            Value::String(s) if !s.trim().is_empty() => Ok(json!(s.trim())),
            Value::String(_) => Err(ToolError::OutOfRange {
                param: spec.name.to_string(),
                detail: "the source name is empty".to_string(),
            }),
            Value::Number(_) => match value.as_i64() {
                Some(id) if id >= 0 => Ok(json!(id)),
                _ => Err(ToolError::OutOfRange {
                    param: spec.name.to_string(),
                    detail: format!("{} is not a valid scene item id", value),
                }),
            },
            _ => Err(invalid(spec.name, "a source name or numeric id", value)),
        },
    }
}

/// Check `arguments` against `params`. Unknown extra keys are dropped.
pub fn validate(tool: &str, params: &[ParamSpec], arguments: &Value) -> ToolResult<ToolArgs> {
    let empty = Map::new();
    let provided = match arguments {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => return Err(invalid("arguments", "an object", other)),
    };

    let mut values = Map::new();
    for spec in params {
        match provided.get(spec.name).filter(|v| !v.is_null()) {
            Some(value) => {
                values.insert(spec.name.to_string(), check(spec, value)?);
            }
            None if spec.required => {
                return Err(ToolError::MissingParameter {
                    tool: tool.to_string(),
                    param: spec.name.to_string(),
                })
            }
            None => {}
        }
    }

    Ok(ToolArgs {
        tool: tool.to_string(),
        values,
    })
}
