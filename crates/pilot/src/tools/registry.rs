use std::collections::HashSet;

use anyhow::{bail, Result};
use serde_json::Value;
use tracing::{debug, warn};

use super::operations::{self, Operation};
use super::schema::{input_schema, validate, ParamSpec};
use crate::errors::{ToolError, ToolResult};
use crate::models::tool::{Tool, ToolCall};
use crate::obs::ControlTarget;

/// A callable operation: stable name, parameter schema and the bound operation.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub operation: Operation,
}

impl ToolDescriptor {
    /// The tool as advertised to a model
    pub fn tool(&self) -> Tool {
        Tool::new(self.name, self.description, input_schema(self.params))
    }
}

/// Read-only after construction; shared by every channel.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    descriptors: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new(descriptors: Vec<ToolDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            if !seen.insert(descriptor.name) {
                bail!("Duplicate tool name: {}", descriptor.name);
            }
        }
        Ok(Self { descriptors })
    }

    /// The OBS tool set
    pub fn obs() -> Self {
        Self {
            descriptors: operations::descriptors(),
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.descriptors.iter().map(ToolDescriptor::tool).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.iter().map(|d| d.name)
    }

    /// Exact name first; models that rewrite hyphens as underscores still resolve.
    pub fn resolve(&self, name: &str) -> ToolResult<&ToolDescriptor> {
        let name = name.trim();
        self.descriptors
            .iter()
            .find(|d| d.name == name)
            .or_else(|| {
                let wanted = name.replace('_', "-");
                self.descriptors.iter().find(|d| d.name == wanted)
            })
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    pub async fn invoke(
        &self,
        descriptor: &ToolDescriptor,
        arguments: &Value,
        target: &dyn ControlTarget,
    ) -> ToolResult<String> {
        let args = validate(descriptor.name, descriptor.params, arguments)?;
        descriptor.operation.execute(target, &args).await
    }

    /// Resolve, validate and run one call from the model.
    pub async fn dispatch(&self, call: &ToolCall, target: &dyn ControlTarget) -> ToolResult<String> {
        let descriptor = self.resolve(&call.name)?;
        debug!(tool = descriptor.name, arguments = %call.arguments, "invoking tool");
        let result = self.invoke(descriptor, &call.arguments, target).await;
        if let Err(e) = &result {
            warn!(tool = descriptor.name, error = %e, "tool call failed");
        }
        result
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::obs()
    }
}
