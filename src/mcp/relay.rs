//! Tool Relay
//!
//! Forwards model-issued tool calls to an MCP server and turns the outcome
//! into tool-result blocks. Resources are exposed to the model through a
//! `read_resource` pseudo-tool.

use crate::mcp::client::McpClient;
use crate::mcp::protocol::Tool;
use crate::mcp::tools::GetCurrentTimeHandler;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

pub const READ_RESOURCE_TOOL: &str = "read_resource";

const NO_CONTENT: &str = "No content";
const NO_RESULT: &str = "No result";

/// A tool call as issued by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Map<String, Value>,
}

/// Result handed back to the model for one [`ToolUse`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "tool_result")]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

pub struct ToolRelay {
    client: McpClient,
    client_ip: Option<String>,
}

impl ToolRelay {
    #[inline]
    pub fn new(client: McpClient) -> Self {
        Self {
            client,
            client_ip: None,
        }
    }

    /// Address of the end user, used when `get_current_time` gets none
    #[inline]
    pub fn with_client_ip(mut self, client_ip: Option<String>) -> Self {
        self.client_ip = client_ip.filter(|ip| !ip.trim().is_empty());
        self
    }

    /// Definition of the `read_resource` pseudo-tool
    #[inline]
    pub fn read_resource_tool() -> Tool {
        Tool {
            name: READ_RESOURCE_TOOL.to_string(),
            description: Some(
                "Read an MCP resource by URI, e.g. conversation://log or weather://cache"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "uri": {
                        "type": "string",
                        "description": "Resource URI"
                    }
                },
                "required": ["uri"]
            }),
        }
    }

    /// Server tools plus the `read_resource` pseudo-tool
    #[inline]
    pub async fn available_tools(&mut self) -> Result<Vec<Tool>> {
        let mut tools = self.client.list_tools().await?;
        tools.push(Self::read_resource_tool());
        Ok(tools)
    }

    /// Run one tool call; failures become error blocks, never `Err`
    #[inline]
    pub async fn dispatch(&mut self, tool_use: &ToolUse) -> ToolResultBlock {
        debug!("Relaying tool call {} ({})", tool_use.name, tool_use.id);

        let (content, is_error) = match self.forward(tool_use).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Tool call {} failed: {:#}", tool_use.name, e);
                (format!("Error: {}", e), true)
            }
        };

        ToolResultBlock {
            tool_use_id: tool_use.id.clone(),
            content,
            is_error,
        }
    }

    /// Close the connection to the server
    #[inline]
    pub async fn shutdown(self) -> Result<()> {
        self.client.shutdown().await
    }

    async fn forward(&mut self, tool_use: &ToolUse) -> Result<(String, bool)> {
        if tool_use.name == READ_RESOURCE_TOOL {
            let uri = tool_use
                .input
                .get("uri")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("read_resource requires a string 'uri'"))?;
            let result = self.client.read_resource(uri).await?;
            if result.contents.is_empty() {
                return Ok((NO_CONTENT.to_string(), false));
            }
            return Ok((result.joined_text(), false));
        }

        let arguments = self.prepare_arguments(tool_use);
        let result = self.client.call_tool(&tool_use.name, arguments).await?;
        let text = if result.content.is_empty() {
            NO_RESULT.to_string()
        } else {
            result.joined_text()
        };
        Ok((text, result.is_error()))
    }

    fn prepare_arguments(&self, tool_use: &ToolUse) -> Map<String, Value> {
        let mut arguments = tool_use.input.clone();

        if tool_use.name == GetCurrentTimeHandler::NAME {
            let supplied = arguments
                .get("ip_address")
                .and_then(Value::as_str)
                .is_some_and(|ip| !ip.trim().is_empty());

            if let (false, Some(ip)) = (supplied, self.client_ip.as_ref()) {
                debug!("Injecting client IP {} into {}", ip, tool_use.name);
                arguments.insert("ip_address".to_string(), Value::String(ip.clone()));
            }
        }

        arguments
    }
}
