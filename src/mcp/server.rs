//! MCP Server Implementation
//!
//! Newline-delimited JSON-RPC over any async reader/writer pair, with stdio
//! as the production transport. Tools, resources and prompts are registered
//! once at startup and dispatched by name.

use crate::mcp::errors::{ErrorHandler, McpError, McpResult};
use crate::mcp::protocol::{
    CallToolParams, CallToolResult, GetPromptParams, GetPromptResult, Implementation,
    InitializeParams, InitializeResult, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ListPromptsResult, ListResourcesResult, ListToolsResult, Prompt,
    ReadResourceParams, ReadResourceResult, Resource, ResourceContents, ServerCapabilities, Tool,
    is_protocol_version_supported, parse_message, salvage_request_id,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Tool handler trait for implementing tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

/// Resource handler trait; returns the resource body as text
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn handle(&self, uri: &str) -> Result<String>;
}

/// Prompt handler trait for rendering a prompt template
#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn handle(&self, arguments: &HashMap<String, String>) -> Result<GetPromptResult>;
}

/// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

struct Registered<D, H: ?Sized> {
    definition: D,
    handler: Arc<H>,
}

/// MCP Server state and configuration
pub struct McpServer {
    /// Server implementation information
    pub server_info: Implementation,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    instructions: Option<String>,
    tools: RwLock<BTreeMap<String, Registered<Tool, dyn ToolHandler>>>,
    resources: RwLock<BTreeMap<String, Registered<Resource, dyn ResourceHandler>>>,
    prompts: RwLock<BTreeMap<String, Registered<Prompt, dyn PromptHandler>>>,
    connection_state: RwLock<ConnectionState>,
}

/// Message handler for processing incoming messages
pub struct MessageHandler {
    server: Arc<McpServer>,
}

impl McpServer {
    /// Create a new MCP server
    #[inline]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            server_info: Implementation {
                name: name.into(),
                version: version.into(),
            },
            capabilities: ServerCapabilities::static_lists(),
            instructions: None,
            tools: RwLock::new(BTreeMap::new()),
            resources: RwLock::new(BTreeMap::new()),
            prompts: RwLock::new(BTreeMap::new()),
            connection_state: RwLock::new(ConnectionState::Uninitialized),
        }
    }

    /// Text returned to clients in the initialize result
    #[inline]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Register a tool with the server
    #[inline]
    pub async fn register_tool<H>(&self, tool: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let name = tool.name.clone();
        let registered = Registered {
            definition: tool,
            handler: Arc::new(handler) as Arc<dyn ToolHandler>,
        };
        self.tools.write().await.insert(name.clone(), registered);
        debug!("Registered tool: {}", name);
    }

    /// Register a resource with the server
    #[inline]
    pub async fn register_resource<H>(&self, resource: Resource, handler: H)
    where
        H: ResourceHandler + 'static,
    {
        let uri = resource.uri.clone();
        let registered = Registered {
            definition: resource,
            handler: Arc::new(handler) as Arc<dyn ResourceHandler>,
        };
        self.resources.write().await.insert(uri.clone(), registered);
        debug!("Registered resource: {}", uri);
    }

    /// Register a prompt with the server
    #[inline]
    pub async fn register_prompt<H>(&self, prompt: Prompt, handler: H)
    where
        H: PromptHandler + 'static,
    {
        let name = prompt.name.clone();
        let registered = Registered {
            definition: prompt,
            handler: Arc::new(handler) as Arc<dyn PromptHandler>,
        };
        self.prompts.write().await.insert(name.clone(), registered);
        debug!("Registered prompt: {}", name);
    }

    #[inline]
    pub async fn tool_definitions(&self) -> Vec<Tool> {
        self.tools
            .read()
            .await
            .values()
            .map(|r| r.definition.clone())
            .collect()
    }

    #[inline]
    pub async fn resource_definitions(&self) -> Vec<Resource> {
        self.resources
            .read()
            .await
            .values()
            .map(|r| r.definition.clone())
            .collect()
    }

    #[inline]
    pub async fn prompt_definitions(&self) -> Vec<Prompt> {
        self.prompts
            .read()
            .await
            .values()
            .map(|r| r.definition.clone())
            .collect()
    }

    /// Run a tool by name, outside of any transport
    #[inline]
    pub async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult> {
        let handler = {
            let tools = self.tools.read().await;
            let registered = tools.get(&params.name).ok_or_else(|| McpError::ToolNotFound {
                name: params.name.clone(),
            })?;
            Arc::clone(&registered.handler)
        };

        debug!("Calling tool: {}", params.name);
        handler.handle(params).await
    }

    /// Read a resource by URI, outside of any transport
    #[inline]
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        let (mime_type, handler) = {
            let resources = self.resources.read().await;
            let registered = resources
                .get(uri)
                .ok_or_else(|| McpError::ResourceNotFound {
                    uri: uri.to_string(),
                })?;
            (
                registered.definition.mime_type.clone(),
                Arc::clone(&registered.handler),
            )
        };

        let text = handler.handle(uri).await?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: uri.to_string(),
                mime_type,
                text: Some(text),
            }],
        })
    }

    /// Render a prompt by name, outside of any transport
    #[inline]
    pub async fn get_prompt(&self, params: GetPromptParams) -> Result<GetPromptResult> {
        let handler = {
            let prompts = self.prompts.read().await;
            let registered = prompts.get(&params.name).ok_or_else(|| McpError::PromptNotFound {
                name: params.name.clone(),
            })?;
            Arc::clone(&registered.handler)
        };

        handler.handle(&params.arguments.unwrap_or_default()).await
    }

    /// Start the server using stdio transport
    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Serve newline-delimited messages until the reader reaches EOF
    #[inline]
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let handler = MessageHandler::new(Arc::clone(&self));
        let mut lines = reader.lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    if let Some(reply) = handler.handle_line(line).await {
                        send_message(&mut writer, &reply).await?;
                    }
                }
                Ok(None) => {
                    info!("EOF reached, closing connection");
                    break;
                }
                Err(e) => {
                    error!("Error reading from input: {}", e);
                    break;
                }
            }
        }

        self.set_connection_state(ConnectionState::Closed).await;
        info!("MCP server stopped");
        Ok(())
    }

    /// Get current connection state
    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    async fn set_connection_state(&self, state: ConnectionState) {
        *self.connection_state.write().await = state;
    }
}

/// Write one message followed by a newline
#[inline]
pub async fn send_message<W>(writer: &mut W, message: &JsonRpcMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(message)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

impl MessageHandler {
    /// Create a new message handler
    #[inline]
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }

    /// Handle one raw line; `None` when no reply is due
    #[inline]
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcMessage> {
        match parse_message(line) {
            Ok(message) => self.process_message(message).await,
            Err(e) => {
                e.log();
                let id = match e {
                    McpError::ParseError { .. } => None,
                    _ => salvage_request_id(line),
                };
                Some(e.to_error_response(id))
            }
        }
    }

    /// Process an incoming message
    #[inline]
    pub async fn process_message(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await;
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                None
            }
        }
    }

    /// Handle a JSON-RPC request
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        debug!("Handling request {:?}: {}", request.id, request.method);

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            "resources/list" => self.handle_list_resources().await,
            "resources/read" => self.handle_read_resource(request.params).await,
            "prompts/list" => self.handle_list_prompts().await,
            "prompts/get" => self.handle_get_prompt(request.params).await,
            method => Err(McpError::MethodNotFound {
                method: method.to_string(),
            }
            .into()),
        };

        match result {
            Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(result, request.id)),
            Err(e) => ErrorHandler::handle_error(&e, Some(request.id)),
        }
    }

    /// Handle a JSON-RPC notification
    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => {
                self.server
                    .set_connection_state(ConnectionState::Ready)
                    .await;
                info!("Server ready to handle requests");
            }
            "notifications/cancelled" => {
                debug!("Received cancellation notification");
            }
            _ => {
                warn!("Unknown notification method: {}", notification.method);
            }
        }
    }

    /// Handle initialize request
    #[inline]
    pub async fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        let params: InitializeParams = parse_params(params, "initialize")?;

        if !is_protocol_version_supported(&params.protocol_version) {
            return Err(McpError::UnsupportedProtocolVersion {
                version: params.protocol_version,
            }
            .into());
        }

        self.server
            .set_connection_state(ConnectionState::Initializing)
            .await;

        let result = InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: self.server.capabilities.clone(),
            server_info: self.server.server_info.clone(),
            instructions: self.server.instructions.clone(),
        };

        info!(
            "Client initialized: {} {}",
            params.client_info.name, params.client_info.version
        );
        Ok(serde_json::to_value(result)?)
    }

    /// Handle list tools request
    #[inline]
    pub async fn handle_list_tools(&self) -> Result<Value> {
        let result = ListToolsResult {
            tools: self.server.tool_definitions().await,
        };
        Ok(serde_json::to_value(result)?)
    }

    /// Handle call tool request
    #[inline]
    pub async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params: CallToolParams = parse_params(params, "tools/call")?;
        let result = self.server.call_tool(params).await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_list_resources(&self) -> Result<Value> {
        let result = ListResourcesResult {
            resources: self.server.resource_definitions().await,
        };
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_read_resource(&self, params: Option<Value>) -> Result<Value> {
        let params: ReadResourceParams = parse_params(params, "resources/read")?;
        let result = self.server.read_resource(&params.uri).await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_list_prompts(&self) -> Result<Value> {
        let result = ListPromptsResult {
            prompts: self.server.prompt_definitions().await,
        };
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_get_prompt(&self, params: Option<Value>) -> Result<Value> {
        let params: GetPromptParams = parse_params(params, "prompts/get")?;
        let result = self.server.get_prompt(params).await?;
        Ok(serde_json::to_value(result)?)
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>, method: &str) -> McpResult<T> {
    let params = params.ok_or_else(|| McpError::InvalidParameters {
        message: format!("{} request missing parameters", method),
    })?;

    serde_json::from_value(params).map_err(|e| McpError::InvalidParameters {
        message: format!("Invalid {} parameters: {}", method, e),
    })
}
