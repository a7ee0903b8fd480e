//! MCP Error Handling
//!
//! Every failure that reaches the wire is an [`McpError`]. Its display
//! string is the JSON-RPC error message; `code` picks the error code.

use crate::mcp::protocol::{
    JsonRpcError, JsonRpcErrorResponse, JsonRpcMessage, RequestId, SUPPORTED_PROTOCOL_VERSIONS,
    error_codes, mcp_error_codes,
};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum McpError {
    #[error(
        "Unsupported protocol version: {version}. Supported: {supported}",
        supported = SUPPORTED_PROTOCOL_VERSIONS.join(", ")
    )]
    UnsupportedProtocolVersion { version: String },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Resource not found: {uri}")]
    ResourceNotFound { uri: String },

    #[error("Prompt not found: {name}")]
    PromptNotFound { name: String },

    #[error("Invalid arguments for tool '{tool}': {message}")]
    InvalidToolParameters { tool: String, message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Invalid params: {message}")]
    InvalidParameters { message: String },

    /// The peer answered a request with a JSON-RPC error
    #[error("Server returned error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("Connection closed")]
    ConnectionClosed,
}

impl McpError {
    /// JSON-RPC error code for this failure
    #[inline]
    pub fn code(&self) -> i32 {
        match self {
            Self::UnsupportedProtocolVersion { .. } => mcp_error_codes::INVALID_PROTOCOL_VERSION,
            Self::ToolNotFound { .. } => mcp_error_codes::TOOL_NOT_FOUND,
            Self::ResourceNotFound { .. } => mcp_error_codes::RESOURCE_NOT_FOUND,
            Self::PromptNotFound { .. } => mcp_error_codes::PROMPT_NOT_FOUND,
            Self::InvalidToolParameters { .. } | Self::InvalidParameters { .. } => {
                error_codes::INVALID_PARAMS
            }
            Self::InvalidRequest { .. } => error_codes::INVALID_REQUEST,
            Self::ParseError { .. } => error_codes::PARSE_ERROR,
            Self::MethodNotFound { .. } => error_codes::METHOD_NOT_FOUND,
            Self::Remote { code, .. } => *code,
            Self::InternalError { .. } | Self::ConnectionClosed => error_codes::INTERNAL_ERROR,
        }
    }

    /// Whether the peer caused the failure
    #[inline]
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::InternalError { .. } | Self::Remote { .. } | Self::ConnectionClosed
        )
    }

    #[inline]
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        let message = match self {
            // relay the peer's message untouched
            Self::Remote { message, .. } => message.clone(),
            _ => self.to_string(),
        };
        JsonRpcError::new(self.code(), message, self.data())
    }

    #[inline]
    pub fn to_error_response(&self, id: Option<RequestId>) -> JsonRpcMessage {
        JsonRpcMessage::ErrorResponse(JsonRpcErrorResponse::new(self.to_jsonrpc_error(), id))
    }

    /// Client mistakes are warnings; failures on this side are errors
    #[inline]
    pub fn log(&self) {
        if self.is_client_error() {
            warn!("Rejected request ({}): {}", self.code(), self);
        } else {
            error!("Request failed ({}): {}", self.code(), self);
        }
    }

    fn data(&self) -> Option<Value> {
        match self {
            Self::UnsupportedProtocolVersion { .. } => {
                Some(json!({ "supported": SUPPORTED_PROTOCOL_VERSIONS }))
            }
            _ => None,
        }
    }
}

/// Turns handler failures into error responses
pub struct ErrorHandler;

impl ErrorHandler {
    /// `McpError`s keep their code; anything else is an internal error
    #[inline]
    pub fn handle_error(error: &anyhow::Error, id: Option<RequestId>) -> JsonRpcMessage {
        let fallback_id = id.clone();
        error.downcast_ref::<McpError>().map_or_else(
            || {
                error!("Unexpected error: {:#}", error);
                McpError::InternalError {
                    message: format!("{:#}", error),
                }
                .to_error_response(fallback_id)
            },
            |known| {
                known.log();
                known.to_error_response(id)
            },
        )
    }
}

pub type McpResult<T> = Result<T, McpError>;

impl From<serde_json::Error> for McpError {
    #[inline]
    fn from(error: serde_json::Error) -> Self {
        Self::ParseError {
            message: error.to_string(),
        }
    }
}
