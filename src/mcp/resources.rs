//! Read-only views of the conversation store

use crate::conversation::SharedStore;
use crate::mcp::errors::McpError;
use crate::mcp::protocol::Resource;
use crate::mcp::server::{McpServer, ResourceHandler};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub const CONVERSATION_LOG_URI: &str = "conversation://log";
pub const WEATHER_CACHE_URI: &str = "weather://cache";

const JSON_MIME_TYPE: &str = "application/json";

#[inline]
pub async fn register_resources(server: &McpServer, store: &SharedStore) {
    server
        .register_resource(
            ConversationLogResource::definition(),
            ConversationLogResource::new(Arc::clone(store)),
        )
        .await;
    server
        .register_resource(
            WeatherCacheResource::definition(),
            WeatherCacheResource::new(Arc::clone(store)),
        )
        .await;
}

/// The full conversation log as JSON
pub struct ConversationLogResource {
    store: SharedStore,
}

impl ConversationLogResource {
    #[inline]
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    #[inline]
    pub fn definition() -> Resource {
        Resource {
            uri: CONVERSATION_LOG_URI.to_string(),
            name: "Conversation Log".to_string(),
            description: Some("Every logged message and tool event, oldest first".to_string()),
            mime_type: Some(JSON_MIME_TYPE.to_string()),
        }
    }
}

#[async_trait]
impl ResourceHandler for ConversationLogResource {
    #[inline]
    async fn handle(&self, uri: &str) -> Result<String> {
        if uri != CONVERSATION_LOG_URI {
            return Err(McpError::ResourceNotFound {
                uri: uri.to_string(),
            }
            .into());
        }
        Ok(self.store.lock().await.render_log(None))
    }
}

/// Listing of cached weather results
pub struct WeatherCacheResource {
    store: SharedStore,
}

impl WeatherCacheResource {
    #[inline]
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    #[inline]
    pub fn definition() -> Resource {
        Resource {
            uri: WEATHER_CACHE_URI.to_string(),
            name: "Weather Cache".to_string(),
            description: Some(
                "Cached alerts and forecasts with their age and a preview".to_string(),
            ),
            mime_type: Some(JSON_MIME_TYPE.to_string()),
        }
    }
}

#[async_trait]
impl ResourceHandler for WeatherCacheResource {
    #[inline]
    async fn handle(&self, uri: &str) -> Result<String> {
        if uri != WEATHER_CACHE_URI {
            return Err(McpError::ResourceNotFound {
                uri: uri.to_string(),
            }
            .into());
        }
        Ok(self.store.lock().await.render_cache())
    }
}
