//! Static guidance prompts

use crate::mcp::protocol::{GetPromptResult, Prompt, PromptMessage, Role, ToolContent};
use crate::mcp::server::{McpServer, PromptHandler};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

const WEATHER_ASSISTANT: &str = "\
You are a helpful weather assistant with access to live US weather data.

- Use get_alerts with a two-letter state code for active warnings and advisories.
- Use get_forecast with latitude and longitude for the next few forecast periods.
- Call get_current_time first when you do not know where the user is; it reports \
coordinates you can pass to get_forecast.
- Results are cached for a while. Use get_cached_weather to see what is already \
known and clear_expired_cache to drop stale entries.
- Summarize severe alerts first and always include any safety instructions.";

const LOCATION_GUIDANCE: &str = "\
The user's location could not be determined from their IP address.

Ask them for their city and state, or for latitude and longitude, before \
requesting a forecast. Weather data is only available for locations in the \
United States. Do not guess coordinates.";

#[inline]
pub async fn register_prompts(server: &McpServer) {
    server
        .register_prompt(
            StaticPrompt::definition(
                "weather_assistant",
                "How to answer weather questions with these tools",
            ),
            StaticPrompt::new("Weather assistant guidance", WEATHER_ASSISTANT),
        )
        .await;
    server
        .register_prompt(
            StaticPrompt::definition(
                "location_guidance",
                "What to do when the user's location is unknown",
            ),
            StaticPrompt::new("Location guidance", LOCATION_GUIDANCE),
        )
        .await;
}

/// A prompt that renders the same single user message every time
pub struct StaticPrompt {
    description: &'static str,
    text: &'static str,
}

impl StaticPrompt {
    #[inline]
    pub fn new(description: &'static str, text: &'static str) -> Self {
        Self { description, text }
    }

    #[inline]
    pub fn definition(name: &str, description: &str) -> Prompt {
        Prompt {
            name: name.to_string(),
            description: Some(description.to_string()),
            arguments: Vec::new(),
        }
    }
}

#[async_trait]
impl PromptHandler for StaticPrompt {
    #[inline]
    async fn handle(&self, _arguments: &HashMap<String, String>) -> Result<GetPromptResult> {
        Ok(GetPromptResult {
            description: Some(self.description.to_string()),
            messages: vec![PromptMessage {
                role: Role::User,
                content: ToolContent::Text {
                    text: self.text.to_string(),
                },
            }],
        })
    }
}
