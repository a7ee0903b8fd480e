//! MCP Protocol Implementation Tests
//!
//! Drives the registered server through raw JSON-RPC lines with in-memory
//! weather and geolocation sources and a manual clock.

use crate::commands::assemble_server;
use crate::config::CacheConfig;
use crate::conversation::{Clock, ConversationStore, ManualClock, SharedStore};
use crate::geolocation::{LocationInfo, LocationProvider, LocationQuery, LocationResolver};
use crate::mcp::protocol::{JsonRpcMessage, error_codes, mcp_error_codes};
use crate::mcp::{McpServer, MessageHandler, ToolContext};
use crate::weather::format::{ALERTS_UNAVAILABLE, FORECAST_UNAVAILABLE};
use crate::weather::models::{
    AlertFeature, AlertProperties, ForecastPeriod, ForecastProperties, Temperature,
};
use crate::weather::{AlertCollection, Forecast, WeatherSource};
use chrono::{TimeDelta, TimeZone, Utc};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeWeather {
    alerts: Option<AlertCollection>,
    forecast: Option<Forecast>,
    alert_calls: AtomicUsize,
    forecast_calls: AtomicUsize,
}

impl WeatherSource for FakeWeather {
    fn fetch_alerts(&self, _state: &str) -> Option<AlertCollection> {
        self.alert_calls.fetch_add(1, Ordering::SeqCst);
        self.alerts.clone()
    }

    fn fetch_forecast(&self, _latitude: f64, _longitude: f64) -> Option<Forecast> {
        self.forecast_calls.fetch_add(1, Ordering::SeqCst);
        self.forecast.clone()
    }
}

#[derive(Default)]
struct RecordingProvider {
    answer: Option<LocationInfo>,
    seen: Mutex<Vec<LocationQuery>>,
}

impl LocationProvider for Arc<RecordingProvider> {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn resolve(&self, query: &LocationQuery) -> Option<LocationInfo> {
        self.seen.lock().expect("not poisoned").push(*query);
        self.answer.clone()
    }
}

fn fire_warning() -> AlertCollection {
    AlertCollection {
        features: vec![AlertFeature {
            properties: AlertProperties {
                event: Some("Fire Warning".to_string()),
                area_desc: Some("Los Angeles County".to_string()),
                ..AlertProperties::default()
            },
        }],
    }
}

fn sunny_forecast() -> Forecast {
    Forecast {
        properties: ForecastProperties {
            periods: vec![ForecastPeriod {
                name: "Today".to_string(),
                temperature: Some(Temperature::Value(75.0)),
                temperature_unit: Some("F".to_string()),
                short_forecast: Some("Sunny".to_string()),
                ..ForecastPeriod::default()
            }],
        },
    }
}

fn tokyo() -> LocationInfo {
    LocationInfo {
        timezone: "Asia/Tokyo".to_string(),
        latitude: Some(35.68),
        longitude: Some(139.69),
        city: "Tokyo".to_string(),
        region: "Tokyo".to_string(),
        country: "Japan".to_string(),
    }
}

struct Harness {
    server: Arc<McpServer>,
    handler: MessageHandler,
    store: SharedStore,
    clock: Arc<ManualClock>,
    weather: Arc<FakeWeather>,
    provider: Arc<RecordingProvider>,
}

async fn harness(weather: FakeWeather, location: Option<LocationInfo>) -> Harness {
    let start = Utc
        .with_ymd_and_hms(2024, 7, 4, 12, 0, 0)
        .single()
        .expect("valid instant");
    let clock = Arc::new(ManualClock::new(start));
    let cache = CacheConfig::default();
    let store =
        ConversationStore::with_clock(&cache, Arc::clone(&clock) as Arc<dyn Clock>).into_shared();
    let weather = Arc::new(weather);
    let provider = Arc::new(RecordingProvider {
        answer: location,
        ..RecordingProvider::default()
    });

    let context = ToolContext {
        weather: Arc::clone(&weather) as Arc<dyn WeatherSource>,
        locator: Arc::new(LocationResolver::new(vec![Box::new(Arc::clone(&provider))])),
        store: Arc::clone(&store),
        cache,
    };
    let server = assemble_server("general-tools", &context).await;

    Harness {
        handler: MessageHandler::new(Arc::clone(&server)),
        server,
        store,
        clock,
        weather,
        provider,
    }
}

async fn request(handler: &MessageHandler, id: i64, method: &str, params: Value) -> JsonRpcMessage {
    let line = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string();
    handler
        .handle_line(&line)
        .await
        .expect("requests always get a reply")
}

async fn call_tool(handler: &MessageHandler, name: &str, arguments: Value) -> JsonRpcMessage {
    request(
        handler,
        7,
        "tools/call",
        json!({"name": name, "arguments": arguments}),
    )
    .await
}

fn result_of(message: JsonRpcMessage) -> Value {
    match message {
        JsonRpcMessage::Response(response) => response.result,
        other => panic!("expected a result, got {other:?}"),
    }
}

fn error_code_of(message: &JsonRpcMessage) -> i32 {
    match message {
        JsonRpcMessage::ErrorResponse(response) => response.error.code,
        other => panic!("expected an error, got {other:?}"),
    }
}

fn tool_text(message: JsonRpcMessage) -> String {
    let result = result_of(message);
    assert_eq!(result["isError"], json!(false));
    result["content"][0]["text"]
        .as_str()
        .expect("text content")
        .to_string()
}

async fn log_contents(store: &SharedStore) -> Vec<String> {
    store
        .lock()
        .await
        .records()
        .map(|r| r.content.clone())
        .collect()
}

mod lifecycle_tests {
    use super::*;
    use crate::mcp::ConnectionState;

    #[tokio::test]
    async fn initialize_echoes_supported_version() {
        let h = harness(FakeWeather::default(), None).await;

        let result = result_of(
            request(
                &h.handler,
                1,
                "initialize",
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "test", "version": "1.0"}
                }),
            )
            .await,
        );

        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "general-tools");
        assert!(result["capabilities"]["tools"].is_object());
        assert!(result["capabilities"]["resources"].is_object());
        assert!(result["capabilities"]["prompts"].is_object());
        assert_eq!(
            h.server.connection_state().await,
            ConnectionState::Initializing
        );

        let reply = h
            .handler
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());
        assert_eq!(h.server.connection_state().await, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn unsupported_protocol_version() {
        let h = harness(FakeWeather::default(), None).await;

        let reply = request(
            &h.handler,
            1,
            "initialize",
            json!({
                "protocolVersion": "1999-01-01",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "1.0"}
            }),
        )
        .await;

        assert_eq!(
            error_code_of(&reply),
            mcp_error_codes::INVALID_PROTOCOL_VERSION
        );
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let h = harness(FakeWeather::default(), None).await;
        assert_eq!(result_of(request(&h.handler, 2, "ping", json!({})).await), json!({}));
    }

    #[tokio::test]
    async fn unknown_method() {
        let h = harness(FakeWeather::default(), None).await;
        let reply = request(&h.handler, 3, "sampling/createMessage", json!({})).await;
        assert_eq!(error_code_of(&reply), error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn unparseable_line_has_null_id() {
        let h = harness(FakeWeather::default(), None).await;

        let reply = h
            .handler
            .handle_line("{not json")
            .await
            .expect("parse errors get a reply");

        assert_eq!(error_code_of(&reply), error_codes::PARSE_ERROR);
        let serialized = serde_json::to_value(&reply).expect("serializes");
        assert_eq!(serialized["id"], Value::Null);
    }

    #[tokio::test]
    async fn wrong_jsonrpc_version_is_invalid_request() {
        let h = harness(FakeWeather::default(), None).await;

        let reply = h
            .handler
            .handle_line(r#"{"jsonrpc":"1.0","id":9,"method":"ping"}"#)
            .await
            .expect("invalid requests get a reply");

        assert_eq!(error_code_of(&reply), error_codes::INVALID_REQUEST);
        let serialized = serde_json::to_value(&reply).expect("serializes");
        assert_eq!(serialized["id"], json!(9));
    }

    #[tokio::test]
    async fn serves_over_in_memory_pipes() {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let h = harness(FakeWeather::default(), None).await;
        let (client, server_end) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_end);
        let serving = tokio::spawn(
            Arc::clone(&h.server).serve(BufReader::new(server_read), server_write),
        );

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\n")
            .await
            .expect("write");
        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n")
            .await
            .expect("write");
        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n")
            .await
            .expect("write");

        let mut lines = BufReader::new(client_read).lines();
        let first: Value = serde_json::from_str(
            &lines.next_line().await.expect("read").expect("line"),
        )
        .expect("json");
        let second: Value = serde_json::from_str(
            &lines.next_line().await.expect("read").expect("line"),
        )
        .expect("json");

        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);
        assert_eq!(second["result"]["tools"].as_array().map(Vec::len), Some(7));

        drop(client_write);
        drop(lines);
        serving.await.expect("join").expect("serve");
        assert_eq!(h.server.connection_state().await, ConnectionState::Closed);
    }
}

mod weather_tool_tests {
    use super::*;

    #[tokio::test]
    async fn alerts_read_through_cache() {
        let h = harness(
            FakeWeather {
                alerts: Some(fire_warning()),
                ..FakeWeather::default()
            },
            None,
        )
        .await;

        let first = tool_text(call_tool(&h.handler, "get_alerts", json!({"state": "ca"})).await);
        let second = tool_text(call_tool(&h.handler, "get_alerts", json!({"state": "CA"})).await);

        assert!(first.contains("Event: Fire Warning"));
        assert_eq!(first, second);
        assert_eq!(h.weather.alert_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            log_contents(&h.store).await,
            vec![
                "Fetched fresh alerts for CA".to_string(),
                "Served cached alerts for CA".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn stale_alerts_are_refetched() {
        let h = harness(
            FakeWeather {
                alerts: Some(fire_warning()),
                ..FakeWeather::default()
            },
            None,
        )
        .await;

        call_tool(&h.handler, "get_alerts", json!({"state": "CA"})).await;
        h.clock.advance(TimeDelta::minutes(31));
        call_tool(&h.handler, "get_alerts", json!({"state": "CA"})).await;

        assert_eq!(h.weather.alert_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unavailable_alerts_are_not_cached() {
        let h = harness(FakeWeather::default(), None).await;

        let text = tool_text(call_tool(&h.handler, "get_alerts", json!({"state": "TX"})).await);
        call_tool(&h.handler, "get_alerts", json!({"state": "TX"})).await;

        assert_eq!(text, ALERTS_UNAVAILABLE);
        assert_eq!(h.weather.alert_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.store.lock().await.cache_len(), 0);
    }

    #[tokio::test]
    async fn forecast_cached_under_rounded_key() {
        let h = harness(
            FakeWeather {
                forecast: Some(sunny_forecast()),
                ..FakeWeather::default()
            },
            None,
        )
        .await;

        let text = tool_text(
            call_tool(
                &h.handler,
                "get_forecast",
                json!({"latitude": 37.7749, "longitude": -122.4194}),
            )
            .await,
        );
        call_tool(
            &h.handler,
            "get_forecast",
            json!({"latitude": 37.771, "longitude": -122.4181}),
        )
        .await;

        assert!(text.contains("Temperature: 75°F"));
        assert_eq!(h.weather.forecast_calls.load(Ordering::SeqCst), 1);
        assert!(h.store.lock().await.entry("forecast_37.77_-122.42").is_some());
    }

    #[tokio::test]
    async fn forecast_stays_fresh_for_an_hour() {
        let h = harness(
            FakeWeather {
                forecast: Some(sunny_forecast()),
                ..FakeWeather::default()
            },
            None,
        )
        .await;
        let args = json!({"latitude": 40.0, "longitude": -75.0});

        call_tool(&h.handler, "get_forecast", args.clone()).await;
        h.clock.advance(TimeDelta::minutes(60));
        call_tool(&h.handler, "get_forecast", args.clone()).await;
        assert_eq!(h.weather.forecast_calls.load(Ordering::SeqCst), 1);

        h.clock.advance(TimeDelta::minutes(1));
        call_tool(&h.handler, "get_forecast", args).await;
        assert_eq!(h.weather.forecast_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unavailable_forecast_text() {
        let h = harness(FakeWeather::default(), None).await;
        let text = tool_text(
            call_tool(
                &h.handler,
                "get_forecast",
                json!({"latitude": 0.0, "longitude": 0.0}),
            )
            .await,
        );
        assert_eq!(text, FORECAST_UNAVAILABLE);
    }

    #[tokio::test]
    async fn bad_arguments_are_invalid_params() {
        let h = harness(FakeWeather::default(), None).await;

        for (tool, arguments) in [
            ("get_forecast", json!({"latitude": 37.0})),
            ("get_forecast", json!({"latitude": "north", "longitude": 1.0})),
            ("get_forecast", json!({"latitude": 91.0, "longitude": 0.0})),
            ("get_alerts", json!({})),
            ("get_alerts", json!({"state": "  "})),
            ("get_alerts", json!({"state": "CA", "county": "LA"})),
            ("get_conversation_log", json!({"limit": -1})),
        ] {
            let reply = call_tool(&h.handler, tool, arguments.clone()).await;
            assert_eq!(
                error_code_of(&reply),
                error_codes::INVALID_PARAMS,
                "{tool} with {arguments}"
            );
        }

        assert_eq!(h.weather.forecast_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.weather.alert_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_tool() {
        let h = harness(FakeWeather::default(), None).await;
        let reply = call_tool(&h.handler, "get_tides", json!({})).await;
        assert_eq!(error_code_of(&reply), mcp_error_codes::TOOL_NOT_FOUND);
    }
}

mod time_tool_tests {
    use super::*;

    #[tokio::test]
    async fn reports_local_time_for_located_caller() {
        let h = harness(FakeWeather::default(), Some(tokyo())).await;

        let text = tool_text(
            call_tool(&h.handler, "get_current_time", json!({"ip_address": "8.8.8.8"})).await,
        );

        // 12:00 UTC is 21:00 in Tokyo
        assert!(text.contains("Time: Thursday, July 04, 2024 at 09:00:00 PM"));
        assert!(text.contains("Coordinates: 35.68, 139.69"));
        assert!(text.ends_with("(IP: 8.8.8.8)"));
        assert_eq!(
            log_contents(&h.store).await,
            vec!["Reported current time in Asia/Tokyo for 8.8.8.8".to_string()]
        );
    }

    #[tokio::test]
    async fn loopback_is_resolved_as_caller() {
        let h = harness(FakeWeather::default(), None).await;

        let text = tool_text(
            call_tool(&h.handler, "get_current_time", json!({"ip_address": "127.0.0.1"})).await,
        );

        assert!(text.contains("Timezone: UTC"));
        assert!(text.contains("Could not determine precise location"));
        assert_eq!(
            *h.provider.seen.lock().expect("not poisoned"),
            vec![LocationQuery::Caller]
        );
    }

    #[tokio::test]
    async fn missing_and_empty_ip_query_the_caller() {
        let h = harness(FakeWeather::default(), Some(tokyo())).await;

        let text = tool_text(call_tool(&h.handler, "get_current_time", json!({})).await);
        call_tool(&h.handler, "get_current_time", json!({"ip_address": ""})).await;

        assert!(!text.contains("(IP:"));
        assert_eq!(
            *h.provider.seen.lock().expect("not poisoned"),
            vec![LocationQuery::Caller, LocationQuery::Caller]
        );
    }
}

mod conversation_tool_tests {
    use super::*;

    #[tokio::test]
    async fn log_message_and_read_back() {
        let h = harness(FakeWeather::default(), None).await;

        for (role, content) in [("user", "hello"), ("assistant", "hi"), ("user", "weather?")] {
            let text = tool_text(
                call_tool(
                    &h.handler,
                    "log_message",
                    json!({"role": role, "content": content}),
                )
                .await,
            );
            assert_eq!(text, format!("Logged {role} message"));
        }

        let all: Vec<Value> = serde_json::from_str(&tool_text(
            call_tool(&h.handler, "get_conversation_log", json!({})).await,
        ))
        .expect("log is JSON");
        assert_eq!(all.len(), 3);
        assert_eq!(all[0]["role"], "user");
        assert_eq!(all[0]["content"], "hello");

        let latest: Vec<Value> = serde_json::from_str(&tool_text(
            call_tool(&h.handler, "get_conversation_log", json!({"limit": 1})).await,
        ))
        .expect("log is JSON");
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0]["content"], "weather?");
    }

    #[tokio::test]
    async fn cached_weather_listing_and_sweep() {
        let h = harness(
            FakeWeather {
                alerts: Some(fire_warning()),
                forecast: Some(sunny_forecast()),
                ..FakeWeather::default()
            },
            None,
        )
        .await;

        call_tool(&h.handler, "get_alerts", json!({"state": "CA"})).await;
        h.clock.advance(TimeDelta::minutes(90));
        call_tool(
            &h.handler,
            "get_forecast",
            json!({"latitude": 37.77, "longitude": -122.41}),
        )
        .await;

        let listing: Vec<Value> = serde_json::from_str(&tool_text(
            call_tool(&h.handler, "get_cached_weather", json!({})).await,
        ))
        .expect("listing is JSON");
        let keys: Vec<&str> = listing.iter().filter_map(|e| e["key"].as_str()).collect();
        assert_eq!(keys, vec!["alerts_CA", "forecast_37.77_-122.41"]);
        assert_eq!(listing[0]["type"], "alerts");
        assert_eq!(listing[0]["age_minutes"], 90);

        // default bound is the forecast max age (60 minutes)
        let text = tool_text(call_tool(&h.handler, "clear_expired_cache", json!({})).await);
        assert!(text.starts_with("Cleared 1 expired cache entries"));
        assert_eq!(h.store.lock().await.cache_len(), 1);

        let text = tool_text(
            call_tool(&h.handler, "clear_expired_cache", json!({"max_age_minutes": 0})).await,
        );
        assert!(text.starts_with("Cleared 0 expired cache entries"));
    }

    #[tokio::test]
    async fn get_cached_weather_rejects_arguments() {
        let h = harness(FakeWeather::default(), None).await;
        let reply = call_tool(&h.handler, "get_cached_weather", json!({"key": "x"})).await;
        assert_eq!(error_code_of(&reply), error_codes::INVALID_PARAMS);
    }
}

mod resource_and_prompt_tests {
    use super::*;

    #[tokio::test]
    async fn lists_resources() {
        let h = harness(FakeWeather::default(), None).await;
        let result = result_of(request(&h.handler, 1, "resources/list", json!({})).await);

        let uris: Vec<&str> = result["resources"]
            .as_array()
            .expect("resources array")
            .iter()
            .filter_map(|r| r["uri"].as_str())
            .collect();
        assert_eq!(uris, vec!["conversation://log", "weather://cache"]);
        assert_eq!(result["resources"][0]["mimeType"], "application/json");
    }

    #[tokio::test]
    async fn reads_conversation_log_resource() {
        let h = harness(FakeWeather::default(), None).await;
        h.store.lock().await.log("user", "from resource");

        let result = result_of(
            request(
                &h.handler,
                1,
                "resources/read",
                json!({"uri": "conversation://log"}),
            )
            .await,
        );

        let contents = &result["contents"][0];
        assert_eq!(contents["uri"], "conversation://log");
        assert_eq!(contents["mimeType"], "application/json");
        let records: Vec<Value> =
            serde_json::from_str(contents["text"].as_str().expect("text")).expect("json");
        assert_eq!(records[0]["content"], "from resource");
    }

    #[tokio::test]
    async fn reads_empty_weather_cache_resource() {
        let h = harness(FakeWeather::default(), None).await;

        let result = result_of(
            request(
                &h.handler,
                1,
                "resources/read",
                json!({"uri": "weather://cache"}),
            )
            .await,
        );
        assert_eq!(result["contents"][0]["text"], "[]");
    }

    #[tokio::test]
    async fn unknown_resource() {
        let h = harness(FakeWeather::default(), None).await;
        let reply = request(&h.handler, 1, "resources/read", json!({"uri": "file:///etc"})).await;
        assert_eq!(error_code_of(&reply), mcp_error_codes::RESOURCE_NOT_FOUND);
    }

    #[tokio::test]
    async fn prompts_list_and_get() {
        let h = harness(FakeWeather::default(), None).await;

        let listed = result_of(request(&h.handler, 1, "prompts/list", json!({})).await);
        let names: Vec<&str> = listed["prompts"]
            .as_array()
            .expect("prompts array")
            .iter()
            .filter_map(|p| p["name"].as_str())
            .collect();
        assert_eq!(names, vec!["location_guidance", "weather_assistant"]);

        let prompt = result_of(
            request(
                &h.handler,
                2,
                "prompts/get",
                json!({"name": "weather_assistant"}),
            )
            .await,
        );
        assert_eq!(prompt["messages"][0]["role"], "user");
        assert!(
            prompt["messages"][0]["content"]["text"]
                .as_str()
                .expect("text")
                .contains("get_forecast")
        );
    }

    #[tokio::test]
    async fn unknown_prompt() {
        let h = harness(FakeWeather::default(), None).await;
        let reply = request(&h.handler, 1, "prompts/get", json!({"name": "haiku"})).await;
        assert_eq!(error_code_of(&reply), mcp_error_codes::PROMPT_NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_params_are_invalid() {
        let h = harness(FakeWeather::default(), None).await;
        let reply = h
            .handler
            .handle_line(r#"{"jsonrpc":"2.0","id":5,"method":"resources/read"}"#)
            .await
            .expect("reply");
        assert_eq!(error_code_of(&reply), error_codes::INVALID_PARAMS);
    }
}

mod relay_tests {
    use super::*;
    use crate::mcp::{McpClient, ToolRelay, ToolUse};
    use serde_json::Map;
    use tokio::io::BufReader;

    async fn connected_relay(h: &Harness, client_ip: Option<&str>) -> ToolRelay {
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_end);
        tokio::spawn(Arc::clone(&h.server).serve(BufReader::new(server_read), server_write));

        let (client_read, client_write) = tokio::io::split(client_end);
        let client = McpClient::connect(client_read, client_write)
            .await
            .expect("handshake succeeds");
        assert_eq!(
            client.server_info().map(|info| info.name.as_str()),
            Some("general-tools")
        );
        ToolRelay::new(client).with_client_ip(client_ip.map(str::to_string))
    }

    fn tool_use(name: &str, input: Value) -> ToolUse {
        let input = match input {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        ToolUse {
            id: "toolu_01".to_string(),
            name: name.to_string(),
            input,
        }
    }

    #[tokio::test]
    async fn available_tools_include_read_resource() {
        let h = harness(FakeWeather::default(), None).await;
        let mut relay = connected_relay(&h, None).await;

        let names: Vec<String> = relay
            .available_tools()
            .await
            .expect("tools listed")
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names.len(), 8);
        assert_eq!(names.last().map(String::as_str), Some("read_resource"));
    }

    #[tokio::test]
    async fn relays_tool_calls() {
        let h = harness(
            FakeWeather {
                alerts: Some(fire_warning()),
                ..FakeWeather::default()
            },
            None,
        )
        .await;
        let mut relay = connected_relay(&h, None).await;

        let block = relay
            .dispatch(&tool_use("get_alerts", json!({"state": "CA"})))
            .await;

        assert_eq!(block.tool_use_id, "toolu_01");
        assert!(!block.is_error);
        assert!(block.content.contains("Fire Warning"));
    }

    #[tokio::test]
    async fn injects_client_ip_for_current_time() {
        let h = harness(FakeWeather::default(), Some(tokyo())).await;
        let mut relay = connected_relay(&h, Some("203.0.113.7")).await;

        let block = relay.dispatch(&tool_use("get_current_time", json!({}))).await;

        assert!(!block.is_error);
        assert!(block.content.ends_with("(IP: 203.0.113.7)"));
        assert_eq!(
            *h.provider.seen.lock().expect("not poisoned"),
            vec![LocationQuery::Address("203.0.113.7".parse().expect("ip"))]
        );
    }

    #[tokio::test]
    async fn explicit_ip_wins_over_client_ip() {
        let h = harness(FakeWeather::default(), Some(tokyo())).await;
        let mut relay = connected_relay(&h, Some("203.0.113.7")).await;

        let block = relay
            .dispatch(&tool_use("get_current_time", json!({"ip_address": "8.8.4.4"})))
            .await;

        assert!(block.content.ends_with("(IP: 8.8.4.4)"));
    }

    #[tokio::test]
    async fn read_resource_pseudo_tool() {
        let h = harness(FakeWeather::default(), None).await;
        h.store.lock().await.log("user", "remember me");
        let mut relay = connected_relay(&h, None).await;

        let block = relay
            .dispatch(&tool_use("read_resource", json!({"uri": "conversation://log"})))
            .await;

        assert!(!block.is_error);
        assert!(block.content.contains("remember me"));
    }

    #[tokio::test]
    async fn failures_become_error_blocks() {
        let h = harness(FakeWeather::default(), None).await;
        let mut relay = connected_relay(&h, None).await;

        let unknown = relay.dispatch(&tool_use("get_tides", json!({}))).await;
        assert!(unknown.is_error);
        assert!(unknown.content.starts_with("Error: "));
        assert!(unknown.content.contains("get_tides"));

        let missing_uri = relay.dispatch(&tool_use("read_resource", json!({}))).await;
        assert!(missing_uri.is_error);

        // the connection survives failed calls
        let block = relay
            .dispatch(&tool_use("log_message", json!({"role": "user", "content": "still here"})))
            .await;
        assert!(!block.is_error);
        relay.shutdown().await.expect("shutdown");
    }

    struct SilentTool;

    #[async_trait::async_trait]
    impl crate::mcp::server::ToolHandler for SilentTool {
        async fn handle(
            &self,
            _params: crate::mcp::protocol::CallToolParams,
        ) -> anyhow::Result<crate::mcp::protocol::CallToolResult> {
            Ok(crate::mcp::protocol::CallToolResult {
                content: Vec::new(),
                is_error: Some(false),
            })
        }
    }

    #[tokio::test]
    async fn empty_tool_content_reads_no_result() {
        let h = harness(FakeWeather::default(), None).await;
        h.server
            .register_tool(
                crate::mcp::protocol::Tool {
                    name: "silent".to_string(),
                    description: None,
                    input_schema: json!({"type": "object"}),
                },
                SilentTool,
            )
            .await;
        let mut relay = connected_relay(&h, None).await;

        let block = relay.dispatch(&tool_use("silent", json!({}))).await;

        assert!(!block.is_error);
        assert_eq!(block.content, "No result");
    }

    #[test]
    fn tool_result_block_shape() {
        let block = crate::mcp::ToolResultBlock {
            tool_use_id: "toolu_01".to_string(),
            content: "ok".to_string(),
            is_error: false,
        };
        let value = serde_json::to_value(&block).expect("serializes");
        assert_eq!(
            value,
            json!({"type": "tool_result", "tool_use_id": "toolu_01", "content": "ok", "is_error": false})
        );
    }
}

mod protocol_tests {
    use crate::mcp::McpError;
    use crate::mcp::protocol::{
        JsonRpcMessage, RequestId, is_protocol_version_supported, parse_message,
        salvage_request_id,
    };

    #[test]
    fn supported_versions() {
        assert!(is_protocol_version_supported("2025-06-18"));
        assert!(is_protocol_version_supported("2025-03-26"));
        assert!(is_protocol_version_supported("2024-11-05"));
        assert!(!is_protocol_version_supported("2024-10-07"));
    }

    #[test]
    fn parses_each_message_kind() {
        assert!(matches!(
            parse_message(r#"{"jsonrpc":"2.0","id":"a","method":"ping"}"#),
            Ok(JsonRpcMessage::Request(_))
        ));
        assert!(matches!(
            parse_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#),
            Ok(JsonRpcMessage::Notification(_))
        ));
        assert!(matches!(
            parse_message(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#),
            Ok(JsonRpcMessage::Response(_))
        ));
        assert!(matches!(
            parse_message(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"no"}}"#),
            Ok(JsonRpcMessage::ErrorResponse(_))
        ));
    }

    #[test]
    fn rejects_malformed_envelopes() {
        assert!(matches!(
            parse_message("not json"),
            Err(McpError::ParseError { .. })
        ));
        assert!(matches!(
            parse_message("[1, 2]"),
            Err(McpError::InvalidRequest { .. })
        ));
        assert!(matches!(
            parse_message(r#"{"id":1,"method":"ping"}"#),
            Err(McpError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn salvages_ids_from_invalid_requests() {
        assert_eq!(
            salvage_request_id(r#"{"jsonrpc":"1.0","id":"abc","method":"ping"}"#),
            Some(RequestId::String("abc".to_string()))
        );
        assert_eq!(salvage_request_id("{broken"), None);
        assert_eq!(salvage_request_id(r#"{"jsonrpc":"2.0"}"#), None);
    }
}
