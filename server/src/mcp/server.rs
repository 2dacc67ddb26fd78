//! MCP Server Implementation
//!
//! Handles MCP protocol requests and routes tool calls to the memory store.

use super::protocol::*;
use super::resources::{get_all_resources, read_resource};
use super::tools::*;
use super::transport::{Incoming, LineTransport, StdioTransport};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::memory::MemoryManager;
use mnemograph_memory::{
    classify, MemoryError, MemoryRecord, MemoryUpdate, Observation, Relation, RelationKey,
    SearchRequest,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "mnemograph";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

/// MCP Server - handles protocol messages
pub struct McpServer {
    manager: Arc<MemoryManager>,
    initialized: bool,
}

impl McpServer {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_manager(Arc::new(MemoryManager::new(config)))
    }

    pub fn with_manager(manager: Arc<MemoryManager>) -> Self {
        Self {
            manager,
            initialized: false,
        }
    }

    pub fn manager(&self) -> &Arc<MemoryManager> {
        &self.manager
    }

    /// Serve stdin/stdout until the client closes stdin
    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut transport = StdioTransport::stdio();
        self.serve(&mut transport).await
    }

    /// Serve any line transport until end of input
    pub async fn serve<R, W>(&mut self, transport: &mut LineTransport<R, W>) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!("MCP server starting...");

        while let Some(incoming) = transport.read().await? {
            let response = match incoming {
                Incoming::Request(request) => self.handle_request(request).await,
                Incoming::Malformed(e) => Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(format!("Parse error: {}", e)),
                )),
                Incoming::Empty => None,
            };
            if let Some(response) = response {
                transport.write(&response).await?;
            }
        }

        tracing::info!("Client disconnected");
        Ok(())
    }

    /// Handle one request; notifications get no response
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        tracing::debug!("Handling request: {}", request.method);

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request(format!(
                    "Unsupported jsonrpc version: {}",
                    request.jsonrpc
                )),
            ));
        }

        let notification = request.is_notification();
        let id = request.id;
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params).await,
            "initialized" | "notifications/initialized" | "notifications/cancelled" => {
                JsonRpcResponse::success(id, Value::Null)
            }
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::from_result(
                id,
                &ToolsListResult {
                    tools: get_all_tools(),
                },
            ),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            "resources/list" => JsonRpcResponse::from_result(
                id,
                &ResourcesListResult {
                    resources: get_all_resources(),
                },
            ),
            "resources/read" => self.handle_resources_read(id, request.params).await,
            method => JsonRpcResponse::error(id, JsonRpcError::method_not_found(method)),
        };

        (!notification).then_some(response)
    }

    async fn handle_initialize(
        &mut self,
        id: Option<Value>,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();
        if let Some(client) = &params.client_info {
            tracing::info!(
                "Client {} {} (protocol {})",
                client.name,
                client.version.as_deref().unwrap_or("?"),
                params.protocol_version.as_deref().unwrap_or("?")
            );
        }

        if let Err(e) = self.manager.initialize().await {
            tracing::error!("Failed to open memory store: {}", e);
            return JsonRpcResponse::error(id, e.into());
        }
        self.initialized = true;

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                logging: Some(LoggingCapability {}),
                resources: Some(ResourcesCapability::default()),
                tools: Some(ToolsCapability::default()),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
        };
        JsonRpcResponse::from_result(id, &result)
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::error(id, e.into()),
        };

        let result = match self.execute_tool(&params.name, params.arguments).await {
            Ok(value) => ToolCallResult::text(
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
            ),
            Err(ServerError::UnknownTool(name)) => {
                return JsonRpcResponse::error(id, ServerError::UnknownTool(name).into());
            }
            Err(e) => {
                tracing::debug!("Tool {} failed: {}", params.name, e);
                ToolCallResult::failure(format!("Error: {}", e))
            }
        };
        JsonRpcResponse::from_result(id, &result)
    }

    async fn handle_resources_read(
        &self,
        id: Option<Value>,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let params: ResourceReadParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::error(id, e.into()),
        };

        match read_resource(&params.uri, &self.manager).await {
            Some(result) => JsonRpcResponse::from_result(id, &result),
            None => JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_params(format!("Resource not found: {}", params.uri)),
            ),
        }
    }

    /// Execute a tool by name
    async fn execute_tool(&self, name: &str, args: Option<Value>) -> ServerResult<Value> {
        let args = args.unwrap_or_else(|| json!({}));
        let manager = &self.manager;

        match name {
            "memory_create" => {
                let args: CreateArgs = parse_args(args)?;
                let mut record = MemoryRecord::builder()
                    .name(args.name)
                    .memory_type(args.memory_type)
                    .metadata(args.metadata)
                    .tags(args.tags)
                    .build()
                    .map_err(MemoryError::from)?;
                record.observations = args
                    .observations
                    .into_iter()
                    .map(Observation::new)
                    .collect::<Result<_, _>>()?;
                let created = manager.create(record).await?;
                Ok(serde_json::to_value(created)?)
            }

            "memory_search" => {
                let args: SearchArgs = parse_args(args)?;
                let mut request = SearchRequest::new(args.query.as_str())
                    .graph_context(args.include_graph_context.unwrap_or(true));
                if let Some(limit) = args.limit {
                    request = request.limit(limit);
                }
                if let Some(threshold) = args.threshold {
                    request = request.threshold(threshold);
                }
                if let Some(types) = args.types {
                    request = request.memory_types(types);
                }

                let results = manager.search(&request).await?;
                Ok(json!({
                    "intent": classify(&args.query),
                    "total": results.len(),
                    "results": results,
                }))
            }

            "memory_get" => {
                let args: IdArgs = parse_args(args)?;
                match manager.get(&args.id).await? {
                    Some(memory) => Ok(serde_json::to_value(memory)?),
                    None => Err(MemoryError::not_found(format!("memory {}", args.id)).into()),
                }
            }

            "memory_update" => {
                let args: UpdateArgs = parse_args(args)?;
                let update = MemoryUpdate {
                    name: args.name,
                    memory_type: args.memory_type,
                    metadata: args.metadata,
                    tags: args.tags,
                };
                Ok(serde_json::to_value(manager.update(&args.id, update).await?)?)
            }

            "memory_delete" => {
                let args: IdArgs = parse_args(args)?;
                let deleted = manager.delete(&args.id).await?;
                Ok(json!({ "id": args.id, "deleted": deleted }))
            }

            "memory_list" => {
                let args: ListArgs = parse_args(args)?;
                let limit = args.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
                let memories = manager
                    .list(args.types.as_deref(), args.offset, limit)
                    .await?;
                Ok(json!({
                    "offset": args.offset,
                    "count": memories.len(),
                    "memories": memories,
                }))
            }

            "observation_add" => {
                let args: ObservationAddArgs = parse_args(args)?;
                let observations = args
                    .observations
                    .into_iter()
                    .map(|text| {
                        let mut observation = Observation::new(text)?;
                        if let Some(source) = &args.source {
                            observation = observation.with_source(source.clone());
                        }
                        if let Some(confidence) = args.confidence {
                            observation = observation.with_confidence(confidence);
                        }
                        Ok(observation)
                    })
                    .collect::<Result<Vec<_>, MemoryError>>()?;
                let added = manager.add_observations(&args.memory_id, observations).await?;
                Ok(json!({ "memoryId": args.memory_id, "added": added }))
            }

            "observation_delete" => {
                let args: ObservationDeleteArgs = parse_args(args)?;
                let removed = manager
                    .delete_observations(&args.memory_id, &args.observation_ids)
                    .await?;
                Ok(json!({ "memoryId": args.memory_id, "removed": removed }))
            }

            "relation_create" => {
                let args: RelationArgs = parse_args(args)?;
                let mut relation = Relation::new(args.from, args.to, args.relation_type)?
                    .with_context(args.context);
                if let Some(strength) = args.strength {
                    relation = relation.with_strength(strength);
                }
                if let Some(source) = args.source {
                    relation = relation.with_source(source);
                }
                let created = manager.create_relation(relation.clone()).await?;
                Ok(json!({ "relation": relation, "created": created }))
            }

            "relation_delete" => {
                let args: RelationArgs = parse_args(args)?;
                let key = RelationKey {
                    from: args.from,
                    to: args.to,
                    relation_type: args.relation_type.trim().to_string(),
                };
                let deleted = manager.delete_relation(&key).await?;
                Ok(json!({ "deleted": deleted }))
            }

            "memory_stats" => manager.stats().await,

            _ => Err(ServerError::UnknownTool(name.to_string())),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> ServerResult<T> {
    let params = params.ok_or_else(|| ServerError::invalid_params("Missing params"))?;
    serde_json::from_value(params).map_err(|e| ServerError::invalid_params(e.to_string()))
}

fn parse_args<T: DeserializeOwned>(args: Value) -> ServerResult<T> {
    serde_json::from_value(args).map_err(|e| ServerError::invalid_params(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemograph_memory::CapabilityCache;
    use tempfile::TempDir;

    fn server(dir: &TempDir) -> McpServer {
        let config = ServerConfig {
            data_dir: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let manager =
            MemoryManager::new(config).with_capability_cache(Arc::new(CapabilityCache::new()));
        McpServer::with_manager(Arc::new(manager))
    }

    fn request(id: u64, method: &str, params: Value) -> JsonRpcRequest {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .unwrap()
    }

    async fn call(server: &mut McpServer, name: &str, arguments: Value) -> (Value, bool) {
        let response = server
            .handle_request(request(
                9,
                "tools/call",
                json!({ "name": name, "arguments": arguments }),
            ))
            .await
            .unwrap();
        let result = response.result.expect("tool call result");
        let is_error = result["isError"].as_bool().unwrap_or(false);
        let text = result["content"][0]["text"].as_str().unwrap().to_string();
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        (body, is_error)
    }

    #[tokio::test]
    async fn test_initialize_and_lists() {
        let dir = TempDir::new().unwrap();
        let mut server = server(&dir);

        let response = server
            .handle_request(request(1, "initialize", json!({"clientInfo": {"name": "test"}})))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], json!("mnemograph"));
        assert_eq!(result["protocolVersion"], json!(PROTOCOL_VERSION));
        assert!(server.is_initialized());

        let response = server
            .handle_request(request(2, "tools/list", Value::Null))
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["tools"].as_array().unwrap().len(), 11);

        let response = server
            .handle_request(request(3, "resources/list", Value::Null))
            .await
            .unwrap();
        assert_eq!(
            response.result.unwrap()["resources"].as_array().unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let dir = TempDir::new().unwrap();
        let mut server = server(&dir);
        let notification: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .unwrap();
        assert!(server.handle_request(notification).await.is_none());

        let response = server
            .handle_request(request(4, "bogus/method", Value::Null))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tool_before_initialize_is_tool_error() {
        let dir = TempDir::new().unwrap();
        let mut server = server(&dir);
        let (body, is_error) = call(&mut server, "memory_stats", json!({})).await;
        assert!(is_error);
        assert!(body.as_str().unwrap().contains("not initialized"));
    }

    #[tokio::test]
    async fn test_memory_tools_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut server = server(&dir);
        server
            .handle_request(request(1, "initialize", json!({})))
            .await
            .unwrap();

        let (dog, is_error) = call(
            &mut server,
            "memory_create",
            json!({
                "name": "Dog",
                "type": "pet",
                "tags": ["Animal"],
                "observations": ["barks at 9000 rpm"]
            }),
        )
        .await;
        assert!(!is_error, "{}", dog);
        assert_eq!(dog["memoryType"], json!("pet"));
        assert_eq!(dog["tags"], json!(["animal"]));
        let dog_id = dog["id"].as_str().unwrap().to_string();

        let (kennel, _) = call(
            &mut server,
            "memory_create",
            json!({"name": "Kennel", "type": "place", "metadata": {"port": 9000}}),
        )
        .await;
        let kennel_id = kennel["id"].as_str().unwrap().to_string();

        let relation = json!({"from": kennel_id, "to": dog_id, "relationType": "houses"});
        let (created, _) = call(&mut server, "relation_create", relation.clone()).await;
        assert_eq!(created["created"], json!(true));
        let (created, _) = call(&mut server, "relation_create", relation.clone()).await;
        assert_eq!(created["created"], json!(false));

        let (found, _) = call(&mut server, "memory_search", json!({"query": "9000"})).await;
        assert_eq!(found["intent"]["type"], json!("exact_search"));
        assert_eq!(found["results"][0]["id"], json!(kennel_id));
        assert_eq!(found["results"][0]["matchType"], json!("exact"));
        assert_eq!(
            found["results"][0]["related"]["descendants"][0]["relationType"],
            json!("houses")
        );

        let (overview, _) = call(&mut server, "memory_search", json!({"query": "*"})).await;
        assert_eq!(overview["total"], json!(1));
        assert_eq!(overview["results"][0]["children"][0]["id"], json!(dog_id));

        let (updated, _) = call(
            &mut server,
            "memory_update",
            json!({"id": kennel_id, "metadata": {"port": null, "city": "Oslo"}}),
        )
        .await;
        assert_eq!(updated["metadata"], json!({"city": "Oslo"}));

        let (fetched, _) = call(&mut server, "memory_get", json!({"id": dog_id})).await;
        assert_eq!(fetched["incoming"].as_array().unwrap().len(), 1);
        let observation_id = fetched["observations"][0]["id"].as_str().unwrap().to_string();

        let (removed, _) = call(
            &mut server,
            "observation_delete",
            json!({"memoryId": dog_id, "observationIds": [observation_id]}),
        )
        .await;
        assert_eq!(removed["removed"], json!(1));

        let (listed, _) = call(&mut server, "memory_list", json!({"types": ["pet"]})).await;
        assert_eq!(listed["count"], json!(1));

        let (deleted, _) = call(&mut server, "relation_delete", relation).await;
        assert_eq!(deleted["deleted"], json!(true));

        let (deleted, _) = call(&mut server, "memory_delete", json!({"id": dog_id})).await;
        assert_eq!(deleted["deleted"], json!(true));
        let (missing, is_error) = call(&mut server, "memory_get", json!({"id": dog_id})).await;
        assert!(is_error);
        assert!(missing.as_str().unwrap().contains("Not found"));

        let (stats, _) = call(&mut server, "memory_stats", json!({})).await;
        assert_eq!(stats["totalMemories"], json!(1));
    }

    #[tokio::test]
    async fn test_bad_arguments_and_unknown_tool() {
        let dir = TempDir::new().unwrap();
        let mut server = server(&dir);
        server
            .handle_request(request(1, "initialize", json!({})))
            .await
            .unwrap();

        let (body, is_error) = call(&mut server, "memory_search", json!({"limit": 3})).await;
        assert!(is_error);
        assert!(body.as_str().unwrap().contains("query"));

        let (_, is_error) = call(
            &mut server,
            "memory_search",
            json!({"query": "dogs", "limit": 0}),
        )
        .await;
        assert!(is_error);

        let response = server
            .handle_request(request(5, "tools/call", json!({"name": "nope"})))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);

        let response = server
            .handle_request(request(6, "tools/call", Value::Null))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }
}
