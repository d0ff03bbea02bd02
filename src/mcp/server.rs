// MCP server: line-delimited JSON-RPC over stdio

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::indexer::IndexingCoordinator;
use crate::mcp::tools;
use crate::query::QueryEngine;

/// JSON-RPC message
#[derive(Debug, Serialize, Deserialize)]
struct JsonRpcMessage {
    jsonrpc: String,
    id: Option<Value>,
    method: Option<String>,
    params: Option<Value>,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Serialize, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    data: Option<Value>,
}

/// MCP tool definition
#[derive(Debug, Serialize, Deserialize)]
struct Tool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ServerCapabilities {
    tools: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ServerInfo {
    name: String,
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct InitializeResult {
    protocol_version: String,
    capabilities: ServerCapabilities,
    server_info: ServerInfo,
}

/// MCP server exposing the context-index tools
pub struct McpServer {
    coordinator: Arc<IndexingCoordinator>,
    engine: QueryEngine,
}

impl McpServer {
    pub fn new(coordinator: Arc<IndexingCoordinator>) -> Self {
        let engine = QueryEngine::for_coordinator(&coordinator);
        Self {
            coordinator,
            engine,
        }
    }

    /// Run the server over stdio until the input stream closes
    pub async fn run(self) -> Result<()> {
        info!("Starting MCP server");

        let (tx, mut rx) = mpsc::unbounded_channel();

        // Blocking stdin reader on its own task
        tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            for line in stdin.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error reading from stdin: {}", e);
                        break;
                    }
                }
            }
        });

        while let Some(line) = rx.recv().await {
            if line.trim().is_empty() {
                continue;
            }
            debug!("Received: {}", line);

            match self.handle_message(&line).await {
                Ok(Some(response)) => {
                    println!("{}", response);
                    io::stdout().flush()?;
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Error handling message: {}", e);
                    let error_response = json!({
                        "jsonrpc": "2.0",
                        "id": null,
                        "error": {
                            "code": -32603,
                            "message": format!("Internal error: {}", e)
                        }
                    });
                    println!("{}", error_response);
                    io::stdout().flush()?;
                }
            }
        }

        Ok(())
    }

    async fn handle_message(&self, message: &str) -> Result<Option<String>> {
        let msg: JsonRpcMessage = serde_json::from_str(message)?;

        match msg.method.as_deref() {
            Some("initialize") => {
                let result = InitializeResult {
                    protocol_version: "2024-11-05".to_string(),
                    capabilities: ServerCapabilities {
                        tools: Some(json!({})),
                    },
                    server_info: ServerInfo {
                        name: "codectx".to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                };

                let response = json!({
                    "jsonrpc": "2.0",
                    "id": msg.id,
                    "result": result
                });
                Ok(Some(serde_json::to_string(&response)?))
            }

            Some("tools/list") => {
                let tools = self.list_tools();
                let response = json!({
                    "jsonrpc": "2.0",
                    "id": msg.id,
                    "result": { "tools": tools }
                });
                Ok(Some(serde_json::to_string(&response)?))
            }

            Some("tools/call") => {
                if let Some(params) = &msg.params {
                    let result = self.call_tool(params).await?;
                    let response = json!({
                        "jsonrpc": "2.0",
                        "id": msg.id,
                        "result": result
                    });
                    Ok(Some(serde_json::to_string(&response)?))
                } else {
                    let error = json!({
                        "jsonrpc": "2.0",
                        "id": msg.id,
                        "error": {
                            "code": -32602,
                            "message": "Invalid params"
                        }
                    });
                    Ok(Some(serde_json::to_string(&error)?))
                }
            }

            Some("shutdown") => {
                info!("Received shutdown request");
                let response = json!({
                    "jsonrpc": "2.0",
                    "id": msg.id,
                    "result": null
                });
                Ok(Some(serde_json::to_string(&response)?))
            }

            _ => {
                let error = json!({
                    "jsonrpc": "2.0",
                    "id": msg.id,
                    "error": {
                        "code": -32601,
                        "message": "Method not found"
                    }
                });
                Ok(Some(serde_json::to_string(&error)?))
            }
        }
    }

    fn list_tools(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: "index_project".to_string(),
                description: "Run a full indexing pass over the project".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "rebuild": {
                            "type": "boolean",
                            "default": false,
                            "description": "Clear existing index data first"
                        }
                    }
                }),
            },
            Tool {
                name: "search_semantic".to_string(),
                description: "Semantic search over indexed project content".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Natural-language query" },
                        "threshold": {
                            "type": "number",
                            "description": "Similarity floor in [0, 1]"
                        },
                        "limit": { "type": "integer", "default": 10 },
                        "kind": {
                            "type": "string",
                            "description": "Filter by element kind (function, class, heading, ...)"
                        },
                        "language": { "type": "string" },
                        "path_prefix": { "type": "string" }
                    },
                    "required": ["query"]
                }),
            },
            Tool {
                name: "search_structural".to_string(),
                description: "Search elements by name pattern and metadata filters".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "pattern": {
                            "type": "string",
                            "description": "Substring, or glob when it contains * or ?"
                        },
                        "kind": { "type": "string" },
                        "language": { "type": "string" },
                        "file": { "type": "string", "description": "File path prefix" },
                        "limit": { "type": "integer", "default": 25 }
                    },
                    "required": ["pattern"]
                }),
            },
            Tool {
                name: "get_context_for_file".to_string(),
                description: "Elements of a file plus its importers and importees".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "file_path": { "type": "string" },
                        "radius": { "type": "integer", "default": 1 }
                    },
                    "required": ["file_path"]
                }),
            },
            Tool {
                name: "get_project_structure".to_string(),
                description: "Directory tree with per-file element counts".to_string(),
                input_schema: json!({ "type": "object", "properties": {} }),
            },
            Tool {
                name: "get_dependencies".to_string(),
                description: "Import/export edges and dependency manifest files".to_string(),
                input_schema: json!({ "type": "object", "properties": {} }),
            },
            Tool {
                name: "clean".to_string(),
                description: "Remove persisted index state for the project".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "dry_run": { "type": "boolean", "default": true }
                    }
                }),
            },
            Tool {
                name: "stats".to_string(),
                description: "Index statistics".to_string(),
                input_schema: json!({ "type": "object", "properties": {} }),
            },
        ]
    }

    async fn call_tool(&self, params: &Value) -> Result<Value> {
        let tool_name = params["name"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing tool name"))?;
        let empty = serde_json::Map::new();
        let args = params["arguments"].as_object().unwrap_or(&empty);
        let args: std::collections::HashMap<String, Value> =
            args.clone().into_iter().collect();

        match tool_name {
            "index_project" => tools::index_project(&self.coordinator, &args).await,
            "search_semantic" => tools::search_semantic(&self.engine, &args).await,
            "search_structural" => tools::search_structural(&self.engine, &args).await,
            "get_context_for_file" => tools::get_context_for_file(&self.engine, &args).await,
            "get_project_structure" => tools::get_project_structure(&self.engine).await,
            "get_dependencies" => tools::get_dependencies(&self.engine).await,
            "clean" => tools::clean(&self.coordinator, &args).await,
            "stats" => tools::stats(&self.engine).await,
            _ => Err(anyhow::anyhow!("Unknown tool: {}", tool_name)),
        }
    }
}
