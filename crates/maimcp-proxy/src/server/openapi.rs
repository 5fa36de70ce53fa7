//! OpenAPI 3.1 synthesis from the aggregated catalog: one path per tool.

use maimcp_protocol::ToolDescriptor;
use serde_json::{json, Map, Value};

use crate::registry::SEPARATOR;

/// Build an OpenAPI 3.1 document for the current catalog.
pub fn openapi_document(tools: &[ToolDescriptor]) -> Value {
    let mut paths = Map::new();
    for tool in tools {
        let (server, bare) = tool
            .name
            .split_once(SEPARATOR)
            .unwrap_or(("", tool.name.as_str()));
        let path = if server.is_empty() {
            format!("/call/{bare}")
        } else {
            format!("/call/{server}/{bare}")
        };
        let schema = tool
            .input_schema
            .clone()
            .unwrap_or_else(|| json!({"type": "object"}));
        paths.insert(
            path,
            json!({
                "post": {
                    "operationId": tool.name.replace(SEPARATOR, "_"),
                    "summary": tool.description,
                    "requestBody": {
                        "required": false,
                        "content": {
                            "application/json": {"schema": schema}
                        }
                    },
                    "responses": {
                        "200": {
                            "description": "Flattened tool output",
                            "content": {"text/plain": {}}
                        },
                        "400": {"description": "Bad arguments or denied by policy"},
                        "404": {"description": "Unknown server or tool"},
                        "500": {"description": "Upstream transport failure"}
                    }
                }
            }),
        );
    }

    json!({
        "openapi": "3.1.0",
        "info": {
            "title": "maimcp-proxy",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Aggregated MCP tool catalog"
        },
        "paths": paths
    })
}
