//! MCP capability descriptors and call payloads.
//!
//! These mirror the wire shapes exchanged with upstream servers
//! (`inputSchema`, `mimeType` and friends are camelCase on the wire) plus a
//! few derived views the proxy needs: the flattened parameter list of a tool
//! and the plain-text rendering of a call result.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// MCP protocol revision spoken to upstreams and advertised downstream.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// A single declared parameter of a tool, projected from its input schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParam {
    /// Parameter name
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// JSON-schema type tag (`string`, `number`, `boolean`, `object`, ...)
    #[serde(rename = "type", default = "default_type_tag")]
    pub type_tag: String,
    /// Whether the schema lists the parameter as required
    #[serde(default)]
    pub required: bool,
}

fn default_type_tag() -> String {
    "string".to_owned()
}

/// Tool advertised by an upstream server.
///
/// The parameter list is not part of the wire shape; it is projected from
/// `properties` / `required` of the input schema on first access and cached
/// for the lifetime of the descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Bare tool name (no server prefix)
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// Recursive JSON-schema-like object describing the arguments
    #[serde(rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(skip)]
    params: OnceLock<Vec<ToolParam>>,
}

impl ToolDescriptor {
    /// Create a descriptor from its wire fields.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Option<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            params: OnceLock::new(),
        }
    }

    /// The declared parameters, projected from the input schema on first
    /// access and cached.
    pub fn params(&self) -> &[ToolParam] {
        self.params
            .get_or_init(|| project_params(self.input_schema.as_ref()))
    }

    /// Copy of this descriptor with the name replaced (used for
    /// `server::name` aggregated identifiers).
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
            params: OnceLock::new(),
        }
    }
}

/// Project `properties` / `required` out of a JSON-schema object.
fn project_params(schema: Option<&Value>) -> Vec<ToolParam> {
    let Some(schema) = schema else {
        return Vec::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    props
        .iter()
        .map(|(name, prop)| ToolParam {
            name: name.clone(),
            description: prop
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            type_tag: prop
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("string")
                .to_owned(),
            required: required.contains(&name.as_str()),
        })
        .collect()
}

/// A declared argument of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// Type tag; prompts rarely declare one, so it defaults to `string`
    #[serde(rename = "type", default = "default_type_tag")]
    pub type_tag: String,
    /// Whether the argument is required
    #[serde(default)]
    pub required: bool,
}

/// Prompt advertised by an upstream server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptDescriptor {
    /// Bare prompt name
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// Ordered argument declarations
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

impl PromptDescriptor {
    /// Copy with the name replaced (aggregated identifier).
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// Resource advertised by an upstream server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource URI
    pub uri: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// MIME type
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
}

impl ResourceDescriptor {
    /// Copy with the URI replaced (aggregated identifier).
    pub fn with_uri(&self, uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..self.clone()
        }
    }
}

/// One item of a tool result's `content` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolContent {
    /// Content kind; the proxy flattens `text` items and passes the rest
    /// through untouched in the structured result
    #[serde(rename = "type")]
    pub kind: String,
    /// Text payload (empty for non-text items)
    #[serde(default)]
    pub text: String,
}

impl ToolContent {
    /// Build a plain text content item.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_owned(),
            text: text.into(),
        }
    }
}

/// Decoded result of a `tools/call`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Content items
    #[serde(default)]
    pub content: Vec<ToolContent>,
    /// Whether the upstream flagged the result as an error
    #[serde(rename = "isError", default)]
    pub is_error: bool,
    /// Current page, when the upstream paginates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    /// Total page count, when the upstream paginates
    #[serde(rename = "totalPages", skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
    /// Continuation token for the next page
    #[serde(rename = "nextPageToken", skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl ToolCallResult {
    /// Concatenate the text of every content item, separated by a blank
    /// line.
    pub fn flatten_text(&self) -> String {
        self.content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Pagination footer for plain-text consumers, when the upstream
    /// supplied pagination metadata.
    pub fn pagination_footer(&self) -> Option<String> {
        let total = self.total_pages?;
        let left = total.saturating_sub(self.page.unwrap_or(0));
        Some(match &self.next_page_token {
            Some(token) => format!("Pages left: {left} (next_page_token: {token})"),
            None => format!("Pages left: {left}"),
        })
    }
}

/// One message of a prompt result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Message role (`user`, `assistant`, ...)
    pub role: String,
    /// Message content, passed through as-is
    pub content: Value,
}

impl PromptMessage {
    /// Build a user-role text message.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_owned(),
            content: serde_json::json!({"type": "text", "text": text.into()}),
        }
    }
}

/// Decoded result of a `prompts/get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetPromptResult {
    /// Prompt description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Rendered messages
    #[serde(default)]
    pub messages: Vec<PromptMessage>,
}

/// One blob of a `resources/read` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceContents {
    /// Resource URI
    pub uri: String,
    /// MIME type
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Textual payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64 payload for binary resources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}
