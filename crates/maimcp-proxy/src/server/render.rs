//! Catalog renderings for the REST facade.
//!
//! The same aggregated catalog is offered plain, simple (one line per
//! tool), quiet (grouped by heuristic category with cleaned descriptions),
//! and as markdown. Descriptions may embed `<think>...</think>` segments;
//! the quiet renderer strips them and keeps the content as a separate
//! *WhenToUse* hint.

use maimcp_protocol::{ResourceDescriptor, ToolDescriptor};
use std::collections::BTreeMap;

use crate::registry::SEPARATOR;

/// Remove `<think>...</think>` segments from a description. Returns the
/// cleaned description and the stripped content, when any.
pub fn strip_think(description: &str) -> (String, Option<String>) {
    let mut clean = String::new();
    let mut hints = Vec::new();
    let mut rest = description;
    loop {
        match rest.split_once("<think>") {
            None => {
                clean.push_str(rest);
                break;
            }
            Some((before, after)) => {
                clean.push_str(before);
                match after.split_once("</think>") {
                    Some((inner, tail)) => {
                        let inner = inner.trim();
                        if !inner.is_empty() {
                            hints.push(inner.to_owned());
                        }
                        rest = tail;
                    }
                    None => break, // unterminated tag: drop the remainder
                }
            }
        }
    }
    let clean = clean.split_whitespace().collect::<Vec<_>>().join(" ");
    let hint = if hints.is_empty() {
        None
    } else {
        Some(hints.join(" "))
    };
    (clean, hint)
}

/// Heuristic category for the quiet listing, keyed off keywords in the
/// tool's name and description.
pub fn categorize(name: &str, description: &str) -> &'static str {
    let haystack = format!("{name} {description}").to_lowercase();
    let any = |words: &[&str]| words.iter().any(|w| haystack.contains(w));
    if any(&["edit", "write", "replace", "insert", "patch", "rename"]) {
        "Editing"
    } else if any(&["file", "read", "open", "directory", "path", "list"]) {
        "File"
    } else if any(&["meta", "info", "status", "version", "describe"]) {
        "Metadata"
    } else if any(&["analy", "search", "grep", "find", "query", "scan"]) {
        "Analysis"
    } else if any(&["inspect", "view", "show", "dump", "debug", "trace"]) {
        "Inspection"
    } else {
        "Other"
    }
}

/// Full plain-text listing: every tool with description and parameters.
pub fn render_plain(tools: &[ToolDescriptor]) -> String {
    let mut out = String::new();
    for tool in tools {
        out.push_str(&tool.name);
        if !tool.description.is_empty() {
            out.push_str(" - ");
            out.push_str(&tool.description);
        }
        out.push('\n');
        for param in tool.params() {
            let req = if param.required { ", required" } else { "" };
            out.push_str(&format!("  {} ({}{req})", param.name, param.type_tag));
            if !param.description.is_empty() {
                out.push_str(": ");
                out.push_str(&param.description);
            }
            out.push('\n');
        }
    }
    out
}

/// One line per tool: name and the first line of the description.
pub fn render_simple(tools: &[ToolDescriptor]) -> String {
    let mut out = String::new();
    for tool in tools {
        out.push_str(&tool.name);
        if let Some(first) = tool.description.lines().next() {
            if !first.is_empty() {
                out.push_str(": ");
                out.push_str(first);
            }
        }
        out.push('\n');
    }
    out
}

/// Grouped listing with cleaned descriptions and WhenToUse hints.
pub fn render_quiet(tools: &[ToolDescriptor]) -> String {
    let mut groups: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    for tool in tools {
        let (clean, hint) = strip_think(&tool.description);
        let mut line = format!("  {}", tool.name);
        if !clean.is_empty() {
            line.push_str(" - ");
            line.push_str(&clean);
        }
        if let Some(hint) = hint {
            line.push_str(&format!(" (WhenToUse: {hint})"));
        }
        groups
            .entry(categorize(&tool.name, &clean))
            .or_default()
            .push(line);
    }
    let mut out = String::new();
    for (category, lines) in groups {
        out.push_str(category);
        out.push_str(":\n");
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// Markdown listing, one section per upstream.
pub fn render_markdown(tools: &[ToolDescriptor]) -> String {
    let mut by_server: BTreeMap<&str, Vec<&ToolDescriptor>> = BTreeMap::new();
    for tool in tools {
        let server = tool
            .name
            .split_once(SEPARATOR)
            .map(|(s, _)| s)
            .unwrap_or("");
        by_server.entry(server).or_default().push(tool);
    }
    let mut out = String::from("# Tools\n");
    for (server, tools) in by_server {
        out.push_str(&format!("\n## {server}\n\n"));
        for tool in tools {
            let bare = tool
                .name
                .split_once(SEPARATOR)
                .map(|(_, n)| n)
                .unwrap_or(&tool.name);
            out.push_str(&format!("- **{bare}**"));
            if !tool.description.is_empty() {
                out.push_str(": ");
                out.push_str(tool.description.lines().next().unwrap_or(""));
            }
            out.push('\n');
            for param in tool.params() {
                let req = if param.required { " (required)" } else { "" };
                out.push_str(&format!("  - `{}`{req}\n", param.name));
            }
        }
    }
    out
}

/// Plain-text resource listing.
pub fn render_resources(resources: &[ResourceDescriptor]) -> String {
    let mut out = String::new();
    for resource in resources {
        out.push_str(&resource.uri);
        if !resource.mime_type.is_empty() {
            out.push_str(&format!(" ({})", resource.mime_type));
        }
        if !resource.name.is_empty() {
            out.push_str(" - ");
            out.push_str(&resource.name);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn strip_think_extracts_hint() {
        let (clean, hint) =
            strip_think("Reads a file. <think>Use when the path is known.</think> Fast.");
        assert_eq!(clean, "Reads a file. Fast.");
        assert_eq!(hint.unwrap(), "Use when the path is known.");
    }

    #[test]
    fn strip_think_without_tag_is_identity() {
        let (clean, hint) = strip_think("plain text");
        assert_eq!(clean, "plain text");
        assert_eq!(hint, None);
    }

    #[test]
    fn strip_think_unterminated_drops_tail() {
        let (clean, hint) = strip_think("visible <think>never closed");
        assert_eq!(clean, "visible");
        assert_eq!(hint, None);
    }

    #[test]
    fn categories() {
        assert_eq!(categorize("replace_text", ""), "Editing");
        assert_eq!(categorize("read_file", ""), "File");
        assert_eq!(categorize("server_info", ""), "Metadata");
        assert_eq!(categorize("grep", "search in sources"), "Analysis");
        assert_eq!(categorize("dump_state", ""), "Inspection");
        assert_eq!(categorize("frobnicate", ""), "Other");
    }

    #[test]
    fn plain_listing_includes_params() {
        let tool = ToolDescriptor::new(
            "files::read",
            "Read a file",
            Some(json!({
                "type": "object",
                "properties": {"path": {"type": "string", "description": "target"}},
                "required": ["path"]
            })),
        );
        let out = render_plain(&[tool]);
        assert!(out.contains("files::read - Read a file"));
        assert!(out.contains("  path (string, required): target"));
    }

    #[test]
    fn quiet_listing_groups_by_category() {
        let tools = vec![
            ToolDescriptor::new("files::read_file", "Reads files", None),
            ToolDescriptor::new("edit::patch", "Applies an edit", None),
        ];
        let out = render_quiet(&tools);
        let editing = out.find("Editing:").unwrap();
        let file = out.find("File:").unwrap();
        assert!(editing < file);
        assert!(out.contains("  edit::patch - Applies an edit"));
    }

    #[test]
    fn markdown_groups_by_server() {
        let tools = vec![
            ToolDescriptor::new("a::x", "first", None),
            ToolDescriptor::new("b::y", "second", None),
        ];
        let out = render_markdown(&tools);
        assert!(out.contains("## a"));
        assert!(out.contains("- **x**: first"));
        assert!(out.contains("## b"));
    }
}
