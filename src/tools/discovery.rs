//! Lazy-loading discovery pair: `search_tools` and `load_tools`.
//!
//! With lazy loading on, the model starts with the base subset and uses
//! these two to find and pull in anything else.  `load_tools` returns the
//! full definitions under `metadata.loaded_tools`; the agent loop merges
//! them into the live toolset before the next LLM call.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::registry::ToolRegistry;
use super::traits::{Tool, ToolContext, ToolResult};

// ─── SearchToolsTool ─────────────────────────────────────────────────────────

pub struct SearchToolsTool {
    registry: Arc<ToolRegistry>,
}

impl SearchToolsTool {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for SearchToolsTool {
    fn name(&self) -> &str {
        "search_tools"
    }

    fn description(&self) -> &str {
        "Search available tools by name or description. Use to discover what tools are available."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query":  { "type": "string", "description": "Search query (matches name or description)" },
                "source": { "type": "string", "enum": ["all", "builtin", "mcp", "skill"], "description": "Filter by source" },
                "limit":  { "type": "integer", "description": "Max results (default 10)" }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
        let query = args.get("query").and_then(Value::as_str).unwrap_or("");
        let source = args.get("source").and_then(Value::as_str).unwrap_or("all");
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;

        let (results, total) = self.registry.search(query, source, limit).await;

        if results.is_empty() {
            return Ok(ToolResult::ok(format!(
                "No tools found for '{query}'. Total available: {total}"
            )));
        }

        let mut lines = vec![format!("## Found {} tools (of {total} total)\n", results.len())];
        for tool in &results {
            let source_tag = if tool.source == "builtin" {
                String::new()
            } else {
                format!(" [{}]", tool.source)
            };
            lines.push(format!("• **{}**{source_tag}", tool.name));
            let mut desc: String = tool.description.chars().take(100).collect();
            if desc.is_empty() {
                desc = "No description".to_owned();
            }
            lines.push(format!("  {desc}"));
            if tool.score > 0 {
                lines.push(format!("  _relevance: {}_", tool.score));
            }
            lines.push(String::new());
        }
        lines.push("\n💡 Use `load_tools` to add these to your current session.".to_owned());

        Ok(ToolResult::ok(lines.join("\n")))
    }
}

// ─── LoadToolsTool ───────────────────────────────────────────────────────────

pub struct LoadToolsTool {
    registry: Arc<ToolRegistry>,
}

impl LoadToolsTool {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for LoadToolsTool {
    fn name(&self) -> &str {
        "load_tools"
    }

    fn description(&self) -> &str {
        "Load additional tools by name into the current session. Use after search_tools."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "names": {
                    "description": "Tool names to load (array or comma-separated string)",
                    "anyOf": [
                        { "type": "array", "items": { "type": "string" } },
                        { "type": "string" }
                    ]
                }
            },
            "required": ["names"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
        let names: Vec<String> = match args.get("names") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(|n| n.trim().to_owned())
                .filter(|n| !n.is_empty())
                .collect(),
            _ => Vec::new(),
        };

        if names.is_empty() {
            return Ok(ToolResult::err("Provide tool names to load"));
        }

        let (loaded, not_found) = self.registry.load(&names).await;

        if loaded.is_empty() {
            return Ok(ToolResult::err(format!(
                "No tools loaded. Not found: {}",
                not_found.join(", ")
            )));
        }

        let loaded_names: Vec<&str> = loaded.iter().map(|d| d.name.as_str()).collect();
        let mut output = format!("✅ Loaded {} tools: {}", loaded.len(), loaded_names.join(", "));
        if !not_found.is_empty() {
            output.push_str(&format!("\n⚠️ Not found: {}", not_found.join(", ")));
        }

        // Spell out each schema so the model sees required parameters
        // even before the definitions reach its tools array.
        for def in &loaded {
            output.push_str(&format!("\n\n📋 **{}**", def.name));
            let desc: String = def.description.chars().take(200).collect();
            output.push_str(&format!("\n  {desc}"));

            let required: Vec<&str> = def
                .parameters
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            if let Some(props) = def.parameters.get("properties").and_then(Value::as_object) {
                if !props.is_empty() {
                    output.push_str("\n  Parameters:");
                    for (pname, pdef) in props {
                        let ptype = pdef.get("type").and_then(Value::as_str).unwrap_or("any");
                        let pdesc: String = pdef
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .chars()
                            .take(80)
                            .collect();
                        let req = if required.contains(&pname.as_str()) {
                            " ⚠️REQUIRED"
                        } else {
                            ""
                        };
                        output.push_str(&format!("\n    • {pname} ({ptype}){req}: {pdesc}"));
                    }
                }
            }
        }

        let payload: Vec<Value> = loaded.iter().map(|d| d.to_openai()).collect();
        Ok(ToolResult::ok(output).with_metadata(json!({ "loaded_tools": payload })))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mcp::{McpBridge, McpRegistry};
    use crate::skills::SkillsClient;

    struct FetchPageStub;

    #[async_trait]
    impl Tool for FetchPageStub {
        fn name(&self) -> &str {
            "fetch_page"
        }
        fn description(&self) -> &str {
            "Fetch and parse URL content as markdown."
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "URL to fetch" }
                },
                "required": ["url"]
            })
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            Ok(ToolResult::ok(""))
        }
    }

    fn registry() -> (Arc<ToolRegistry>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mcp = Arc::new(McpRegistry::load(
            McpBridge::new(1, 1),
            dir.path().join("servers.json"),
            dir.path().join("cache.json"),
        ));
        let registry = Arc::new(ToolRegistry::new(
            mcp,
            Arc::new(SkillsClient::new("")),
            dir.path().join("tools_config.json"),
            60,
        ));
        registry.register(Arc::new(FetchPageStub), "builtin");
        (registry, dir)
    }

    fn ctx() -> ToolContext {
        ToolContext::new("/tmp", 1, 1)
    }

    #[tokio::test]
    async fn search_renders_hits_with_hint() {
        let (registry, _dir) = registry();
        let tool = SearchToolsTool::new(registry);

        let result = tool
            .execute(json!({"query": "fetch"}), &ctx())
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("**fetch_page**"));
        assert!(result.output.contains("load_tools"));
    }

    #[tokio::test]
    async fn search_miss_reports_total() {
        let (registry, _dir) = registry();
        let tool = SearchToolsTool::new(registry);
        let result = tool
            .execute(json!({"query": "quantum"}), &ctx())
            .await
            .unwrap();
        assert!(result.output.contains("No tools found"));
        assert!(result.output.contains("Total available: 1"));
    }

    #[tokio::test]
    async fn load_returns_definitions_in_metadata() {
        let (registry, _dir) = registry();
        let tool = LoadToolsTool::new(registry);

        let result = tool
            .execute(json!({"names": ["fetch_page", "ghost"]}), &ctx())
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("✅ Loaded 1 tools: fetch_page"));
        assert!(result.output.contains("Not found: ghost"));
        assert!(result.output.contains("⚠️REQUIRED"));

        let loaded = result.metadata.unwrap()["loaded_tools"].clone();
        let defs = loaded.as_array().unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0]["function"]["name"], "fetch_page");
    }

    #[tokio::test]
    async fn load_accepts_comma_string() {
        let (registry, _dir) = registry();
        let tool = LoadToolsTool::new(registry);
        let result = tool
            .execute(json!({"names": "fetch_page, fetch_page"}), &ctx())
            .await
            .unwrap();
        assert!(result.success);
        // Deduplicated.
        let loaded = result.metadata.unwrap()["loaded_tools"].clone();
        assert_eq!(loaded.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn load_without_names_is_an_error() {
        let (registry, _dir) = registry();
        let tool = LoadToolsTool::new(registry);
        let result = tool.execute(json!({}), &ctx()).await.unwrap();
        assert!(!result.success);
    }
}
