//! Skill management tools, backed by the external skills service.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::skills::SkillsClient;

use super::traits::{Tool, ToolContext, ToolResult};

// ─── InstallSkillTool ────────────────────────────────────────────────────────

pub struct InstallSkillTool {
    skills: Arc<SkillsClient>,
}

impl InstallSkillTool {
    pub fn new(skills: Arc<SkillsClient>) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl Tool for InstallSkillTool {
    fn name(&self) -> &str {
        "install_skill"
    }

    fn description(&self) -> &str {
        "Install a skill from the skills repository. Skills add capabilities \
         like creating presentations, documents, etc."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name":   { "type": "string", "description": "Skill name (e.g. 'pptx', 'docx', 'xlsx')" },
                "source": { "type": "string", "enum": ["anthropic", "url"], "description": "Source: 'anthropic' for official skills, 'url' for custom" }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_lowercase)
            .unwrap_or_default();
        if name.is_empty() {
            return Ok(ToolResult::err("Skill name required"));
        }
        let source = args
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("anthropic");

        match self.skills.install(&name, source).await {
            Ok(data) => {
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Installed");
                let path = data.get("path").and_then(Value::as_str).unwrap_or("");
                Ok(ToolResult::ok(format!("✅ {message}\nPath: {path}")))
            }
            Err(e) => Ok(ToolResult::err(format!("Failed to install skill: {e}"))),
        }
    }
}

// ─── ListSkillsTool ──────────────────────────────────────────────────────────

pub struct ListSkillsTool {
    skills: Arc<SkillsClient>,
}

impl ListSkillsTool {
    pub fn new(skills: Arc<SkillsClient>) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl Tool for ListSkillsTool {
    fn name(&self) -> &str {
        "list_skills"
    }

    fn description(&self) -> &str {
        "List available and installed skills."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "installed_only": { "type": "boolean", "description": "Show only installed skills" }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
        let installed_only = args
            .get("installed_only")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let (installed_data, available_data) = match self.skills.list().await {
            Ok(pair) => pair,
            Err(e) => return Ok(ToolResult::err(format!("Failed to list skills: {e}"))),
        };

        let mut lines = vec!["## Skills\n".to_owned()];

        if !installed_only {
            lines.push("### Available for Installation".to_owned());
            for skill in available_data
                .get("available")
                .and_then(Value::as_array)
                .unwrap_or(&Vec::new())
            {
                let name = skill.get("name").and_then(Value::as_str).unwrap_or("?");
                let desc: String = skill
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .chars()
                    .take(50)
                    .collect();
                let status = if skill
                    .get("installed")
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
                {
                    "✅ installed"
                } else {
                    "📦 available"
                };
                lines.push(format!("- `{name}` — {desc} ({status})"));
            }
            lines.push(String::new());
        }

        lines.push("### Installed Skills".to_owned());
        let installed = installed_data
            .get("skills")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if installed.is_empty() {
            lines.push("No skills installed yet. Use `install_skill` to add some!".to_owned());
        } else {
            for skill in &installed {
                let name = skill.get("name").and_then(Value::as_str).unwrap_or("?");
                let desc: String = skill
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .chars()
                    .take(40)
                    .collect();
                let path = skill.get("path").and_then(Value::as_str).unwrap_or("");
                lines.push(format!("- `{name}` — {desc} (`{path}`)"));
            }
        }

        Ok(ToolResult::ok(lines.join("\n")))
    }
}
