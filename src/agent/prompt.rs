//! System prompt composition and response cleanup.

use std::path::Path;

use chrono::Utc;

use crate::ai::{ChatMessage, MessageRole};

/// Used when no template file is deployed.
const FALLBACK_TEMPLATE: &str = "\
You are a helpful AI assistant with access to a Linux environment.

You can:
- Execute shell commands
- Read, write, edit, delete files
- Search the web
- Manage reminders and tasks

Working directory: {{cwd}}
Date: {{date}}

Available tools:
{{tools}}

Your reserved ports: {{userPorts}}
{{skills}}

Always be helpful and concise. Think step by step when solving complex problems.
";

/// Load the system prompt template, falling back to the built-in one.
pub fn load_template(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(template) => template,
        Err(_) => {
            log::debug!("prompt: no template at '{}', using fallback", path.display());
            FALLBACK_TEMPLATE.to_owned()
        }
    }
}

/// Deterministic per-user port range: ten ports starting at
/// `4010 + (user_id mod 1000)`.
pub fn user_ports(user_id: i64) -> String {
    let base = 4010 + user_id.rem_euclid(1000);
    format!("{base}-{}", base + 9)
}

/// Substitute the template placeholders.
pub fn render_system_prompt(
    template: &str,
    cwd: &Path,
    tools_list: &str,
    user_ports: &str,
    skills: &str,
) -> String {
    template
        .replace("{{cwd}}", &cwd.display().to_string())
        .replace("{{date}}", &Utc::now().format("%Y-%m-%d %H:%M").to_string())
        .replace("{{tools}}", tools_list)
        .replace("{{userPorts}}", user_ports)
        .replace("{{skills}}", skills)
}

/// Per-turn footer appended after the template.
pub fn turn_footer(username: &str, user_id: i64, cwd: &Path, source: &str) -> String {
    format!(
        "\nUser: @{username} (id={user_id})\nWorkspace: {}\nTime: {}\nSource: {source}",
        cwd.display(),
        Utc::now().format("%Y-%m-%d %H:%M"),
    )
}

/// Strip LLM artifacts: `<thinking>` blocks and stray wrapper tags.
pub fn clean_response(text: &str) -> String {
    let without_thinking = regex::RegexBuilder::new(r"<thinking>[\s\S]*?</thinking>")
        .case_insensitive(true)
        .build()
        .map(|re| re.replace_all(text, "").into_owned())
        .unwrap_or_else(|_| text.to_owned());

    let without_tags =
        regex::RegexBuilder::new(r"</?(final|response|answer|output|reply|thinking)>")
            .case_insensitive(true)
            .build()
            .map(|re| re.replace_all(&without_thinking, "").into_owned())
            .unwrap_or(without_thinking);

    without_tags.trim().to_owned()
}

/// Drop oldest non-system messages until both caps hold.
///
/// The system head (when present) always survives, as does the final
/// message - usually the inbound user turn.
pub fn trim_messages(
    mut messages: Vec<ChatMessage>,
    max_messages: usize,
    max_chars: usize,
) -> Vec<ChatMessage> {
    let head = if messages.first().map(|m| m.role) == Some(MessageRole::System) {
        Some(messages.remove(0))
    } else {
        None
    };

    while messages.len() > 1
        && (messages.len() > max_messages || total_chars(&head, &messages) > max_chars)
    {
        messages.remove(0);
    }

    if let Some(system) = head {
        messages.insert(0, system);
    }
    messages
}

fn total_chars(head: &Option<ChatMessage>, tail: &[ChatMessage]) -> usize {
    head.as_ref().map(ChatMessage::size_chars).unwrap_or(0)
        + tail.iter().map(ChatMessage::size_chars).sum::<usize>()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_substituted() {
        let rendered = render_system_prompt(
            "cwd={{cwd}} tools:\n{{tools}} ports={{userPorts}}{{skills}}",
            Path::new("/workspace/7"),
            "- read_file: Read file contents.",
            "4017-4026",
            "\n\nSkills: pptx",
        );
        assert!(rendered.contains("cwd=/workspace/7"));
        assert!(rendered.contains("- read_file"));
        assert!(rendered.contains("ports=4017-4026"));
        assert!(rendered.contains("Skills: pptx"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn user_ports_are_deterministic() {
        assert_eq!(user_ports(7), "4017-4026");
        assert_eq!(user_ports(1007), "4017-4026");
        assert_eq!(user_ports(0), "4010-4019");
        // Negative ids still land in range.
        assert_eq!(user_ports(-1), "5009-5018");
    }

    #[test]
    fn clean_response_strips_artifacts() {
        let raw = "<thinking>let me think\nmore thoughts</thinking><final>The answer is 4.</final>";
        assert_eq!(clean_response(raw), "The answer is 4.");

        assert_eq!(clean_response("<response>plain</response>"), "plain");
        assert_eq!(clean_response("  already clean  "), "already clean");
    }

    #[test]
    fn trim_preserves_system_head_and_last_message() {
        let mut messages = vec![ChatMessage::system("sys")];
        for i in 0..10 {
            messages.push(ChatMessage::user(format!("msg {i}")));
        }

        let trimmed = trim_messages(messages, 3, usize::MAX);
        assert_eq!(trimmed.len(), 4); // system + 3
        assert_eq!(trimmed[0].role, MessageRole::System);
        assert_eq!(trimmed.last().unwrap().content.as_deref(), Some("msg 9"));
    }

    #[test]
    fn trim_enforces_char_cap() {
        let mut messages = vec![ChatMessage::system("s")];
        for _ in 0..5 {
            messages.push(ChatMessage::user("x".repeat(200)));
        }

        let trimmed = trim_messages(messages, 100, 500);
        // Oldest user messages dropped; the final one always kept.
        assert!(trimmed.len() < 6);
        assert_eq!(trimmed[0].role, MessageRole::System);
    }

    #[test]
    fn trim_without_system_head() {
        let messages: Vec<ChatMessage> =
            (0..6).map(|i| ChatMessage::user(format!("m{i}"))).collect();
        let trimmed = trim_messages(messages, 2, usize::MAX);
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed[1].content.as_deref(), Some("m5"));
    }
}
