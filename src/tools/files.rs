//! Workspace file tools: read, write, edit, delete, glob search, text
//! search, directory listing.
//!
//! Every path argument is normalized against the session's working
//! directory; escaping the per-user workspace is an error.  All file IO
//! goes through `spawn_blocking` so large files never stall the runtime.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Value, json};

use super::traits::{Tool, ToolContext, ToolResult};

/// Maximum matches returned by the search tools.
const MAX_SEARCH_RESULTS: usize = 200;

// ─── Path normalization ──────────────────────────────────────────────────────

/// Resolve `raw` against `cwd` and verify it stays inside the workspace.
///
/// The check is lexical (`..` components are folded before comparison) so
/// it works for paths that do not exist yet.
pub fn normalize_path(raw: &str, cwd: &Path) -> Result<PathBuf, String> {
    let candidate = Path::new(raw);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        cwd.join(candidate)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err("Access denied: path escapes workspace".to_owned());
                }
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }

    if !normalized.starts_with(cwd) {
        return Err("Access denied: path outside your workspace".to_owned());
    }
    Ok(normalized)
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing required argument '{key}'"))
}

// ─── ReadFileTool ────────────────────────────────────────────────────────────

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read file contents. Always read before editing."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path":   { "type": "string", "description": "Path to file" },
                "offset": { "type": "integer", "description": "Starting line (1-based)" },
                "limit":  { "type": "integer", "description": "Number of lines" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let path = normalize_path(required_str(&args, "path")?, &ctx.cwd)?;
        let offset = args.get("offset").and_then(Value::as_u64).map(|n| n as usize);
        let limit = args.get("limit").and_then(Value::as_u64).map(|n| n as usize);

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;

        let output = match (offset, limit) {
            (None, None) => contents,
            (offset, limit) => {
                let skip = offset.unwrap_or(1).saturating_sub(1);
                let take = limit.unwrap_or(usize::MAX);
                contents
                    .lines()
                    .skip(skip)
                    .take(take)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };

        Ok(ToolResult::ok(output))
    }
}

// ─── WriteFileTool ───────────────────────────────────────────────────────────

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to file. Creates if doesn't exist."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path":    { "type": "string", "description": "Path to file" },
                "content": { "type": "string", "description": "Content to write" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let path = normalize_path(required_str(&args, "path")?, &ctx.cwd)?;
        let content = required_str(&args, "content")?.to_owned();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("failed to create parent dirs: {e}"))?;
        }

        let bytes = content.len();
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| format!("failed to write '{}': {e}", path.display()))?;

        Ok(ToolResult::ok(format!("Wrote {bytes} bytes to {}", path.display())))
    }
}

// ─── EditFileTool ────────────────────────────────────────────────────────────

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit file by replacing text. old_text must match exactly."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path":     { "type": "string", "description": "Path to file" },
                "old_text": { "type": "string", "description": "Text to find" },
                "new_text": { "type": "string", "description": "Replacement text" }
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let path = normalize_path(required_str(&args, "path")?, &ctx.cwd)?;
        let old_text = required_str(&args, "old_text")?;
        let new_text = required_str(&args, "new_text")?;

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;

        let matches = contents.matches(old_text).count();
        if matches == 0 {
            return Err("old_text not found in file".to_owned());
        }
        if matches > 1 {
            return Err(format!(
                "old_text matches {matches} times; provide more context to make it unique"
            ));
        }

        let updated = contents.replacen(old_text, new_text, 1);
        tokio::fs::write(&path, updated)
            .await
            .map_err(|e| format!("failed to write '{}': {e}", path.display()))?;

        Ok(ToolResult::ok(format!("Edited {}", path.display())))
    }
}

// ─── DeleteFileTool ──────────────────────────────────────────────────────────

pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file within workspace."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to file" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let path = normalize_path(required_str(&args, "path")?, &ctx.cwd)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| format!("failed to delete '{}': {e}", path.display()))?;
        Ok(ToolResult::ok(format!("Deleted {}", path.display())))
    }
}

// ─── SearchFilesTool ─────────────────────────────────────────────────────────

pub struct SearchFilesTool;

/// Match one path segment against a glob segment (`*` and `?` only).
fn segment_matches(segment: &str, pattern: &str) -> bool {
    fn inner(s: &[u8], p: &[u8]) -> bool {
        match (p.first(), s.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                inner(s, &p[1..]) || (!s.is_empty() && inner(&s[1..], p))
            }
            (Some(b'?'), Some(_)) => inner(&s[1..], &p[1..]),
            (Some(pc), Some(sc)) if pc == sc => inner(&s[1..], &p[1..]),
            _ => false,
        }
    }
    inner(segment.as_bytes(), pattern.as_bytes())
}

/// Match a relative path against a glob with `**` directory wildcards.
fn glob_matches(rel: &str, pattern: &str) -> bool {
    fn inner(path: &[&str], pat: &[&str]) -> bool {
        match (pat.first(), path.first()) {
            (None, None) => true,
            (Some(&"**"), _) => {
                inner(path, &pat[1..]) || (!path.is_empty() && inner(&path[1..], pat))
            }
            (Some(p), Some(s)) if segment_matches(s, p) => inner(&path[1..], &pat[1..]),
            _ => false,
        }
    }
    let path: Vec<&str> = rel.split('/').collect();
    let pat: Vec<&str> = pattern.split('/').collect();
    inner(&path, &pat)
}

fn walk_files(root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search for files by glob pattern."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Glob pattern (e.g. **/*.py)" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let pattern = required_str(&args, "pattern")?.to_owned();
        let cwd = ctx.cwd.clone();

        let matches = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            walk_files(&cwd, &mut files);
            let mut matches: Vec<String> = files
                .into_iter()
                .filter_map(|p| {
                    p.strip_prefix(&cwd)
                        .ok()
                        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
                })
                .filter(|rel| glob_matches(rel, &pattern))
                .collect();
            matches.sort();
            matches.truncate(MAX_SEARCH_RESULTS);
            matches
        })
        .await
        .map_err(|e| format!("search task panicked: {e}"))?;

        if matches.is_empty() {
            Ok(ToolResult::ok("No files matched"))
        } else {
            Ok(ToolResult::ok(matches.join("\n")))
        }
    }
}

// ─── SearchTextTool ──────────────────────────────────────────────────────────

pub struct SearchTextTool;

#[async_trait]
impl Tool for SearchTextTool {
    fn name(&self) -> &str {
        "search_text"
    }

    fn description(&self) -> &str {
        "Search text in files using grep."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern":     { "type": "string", "description": "Text/regex to search" },
                "path":        { "type": "string", "description": "Directory to search" },
                "ignore_case": { "type": "boolean", "description": "Case insensitive" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let pattern = required_str(&args, "pattern")?;
        let ignore_case = args
            .get("ignore_case")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let root = match args.get("path").and_then(Value::as_str) {
            Some(p) => normalize_path(p, &ctx.cwd)?,
            None => ctx.cwd.clone(),
        };

        let regex = regex::RegexBuilder::new(pattern)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| format!("invalid pattern: {e}"))?;
        let cwd = ctx.cwd.clone();

        let lines = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            walk_files(&root, &mut files);
            files.sort();

            let mut lines = Vec::new();
            'outer: for file in files {
                let Ok(contents) = std::fs::read_to_string(&file) else {
                    continue; // binary or unreadable
                };
                let rel = file
                    .strip_prefix(&cwd)
                    .map(|r| r.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| file.to_string_lossy().into_owned());
                for (i, line) in contents.lines().enumerate() {
                    if regex.is_match(line) {
                        lines.push(format!("{rel}:{}: {line}", i + 1));
                        if lines.len() >= MAX_SEARCH_RESULTS {
                            break 'outer;
                        }
                    }
                }
            }
            lines
        })
        .await
        .map_err(|e| format!("search task panicked: {e}"))?;

        if lines.is_empty() {
            Ok(ToolResult::ok("No matches"))
        } else {
            Ok(ToolResult::ok(lines.join("\n")))
        }
    }
}

// ─── ListDirectoryTool ───────────────────────────────────────────────────────

pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List directory contents."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory path" }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let dir = match args.get("path").and_then(Value::as_str) {
            Some(p) => normalize_path(p, &ctx.cwd)?,
            None => ctx.cwd.clone(),
        };

        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| format!("failed to list '{}': {e}", dir.display()))?;

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = reader.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();

        if entries.is_empty() {
            Ok(ToolResult::ok("(empty directory)"))
        } else {
            Ok(ToolResult::ok(entries.join("\n")))
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
