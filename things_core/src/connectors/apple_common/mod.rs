// Apple Common - shared infrastructure for driving macOS apps from Rust
// Subprocess runners (osascript / open), the serialized executor, and
// parsing of AppleScript text output.

mod executor;
pub mod parse;

pub use executor::{AppleScriptExecutor, ExecutionLock, ExecutionMethod, ExecutionResult, FailureKind};

use async_trait::async_trait;
use std::io;
use tracing::info;

/// Raw outcome of one subprocess.
#[derive(Debug, Clone, Default)]
pub struct ScriptResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ScriptResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn failed(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }
}

/// A fully rendered command for the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// `osascript -e <script>`
    AppleScript(String),
    /// `open <things-url>`
    OpenUrl(String),
}

impl Invocation {
    pub fn method(&self) -> ExecutionMethod {
        match self {
            Invocation::AppleScript(_) => ExecutionMethod::AppleScript,
            Invocation::OpenUrl(_) => ExecutionMethod::UrlScheme,
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            Invocation::AppleScript(s) | Invocation::OpenUrl(s) => s,
        }
    }
}

/// Spawns the subprocess behind an [`Invocation`]. Swapped for a scripted
/// fake in tests and for [`DryRunRunner`] in mock mode.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> io::Result<ScriptResult>;
}

/// Runs `/usr/bin/osascript` and `/usr/bin/open`.
#[derive(Debug, Default, Clone)]
pub struct OsascriptRunner;

#[async_trait]
impl ScriptRunner for OsascriptRunner {
    #[cfg(target_os = "macos")]
    async fn run(&self, invocation: &Invocation) -> io::Result<ScriptResult> {
        use tokio::process::Command;

        let mut cmd = match invocation {
            Invocation::AppleScript(script) => {
                let mut cmd = Command::new("/usr/bin/osascript");
                cmd.arg("-e").arg(script);
                cmd
            }
            Invocation::OpenUrl(url) => {
                let mut cmd = Command::new("/usr/bin/open");
                cmd.arg(url);
                cmd
            }
        };
        // A timed-out call drops this future; the child must die with it.
        cmd.kill_on_drop(true);

        let output = cmd.output().await?;
        Ok(ScriptResult {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    #[cfg(not(target_os = "macos"))]
    async fn run(&self, invocation: &Invocation) -> io::Result<ScriptResult> {
        let _ = invocation;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "AppleScript is only available on macOS",
        ))
    }
}

/// Logs each invocation and reports success with empty output.
#[derive(Debug, Default, Clone)]
pub struct DryRunRunner;

#[async_trait]
impl ScriptRunner for DryRunRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<ScriptResult> {
        info!(
            target: "things::executor",
            method = ?invocation.method(),
            bytes = invocation.payload().len(),
            "mock mode: skipping subprocess"
        );
        Ok(ScriptResult::ok(""))
    }
}

/// Escape a string for use inside an AppleScript string literal.
pub fn escape_applescript_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
        .replace('\t', "\\t")
}

/// Parse AppleScript list output into a Vec of strings.
/// AppleScript returns lists like: {"item1", "item2", "item3"}; a list of one
/// may come back as the bare item.
pub fn parse_applescript_list(output: &str) -> Vec<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == "{}" {
        return Vec::new();
    }

    let inner = if trimmed.starts_with('{') && trimmed.ends_with('}') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in inner.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                push_item(&mut items, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_item(&mut items, &current);

    items
}

fn push_item(items: &mut Vec<String>, raw: &str) {
    let item = raw.trim();
    if !item.is_empty() {
        items.push(item.to_string());
    }
}

/// Standard capabilities for AppleScript-backed connectors.
pub fn apple_connector_capabilities() -> rmcp::model::ServerCapabilities {
    rmcp::model::ServerCapabilities {
        tools: Some(rmcp::model::ToolsCapability { list_changed: None }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_applescript_list() {
        let output = r#"{"item1", "item2", "item3"}"#;
        let items = parse_applescript_list(output);
        assert_eq!(items, vec!["item1", "item2", "item3"]);
    }

    #[test]
    fn test_parse_unquoted_list() {
        assert_eq!(parse_applescript_list("{a,b}"), vec!["a", "b"]);
        assert_eq!(parse_applescript_list("{errands, home}"), vec!["errands", "home"]);
    }

    #[test]
    fn test_parse_list_with_quoted_comma() {
        let items = parse_applescript_list(r#"{"a, b", "c \"d\""}"#);
        assert_eq!(items, vec!["a, b", "c \"d\""]);
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(parse_applescript_list("{}").is_empty());
        assert!(parse_applescript_list("   ").is_empty());
    }

    #[test]
    fn test_single_item_without_braces() {
        assert_eq!(parse_applescript_list("errands"), vec!["errands"]);
    }

    #[test]
    fn test_escape_applescript_string() {
        let input = r#"Hello "World""#;
        assert_eq!(escape_applescript_string(input), r#"Hello \"World\""#);
        assert_eq!(escape_applescript_string("a\\b"), "a\\\\b");
        assert_eq!(escape_applescript_string("line1\nline2"), "line1\\nline2");
    }

    #[test]
    fn test_invocation_method() {
        assert_eq!(
            Invocation::OpenUrl("things:///show?id=today".into()).method(),
            ExecutionMethod::UrlScheme
        );
        assert_eq!(
            Invocation::AppleScript("return 1".into()).payload(),
            "return 1"
        );
    }

    #[tokio::test]
    async fn test_dry_run_runner_succeeds() {
        let result = DryRunRunner
            .run(&Invocation::AppleScript("tell application \"Things3\" to name".into()))
            .await
            .unwrap();
        assert!(result.success());
        assert!(result.stdout.is_empty());
    }
}
