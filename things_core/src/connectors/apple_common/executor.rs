use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{escape_applescript_string, Invocation, ScriptRunner};
use crate::config::Config;
use crate::error::{ErrorKind, ThingsError};

// ASCII classes only: the regex build carries no Unicode Perl classes.
static OSA_ERROR_NUMBER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\((-?[0-9]+)\)[ \t\r\n]*$").ok());

/// Serializes every AppleScript/URL dispatch. Apple Events sent concurrently
/// to one application interleave, so at most one subprocess runs at a time.
///
/// Clones share the same underlying mutex. Built once by
/// [`crate::build_connector`] and handed to every executor.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLock {
    inner: Arc<Mutex<()>>,
}

impl ExecutionLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.inner.lock().await
    }

    pub fn same_as(&self, other: &ExecutionLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMethod {
    #[serde(rename = "applescript")]
    AppleScript,
    UrlScheme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    NonZeroExit,
    Spawn,
    NotRunning,
    PermissionDenied,
}

impl FailureKind {
    /// Same classification as the [`ThingsError`] the failure turns into.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FailureKind::Timeout | FailureKind::NonZeroExit => ErrorKind::Transient,
            FailureKind::Spawn | FailureKind::NotRunning | FailureKind::PermissionDenied => {
                ErrorKind::Permanent
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Recognise failures that retrying cannot fix.
    pub fn from_stderr(stderr: &str) -> Self {
        let lower = stderr.to_ascii_lowercase();
        let number = OSA_ERROR_NUMBER
            .as_ref()
            .and_then(|re| re.captures(stderr))
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<i32>().ok());

        if lower.contains("isn't running")
            || lower.contains("is not running")
            || number == Some(-600)
        {
            FailureKind::NotRunning
        } else if lower.contains("not authorized")
            || lower.contains("not allowed")
            || matches!(number, Some(-1743) | Some(-1744))
        {
            FailureKind::PermissionDenied
        } else {
            FailureKind::NonZeroExit
        }
    }
}

/// Outcome of one (possibly retried) invocation. `success == false` implies
/// `error` is set and `output` is `None`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    /// Seconds spent in the subprocess, excluding lock wait.
    pub execution_time: f64,
    pub method: ExecutionMethod,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    pub fn succeeded(output: String, execution_time: f64, method: ExecutionMethod) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            execution_time,
            method,
            attempts: 1,
            failure: None,
        }
    }

    pub fn failed(
        error: impl Into<String>,
        failure: FailureKind,
        execution_time: f64,
        method: ExecutionMethod,
    ) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown error".to_string();
        }
        Self {
            success: false,
            output: None,
            error: Some(error),
            execution_time,
            method,
            attempts: 1,
            failure: Some(failure),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !self.success && self.failure.map(|f| f.is_retryable()).unwrap_or(true)
    }

    pub fn output_text(&self) -> &str {
        self.output.as_deref().unwrap_or("")
    }

    /// Converts into stdout text or the typed error matching the failure.
    pub fn into_output(self) -> Result<String, ThingsError> {
        if self.success {
            return Ok(self.output.unwrap_or_default());
        }
        let message = self.error.unwrap_or_else(|| "unknown error".to_string());
        Err(match self.failure {
            Some(FailureKind::Timeout) => ThingsError::Timeout(message),
            Some(FailureKind::NotRunning) => ThingsError::ThingsNotRunning(message),
            Some(FailureKind::PermissionDenied) => ThingsError::PermissionDenied(message),
            Some(FailureKind::Spawn) => ThingsError::Spawn(message),
            _ => ThingsError::Execution {
                message,
                attempts: self.attempts,
            },
        })
    }
}

/// Runs invocations under the shared lock with a timeout and exponential
/// backoff retry (`base_delay * 2^(attempt - 1)`).
#[derive(Clone)]
pub struct AppleScriptExecutor {
    runner: Arc<dyn ScriptRunner>,
    lock: ExecutionLock,
    timeout: Duration,
    retry_count: u32,
    base_delay: Duration,
}

impl AppleScriptExecutor {
    /// Every executor that talks to the same application must be given the
    /// same `lock`.
    pub fn new(runner: Arc<dyn ScriptRunner>, config: &Config, lock: ExecutionLock) -> Self {
        Self {
            runner,
            lock,
            timeout: config.timeout(),
            retry_count: config.applescript_retry_count,
            base_delay: config.retry_base_delay(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry_count: u32, base_delay: Duration) -> Self {
        self.retry_count = retry_count;
        self.base_delay = base_delay;
        self
    }

    pub fn lock(&self) -> &ExecutionLock {
        &self.lock
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Run an AppleScript with retry.
    pub async fn execute(&self, script: &str) -> ExecutionResult {
        self.run_with_retry(Invocation::AppleScript(script.to_string()))
            .await
    }

    /// Dispatch a Things URL with retry.
    pub async fn open_url(&self, url: &str) -> ExecutionResult {
        self.run_with_retry(Invocation::OpenUrl(url.to_string())).await
    }

    /// Single attempt: acquire the lock, spawn, wait up to `timeout`.
    /// The guard drops on every exit path, including timeout.
    pub async fn run(&self, invocation: &Invocation, timeout: Duration) -> ExecutionResult {
        let method = invocation.method();
        let _guard = self.lock.acquire().await;
        let started = Instant::now();

        let outcome = tokio::time::timeout(timeout, self.runner.run(invocation)).await;
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Ok(Ok(out)) if out.success() => ExecutionResult::succeeded(out.stdout, elapsed, method),
            Ok(Ok(out)) => {
                let message = if out.stderr.is_empty() {
                    format!("exit code {}", out.exit_code)
                } else {
                    out.stderr
                };
                let kind = FailureKind::from_stderr(&message);
                ExecutionResult::failed(message, kind, elapsed, method)
            }
            Ok(Err(e)) => ExecutionResult::failed(
                format!("Failed to spawn subprocess: {}", e),
                FailureKind::Spawn,
                elapsed,
                method,
            ),
            Err(_) => ExecutionResult::failed(
                format!("Timed out after {:.1}s", timeout.as_secs_f64()),
                FailureKind::Timeout,
                elapsed,
                method,
            ),
        }
    }

    async fn run_with_retry(&self, invocation: Invocation) -> ExecutionResult {
        let attempts = self.retry_count.max(1);
        let mut attempt: u32 = 0;

        loop {
            let mut result = self.run(&invocation, self.timeout).await;
            attempt += 1;
            result.attempts = attempt;

            if result.success {
                if attempt > 1 {
                    debug!(target: "things::executor", attempt, "succeeded after retry");
                }
                return result;
            }

            if !result.is_retryable() || attempt >= attempts {
                if let Some(error) = result.error.take() {
                    result.error = Some(format!("{} (after {} attempt(s))", error, attempt));
                }
                warn!(
                    target: "things::executor",
                    method = ?result.method,
                    attempts = attempt,
                    failure = ?result.failure,
                    error = result.error.as_deref().unwrap_or(""),
                    "invocation failed"
                );
                return result;
            }

            let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
            debug!(
                target: "things::executor",
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = result.error.as_deref().unwrap_or(""),
                "retrying after backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Single-shot check via System Events; no retry.
    pub async fn is_app_running(&self, app_name: &str) -> Result<bool, ThingsError> {
        let script = format!(
            r#"tell application "System Events" to (name of processes) contains "{}""#,
            escape_applescript_string(app_name)
        );
        let output = self
            .run(&Invocation::AppleScript(script), self.timeout)
            .await
            .into_output()?;
        Ok(output.trim() == "true")
    }
}
