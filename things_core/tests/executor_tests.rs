mod common;

use async_trait::async_trait;
use futures::future::join_all;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use common::{test_config, ScriptedRunner};
use things_core::{
    AppleScriptExecutor, ExecutionLock, FailureKind, Invocation, ScriptResult, ScriptRunner,
    ThingsError,
};

/// Fails `failures` times, then succeeds; records when each attempt started.
struct FlakyRunner {
    failures: usize,
    stderr: &'static str,
    attempts: Mutex<Vec<Instant>>,
}

impl FlakyRunner {
    fn new(failures: usize, stderr: &'static str) -> Self {
        Self {
            failures,
            stderr,
            attempts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ScriptRunner for FlakyRunner {
    async fn run(&self, _invocation: &Invocation) -> io::Result<ScriptResult> {
        let mut attempts = self.attempts.lock().unwrap();
        attempts.push(Instant::now());
        if attempts.len() <= self.failures {
            Ok(ScriptResult::failed(self.stderr, 1))
        } else {
            Ok(ScriptResult::ok("done"))
        }
    }
}

/// First call never completes; later calls succeed immediately.
struct HangOnceRunner {
    calls: AtomicUsize,
}

#[async_trait]
impl ScriptRunner for HangOnceRunner {
    async fn run(&self, _invocation: &Invocation) -> io::Result<ScriptResult> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::future::pending::<()>().await;
        }
        Ok(ScriptResult::ok("after hang"))
    }
}

fn executor(runner: Arc<dyn ScriptRunner>) -> AppleScriptExecutor {
    AppleScriptExecutor::new(runner, &test_config(), ExecutionLock::new())
}

#[tokio::test(start_paused = true)]
async fn test_retry_with_exponential_backoff() {
    let runner = Arc::new(FlakyRunner::new(2, "execution error: busy (-1712)"));
    let executor = executor(runner.clone()).with_retry(3, Duration::from_secs(1));

    let result = executor.execute("return 1").await;

    assert!(result.success);
    assert_eq!(result.output_text(), "done");
    assert_eq!(result.attempts, 3);

    let attempts = runner.attempts.lock().unwrap().clone();
    assert_eq!(attempts.len(), 3);
    let first_gap = attempts[1] - attempts[0];
    let second_gap = attempts[2] - attempts[1];
    assert!(first_gap >= Duration::from_secs(1) && first_gap < Duration::from_millis(1100));
    assert!(second_gap >= Duration::from_secs(2) && second_gap < Duration::from_millis(2100));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_report_attempts() {
    let runner = Arc::new(FlakyRunner::new(10, "execution error: busy (-1712)"));
    let executor = executor(runner.clone()).with_retry(3, Duration::from_millis(100));

    let result = executor.execute("return 1").await;

    assert!(!result.success);
    assert!(result.output.is_none());
    assert_eq!(result.attempts, 3);
    assert!(result.error.as_deref().unwrap().ends_with("(after 3 attempt(s))"));
    assert_eq!(runner.attempts.lock().unwrap().len(), 3);
    assert!(matches!(
        result.into_output(),
        Err(ThingsError::Execution { attempts: 3, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_not_running_is_not_retried() {
    let runner = Arc::new(FlakyRunner::new(
        10,
        "execution error: Things3 got an error: Application isn't running. (-600)",
    ));
    let executor = executor(runner.clone()).with_retry(3, Duration::from_secs(1));

    let result = executor.execute("return 1").await;

    assert_eq!(result.failure, Some(FailureKind::NotRunning));
    assert_eq!(runner.attempts.lock().unwrap().len(), 1);
    assert!(matches!(
        result.into_output(),
        Err(ThingsError::ThingsNotRunning(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_is_not_retried() {
    let runner = Arc::new(FlakyRunner::new(
        10,
        "execution error: Not authorized to send Apple events to Things3. (-1743)",
    ));
    let executor = executor(runner.clone()).with_retry(5, Duration::from_secs(1));

    let result = executor.execute("return 1").await;

    assert_eq!(result.failure, Some(FailureKind::PermissionDenied));
    assert_eq!(runner.attempts.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_lock_released_after_timeout() {
    let runner = Arc::new(HangOnceRunner {
        calls: AtomicUsize::new(0),
    });
    let executor = executor(runner)
        .with_timeout(Duration::from_secs(5))
        .with_retry(1, Duration::from_secs(1));

    let started = Instant::now();
    let hung = executor.execute("delay 1000").await;
    assert_eq!(hung.failure, Some(FailureKind::Timeout));
    assert!(matches!(hung.into_output(), Err(ThingsError::Timeout(_))));

    let next = tokio::time::timeout(Duration::from_secs(1), executor.execute("return 2"))
        .await
        .expect("lock was not released");
    assert!(next.success);
    assert_eq!(next.output_text(), "after hang");
    assert!(started.elapsed() < Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_never_overlap() {
    let intervals: Arc<Mutex<Vec<(Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

    struct TimedRunner {
        intervals: Arc<Mutex<Vec<(Instant, Instant)>>>,
    }

    #[async_trait]
    impl ScriptRunner for TimedRunner {
        async fn run(&self, _invocation: &Invocation) -> io::Result<ScriptResult> {
            let entered = Instant::now();
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.intervals.lock().unwrap().push((entered, Instant::now()));
            Ok(ScriptResult::ok(""))
        }
    }

    let runner: Arc<dyn ScriptRunner> = Arc::new(TimedRunner {
        intervals: intervals.clone(),
    });
    let lock = ExecutionLock::new();
    // Two independently built executors on one lock.
    let first = AppleScriptExecutor::new(runner.clone(), &test_config(), lock.clone());
    let second = AppleScriptExecutor::new(runner, &test_config(), lock);
    assert!(first.lock().same_as(second.lock()));

    let calls = (0..6).map(|i| {
        let executor = if i % 2 == 0 { &first } else { &second };
        executor.execute("return 1")
    });
    let results = join_all(calls).await;
    assert!(results.iter().all(|r| r.success));

    let mut intervals = intervals.lock().unwrap().clone();
    assert_eq!(intervals.len(), 6);
    intervals.sort_by_key(|(start, _)| *start);
    for pair in intervals.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "overlapping AppleScript calls");
    }
}

#[test]
fn test_connector_clones_share_one_lock() {
    let runner: Arc<dyn ScriptRunner> = Arc::new(ScriptedRunner::new(|_| ScriptResult::ok("")));
    let connector = things_core::build_connector_with_runner(&test_config(), runner.clone());
    let copy = connector.clone();
    assert!(connector
        .service()
        .executor()
        .lock()
        .same_as(copy.service().executor().lock()));

    let other = things_core::build_connector_with_runner(&test_config(), runner);
    assert!(!other
        .service()
        .executor()
        .lock()
        .same_as(connector.service().executor().lock()));
}

#[tokio::test]
async fn test_url_dispatch_uses_url_method() {
    let runner = Arc::new(ScriptedRunner::new(|_| ScriptResult::ok("")));
    let executor = executor(runner.clone());

    let result = executor.open_url("things:///show?id=today").await;

    assert!(result.success);
    assert_eq!(result.method, things_core::ExecutionMethod::UrlScheme);
    assert_eq!(runner.urls(), vec!["things:///show?id=today".to_string()]);
}
