#![allow(dead_code)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use things_core::connectors::apple_common::parse::{FIELD_SEPARATOR, RECORD_SEPARATOR};
use things_core::{Config, Invocation, ScriptResult, ScriptRunner};

type Responder = dyn Fn(&Invocation) -> ScriptResult + Send + Sync;

/// Runner that answers from a closure and records every invocation.
pub struct ScriptedRunner {
    responder: Box<Responder>,
    calls: Mutex<Vec<Invocation>>,
    delay: Option<Duration>,
}

impl ScriptedRunner {
    pub fn new(responder: impl Fn(&Invocation) -> ScriptResult + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Simulated subprocess duration (tokio time).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.payload().contains(needle))
            .count()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Invocation::OpenUrl(url) => Some(url),
                Invocation::AppleScript(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl ScriptRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<ScriptResult> {
        self.calls.lock().unwrap().push(invocation.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok((self.responder)(invocation))
    }
}

/// Defaults with a single attempt per invocation, so failures are immediate.
pub fn test_config() -> Config {
    Config {
        applescript_retry_count: 1,
        retry_base_delay_ms: 10,
        ..Default::default()
    }
}

pub fn wire(records: &[&[(&str, &str)]]) -> String {
    records
        .iter()
        .map(|fields| {
            fields
                .iter()
                .map(|(k, v)| format!("{}:{}", k, v))
                .collect::<Vec<_>>()
                .join(&FIELD_SEPARATOR.to_string())
        })
        .collect::<Vec<_>>()
        .join(&RECORD_SEPARATOR.to_string())
}

pub fn todo_wire(id: &str, title: &str) -> String {
    wire(&[&[
        ("ID", id),
        ("TITLE", title),
        ("NOTES", ""),
        ("STATUS", "open"),
        ("TAGS", "{errands}"),
        ("DUE", ""),
        ("ACTIVATION", ""),
        ("PROJECT", ""),
        ("AREA", ""),
    ]])
}

static TODO_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r#"to do id "([^"]+)""#).unwrap());
static EXISTS_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"return \(exists (?:project|area) id "([^"]+)"\)"#).unwrap());

pub fn todo_id_in(script: &str) -> Option<String> {
    TODO_ID
        .captures(script)
        .map(|c| c[1].to_string())
}

/// A small in-memory stand-in for Things. Todo ids containing `missing`
/// do not exist, ids containing `fail` make AppleScript error out, and
/// project/area ids ending in `404` do not exist. Known tags: errands, home.
pub fn fake_things(invocation: &Invocation) -> ScriptResult {
    let script = match invocation {
        Invocation::OpenUrl(_) => return ScriptResult::ok(""),
        Invocation::AppleScript(script) => script.as_str(),
    };

    if script.contains("(name of processes)") {
        return ScriptResult::ok("true");
    }

    let todo_id = todo_id_in(script);
    if let Some(id) = &todo_id {
        if id.contains("fail") {
            return ScriptResult::failed(
                format!("execution error: Can't get to do id \"{}\". (-1728)", id),
                1,
            );
        }
    }

    if let Some(caps) = EXISTS_ID.captures(script) {
        return ScriptResult::ok((!caps[1].ends_with("404")).to_string());
    }
    if script.contains("whose id is") {
        // Every unscheduled todo lives in Anytime.
        return ScriptResult::ok(script.contains("list \"Anytime\"").to_string());
    }
    if script.contains("return my todoRecord(t)") {
        let id = todo_id.unwrap_or_default();
        if id.contains("missing") {
            return ScriptResult::ok("NOT_FOUND");
        }
        return ScriptResult::ok(todo_wire(&id, "Buy milk"));
    }
    if script.contains("return \"OK\"") {
        if todo_id.map(|id| id.contains("missing")).unwrap_or(false) {
            return ScriptResult::ok("NOT_FOUND");
        }
        return ScriptResult::ok("OK");
    }
    if script.contains("make new tag") {
        return ScriptResult::ok("TAG-NEW");
    }
    if script.contains("whose name is") {
        return ScriptResult::ok("NEW-1");
    }
    if script.contains("repeat with g in tags") {
        return ScriptResult::ok(wire(&[
            &[("ID", "TAG-1"), ("TITLE", "errands"), ("PARENT", ""), ("SHORTCUT", "")],
            &[("ID", "TAG-2"), ("TITLE", "home"), ("PARENT", ""), ("SHORTCUT", "h")],
        ]));
    }
    if script.contains("repeat with a in areas") {
        return ScriptResult::ok(wire(&[&[("ID", "A1"), ("TITLE", "Home"), ("TAGS", "{}")]]));
    }
    if script.contains("projectRecord(item i") {
        return ScriptResult::ok(wire(&[&[
            ("ID", "P1"),
            ("TITLE", "Renovate"),
            ("STATUS", "open"),
            ("AREA", "A1"),
        ]]));
    }
    if script.contains("todoRecord(item i") {
        let mut records = todo_wire("T1", "Buy milk");
        records.push(RECORD_SEPARATOR);
        records.push_str(&todo_wire("T2", "Call mum"));
        return ScriptResult::ok(records);
    }
    ScriptResult::ok("")
}

pub fn fake_runner() -> Arc<ScriptedRunner> {
    Arc::new(ScriptedRunner::new(fake_things))
}
