#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use xcpilot_automation::{
    AutomationConfig, AutomationError, CancellationToken, Dispatcher, ProcessOutput,
    ProcessRequest, ProcessRunner,
};

type Handler = Box<dyn Fn(&ProcessRequest) -> ProcessOutput + Send + Sync>;

/// Recording `ProcessRunner` double with scripted replies.
pub struct FakeProcesses {
    calls: Mutex<Vec<ProcessRequest>>,
    spawned: Mutex<Vec<ProcessRequest>>,
    installed: HashSet<String>,
    handler: Handler,
    next_pid: AtomicU32,
}

impl FakeProcesses {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            spawned: Mutex::new(Vec::new()),
            installed: HashSet::new(),
            handler: Box::new(|_| ok("")),
            next_pid: AtomicU32::new(4000),
        }
    }

    pub fn installed(mut self, programs: &[&str]) -> Self {
        self.installed.extend(programs.iter().map(|p| p.to_string()));
        self
    }

    pub fn reply_with(
        mut self,
        handler: impl Fn(&ProcessRequest) -> ProcessOutput + Send + Sync + 'static,
    ) -> Self {
        self.handler = Box::new(handler);
        self
    }

    pub fn calls(&self) -> Vec<ProcessRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn spawned(&self) -> Vec<ProcessRequest> {
        self.spawned.lock().unwrap().clone()
    }

    /// Every process touched: run and spawned.
    pub fn invocation_count(&self) -> usize {
        self.calls.lock().unwrap().len() + self.spawned.lock().unwrap().len()
    }

    pub fn calls_to(&self, program_suffix: &str) -> Vec<ProcessRequest> {
        self.calls()
            .into_iter()
            .filter(|r| r.program.ends_with(program_suffix))
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for FakeProcesses {
    async fn run(
        &self,
        request: ProcessRequest,
        cancel: &CancellationToken,
    ) -> xcpilot_automation::Result<ProcessOutput> {
        if cancel.is_cancelled() {
            return Err(AutomationError::Cancelled);
        }
        let output = (self.handler)(&request);
        self.calls.lock().unwrap().push(request);
        Ok(output)
    }

    async fn spawn_detached(&self, request: ProcessRequest) -> xcpilot_automation::Result<u32> {
        self.spawned.lock().unwrap().push(request);
        Ok(self.next_pid.fetch_add(1, Ordering::SeqCst))
    }

    async fn locate(&self, program: &str) -> Option<PathBuf> {
        self.installed
            .contains(program)
            .then(|| PathBuf::from(format!("/usr/local/bin/{}", program)))
    }
}

pub fn ok(stdout: &str) -> ProcessOutput {
    ProcessOutput {
        status: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn failed(status: i32, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        status: Some(status),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

pub fn ax_success(data: Value) -> ProcessOutput {
    ok(&json!({"command_id": "test", "status": "success", "data": data}).to_string())
}

pub fn ax_error(message: &str) -> ProcessOutput {
    ok(&json!({"command_id": "test", "status": "error", "error": message}).to_string())
}

/// The JSON command an accessibility-tool request carried on stdin.
pub fn ax_command(request: &ProcessRequest) -> Value {
    request
        .stdin
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or(Value::Null)
}

pub fn is_ax(request: &ProcessRequest) -> bool {
    request.program.ends_with("axorc")
}

pub fn is_osascript(request: &ProcessRequest) -> bool {
    request.program == "osascript"
}

pub fn script_of(request: &ProcessRequest) -> &str {
    request.args.get(1).map(String::as_str).unwrap_or_default()
}

pub fn dispatcher(fake: &Arc<FakeProcesses>, config: AutomationConfig) -> Dispatcher {
    Dispatcher::new(fake.clone(), Arc::new(config))
}
