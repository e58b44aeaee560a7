//! Command-line coding agent adapter.
//!
//! Runs the configured agent binary (Claude Code by default) once per chat
//! call, in the task's working directory, with the full-context prompt as the
//! last argument. `stream-json` output is parsed into trace entries; anything
//! else is treated as plain text.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentConfig, TaskDescriptor, TraceEntry, UsageReport};
use crate::domain::ports::{Agent, AgentFactory};

/// Creates one [`CliAgent`] per task.
#[derive(Debug, Clone)]
pub struct CliAgentFactory {
    config: Arc<AgentConfig>,
}

impl CliAgentFactory {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl AgentFactory for CliAgentFactory {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn create(
        &self,
        task_index: usize,
        descriptor: &TaskDescriptor,
    ) -> DomainResult<Box<dyn Agent>> {
        let working_dir = PathBuf::from(descriptor.working_context());
        if !working_dir.is_dir() {
            return Err(DomainError::SessionUnavailable(format!(
                "working directory {} does not exist",
                working_dir.display()
            )));
        }

        Ok(Box::new(CliAgent {
            config: Arc::clone(&self.config),
            task_index,
            working_dir,
            child: None,
            trace: Vec::new(),
        }))
    }
}

/// One agent process per call, bound to a working directory.
#[derive(Debug)]
pub struct CliAgent {
    config: Arc<AgentConfig>,
    task_index: usize,
    working_dir: PathBuf,
    /// Process of the call in flight; left behind if that call was abandoned.
    child: Option<Child>,
    trace: Vec<TraceEntry>,
}

impl CliAgent {
    fn build_args(&self, prompt: &str) -> Vec<String> {
        let mut args = self.config.args.clone();
        if let Some(model) = &self.config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.push(prompt.to_string());
        args
    }

    fn command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(self.build_args(prompt))
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        cmd.env("TASKLOOP_TASK_INDEX", self.task_index.to_string());
        cmd
    }
}

#[async_trait]
impl Agent for CliAgent {
    async fn run(&mut self, prompt: &str) -> DomainResult<String> {
        self.trace.clear();

        let mut child = self.command(prompt).spawn().map_err(|e| {
            DomainError::AgentCallFailed(format!("Failed to spawn {}: {e}", self.config.binary))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            DomainError::AgentCallFailed("Failed to capture agent stdout".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            DomainError::AgentCallFailed("Failed to capture agent stderr".to_string())
        })?;
        debug!(
            task_index = self.task_index,
            pid = child.id(),
            working_dir = %self.working_dir.display(),
            "agent process spawned"
        );
        self.child = Some(child);

        let (stdout_lines, stderr_lines) = tokio::join!(read_lines(stdout), read_lines(stderr));

        let status = match self.child.as_mut() {
            Some(child) => child.wait().await.map_err(|e| {
                DomainError::AgentCallFailed(format!("Failed to wait for agent process: {e}"))
            })?,
            None => {
                return Err(DomainError::AgentCallFailed(
                    "agent process disappeared".to_string(),
                ))
            }
        };
        self.child = None;

        let mut parser = StreamParser::default();
        for line in &stdout_lines {
            parser.feed(line);
        }
        let outcome = parser.finish(&stdout_lines);
        self.trace = outcome.trace;

        if !status.success() || outcome.is_error {
            let stderr_text = stderr_lines.join("\n");
            let message = if !stderr_text.trim().is_empty() {
                stderr_text.trim().to_string()
            } else if outcome.is_error && !outcome.response.is_empty() {
                outcome.response
            } else {
                format!("agent exited with code {:?}", status.code())
            };
            self.trace.push(TraceEntry::Error {
                message: message.clone(),
            });
            return Err(DomainError::AgentCallFailed(message));
        }

        Ok(outcome.response)
    }

    fn trace(&self) -> Vec<TraceEntry> {
        self.trace.clone()
    }

    async fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill().await {
                warn!(task_index = self.task_index, error = %err, "failed to kill agent process");
            }
        }
    }
}

async fn read_lines<R: AsyncRead + Unpin>(reader: R) -> Vec<String> {
    let mut lines = BufReader::new(reader).lines();
    let mut collected = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        collected.push(line);
    }
    collected
}

/// Result of parsing one call's output.
#[derive(Debug, Default)]
struct ParsedOutput {
    response: String,
    trace: Vec<TraceEntry>,
    is_error: bool,
}

/// Incremental `stream-json` parser.
///
/// Understands both the nested `{"type":"assistant","message":{...}}` events
/// and the flat `{"type":"text","text":...}` form.
#[derive(Debug, Default)]
struct StreamParser {
    trace: Vec<TraceEntry>,
    tool_positions: HashMap<String, usize>,
    assistant_text: Vec<String>,
    result: Option<String>,
    is_error: bool,
    saw_json: bool,
}

impl StreamParser {
    fn feed(&mut self, line: &str) {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return;
        }
        let Ok(event) = serde_json::from_str::<serde_json::Value>(trimmed) else {
            return;
        };
        let Some(event_type) = event.get("type").and_then(|t| t.as_str()) else {
            return;
        };
        self.saw_json = true;

        match event_type {
            "assistant" | "user" => {
                let message = event.get("message").unwrap_or(&event);
                let usage = parse_usage(message.get("usage"));
                match message.get("content") {
                    Some(serde_json::Value::Array(blocks)) => {
                        let mut usage = usage;
                        for block in blocks {
                            self.content_block(block, &mut usage);
                        }
                        if let Some(usage) = usage {
                            self.trace.push(TraceEntry::Usage { usage });
                        }
                    }
                    Some(serde_json::Value::String(text)) if event_type == "assistant" => {
                        self.text(text, usage);
                    }
                    _ => {
                        if let Some(usage) = usage {
                            self.trace.push(TraceEntry::Usage { usage });
                        }
                    }
                }
            }
            "text" | "content_block_delta" => {
                let text = event
                    .get("text")
                    .or_else(|| event.get("delta").and_then(|d| d.get("text")))
                    .and_then(|t| t.as_str())
                    .unwrap_or_default();
                self.text(text, None);
            }
            "tool_use" | "tool_result" => self.content_block(&event, &mut None),
            "usage" | "message_delta" => {
                if let Some(usage) = parse_usage(event.get("usage")) {
                    self.trace.push(TraceEntry::Usage { usage });
                }
            }
            "result" => {
                self.result = event
                    .get("result")
                    .and_then(|r| r.as_str())
                    .map(str::to_string);
                self.is_error = event
                    .get("is_error")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if let Some(usage) = parse_usage(event.get("usage")) {
                    self.trace.push(TraceEntry::Usage { usage });
                }
            }
            "error" => {
                let message = event
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .or_else(|| event.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                self.trace.push(TraceEntry::Error { message });
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str, usage: Option<UsageReport>) {
        if text.is_empty() {
            return;
        }
        self.assistant_text.push(text.to_string());
        self.trace.push(TraceEntry::Content {
            text: text.to_string(),
            usage,
        });
    }

    /// One block of a message. `usage` is attached to the first text block.
    fn content_block(&mut self, block: &serde_json::Value, usage: &mut Option<UsageReport>) {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                let text = block.get("text").and_then(|t| t.as_str()).unwrap_or_default();
                if !text.is_empty() {
                    self.text(text, usage.take());
                }
            }
            Some("tool_use") => {
                let name = block
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                let args = block.get("input").cloned().unwrap_or_default();
                if let Some(id) = block.get("id").and_then(|i| i.as_str()) {
                    self.tool_positions.insert(id.to_string(), self.trace.len());
                }
                self.trace.push(TraceEntry::ToolCall {
                    name,
                    args,
                    result: serde_json::Value::Null,
                });
            }
            Some("tool_result") => {
                let content = block
                    .get("content")
                    .or_else(|| block.get("result"))
                    .cloned()
                    .unwrap_or_default();
                let position = block
                    .get("tool_use_id")
                    .and_then(|i| i.as_str())
                    .and_then(|id| self.tool_positions.get(id).copied());
                match position.and_then(|p| self.trace.get_mut(p)) {
                    Some(TraceEntry::ToolCall { result, .. }) => *result = content,
                    _ => self.trace.push(TraceEntry::ToolCall {
                        name: "unknown".to_string(),
                        args: serde_json::Value::Null,
                        result: content,
                    }),
                }
            }
            _ => {}
        }
    }

    fn finish(mut self, raw_lines: &[String]) -> ParsedOutput {
        let response = if let Some(result) = self.result.take() {
            result
        } else if !self.assistant_text.is_empty() {
            self.assistant_text.join("\n")
        } else if self.saw_json {
            String::new()
        } else {
            raw_lines.join("\n").trim().to_string()
        };

        if !self.saw_json && !response.is_empty() {
            self.trace.push(TraceEntry::content(response.clone()));
        }

        ParsedOutput {
            response,
            trace: self.trace,
            is_error: self.is_error,
        }
    }
}

fn parse_usage(value: Option<&serde_json::Value>) -> Option<UsageReport> {
    let report: UsageReport = serde_json::from_value(value?.clone()).ok()?;
    (!report.is_empty()).then_some(report)
}
