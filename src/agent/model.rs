//! Headless language-model runner.
//!
//! [`HeadlessModel`] drives a CLI model in non-interactive mode
//! (`<cmd> -p <prompt> --output-format json`) and unwraps its JSON envelope.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::{slog_debug, Error, Result};

/// Default timeout for one model turn (10 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// One prompt in, one completion out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// A successful completion and its accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub output: String,
    pub session_id: Option<String>,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub num_turns: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    subtype: Option<String>,
    result: Option<String>,
    session_id: Option<String>,
    total_cost_usd: Option<f64>,
    duration_ms: Option<u64>,
    num_turns: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

/// Runs a model CLI once per prompt.
#[derive(Debug, Clone)]
pub struct HeadlessModel {
    binary: PathBuf,
    /// Extra arguments from the configured command, placed before `-p`.
    args: Vec<String>,
    timeout: Duration,
}

impl HeadlessModel {
    /// Build from a command line such as `"claude --model sonnet"`.
    ///
    /// # Errors
    ///
    /// `Error::AgentBinaryNotFound` if the program is not on `PATH`.
    pub fn from_command(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| Error::AgentBinaryNotFound(command.to_string()))?;
        let binary =
            which::which(&program).map_err(|_| Error::AgentBinaryNotFound(program.clone()))?;

        Ok(Self {
            binary,
            args: parts.collect(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Use an explicit binary, skipping the `PATH` lookup.
    pub fn with_binary(binary: PathBuf) -> Self {
        Self {
            binary,
            args: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one prompt and return the unwrapped reply.
    pub async fn run(&self, prompt: &str) -> Result<ModelReply> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.binary)
                .args(&self.args)
                .arg("-p")
                .arg(prompt)
                .arg("--output-format")
                .arg("json")
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| Error::Timeout(self.timeout))?
        .map_err(Error::Io)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if let Ok(reply) = Self::parse_envelope(&stdout) {
            return reply;
        }

        if !output.status.success() {
            let message = if stderr.trim().is_empty() {
                format!(
                    "model exited with code {}",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            return Err(Error::AgentExecution(message));
        }

        // Plain-text output despite the json flag.
        Ok(ModelReply {
            output: stdout.trim().to_string(),
            session_id: None,
            cost_usd: None,
            duration_ms: None,
            num_turns: None,
        })
    }

    /// Parse the CLI's JSON envelope.
    ///
    /// The outer `Result` fails only when `json` is not an envelope at all;
    /// the inner one carries the model's own success or error.
    pub fn parse_envelope(json: &str) -> Result<Result<ModelReply>> {
        let raw: Envelope = serde_json::from_str(json)?;

        let output = match raw.subtype.as_deref() {
            Some("success") => Ok(raw.result.unwrap_or_default()),
            Some(subtype) if subtype.starts_with("error") => Err(raw
                .error
                .or(raw.result)
                .unwrap_or_else(|| subtype.to_string())),
            _ => match (raw.error, raw.result) {
                (Some(error), _) => Err(error),
                (None, Some(result)) => Ok(result),
                (None, None) => Err("unknown response format".to_string()),
            },
        };

        Ok(output
            .map(|output| ModelReply {
                output,
                session_id: raw.session_id,
                cost_usd: raw.total_cost_usd,
                duration_ms: raw.duration_ms,
                num_turns: raw.num_turns,
            })
            .map_err(Error::AgentExecution))
    }
}

#[async_trait]
impl LanguageModel for HeadlessModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let reply = self.run(prompt).await?;
        slog_debug!(
            "model reply: {} chars, cost={:?} turns={:?} duration_ms={:?}",
            reply.output.len(),
            reply.cost_usd,
            reply.num_turns,
            reply.duration_ms
        );
        Ok(reply.output)
    }
}
