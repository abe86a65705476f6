//! Oracle adapter that shells out to an external CLI.
//!
//! The request is rendered to a prompt (see [`crate::oracle::prompt`]),
//! written to the child's stdin, and the structured payload is extracted
//! from whatever the child prints — tools tend to wrap their JSON in prose
//! or code fences, so extraction is brace-counting rather than a strict
//! parse of the whole stream.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::oracle::{Oracle, OracleRequest, prompt};
use crate::util::extract_json_object;

/// Default timeout for a single oracle invocation.
const DEFAULT_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// Oracle backed by an external command.
pub struct CommandOracle {
    cmd: String,
    args: Vec<String>,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl CommandOracle {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            working_dir: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    async fn run_command(&self, input: &str) -> Result<String> {
        let mut cmd = Command::new(&self.cmd);
        cmd.args(&self.args);

        if let Some(ref working_dir) = self.working_dir {
            cmd.current_dir(working_dir);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn oracle command '{}'", self.cmd))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .context("Failed to write request to oracle stdin")?;
            stdin.shutdown().await.context("Failed to close oracle stdin")?;
        }

        let mut stdout = child.stdout.take().context("Failed to get oracle stdout")?;
        let mut output = String::new();

        let status = tokio::time::timeout(self.timeout, async {
            stdout
                .read_to_string(&mut output)
                .await
                .context("Failed to read oracle stdout")?;
            child.wait().await.context("Failed to wait for oracle process")
        })
        .await
        .context("Oracle invocation timed out")??;

        if !status.success() {
            anyhow::bail!(
                "Oracle command exited with code {}",
                status.code().unwrap_or(-1)
            );
        }

        Ok(output)
    }
}

#[async_trait]
impl Oracle for CommandOracle {
    async fn invoke(&self, request: &OracleRequest) -> Result<Value> {
        let input = prompt::compose(request);

        tracing::debug!(phase = %request.phase, "invoking oracle command");
        let output = self.run_command(&input).await?;

        let json = extract_json_object(&output)
            .ok_or_else(|| anyhow::anyhow!("No JSON object found in oracle output"))?;

        serde_json::from_str(&json).context("Oracle output is not valid JSON")
    }
}
