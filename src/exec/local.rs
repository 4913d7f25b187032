// ABOUTME: Runs commands on the controller host through `sh -c`.
// ABOUTME: Output is captured and optionally logged line by line as it arrives.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use super::shell::compose;
use super::{CommandOutput, ExecError, RunOptions, Runner};

#[derive(Debug, Clone)]
pub struct LocalRunner {
    timeout: Duration,
}

impl LocalRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }
}

#[async_trait]
impl Runner for LocalRunner {
    fn describe(&self) -> String {
        "local".to_string()
    }

    async fn run(&self, command: &str, options: &RunOptions) -> Result<CommandOutput, ExecError> {
        let composed = compose(command, options);
        tracing::debug!("local$ {}", composed);

        let spawn_err = |source| ExecError::Spawn {
            command: command.to_string(),
            source,
        };

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&composed)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stream = options.stream;

        let finished = async {
            let (out, err, status) = tokio::join!(
                collect(stdout, stream),
                collect(stderr, stream),
                child.wait()
            );
            Ok::<_, std::io::Error>((out?, err?, status?))
        };

        let (stdout, stderr, status) = match tokio::time::timeout(self.timeout, finished).await {
            Ok(result) => result.map_err(spawn_err)?,
            Err(_) => {
                return Err(ExecError::Timeout {
                    command: command.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        Ok(CommandOutput {
            // Killed by a signal.
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<(), ExecError> {
        tracing::debug!("local copy {} -> {}", local.display(), remote);
        tokio::fs::copy(local, remote)
            .await
            .map_err(|e| ExecError::Transfer {
                from: local.to_path_buf(),
                to: remote.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

async fn collect<R>(reader: Option<R>, stream: bool) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(String::new());
    };

    let mut segments = BufReader::new(reader).split(b'\n');
    let mut buf = String::new();
    while let Some(segment) = segments.next_segment().await? {
        let line = String::from_utf8_lossy(&segment);
        if stream {
            tracing::debug!(target: "stagehand::local", "{}", line);
        }
        buf.push_str(&line);
        buf.push('\n');
    }
    Ok(buf)
}
