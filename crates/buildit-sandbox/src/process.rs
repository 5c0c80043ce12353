//! Low-level spawning and line-delimited JSON IPC with a sandbox child process.

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tracing::warn;

use buildit_core::sandbox::SandboxMessage;

use crate::error::{Result, SandboxError};

pub struct SandboxProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<tokio::process::ChildStdout>,
}

impl SandboxProcess {
    /// Spawn `command` with `args`, piping stdin/stdout for JSONL and forwarding
    /// stderr through `tracing` at warn level.
    pub async fn spawn(command: &str, args: &[String], cwd: Option<&str>, env: &[(String, String)]) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(SandboxError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::Protocol("stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Protocol("stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            let trimmed = line.trim_end();
                            if !trimmed.is_empty() {
                                warn!(target: "buildit_sandbox.stderr", "{trimmed}");
                            }
                        }
                    }
                }
            });
        }

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    pub async fn send(&mut self, message: &SandboxMessage) -> Result<()> {
        let mut line = serde_json::to_string(message).map_err(|e| SandboxError::Protocol(e.to_string()))?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await.map_err(SandboxError::Stdin)?;
        self.stdin.flush().await.map_err(SandboxError::Stdin)?;
        Ok(())
    }

    /// Read the next message, or `None` on clean EOF.
    pub async fn recv(&mut self) -> Result<Option<SandboxMessage>> {
        let mut buf = String::new();
        let n = self.stdout.read_line(&mut buf).await.map_err(SandboxError::Stdout)?;
        if n == 0 {
            return Ok(None);
        }
        let line = buf.trim_end();
        if line.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(line)
            .map(Some)
            .map_err(|e| SandboxError::Protocol(format!("{e}: {line}")))
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Graceful-then-forced shutdown: SIGTERM, then SIGKILL if still alive after `grace`.
    pub async fn terminate(&mut self, grace: std::time::Duration) {
        #[cfg(unix)]
        if let Some(pid) = self.pid() {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            if tokio::time::timeout(grace, self.child.wait()).await.is_ok() {
                return;
            }
        }
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildit_core::sandbox::{LogLevel, SandboxMessage};

    fn echo_script() -> Vec<String> {
        vec![
            "-c".to_string(),
            "read _line; printf '{\"type\":\"log\",\"level\":\"info\",\"message\":\"hi\",\"meta\":null}\\n'"
                .to_string(),
        ]
    }

    #[tokio::test]
    async fn sends_and_receives_a_line() {
        let args = echo_script();
        let mut process = SandboxProcess::spawn("sh", &args, None, &[]).await.unwrap();
        process
            .send(&SandboxMessage::Log {
                level: LogLevel::Info,
                message: "ping".into(),
                meta: None,
            })
            .await
            .unwrap();

        let message = process.recv().await.unwrap().expect("one line of output");
        match message {
            SandboxMessage::Log { message, .. } => assert_eq!(message, "hi"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn recv_returns_none_on_eof() {
        let mut process = SandboxProcess::spawn("sh", &["-c".to_string(), "true".to_string()], None, &[])
            .await
            .unwrap();
        assert!(process.recv().await.unwrap().is_none());
    }
}
