//! Guest commands over the system `ssh` client

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use vmflow_builder::{CommandExecutor, ExecError, RemoteCommand, RemoteSession};
use vmflow_config::CommunicatorConfig;

const PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Runs guest commands through `ssh` in batch mode
#[derive(Debug, Clone)]
pub struct SshExecutor {
    username: String,
    port: u16,
    private_key_file: Option<PathBuf>,
    options: Vec<String>,
    connect_timeout: Duration,
}

impl SshExecutor {
    pub fn from_config(config: &CommunicatorConfig) -> Self {
        Self {
            username: config.username.clone().unwrap_or_default(),
            port: config.port,
            private_key_file: config.private_key_file.clone(),
            options: config.options.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }

    /// Arguments up to and including the destination
    fn args(&self, host: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            "-p".to_string(),
            self.port.to_string(),
        ];
        if let Some(key) = &self.private_key_file {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        for option in &self.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args.push(format!("{}@{}", self.username, host));
        args
    }

    async fn probe(&self, args: &[String]) -> Result<(), String> {
        let output = Command::new("ssh")
            .args(args)
            .arg("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| e.to_string())?;

        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }
}

#[async_trait]
impl CommandExecutor for SshExecutor {
    async fn connect(&self, host: &str) -> Result<Box<dyn RemoteSession>, ExecError> {
        let args = self.args(host);
        let deadline = Instant::now() + self.connect_timeout;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            tracing::debug!(host, attempt, "Probing ssh");
            let reason = match self.probe(&args).await {
                Ok(()) => {
                    tracing::info!(host, attempt, "ssh connected");
                    return Ok(Box::new(SshSession {
                        host: host.to_string(),
                        args,
                    }));
                }
                Err(reason) => reason,
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(ExecError::Connection(format!(
                    "{} not reachable after {} attempts: {}",
                    host, attempt, reason
                )));
            }
            tracing::debug!(host, %reason, "ssh not ready yet");
            tokio::time::sleep(PROBE_INTERVAL.min(deadline - now)).await;
        }
    }
}

struct SshSession {
    host: String,
    args: Vec<String>,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn start(&self, command: &str) -> Result<Box<dyn RemoteCommand>, ExecError> {
        tracing::info!(host = %self.host, command, "Running guest command");

        let mut child = Command::new("ssh")
            .args(&self.args)
            .arg("--")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::Start(e.to_string()))?;

        let mut pumps = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pumps.push(pump(stdout, self.host.clone(), "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(pump(stderr, self.host.clone(), "stderr"));
        }

        Ok(Box::new(SshCommand { child, pumps }))
    }
}

fn pump<R>(reader: R, host: String, stream: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::info!(target: "vmflow::guest", host = %host, stream, "{}", line);
        }
    })
}

struct SshCommand {
    child: Child,
    pumps: Vec<JoinHandle<()>>,
}

#[async_trait]
impl RemoteCommand for SshCommand {
    async fn wait(&mut self) -> Result<i32, ExecError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ExecError::Wait(e.to_string()))?;

        for pump in self.pumps.drain(..) {
            let _ = pump.await;
        }

        // Killed by a signal
        Ok(status.code().unwrap_or(-1))
    }
}
