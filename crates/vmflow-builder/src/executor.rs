//! Remote command execution seam
//!
//! The lifecycle needs three things from a guest transport: connect to a
//! host, start a command, wait for its exit status. The `vmflow` binary
//! provides an ssh implementation; tests provide scripted ones.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("failed to start command: {0}")]
    Start(String),

    #[error("command wait failed: {0}")]
    Wait(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opens sessions to a guest
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn connect(&self, host: &str) -> Result<Box<dyn RemoteSession>, ExecError>;
}

/// A live connection to one guest
#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn start(&self, command: &str) -> Result<Box<dyn RemoteCommand>, ExecError>;
}

/// A started command
#[async_trait]
pub trait RemoteCommand: Send {
    /// Exit status; a command killed by a signal reports a non-zero value
    async fn wait(&mut self) -> Result<i32, ExecError>;
}
