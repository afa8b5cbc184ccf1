// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin request/reply client for the manager socket.

use std::path::PathBuf;
use std::time::Duration;

use eq_wire::{encode, read_frame, write_message, ProtocolError, RawRequest};
use serde_json::Value;
use thiserror::Error;
use tokio::net::UnixStream;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Manager is not running (socket {0})")]
    NotRunning(PathBuf),

    #[error("Cannot determine state directory (HOME not set)")]
    NoStateDir,

    #[error("Request timed out")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Resolve state directory the same way the daemon does.
fn state_dir() -> Result<PathBuf, ClientError> {
    if let Ok(dir) = std::env::var("EQ_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("eq"));
    }
    let home = std::env::var("HOME").map_err(|_| ClientError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/eq"))
}

fn request_timeout() -> Duration {
    std::env::var("EQ_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

pub struct Client {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Client {
    pub fn from_env() -> Result<Self, ClientError> {
        Ok(Self { socket_path: state_dir()?.join("manager.sock"), timeout: request_timeout() })
    }

    async fn connect(&self) -> Result<UnixStream, ClientError> {
        UnixStream::connect(&self.socket_path)
            .await
            .map_err(|_| ClientError::NotRunning(self.socket_path.clone()))
    }

    /// Send one request and wait for its reply mapping.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let stream = self.connect().await?;
        let (mut reader, mut writer) = stream.into_split();

        let raw = RawRequest { method: method.to_string(), params };
        write_message(&mut writer, &encode(&raw)?).await?;

        match read_frame::<Value, _>(&mut reader, self.timeout).await {
            Ok(reply) => Ok(reply),
            Err(ProtocolError::Timeout) => Err(ClientError::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    /// Send a request that is not answered on success (`manager_stop`,
    /// `manager_kill`). A failure reply may still arrive.
    pub async fn call_no_reply(&self, method: &str, params: Value) -> Result<Option<Value>, ClientError> {
        let stream = self.connect().await?;
        let (mut reader, mut writer) = stream.into_split();

        let raw = RawRequest { method: method.to_string(), params };
        write_message(&mut writer, &encode(&raw)?).await?;

        match read_frame::<Value, _>(&mut reader, self.timeout).await {
            Ok(reply) => Ok(Some(reply)),
            Err(ProtocolError::ConnectionClosed) | Err(ProtocolError::Timeout) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
