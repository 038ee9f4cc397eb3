//! Authenticated session: who is logged in and with which token.
//!
//! Persisted as `session.json` in the data dir so the CLI stays logged in
//! between runs.

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::entities::UserId;
use crate::transport::{Transport, TransportError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub username: String,
}

impl Session {
    /// Log in and install the token on `transport`.
    pub fn login(transport: &dyn Transport, username: &str, password: &str) -> Result<Self, TransportError> {
        let reply = transport.login(username.trim(), password)?;
        transport.set_token(Some(reply.token.clone()));
        info!("Logged in as {} ({})", reply.username, reply.user_id);
        Ok(Self {
            token: reply.token,
            user_id: reply.user_id,
            username: reply.username,
        })
    }

    /// Create an account. Does not log in.
    pub fn register(transport: &dyn Transport, username: &str, password: &str) -> Result<(), TransportError> {
        transport.register(username.trim(), password)?;
        info!("Registered {}", username.trim());
        Ok(())
    }

    /// Install this session's token on `transport`.
    pub fn activate(&self, transport: &dyn Transport) {
        transport.set_token(Some(self.token.clone()));
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let session = serde_json::from_str(&text).with_context(|| format!("Corrupt session file {}", path.display()))?;
        debug!("Session loaded from {}", path.display());
        Ok(Some(session))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Remove a saved session. Missing file is fine.
    pub fn clear(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}
