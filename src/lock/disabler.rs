// src/lock/disabler.rs

//! Administrative disable lock.
//!
//! An operator disables the agent by creating this file, optionally with a
//! reason. While it exists every run is skipped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{AgentError, Result};

use super::ensure_parent_dir;

#[derive(Debug, Serialize, Deserialize)]
struct DisableRecord {
    disabled_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disabler {
    path: PathBuf,
}

impl Disabler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn disabled(&self) -> bool {
        self.path.exists()
    }

    /// Disable the agent, recording `message` as the reason.
    pub fn disable(&self, message: &str) -> Result<()> {
        ensure_parent_dir(&self.path)?;
        let record = DisableRecord {
            disabled_message: message.to_string(),
        };
        let json = serde_json::to_vec(&record).map_err(anyhow::Error::from)?;
        fs::write(&self.path, json).map_err(|source| AgentError::LockError {
            path: self.path.clone(),
            source,
        })?;
        info!(lockfile = %self.path.display(), reason = %message, "agent disabled");
        Ok(())
    }

    /// Re-enable the agent. Enabling an enabled agent is a no-op.
    pub fn enable(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(lockfile = %self.path.display(), "agent enabled");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AgentError::LockError {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// The recorded reason, if the agent is disabled.
    ///
    /// Lock files written without a reason (or by hand) yield an empty
    /// message rather than `None`.
    pub fn disable_message(&self) -> Option<String> {
        let contents = fs::read(&self.path).ok()?;
        match serde_json::from_slice::<DisableRecord>(&contents) {
            Ok(record) => Some(record.disabled_message),
            Err(e) => {
                if !contents.is_empty() {
                    warn!(lockfile = %self.path.display(), error = %e, "unreadable disable lock");
                }
                Some(String::new())
            }
        }
    }
}
