// src/lock/mod.rs

//! File-backed locks used by the agent.
//!
//! - [`run_lock`] holds the cross-process advisory lock that keeps two agent
//!   processes on one node from running the client at the same time.
//! - [`disabler`] manages the administrative "disabled" lockfile an operator
//!   drops to pause the agent.

pub mod disabler;
pub mod run_lock;

pub use disabler::Disabler;
pub use run_lock::{RunLock, RunLockGuard};

use std::fs;
use std::path::Path;

use crate::errors::{AgentError, Result};

/// Create the parent directory of a lock path if it is missing.
fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| AgentError::LockError {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}
