// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! Client-scoped failures never show up here: the agent logs and contains
//! them. What does show up is either configuration/IO trouble or one of the
//! two process-scoped catastrophes relayed from an isolated child run.

use std::path::PathBuf;

use thiserror::Error;

/// Exit code used when a child run aborted and the parent must follow suit.
pub const ABORT_EXIT_CODE: i32 = -1;

/// Exit code a child uses to report memory exhaustion.
pub const OUT_OF_MEMORY_EXIT_CODE: i32 = -2;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("could not use lock file {path:?}: {source}")]
    LockError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("child run aborted (exit code {0})")]
    ChildAborted(i32),

    #[error("Could not allocate memory")]
    OutOfMemory,

    #[error("could not start child process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    /// Whether this error must take the whole daemon down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::ChildAborted(_) | AgentError::OutOfMemory)
    }

    /// The process exit code the daemon terminates with for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            AgentError::ChildAborted(code) => *code,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Returns true if any error in the chain reports memory exhaustion.
pub fn is_out_of_memory(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return io.kind() == std::io::ErrorKind::OutOfMemory;
        }
        cause
            .downcast_ref::<std::collections::TryReserveError>()
            .is_some()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_carry_their_exit_codes() {
        assert!(AgentError::ChildAborted(ABORT_EXIT_CODE).is_fatal());
        assert_eq!(AgentError::ChildAborted(ABORT_EXIT_CODE).exit_code(), -1);
        assert!(AgentError::OutOfMemory.is_fatal());
        assert_eq!(AgentError::OutOfMemory.exit_code(), 1);
        assert!(!AgentError::ConfigError("bad".into()).is_fatal());
    }

    #[test]
    fn detects_out_of_memory_in_chain() {
        let oom = std::io::Error::new(std::io::ErrorKind::OutOfMemory, "no pages");
        let err = anyhow::Error::new(oom).context("building catalog");
        assert!(is_out_of_memory(&err));

        let reserve = Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err();
        assert!(is_out_of_memory(&anyhow::Error::new(reserve)));

        assert!(!is_out_of_memory(&anyhow::anyhow!("plain failure")));
    }
}
