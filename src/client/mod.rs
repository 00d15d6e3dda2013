// src/client/mod.rs

//! Concrete clients shipped with the agent.
//!
//! The agent itself is generic over [`ClientFactory`](crate::agent::ClientFactory);
//! the daemon binary uses [`CommandFactory`], which runs the configured shell
//! command as the unit of work, isolated through [`ReexecLauncher`] when
//! forking is on.

pub mod command;
pub mod reexec;

pub use command::{CommandArgs, CommandClient, CommandFactory};
pub use reexec::ReexecLauncher;
