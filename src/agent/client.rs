// src/agent/client.rs

//! The contract the agent expects from the work it supervises.
//!
//! The agent knows nothing about what a client does. It needs a way to build
//! one (a [`ClientFactory`], the "client class"), the lock path shared by all
//! clients of that kind, and a client that can `run` and optionally `stop`.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

/// Boxed, sendable future used at the trait seams of this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One unit of configuration work.
pub trait Client: Send + Sync + 'static {
    /// Per-run arguments. The scheduler always runs with `Args::default()`.
    type Args: Default + Send + 'static;

    /// Perform the work, returning an optional exit status.
    fn run(&self, args: Self::Args) -> BoxFuture<'_, anyhow::Result<Option<i32>>>;

    /// Ask an in-flight `run` to finish early. Clients that cannot be stopped
    /// ignore this.
    fn stop(&self) {}
}

/// Builds clients of one kind.
pub trait ClientFactory: Send + Sync + 'static {
    type Client: Client;

    /// Name used in log output.
    fn name(&self) -> &str;

    /// Run lock path shared by every client of this kind.
    fn lockfile_path(&self) -> PathBuf;

    fn build(&self) -> anyhow::Result<Self::Client>;
}

/// Argument type of the clients a factory builds.
pub type ClientArgs<F> = <<F as ClientFactory>::Client as Client>::Args;
