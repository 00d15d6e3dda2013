// src/lib.rs

pub mod agent;
pub mod cli;
pub mod client;
pub mod config;
pub mod daemon;
pub mod errors;
pub mod lock;
pub mod logging;
pub mod schedule;
pub mod state;

use std::sync::Arc;

use tracing::{debug, info};

use crate::agent::{Agent, RunOutcome, Splay};
use crate::cli::CliArgs;
use crate::client::{CommandArgs, CommandFactory, ReexecLauncher};
use crate::config::{ConfigFile, default_config_path, load_and_validate};
use crate::daemon::{DaemonExit, run_daemon};
use crate::errors::Result;
use crate::lock::Disabler;
use crate::state::{ApplicationState, RunStateController};

/// What the binary should do once [`run`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Exit the process with this status.
    Code(i32),
    /// Replace the process with a fresh copy of itself.
    Restart,
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the administrative disable lock (`--disable` / `--enable`)
/// - a single foreground run (`--onetime`)
/// - the child side of an isolated run (`--child-run`)
/// - the scheduled daemon with its signal handling
pub async fn run(args: CliArgs) -> Result<Exit> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(Exit::Code(0));
    }

    let disabler = Disabler::new(&cfg.agent.disabled_lockfile);
    if let Some(message) = args.disable.as_deref() {
        disabler.disable(message)?;
        return Ok(Exit::Code(0));
    }
    if args.enable {
        disabler.enable()?;
        return Ok(Exit::Code(0));
    }

    let state = Arc::new(ApplicationState::new());
    let factory = CommandFactory::from_config(&cfg);
    let run_args = CommandArgs {
        job_id: args.job_id.clone(),
    };

    if args.child_run {
        let agent = Agent::new(factory, Arc::clone(&state) as Arc<dyn RunStateController>);
        return Ok(Exit::Code(agent.run_as_child(run_args).await));
    }

    let launcher = ReexecLauncher::current(&config_path)?.with_log_level(args.log_level);
    let mut agent = Agent::from_settings(
        factory,
        Arc::clone(&state) as Arc<dyn RunStateController>,
        &cfg.agent,
    )
    .with_launcher(launcher);
    if args.no_fork {
        agent.set_should_fork(false);
    }

    if args.onetime {
        let agent = agent.with_splay(Splay::disabled());
        let outcome = agent.run(run_args).await?;
        info!(?outcome, "one-time run finished");
        return Ok(Exit::Code(onetime_exit_code(outcome)));
    }

    match run_daemon(Arc::new(agent), state, &cfg.agent, Some(&config_path)).await? {
        DaemonExit::Stopped => Ok(Exit::Code(0)),
        DaemonExit::Restart => Ok(Exit::Restart),
    }
}

/// Exit status of `--onetime`: the client's own status, or 1 when no client
/// ran or it reported nothing.
fn onetime_exit_code(outcome: RunOutcome) -> i32 {
    outcome.exit_status().unwrap_or(1)
}

/// Simple dry-run output: print the effective settings.
fn print_dry_run(cfg: &ConfigFile) {
    let agent = &cfg.agent;
    println!("nodeagent dry-run");
    println!("  agent.runinterval = {:?}", agent.runinterval);
    println!("  agent.splay = {}", agent.splay);
    if agent.splay {
        println!("  agent.splaylimit = {:?}", agent.splaylimit);
    }
    println!("  agent.fork = {}", agent.fork);
    println!("  agent.lockfile = {}", agent.lockfile.display());
    println!("  agent.disabled_lockfile = {}", agent.disabled_lockfile.display());
    if agent.filetimeout.is_zero() {
        println!("  agent.filetimeout = off");
    } else {
        println!("  agent.filetimeout = {:?}", agent.filetimeout);
    }
    println!();

    println!("client:");
    println!("  - {}", cfg.client.name);
    println!("      cmd: {}", cfg.client.cmd);

    debug!("dry-run complete (no execution)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RunStatus;

    #[test]
    fn onetime_exit_code_prefers_client_status() {
        assert_eq!(onetime_exit_code(RunOutcome::Completed(Some(0))), 0);
        assert_eq!(onetime_exit_code(RunOutcome::ChildExited(4)), 4);
        assert_eq!(onetime_exit_code(RunOutcome::Completed(None)), 1);
        assert_eq!(onetime_exit_code(RunOutcome::Disabled), 1);
        assert_eq!(onetime_exit_code(RunOutcome::AlreadyRunning), 1);
        assert_eq!(
            onetime_exit_code(RunOutcome::Skipped(RunStatus::default())),
            1
        );
    }
}
