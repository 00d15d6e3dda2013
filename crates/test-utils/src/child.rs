//! Isolated runs inside test binaries.
//!
//! A test binary cannot re-exec `nodeagent`, so [`TestChildLauncher`] starts
//! the test binary itself, filtered down to one entry test that calls
//! [`child_entry`]. In a normal test run that entry returns at once; in the
//! child it runs a [`FakeClient`](crate::fake_client::FakeClient) through
//! [`Agent::run_as_child`] and exits with the resulting code.
//!
//! ```ignore
//! #[test]
//! fn isolated_child() {
//!     nodeagent_test_utils::child::child_entry();
//! }
//! ```

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

use nodeagent::agent::{Agent, ChildLauncher};
use nodeagent::state::{ApplicationState, RunStateController};

use crate::fake_client::{Behaviour, FakeArgs, FakeFactory};

const BEHAVIOUR_ENV: &str = "NODEAGENT_TEST_CHILD";
const MARKER_ENV: &str = "NODEAGENT_TEST_CHILD_MARKER";
const TAG_ENV: &str = "NODEAGENT_TEST_CHILD_TAG";

/// Launches `<test binary> <entry> --exact` as the child of an isolated run.
#[derive(Debug, Clone)]
pub struct TestChildLauncher {
    exe: PathBuf,
    entry: String,
    behaviour: Behaviour,
    marker: Option<PathBuf>,
}

impl TestChildLauncher {
    /// `entry` names the test in this binary that calls [`child_entry`].
    pub fn new(entry: &str, behaviour: Behaviour) -> Self {
        Self {
            exe: std::env::current_exe().expect("test binary path"),
            entry: entry.to_string(),
            behaviour,
            marker: None,
        }
    }

    /// File the child creates once its client run has started.
    pub fn with_started_marker(mut self, path: impl Into<PathBuf>) -> Self {
        self.marker = Some(path.into());
        self
    }
}

impl ChildLauncher<FakeArgs> for TestChildLauncher {
    fn command(&self, args: &FakeArgs) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.args([self.entry.as_str(), "--exact", "--nocapture", "--test-threads=1"])
            .env(BEHAVIOUR_ENV, self.behaviour.to_env())
            .env_remove(MARKER_ENV)
            .env_remove(TAG_ENV)
            .stdin(Stdio::null())
            .stdout(Stdio::null());
        if let Some(marker) = &self.marker {
            cmd.env(MARKER_ENV, marker);
        }
        if let Some(tag) = &args.tag {
            cmd.env(TAG_ENV, tag);
        }
        cmd
    }
}

/// Body of the entry test. Does nothing unless this process was started by
/// a [`TestChildLauncher`]; then it performs the child run and exits.
pub fn child_entry() {
    let Ok(encoded) = std::env::var(BEHAVIOUR_ENV) else {
        return;
    };
    let behaviour = Behaviour::from_env(&encoded)
        .unwrap_or_else(|| panic!("unknown child behaviour {encoded:?}"));
    crate::init_tracing();

    let lockfile = std::env::temp_dir().join(format!("nodeagent-child-{}.lock", std::process::id()));
    let mut factory = FakeFactory::new(lockfile, behaviour);
    if let Some(marker) = std::env::var_os(MARKER_ENV) {
        factory = factory.with_started_marker(marker);
    }
    let state = Arc::new(ApplicationState::new()) as Arc<dyn RunStateController>;
    let agent = Agent::new(factory, state);
    let args = FakeArgs {
        tag: std::env::var(TAG_ENV).ok(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("child runtime");
    let code = runtime.block_on(agent.run_as_child(args));
    std::process::exit(code);
}
