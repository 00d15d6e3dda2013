// tests/config_errors.rs

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::NamedTempFile;

use nodeagent::config::load_and_validate;
use nodeagent::errors::AgentError;
use nodeagent_test_utils::builders::AgentConfigBuilder;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn minimal_config_gets_defaults() {
    let file = config_file(
        r#"
[client]
cmd = "echo applying"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.agent.runinterval, Duration::from_secs(30 * 60));
    assert_eq!(cfg.agent.splaylimit, cfg.agent.runinterval);
    assert!(!cfg.agent.splay);
    assert!(cfg.agent.fork);
    assert_eq!(cfg.agent.filetimeout, Duration::from_secs(15));
    assert_eq!(
        cfg.agent.lockfile,
        PathBuf::from("/var/run/nodeagent/agent_catalog_run.lock")
    );
    assert_eq!(cfg.client.name, "apply");
}

#[test]
fn explicit_agent_section_is_parsed() {
    let file = config_file(
        r#"
[agent]
runinterval = "2h"
splay = true
splaylimit = "90s"
fork = false
lockfile = "/tmp/na/run.lock"
disabled_lockfile = "/tmp/na/disabled.lock"
filetimeout = "0s"

[client]
name = "puppet"
cmd = "puppet apply site.pp"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.agent.runinterval, Duration::from_secs(7200));
    assert!(cfg.agent.splay);
    assert_eq!(cfg.agent.splaylimit, Duration::from_secs(90));
    assert!(!cfg.agent.fork);
    assert!(cfg.agent.filetimeout.is_zero());
    assert_eq!(cfg.client.name, "puppet");
}

#[test]
fn missing_client_section_is_a_toml_error() {
    let file = config_file(
        r#"
[agent]
runinterval = "30m"
"#,
    );

    match load_and_validate(file.path()) {
        Err(AgentError::TomlError(_)) => {}
        other => panic!("Expected TomlError, got: {:?}", other),
    }
}

#[test]
fn bad_duration_names_the_setting() {
    let file = config_file(
        r#"
[agent]
runinterval = "soon"

[client]
cmd = "true"
"#,
    );

    match load_and_validate(file.path()) {
        Err(AgentError::ConfigError(msg)) => assert!(msg.contains("runinterval"), "{msg}"),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
fn shared_lock_paths_are_rejected() {
    let file = config_file(
        r#"
[agent]
lockfile = "/tmp/na/same.lock"
disabled_lockfile = "/tmp/na/same.lock"

[client]
cmd = "true"
"#,
    );

    match load_and_validate(file.path()) {
        Err(AgentError::ConfigError(msg)) => assert!(msg.contains("must differ"), "{msg}"),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
fn empty_command_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let raw = AgentConfigBuilder::new(dir.path()).client("apply", "  ").raw();

    assert!(matches!(
        nodeagent::config::ConfigFile::try_from(raw),
        Err(AgentError::ConfigError(_))
    ));
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("absent.toml"), "{err}");
}
