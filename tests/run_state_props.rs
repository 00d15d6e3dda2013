// tests/run_state_props.rs

use std::time::Duration;

use proptest::prelude::*;

use nodeagent::agent::Splay;
use nodeagent::config::parse_duration;
use nodeagent::state::{ApplicationState, RunStateController};

fn state_with(stop: bool, restart: bool, interrupt: bool) -> ApplicationState {
    let state = ApplicationState::new();
    if stop {
        state.request_stop();
    }
    if restart {
        state.request_restart();
    }
    if interrupt {
        state.interrupt();
    }
    state
}

proptest! {
    #[test]
    fn work_runs_only_when_state_is_clear(stop: bool, restart: bool, interrupt: bool) {
        let state = state_with(stop, restart, interrupt);
        let controller: &dyn RunStateController = &state;

        let mut invoked = false;
        let result = controller.controlled_run(|| {
            invoked = true;
            7
        });

        let clear = !stop && !restart && !interrupt;
        prop_assert_eq!(invoked, clear);
        prop_assert_eq!(result, clear.then_some(7));
        prop_assert_eq!(controller.run_status().is_clear(), clear);
    }

    #[test]
    fn stopping_and_restart_are_mutually_exclusive(stop: bool, restart: bool, interrupt: bool) {
        let state = state_with(stop, restart, interrupt);

        prop_assert_eq!(state.stopping(), stop);
        prop_assert_eq!(state.needing_restart(), restart && !stop);
        prop_assert!(!(state.stopping() && state.needing_restart()));
    }

    #[test]
    fn splay_delay_never_exceeds_the_limit(limit_secs in 0u64..100_000, pick in any::<u64>()) {
        let splay = Splay::new(true, Duration::from_secs(limit_secs))
            .with_draw(move |bound| pick % bound);

        prop_assert!(splay.delay() <= Duration::from_secs(limit_secs));
    }

    #[test]
    fn bare_numbers_parse_as_seconds(n in 0u64..10_000_000) {
        prop_assert_eq!(parse_duration(&n.to_string()), Ok(Duration::from_secs(n)));
        prop_assert_eq!(parse_duration(&format!("{n}m")), Ok(Duration::from_secs(n * 60)));
    }
}
