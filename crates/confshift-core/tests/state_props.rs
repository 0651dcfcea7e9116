use confshift_core::{allowed_transitions, validate_transition, RunState};
use proptest::prelude::*;

fn any_state() -> impl Strategy<Value = RunState> {
    prop_oneof![
        Just(RunState::Idle),
        Just(RunState::Discover),
        (0usize..8).prop_map(RunState::ExecuteUnit),
        Just(RunState::Commit),
        Just(RunState::Abort),
        Just(RunState::Done),
    ]
}

proptest! {
    #[test]
    fn allowed_transitions_validate(from in any_state()) {
        for to in allowed_transitions(from) {
            prop_assert!(validate_transition(from, to).is_ok());
        }
    }

    #[test]
    fn validate_agrees_with_allowed(from in any_state(), to in any_state()) {
        let allowed = allowed_transitions(from).contains(&to);
        prop_assert_eq!(validate_transition(from, to).is_ok(), allowed);
    }

    #[test]
    fn every_walk_can_finish(path in prop::collection::vec(0usize..3, 0..12)) {
        // Follow arbitrary legal choices; Done must stay reachable
        let mut state = RunState::Idle;
        for choice in path {
            let next = allowed_transitions(state);
            if next.is_empty() {
                break;
            }
            state = next[choice % next.len()];
        }
        let mut steps = 0;
        while state != RunState::Done {
            let next = allowed_transitions(state);
            prop_assert!(!next.is_empty());
            state = *next.iter().find(|s| matches!(s, RunState::Abort | RunState::Done)).unwrap_or(&next[0]);
            steps += 1;
            prop_assert!(steps < 4);
        }
    }
}

#[test]
fn test_done_is_terminal() {
    assert!(allowed_transitions(RunState::Done).is_empty());
    assert!(validate_transition(RunState::Done, RunState::Abort).is_err());
}
