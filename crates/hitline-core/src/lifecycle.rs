use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Lifecycle state of the single active session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Idle,
    Configuring,
    Launching,
    Running,
    Stopping,
    Finalizing,
    Completed,
    Error,
}

impl Lifecycle {
    pub const ALL: [Lifecycle; 8] = [
        Lifecycle::Idle,
        Lifecycle::Configuring,
        Lifecycle::Launching,
        Lifecycle::Running,
        Lifecycle::Stopping,
        Lifecycle::Finalizing,
        Lifecycle::Completed,
        Lifecycle::Error,
    ];

    /// States reachable from `self` in one step.
    pub const fn allowed_transitions(self) -> &'static [Lifecycle] {
        match self {
            Self::Idle => &[Self::Configuring],
            Self::Configuring => &[Self::Launching, Self::Idle, Self::Error],
            Self::Launching => &[Self::Running, Self::Stopping, Self::Error],
            Self::Running => &[Self::Stopping, Self::Error],
            Self::Stopping => &[Self::Finalizing, Self::Error],
            Self::Finalizing => &[Self::Completed, Self::Error],
            Self::Completed => &[Self::Idle],
            Self::Error => &[Self::Idle],
        }
    }

    pub fn can_transition(self, to: Lifecycle) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// Move to `to` if the transition table allows it. Rejected transitions
    /// leave the state untouched.
    pub fn transition(&mut self, to: Lifecycle) -> Result<(), StateError> {
        if !self.can_transition(to) {
            tracing::warn!(from = %self, to = %to, "Rejected lifecycle transition");
            return Err(StateError::InvalidTransition { from: *self, to });
        }
        tracing::debug!(from = %self, to = %to, "Lifecycle transition");
        *self = to;
        Ok(())
    }

    /// Return to `Running` after the finalize computation failed, so the stop
    /// can be retried without losing the session. Only valid while stopping
    /// or finalizing; this is the one move outside the transition table.
    pub fn rollback_to_running(&mut self) -> Result<(), StateError> {
        match self {
            Self::Stopping | Self::Finalizing => {
                tracing::warn!(from = %self, "Rolling lifecycle back to running");
                *self = Self::Running;
                Ok(())
            },
            other => Err(StateError::RollbackNotAllowed(*other)),
        }
    }

    /// Any other state blocks a new start.
    pub const fn accepts_start(self) -> bool {
        matches!(self, Self::Idle | Self::Completed | Self::Error)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Configuring => "configuring",
            Self::Launching => "launching",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[(Lifecycle, &[Lifecycle])] = &[
        (Lifecycle::Idle, &[Lifecycle::Configuring]),
        (
            Lifecycle::Configuring,
            &[Lifecycle::Launching, Lifecycle::Idle, Lifecycle::Error],
        ),
        (
            Lifecycle::Launching,
            &[Lifecycle::Running, Lifecycle::Stopping, Lifecycle::Error],
        ),
        (Lifecycle::Running, &[Lifecycle::Stopping, Lifecycle::Error]),
        (Lifecycle::Stopping, &[Lifecycle::Finalizing, Lifecycle::Error]),
        (Lifecycle::Finalizing, &[Lifecycle::Completed, Lifecycle::Error]),
        (Lifecycle::Completed, &[Lifecycle::Idle]),
        (Lifecycle::Error, &[Lifecycle::Idle]),
    ];

    #[test]
    fn every_pair_matches_the_table() {
        for &(from, allowed) in TABLE {
            for to in Lifecycle::ALL {
                let mut state = from;
                let result = state.transition(to);
                if allowed.contains(&to) {
                    assert!(result.is_ok(), "{from} -> {to} should be allowed");
                    assert_eq!(state, to);
                } else {
                    assert_eq!(
                        result,
                        Err(StateError::InvalidTransition { from, to }),
                        "{from} -> {to} should be rejected"
                    );
                    assert_eq!(state, from, "rejected transition must not mutate");
                }
            }
        }
    }

    #[test]
    fn happy_path_reaches_idle_again() {
        let mut state = Lifecycle::Idle;
        for next in [
            Lifecycle::Configuring,
            Lifecycle::Launching,
            Lifecycle::Running,
            Lifecycle::Stopping,
            Lifecycle::Finalizing,
            Lifecycle::Completed,
            Lifecycle::Idle,
        ] {
            state.transition(next).unwrap();
        }
        assert_eq!(state, Lifecycle::Idle);
    }

    #[test]
    fn rollback_only_from_stopping_or_finalizing() {
        for from in Lifecycle::ALL {
            let mut state = from;
            let result = state.rollback_to_running();
            if matches!(from, Lifecycle::Stopping | Lifecycle::Finalizing) {
                assert!(result.is_ok());
                assert_eq!(state, Lifecycle::Running);
            } else {
                assert_eq!(result, Err(StateError::RollbackNotAllowed(from)));
                assert_eq!(state, from);
            }
        }
    }

    #[test]
    fn start_acceptance() {
        let accepting: Vec<_> = Lifecycle::ALL
            .into_iter()
            .filter(|s| s.accepts_start())
            .collect();
        assert_eq!(
            accepting,
            vec![Lifecycle::Idle, Lifecycle::Completed, Lifecycle::Error]
        );
    }

    #[test]
    fn display_matches_serde_name() {
        for state in Lifecycle::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn any_state() -> impl Strategy<Value = Lifecycle> {
            (0usize..Lifecycle::ALL.len()).prop_map(|i| Lifecycle::ALL[i])
        }

        proptest! {
            #[test]
            fn random_walk_only_follows_table(
                attempts in proptest::collection::vec(any_state(), 1..64),
            ) {
                let mut state = Lifecycle::Idle;
                for to in attempts {
                    let before = state;
                    match state.transition(to) {
                        Ok(()) => prop_assert!(before.can_transition(to)),
                        Err(_) => prop_assert_eq!(state, before),
                    }
                }
            }
        }
    }
}
