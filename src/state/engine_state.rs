//! Engine lifecycle states
//!
//! `Idle → Running ⇄ Paused`, `Running → Error`, `Error → Idle`, and `start()` is accepted
//! from `Idle`, `Paused` and `Error`.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current lifecycle state of the crawl engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Not crawling; either never started or disabled on boot
    Idle,

    /// The scheduler loop is active
    Running,

    /// Stopped by an operator after the in-flight batch was persisted
    Paused,

    /// Stopped by an unrecoverable condition (e.g. the position could not be persisted)
    Error,
}

impl EngineState {
    /// Returns true if `start()` may move the engine to `Running` from this state
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Paused | Self::Error)
    }

    /// Checks whether moving from this state to `to` is a legal transition
    pub fn can_transition_to(&self, to: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, to),
            (Idle, Running)
                | (Paused, Running)
                | (Error, Running)
                | (Running, Paused)
                | (Running, Error)
                | (Error, Idle)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_is_allowed_from_stopped_states() {
        assert!(EngineState::Idle.can_start());
        assert!(EngineState::Paused.can_start());
        assert!(EngineState::Error.can_start());
        assert!(!EngineState::Running.can_start());
    }

    #[test]
    fn test_legal_transitions() {
        assert!(EngineState::Running.can_transition_to(EngineState::Paused));
        assert!(EngineState::Running.can_transition_to(EngineState::Error));
        assert!(EngineState::Error.can_transition_to(EngineState::Idle));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!EngineState::Idle.can_transition_to(EngineState::Paused));
        assert!(!EngineState::Paused.can_transition_to(EngineState::Error));
        assert!(!EngineState::Idle.can_transition_to(EngineState::Error));
    }

    #[test]
    fn test_serializes_as_snake_case() {
        let json = serde_json::to_string(&EngineState::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }
}
