use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Lifecycle of one resource within a pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    NotStarted,
    Extracting,
    Normalizing,
    Loading,
    Done,   // terminal
    Failed, // terminal
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal pipeline state transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: PipelineState,
    pub to: PipelineState,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::NotStarted => "not_started",
            PipelineState::Extracting => "extracting",
            PipelineState::Normalizing => "normalizing",
            PipelineState::Loading => "loading",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (NotStarted, Extracting)
            | (Extracting, Normalizing)
            | (Normalizing, Loading)
            | (Loading, Done) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }

    pub fn transition(self, next: PipelineState) -> Result<PipelineState, IllegalTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        PipelineState::NotStarted
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    #[test]
    fn test_happy_path() {
        let mut state = PipelineState::default();
        for next in [Extracting, Normalizing, Loading, Done] {
            state = state.transition(next).unwrap();
        }
        assert_eq!(state, Done);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_failed_reachable_from_every_non_terminal_state() {
        for state in [NotStarted, Extracting, Normalizing, Loading] {
            assert_eq!(state.transition(Failed), Ok(Failed));
        }
        assert!(Done.transition(Failed).is_err());
        assert!(Failed.transition(Failed).is_err());
    }

    #[test]
    fn test_skipping_or_reversing_is_rejected() {
        assert_eq!(
            NotStarted.transition(Loading),
            Err(IllegalTransition {
                from: NotStarted,
                to: Loading
            })
        );
        assert!(Loading.transition(Extracting).is_err());
        assert!(Done.transition(NotStarted).is_err());
    }
}
