use serde::Serialize;

use super::RecordingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordingState {
    Idle,
    Recording,
    Processing,
    Complete,
    Failed,
}

impl RecordingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordingState::Complete | RecordingState::Failed)
    }
}

/// State machine for a recording session with validated transitions
pub struct RecordingStateMachine {
    current_state: RecordingState,
}

impl Default for RecordingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: RecordingState::Idle,
        }
    }

    pub fn current(&self) -> RecordingState {
        self.current_state
    }

    /// Validate and perform state transition
    pub fn transition_to(&mut self, new_state: RecordingState) -> Result<(), RecordingError> {
        if !Self::is_valid_transition(self.current_state, new_state) {
            log::error!(
                "[FLOW] Recording transition INVALID: {:?} -> {:?}",
                self.current_state,
                new_state
            );
            return Err(RecordingError::InvalidTransition {
                from: self.current_state,
                to: new_state,
            });
        }

        log::info!(
            "[FLOW] Recording transition: {:?} -> {:?}",
            self.current_state,
            new_state
        );
        let old_state = self.current_state;
        self.current_state = new_state;

        match (old_state, new_state) {
            (RecordingState::Processing, RecordingState::Complete) => {
                log::info!("[FLOW] Recording processed successfully");
            }
            (_, RecordingState::Failed) => {
                log::error!("[FLOW] Recording failed from {:?}", old_state);
            }
            _ => {}
        }

        Ok(())
    }

    fn is_valid_transition(from: RecordingState, to: RecordingState) -> bool {
        matches!(
            (from, to),
            (RecordingState::Idle, RecordingState::Recording)
                | (RecordingState::Recording, RecordingState::Processing)
                | (RecordingState::Recording, RecordingState::Failed)
                | (RecordingState::Processing, RecordingState::Complete)
                | (RecordingState::Processing, RecordingState::Failed)
        )
    }

    pub fn can_start(&self) -> bool {
        matches!(self.current_state, RecordingState::Idle)
    }

    pub fn can_stop(&self) -> bool {
        matches!(self.current_state, RecordingState::Recording)
    }
}
