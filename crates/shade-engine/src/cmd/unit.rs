use crate::error::{EngineError, EngineResult};
use crate::sync::FenceValue;

use super::list::CommandList;

/// Lifecycle of a [`RecordingUnit`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RecordingState {
    /// Safe to reset.
    Idle,
    /// Commands are being appended.
    Recording,
    /// Ready for submission.
    Closed,
    /// Owned by the GPU until the fence reaches the contained value.
    Submitted(FenceValue),
}

/// Allocator + list pair used to build one package of GPU commands.
///
/// The list storage is reused across resets. A reset while the last submission
/// is still unsignaled is refused.
#[derive(Debug)]
pub struct RecordingUnit {
    list: CommandList,
    state: RecordingState,
    resets: u64,
}

impl RecordingUnit {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            list: CommandList::new(label),
            state: RecordingState::Idle,
            resets: 0,
        }
    }

    pub fn label(&self) -> &str {
        self.list.label()
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Number of successful resets since creation.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Fence value of the outstanding submission, if any.
    pub fn pending(&self) -> Option<FenceValue> {
        match self.state {
            RecordingState::Submitted(v) => Some(v),
            _ => None,
        }
    }

    pub fn list(&self) -> &CommandList {
        &self.list
    }

    /// Moves a retired submission back to `Idle`. Returns whether the unit is now idle.
    pub fn retire(&mut self, completed: FenceValue) -> bool {
        match self.state {
            RecordingState::Submitted(v) if completed >= v => {
                self.state = RecordingState::Idle;
                true
            }
            RecordingState::Idle => true,
            _ => false,
        }
    }

    /// Clears the list and starts recording.
    ///
    /// `completed` is the timeline's current completed value. Resetting an
    /// abandoned recording (or a closed list that never got submitted) is allowed.
    pub fn reset(&mut self, completed: FenceValue) -> EngineResult<&mut CommandList> {
        if let RecordingState::Submitted(pending) = self.state {
            if completed < pending {
                return Err(EngineError::UnitInFlight {
                    label: self.label().to_owned(),
                    pending,
                    completed,
                });
            }
        }

        if matches!(self.state, RecordingState::Recording | RecordingState::Closed) {
            log::debug!(
                "recording unit `{}` discards {} unsubmitted commands",
                self.label(),
                self.list.len()
            );
        }

        self.list.clear();
        self.state = RecordingState::Recording;
        self.resets += 1;
        Ok(&mut self.list)
    }

    /// The list being recorded.
    pub fn recording(&mut self) -> EngineResult<&mut CommandList> {
        self.expect_state(RecordingState::Recording, "recording")?;
        Ok(&mut self.list)
    }

    pub fn close(&mut self) -> EngineResult<&CommandList> {
        self.expect_state(RecordingState::Recording, "recording")?;
        self.state = RecordingState::Closed;
        Ok(&self.list)
    }

    /// Closed list handed to the queue. `marker` retires it.
    pub fn mark_submitted(&mut self, marker: FenceValue) -> EngineResult<()> {
        self.expect_state(RecordingState::Closed, "closed")?;
        self.state = RecordingState::Submitted(marker);
        Ok(())
    }

    fn expect_state(&self, expected: RecordingState, name: &'static str) -> EngineResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EngineError::RecordingState {
                label: self.label().to_owned(),
                expected: name,
                found: self.state,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    fn fv(v: u64) -> FenceValue {
        FenceValue::new(v)
    }

    fn submitted(marker: u64) -> RecordingUnit {
        let mut unit = RecordingUnit::new("unit");
        unit.reset(FenceValue::ZERO).unwrap();
        unit.close().unwrap();
        unit.mark_submitted(fv(marker)).unwrap();
        unit
    }

    #[test]
    fn full_cycle() {
        let mut unit = RecordingUnit::new("main");
        assert_eq!(unit.state(), RecordingState::Idle);

        unit.reset(FenceValue::ZERO).unwrap().draw_indexed(3, 1);
        assert_eq!(unit.state(), RecordingState::Recording);

        assert_eq!(unit.close().unwrap().len(), 1);
        unit.mark_submitted(fv(1)).unwrap();
        assert_eq!(unit.pending(), Some(fv(1)));

        assert!(unit.retire(fv(1)));
        assert_eq!(unit.state(), RecordingState::Idle);
    }

    #[test]
    fn reset_refused_while_in_flight() {
        let mut unit = submitted(5);
        let err = unit.reset(fv(4)).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Usage);
        assert!(matches!(err, EngineError::UnitInFlight { pending, .. } if pending == fv(5)));
        assert_eq!(unit.state(), RecordingState::Submitted(fv(5)));
        assert_eq!(unit.resets(), 1);
    }

    #[test]
    fn reset_allowed_once_signaled() {
        let mut unit = submitted(5);
        unit.reset(fv(5)).unwrap();
        assert_eq!(unit.state(), RecordingState::Recording);
        assert!(unit.list().is_empty());
    }

    #[test]
    fn retire_keeps_unsignaled_submission() {
        let mut unit = submitted(2);
        assert!(!unit.retire(fv(1)));
        assert_eq!(unit.pending(), Some(fv(2)));
    }

    #[test]
    fn out_of_order_calls_are_rejected() {
        let mut unit = RecordingUnit::new("main");
        assert!(unit.close().is_err());
        assert!(unit.recording().is_err());
        assert!(unit.mark_submitted(fv(1)).is_err());

        unit.reset(FenceValue::ZERO).unwrap();
        assert!(unit.mark_submitted(fv(1)).is_err());
    }

    #[test]
    fn abandoned_recording_can_restart() {
        let mut unit = RecordingUnit::new("main");
        unit.reset(FenceValue::ZERO).unwrap().draw_indexed(3, 1);
        let list = unit.reset(FenceValue::ZERO).unwrap();
        assert!(list.is_empty());
        assert_eq!(unit.resets(), 2);
    }
}
