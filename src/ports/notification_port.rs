//! Notification delivery port trait.

use crate::domain::error::AlertEngineError;
use crate::domain::trigger_manager::FiredEvent;

/// Port for delivering fired events to the outside world.
pub trait NotificationPort {
    fn dispatch(&mut self, event: &FiredEvent) -> Result<(), AlertEngineError>;

    /// Default implementation: dispatches one event at a time, stopping at the first failure.
    fn dispatch_all(&mut self, events: &[FiredEvent]) -> Result<(), AlertEngineError> {
        events.iter().try_for_each(|event| self.dispatch(event))
    }
}
