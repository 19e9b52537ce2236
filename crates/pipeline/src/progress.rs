use serde::Serialize;
use tracing::info;

use crate::outcome::EntityStatus;

/// Emitted each time an entity reaches a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub entity_index: usize,
    pub completed: usize,
    pub total: usize,
    pub status: EntityStatus,
}

pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Logs every event at INFO.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        info!(
            entity_index = event.entity_index,
            completed = event.completed,
            total = event.total,
            status = %event.status,
            "Entity finished"
        );
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
