// Progress event fan-out for running jobs

use serde::Serialize;
use tokio::sync::broadcast;

use crate::job::{JobKind, JobStatus};

/// Events emitted while jobs and scheduled ticks execute.
///
/// Delivery is fire-and-forget: live subscribers see each event at most
/// once, late subscribers see nothing, and publishing never blocks the
/// emitting job.
#[derive(Debug, Clone, Serialize)]
pub enum ProgressEvent {
    /// A job began driving a device
    JobStarted {
        device_id: String,
        job_id: String,
        kind: JobKind,
        total_commands: usize,
    },

    /// One inspection command finished its drain window
    CommandCompleted {
        device_id: String,
        job_id: String,
        /// 0-100 across the job's command list
        progress: u8,
        /// Which command this was, by its result map coordinates
        category: String,
        name: String,
    },

    /// Terminal event for a job
    JobFinished {
        device_id: String,
        job_id: String,
        status: JobStatus,
        error: Option<String>,
    },

    /// A scheduled tick skipped a device without attempting a connection
    DeviceSkipped {
        device_id: String,
        task_id: String,
        reason: String,
    },

    /// One scheduled tick finished iterating its device list
    BatchSummary {
        task_id: String,
        attempted: usize,
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Broadcast sender for progress events
#[derive(Clone)]
pub struct ProgressBroadcaster {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressBroadcaster {
    /// Create a broadcaster with the given per-subscriber buffer depth.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        ProgressBroadcaster { tx }
    }

    /// Subscribe a live observer. No replay of earlier events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Never fails, never blocks; a send with no
    /// subscribers is silently dropped.
    pub fn publish(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit a job started event
    pub fn job_started(&self, device_id: String, job_id: String, kind: JobKind, total: usize) {
        self.publish(ProgressEvent::JobStarted {
            device_id,
            job_id,
            kind,
            total_commands: total,
        });
    }

    /// Emit a command completed event
    pub fn command_completed(
        &self,
        device_id: String,
        job_id: String,
        progress: u8,
        category: String,
        name: String,
    ) {
        self.publish(ProgressEvent::CommandCompleted {
            device_id,
            job_id,
            progress,
            category,
            name,
        });
    }

    /// Emit a terminal job event
    pub fn job_finished(
        &self,
        device_id: String,
        job_id: String,
        status: JobStatus,
        error: Option<String>,
    ) {
        self.publish(ProgressEvent::JobFinished {
            device_id,
            job_id,
            status,
            error,
        });
    }

    /// Emit a device skipped event
    pub fn device_skipped(&self, device_id: String, task_id: String, reason: String) {
        self.publish(ProgressEvent::DeviceSkipped {
            device_id,
            task_id,
            reason,
        });
    }

    /// Emit a batch summary event
    pub fn batch_summary(
        &self,
        task_id: String,
        attempted: usize,
        succeeded: usize,
        failed: usize,
        skipped: usize,
    ) {
        self.publish(ProgressEvent::BatchSummary {
            task_id,
            attempted,
            succeeded,
            failed,
            skipped,
        });
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
