// Cron-driven batch scheduling
//
// Each task owns a timer loop: sleep until the next cron fire, then run one
// tick over its device list. Devices inside a tick are strictly sequential
// with fixed pacing; distinct tasks run concurrently with no cross-task
// device locking. Nothing here survives a restart.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::job::{generate_job_id, CommandSpec, HistoryEntry, HistoryStore, JobKind, JobRunner};
use crate::output::errors::PatrolError;
use crate::output::events::ProgressBroadcaster;

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause between devices within one tick, bounding load on shared
    /// infrastructure
    pub inter_device_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            inter_device_delay: Duration::from_secs(2),
        }
    }
}

/// Listing view of a registered task
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub id: String,
    pub cron: String,
    pub kind: JobKind,
    pub device_count: usize,
}

struct ScheduledTask {
    info: TaskInfo,
    cancel: Arc<Notify>,
}

/// Everything one tick needs, cloned out of the scheduler so timer loops
/// own their context
#[derive(Clone)]
struct TickContext {
    task_id: String,
    devices: Vec<Device>,
    kind: JobKind,
    commands: Vec<CommandSpec>,
    runner: Arc<JobRunner>,
    history: Arc<HistoryStore>,
    broadcaster: ProgressBroadcaster,
    inter_device_delay: Duration,
}

/// Owns cron tasks and their timer loops
pub struct Scheduler {
    tasks: DashMap<String, ScheduledTask>,
    runner: Arc<JobRunner>,
    history: Arc<HistoryStore>,
    broadcaster: ProgressBroadcaster,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        runner: Arc<JobRunner>,
        history: Arc<HistoryStore>,
        broadcaster: ProgressBroadcaster,
    ) -> Self {
        Scheduler {
            tasks: DashMap::new(),
            runner,
            history,
            broadcaster,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a cron task. The expression is validated eagerly: nothing is
    /// registered and no timer starts on a bad expression.
    pub fn create(
        &self,
        cron_expr: &str,
        devices: Vec<Device>,
        kind: JobKind,
        commands: Vec<CommandSpec>,
    ) -> Result<String, PatrolError> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| PatrolError::Schedule {
            message: format!("Invalid cron expression '{}': {}", cron_expr, e),
            suggestion: Some(
                "Expected seconds-first cron syntax, e.g. '0 0 2 * * *' for 02:00 daily"
                    .to_string(),
            ),
        })?;

        let task_id = generate_job_id();
        let cancel = Arc::new(Notify::new());

        let ctx = TickContext {
            task_id: task_id.clone(),
            devices,
            kind,
            commands,
            runner: self.runner.clone(),
            history: self.history.clone(),
            broadcaster: self.broadcaster.clone(),
            inter_device_delay: self.config.inter_device_delay,
        };

        let info = TaskInfo {
            id: task_id.clone(),
            cron: cron_expr.to_string(),
            kind,
            device_count: ctx.devices.len(),
        };

        info!(task = %task_id, cron = %cron_expr, devices = ctx.devices.len(), %kind, "task registered");

        tokio::spawn(task_loop(schedule, ctx, cancel.clone()));

        self.tasks.insert(task_id.clone(), ScheduledTask { info, cancel });
        Ok(task_id)
    }

    /// Stop a task's timer and remove it. A tick already in flight is
    /// allowed to finish; only future fires are cancelled.
    pub fn delete(&self, task_id: &str) -> Result<(), PatrolError> {
        match self.tasks.remove(task_id) {
            Some((_, task)) => {
                task.cancel.notify_one();
                info!(task = %task_id, "task deleted");
                Ok(())
            }
            None => Err(PatrolError::Schedule {
                message: format!("Unknown task '{}'", task_id),
                suggestion: None,
            }),
        }
    }

    /// Registered tasks, in no particular order.
    pub fn list(&self) -> Vec<TaskInfo> {
        self.tasks.iter().map(|t| t.info.clone()).collect()
    }

    /// Run one batch immediately, outside any cron task.
    pub async fn run_batch(
        &self,
        label: &str,
        devices: Vec<Device>,
        kind: JobKind,
        commands: Vec<CommandSpec>,
    ) {
        let ctx = TickContext {
            task_id: label.to_string(),
            devices,
            kind,
            commands,
            runner: self.runner.clone(),
            history: self.history.clone(),
            broadcaster: self.broadcaster.clone(),
            inter_device_delay: self.config.inter_device_delay,
        };
        run_tick(&ctx).await;
    }

    /// Cancel all task timers. In-flight ticks finish on their own.
    pub fn shutdown(&self) {
        for task in self.tasks.iter() {
            task.cancel.notify_one();
        }
        self.tasks.clear();
    }
}

async fn task_loop(schedule: Schedule, ctx: TickContext, cancel: Arc<Notify>) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            debug!(task = %ctx.task_id, "schedule has no future fire times, stopping");
            break;
        };
        let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = cancel.notified() => break,
            _ = tokio::time::sleep(delay) => {
                // The tick itself is never cancelled mid-flight
                run_tick(&ctx).await;
            }
        }
    }
    debug!(task = %ctx.task_id, "timer loop ended");
}

/// One firing: iterate the device list sequentially, record every outcome,
/// then emit a single batch summary. One device's failure never aborts the
/// tick.
async fn run_tick(ctx: &TickContext) {
    info!(task = %ctx.task_id, devices = ctx.devices.len(), kind = %ctx.kind, "tick started");

    let mut attempted = 0usize;
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;

    for (i, device) in ctx.devices.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(ctx.inter_device_delay).await;
        }

        // Credential pre-check: skip with a recorded reason, no connection
        // attempt
        if !device.credentials.is_complete() {
            skipped += 1;
            let reason = "credentials incomplete";
            warn!(task = %ctx.task_id, device = %device.name, "skipping device: {}", reason);
            ctx.history
                .append(&device.id, HistoryEntry::skipped(generate_job_id(), reason));
            ctx.broadcaster.device_skipped(
                device.id.clone(),
                ctx.task_id.clone(),
                reason.to_string(),
            );
            continue;
        }

        attempted += 1;
        match ctx
            .runner
            .run(device, ctx.kind, ctx.commands.clone())
            .await
        {
            Ok(_) => succeeded += 1,
            Err(e) => {
                failed += 1;
                warn!(task = %ctx.task_id, device = %device.name, class = e.class(), "device failed in tick");
            }
        }
    }

    ctx.broadcaster
        .batch_summary(ctx.task_id.clone(), attempted, succeeded, failed, skipped);
    info!(
        task = %ctx.task_id,
        attempted, succeeded, failed, skipped,
        "tick finished"
    );
}
