// Per-device job state machine
//
// Composes session driving, segmentation and result parsing into one job
// outcome. Created -> Connecting -> Driving -> Segmenting -> Success|Failed,
// no internal retries; retry policy, if any, belongs to the scheduler tick.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::parse::parse_block;
use super::{
    Backup, BackupStore, BuiltinParser, CommandSpec, HistoryEntry, HistoryStore, Job, JobKind,
    JobResult, JobState, JobStatus, ResultBlock, ResultParser,
};
use crate::device::Device;
use crate::output::errors::PatrolError;
use crate::output::events::ProgressBroadcaster;
use crate::session::{
    clean_output, segment, DriverConfig, SessionDriver, SessionFactory, NO_OUTPUT_SENTINEL,
};

/// Tunables for job execution
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub inspection_driver: DriverConfig,
    pub backup_driver: DriverConfig,
    /// Root directory for backup artifacts, one subdirectory per device
    pub backup_root: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            inspection_driver: DriverConfig::inspection(),
            backup_driver: DriverConfig::backup(),
            backup_root: PathBuf::from("backups"),
        }
    }
}

/// What a successful job produced
#[derive(Debug)]
pub enum JobOutcome {
    Inspection {
        result: JobResult,
        /// Cleaned copy of the full transcript, kept for diagnostics
        raw_log: String,
    },
    Backup(Backup),
}

/// Runs one job at a time against one device
pub struct JobRunner {
    factory: Arc<dyn SessionFactory>,
    parser: Arc<dyn ResultParser>,
    history: Arc<HistoryStore>,
    broadcaster: ProgressBroadcaster,
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(factory: Arc<dyn SessionFactory>, history: Arc<HistoryStore>) -> Self {
        JobRunner {
            factory,
            parser: Arc::new(BuiltinParser),
            history,
            broadcaster: ProgressBroadcaster::default(),
            config: RunnerConfig::default(),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn ResultParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: ProgressBroadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one job to a terminal state. The command list is fixed once the
    /// run starts; backups derive their single command from the vendor
    /// profile and ignore `commands`.
    pub async fn run(
        &self,
        device: &Device,
        kind: JobKind,
        commands: Vec<CommandSpec>,
    ) -> Result<JobOutcome, PatrolError> {
        let specs = match kind {
            JobKind::Backup => vec![CommandSpec::new(
                "Backup",
                "Running Config",
                device.profile().backup_command,
            )],
            JobKind::Inspection => commands,
        };

        let mut job = Job::new(&device.id, kind, specs);
        let total = job.commands.len();
        debug!(job = %job.id, device = %device.name, %kind, total, "job created");
        self.broadcaster
            .job_started(device.id.clone(), job.id.clone(), kind, total);

        job.state = JobState::Connecting;

        let texts: Vec<String> = job.commands.iter().map(|s| s.command.clone()).collect();
        let coords: Vec<(String, String)> = job
            .commands
            .iter()
            .map(|s| (s.category.clone(), s.name.clone()))
            .collect();
        let driver_config = match kind {
            JobKind::Backup => self.config.backup_driver.clone(),
            JobKind::Inspection => self.config.inspection_driver.clone(),
        };
        let profile = device.profile();
        let factory = self.factory.clone();
        let broadcaster = self.broadcaster.clone();
        let target = device.clone();
        let job_id = job.id.clone();
        let device_id = device.id.clone();
        let emit_per_command = kind == JobKind::Inspection;
        let command_texts = texts.clone();

        // ssh2 is blocking; the whole connect-and-drive phase runs on the
        // blocking pool while other jobs proceed on the runtime.
        let driving = tokio::task::spawn_blocking(move || {
            let shell = factory.open(&target)?;
            let driver =
                SessionDriver::new(shell, profile, driver_config, target.name.clone());
            driver.run(&command_texts, &mut |idx| {
                if emit_per_command {
                    let progress = (((idx + 1) * 100) / total) as u8;
                    let (category, name) = coords[idx].clone();
                    broadcaster.command_completed(
                        device_id.clone(),
                        job_id.clone(),
                        progress,
                        category,
                        name,
                    );
                }
            })
        });

        job.state = JobState::Driving;
        let transcript = match driving.await {
            Ok(Ok(transcript)) => transcript,
            Ok(Err(e)) => return self.fail(&mut job, device, e),
            Err(join_err) => {
                let e = PatrolError::Channel {
                    device: device.name.clone(),
                    message: format!("Session task failed: {}", join_err),
                };
                return self.fail(&mut job, device, e);
            }
        };

        job.state = JobState::Segmenting;
        let blocks = segment(&transcript, &texts, profile);

        match kind {
            JobKind::Inspection => {
                let mut result = JobResult::new();
                for (spec, block) in job.commands.iter().zip(blocks) {
                    let data = if block == NO_OUTPUT_SENTINEL {
                        None
                    } else {
                        let rule_key = spec.parse_hint.as_deref().unwrap_or(&spec.command);
                        parse_block(self.parser.as_ref(), device.vendor, rule_key, &block)
                    };
                    result.insert(ResultBlock {
                        category: spec.category.clone(),
                        name: spec.name.clone(),
                        data,
                        raw: block,
                    });
                }

                let raw_log = clean_output(&transcript, profile);

                job.state = JobState::Success;
                info!(job = %job.id, device = %device.name, blocks = result.len(), "inspection finished");
                self.history
                    .append(&device.id, HistoryEntry::success(&job.id, result.clone()));
                self.broadcaster.job_finished(
                    device.id.clone(),
                    job.id.clone(),
                    JobStatus::Success,
                    None,
                );

                Ok(JobOutcome::Inspection { result, raw_log })
            }

            JobKind::Backup => {
                let block = blocks.into_iter().next().unwrap_or_default();
                let content = if block == NO_OUTPUT_SENTINEL {
                    String::new()
                } else {
                    block
                };

                let store = BackupStore::new(&self.config.backup_root);
                let backup = match store.store(&device.name, &content) {
                    Ok(backup) => backup,
                    Err(e) => return self.fail(&mut job, device, e),
                };

                let mut result = JobResult::new();
                result.insert(ResultBlock {
                    category: "Backup".to_string(),
                    name: "Running Config".to_string(),
                    data: serde_json::to_value(&backup).ok(),
                    raw: format!("stored {} ({} bytes)", backup.filename, backup.size),
                });

                job.state = JobState::Success;
                info!(job = %job.id, device = %device.name, size = backup.size, "backup stored");
                self.history
                    .append(&device.id, HistoryEntry::success(&job.id, result));
                self.broadcaster.job_finished(
                    device.id.clone(),
                    job.id.clone(),
                    JobStatus::Success,
                    None,
                );

                Ok(JobOutcome::Backup(backup))
            }
        }
    }

    fn fail(
        &self,
        job: &mut Job,
        device: &Device,
        error: PatrolError,
    ) -> Result<JobOutcome, PatrolError> {
        job.state = JobState::Failed;
        warn!(job = %job.id, device = %device.name, class = error.class(), "job failed");
        self.history
            .append(&device.id, HistoryEntry::failed(&job.id, error.summary()));
        self.broadcaster.job_finished(
            device.id.clone(),
            job.id.clone(),
            JobStatus::Failed,
            Some(error.summary()),
        );
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Credentials, Vendor};
    use crate::output::events::ProgressEvent;
    use crate::session::testing::{ScriptedFactory, ScriptedShell};
    use std::time::Duration;

    fn fast_config(backup_root: PathBuf) -> RunnerConfig {
        let fast = DriverConfig {
            ready_timeout: Duration::from_millis(200),
            inter_command_delay: Duration::from_millis(20),
            quiet_window: Duration::from_millis(30),
            overall_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(1),
        };
        RunnerConfig {
            inspection_driver: fast.clone(),
            backup_driver: fast,
            backup_root,
        }
    }

    fn test_device() -> Device {
        Device::new("sw1")
            .with_vendor(Vendor::Huawei)
            .with_credentials(Credentials::new("192.0.2.1", "admin", "pw"))
    }

    fn inspection_specs() -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("CPU", "CPU usage", "display cpu-usage"),
            CommandSpec::new("Time", "Clock", "display clock"),
        ]
    }

    #[tokio::test]
    async fn test_inspection_produces_one_block_per_command() {
        let factory = ScriptedFactory::new(|_| {
            Ok(Box::new(ScriptedShell::with_chunks(vec![
                "<sw1>",
                "display cpu-usage\r\nCPU Usage   : 37%\r\n<sw1>",
                "display clock\r\n<sw1>",
            ])))
        });
        let history = Arc::new(HistoryStore::new());
        let runner = JobRunner::new(Arc::new(factory), history.clone())
            .with_config(fast_config(PathBuf::from("unused")));

        let outcome = runner
            .run(&test_device(), JobKind::Inspection, inspection_specs())
            .await
            .unwrap();

        let JobOutcome::Inspection { result, raw_log } = outcome else {
            panic!("expected inspection outcome");
        };

        assert_eq!(result.len(), 2);

        let cpu = result.get("CPU", "CPU usage").unwrap();
        assert_eq!(cpu.data, Some(serde_json::json!({ "usage": 37 })));
        assert!(cpu.raw.contains("CPU Usage"));

        // No output for the clock command: explicit sentinel, never a
        // missing block
        let clock = result.get("Time", "Clock").unwrap();
        assert!(clock.data.is_none());
        assert_eq!(clock.raw, NO_OUTPUT_SENTINEL);

        assert!(raw_log.contains("CPU Usage"));

        let entries = history.get("sw1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, JobStatus::Success);
    }

    #[tokio::test]
    async fn test_inspection_emits_lifecycle_events() {
        let factory = ScriptedFactory::new(|_| {
            Ok(Box::new(ScriptedShell::with_chunks(vec![
                "<sw1>",
                "display cpu-usage\r\nCPU Usage   : 12%\r\n<sw1>",
                "display clock\r\n2026-08-05 11:02:33\r\n<sw1>",
            ])))
        });
        let broadcaster = ProgressBroadcaster::new(64);
        let mut rx = broadcaster.subscribe();
        let runner = JobRunner::new(Arc::new(factory), Arc::new(HistoryStore::new()))
            .with_broadcaster(broadcaster)
            .with_config(fast_config(PathBuf::from("unused")));

        runner
            .run(&test_device(), JobKind::Inspection, inspection_specs())
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert!(matches!(
            events.first(),
            Some(ProgressEvent::JobStarted {
                total_commands: 2,
                ..
            })
        ));

        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::CommandCompleted { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![50, 100]);

        assert!(matches!(
            events.last(),
            Some(ProgressEvent::JobFinished {
                status: JobStatus::Success,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_is_terminal_and_recorded() {
        let factory = ScriptedFactory::new(|device| {
            Err(PatrolError::Connect {
                device: device.name.clone(),
                message: "Connection refused".to_string(),
                suggestion: None,
            })
        });
        let opens = factory.open_count();
        let history = Arc::new(HistoryStore::new());
        let broadcaster = ProgressBroadcaster::new(64);
        let mut rx = broadcaster.subscribe();
        let runner = JobRunner::new(Arc::new(factory), history.clone())
            .with_broadcaster(broadcaster)
            .with_config(fast_config(PathBuf::from("unused")));

        let err = runner
            .run(&test_device(), JobKind::Inspection, inspection_specs())
            .await
            .unwrap_err();

        assert_eq!(err.class(), "connect");
        // Exactly one attempt, no retry inside the job
        assert_eq!(opens.load(std::sync::atomic::Ordering::SeqCst), 1);

        let entries = history.get("sw1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, JobStatus::Failed);
        assert!(entries[0].error.as_deref().unwrap().contains("connect"));

        let mut saw_failed_terminal = false;
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::JobFinished { status, error, .. } = event {
                assert_eq!(status, JobStatus::Failed);
                assert!(error.unwrap().contains("Connection refused"));
                saw_failed_terminal = true;
            }
        }
        assert!(saw_failed_terminal);
    }

    #[tokio::test]
    async fn test_backup_without_trailing_prompt_stores_cleaned_text() {
        let dir = tempfile::tempdir().unwrap();
        // The dump just stops: no prompt, no terminator. Only the quiet
        // window ends the run.
        let factory = ScriptedFactory::new(|_| {
            Ok(Box::new(ScriptedShell::with_chunks(vec![
                "<sw1>",
                "display current-configuration\r\nsysname sw1\r\n#\r\nreturn\r\n",
            ])))
        });
        let history = Arc::new(HistoryStore::new());
        let runner = JobRunner::new(Arc::new(factory), history.clone())
            .with_config(fast_config(dir.path().to_path_buf()));

        let outcome = runner
            .run(&test_device(), JobKind::Backup, Vec::new())
            .await
            .unwrap();

        let JobOutcome::Backup(backup) = outcome else {
            panic!("expected backup outcome");
        };

        let stored = std::fs::read_to_string(&backup.path).unwrap();
        assert_eq!(backup.size, stored.len() as u64);
        assert!(stored.contains("sysname sw1"));
        assert!(!stored.contains("display current-configuration"));

        assert_eq!(history.get("sw1")[0].status, JobStatus::Success);
    }
}
