// Job types and the per-device run pipeline

pub mod history;
pub mod parse;
pub mod runner;
pub mod storage;

pub use history::{HistoryEntry, HistoryStore};
pub use parse::{BuiltinParser, RawTextParser, ResultParser};
pub use runner::{JobOutcome, JobRunner, RunnerConfig};
pub use storage::{Backup, BackupStore};

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// What a job does against its device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobKind {
    /// Pull the full device configuration and store it as an artifact
    Backup,
    /// Run a list of health commands and parse their output
    Inspection,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Backup => "backup",
            JobKind::Inspection => "inspection",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one run. Terminal states are Success and Failed; there are
/// no internal retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Created,
    Connecting,
    Driving,
    Segmenting,
    Success,
    Failed,
}

/// Outcome classification stored in history and terminal events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Success,
    Failed,
    Skipped,
}

/// One command template to run during an inspection.
///
/// Supplied externally; the engine treats the command text as opaque.
#[derive(Debug, Clone, Serialize)]
pub struct CommandSpec {
    /// Grouping key in the result map, e.g. "CPU"
    pub category: String,
    /// Display name within the category, e.g. "CPU usage"
    pub name: String,
    /// Literal command text sent to the device
    pub command: String,
    /// Optional hint for the result parser rule lookup
    pub parse_hint: Option<String>,
}

impl CommandSpec {
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        CommandSpec {
            category: category.into(),
            name: name.into(),
            command: command.into(),
            parse_hint: None,
        }
    }

    pub fn with_parse_hint(mut self, hint: impl Into<String>) -> Self {
        self.parse_hint = Some(hint.into());
        self
    }
}

/// Output attributed to one executed command.
///
/// Exactly one block exists per executed CommandSpec. Output that could not
/// be located or that cleaned down to nothing is represented by the
/// "No output returned." sentinel in `raw`, never by a missing block.
#[derive(Debug, Clone, Serialize)]
pub struct ResultBlock {
    pub category: String,
    pub name: String,
    /// Structured data when a parser rule matched, otherwise None
    pub data: Option<serde_json::Value>,
    /// Cleaned original text
    pub raw: String,
}

/// Aggregated result of one job: category -> name -> block
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobResult {
    blocks: BTreeMap<String, BTreeMap<String, ResultBlock>>,
}

impl JobResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, block: ResultBlock) {
        self.blocks
            .entry(block.category.clone())
            .or_default()
            .insert(block.name.clone(), block);
    }

    pub fn get(&self, category: &str, name: &str) -> Option<&ResultBlock> {
        self.blocks.get(category).and_then(|m| m.get(name))
    }

    /// Total number of blocks across all categories.
    pub fn len(&self) -> usize {
        self.blocks.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResultBlock> {
        self.blocks.values().flat_map(|m| m.values())
    }
}

/// One end-to-end automation run against one device
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub device_id: String,
    pub kind: JobKind,
    /// Fixed once the run starts
    pub commands: Vec<CommandSpec>,
    pub state: JobState,
}

impl Job {
    pub fn new(device_id: impl Into<String>, kind: JobKind, commands: Vec<CommandSpec>) -> Self {
        Job {
            id: generate_job_id(),
            device_id: device_id.into(),
            kind,
            commands,
            state: JobState::Created,
        }
    }
}

/// Generate a unique job ID
pub(crate) fn generate_job_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis();

    // Use timestamp + random suffix for uniqueness
    let random: u32 = rand::random();
    format!("{:x}_{:x}", now, random)
}
