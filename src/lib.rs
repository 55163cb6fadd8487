// Patrol - Network Device Backup & Inspection Automation
//
// Logs into heterogeneous network equipment over interactive SSH to pull
// configuration backups and run multi-command health inspections, on demand
// or on a cron schedule, unattended.

pub mod device;
pub mod job;
pub mod output;
pub mod schedule;
pub mod session;

pub use device::{Credentials, Device, Vendor, VendorProfile};
pub use job::{
    Backup, CommandSpec, HistoryEntry, HistoryStore, JobKind, JobOutcome, JobResult, JobRunner,
    JobStatus, ResultBlock, ResultParser, RunnerConfig,
};
pub use output::{PatrolError, ProgressBroadcaster, ProgressEvent};
pub use schedule::{Scheduler, SchedulerConfig, TaskInfo};
pub use session::{DriverConfig, SessionDriver, SessionFactory, SshSessionFactory};

/// Version of the Patrol tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::device::{Credentials, Device, Vendor};
    pub use crate::job::{CommandSpec, HistoryStore, JobKind, JobOutcome, JobRunner};
    pub use crate::output::{PatrolError, ProgressBroadcaster, ProgressEvent};
    pub use crate::schedule::{Scheduler, SchedulerConfig};
    pub use crate::session::SshSessionFactory;
}
