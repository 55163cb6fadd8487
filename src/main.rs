// Patrol CLI - network device backup & inspection automation

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::*;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use patrol::device::{Credentials, Device, Vendor};
use patrol::job::{CommandSpec, HistoryStore, JobKind, JobOutcome, JobRunner, RunnerConfig};
use patrol::output::{PatrolError, ProgressBroadcaster, ProgressEvent};
use patrol::schedule::{Scheduler, SchedulerConfig};
use patrol::session::SshSessionFactory;

#[derive(Parser)]
#[command(
    name = "patrol",
    about = "Network device backup & inspection automation",
    version,
    disable_colored_help = true,
    term_width = 0,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
#[command(disable_colored_help = true)]
enum Commands {
    /// Pull a configuration backup from one device
    Backup {
        /// Device address (host or host:port)
        host: String,

        /// Login username
        #[arg(short, long)]
        user: String,

        /// Device vendor (huawei, cisco, h3c, generic)
        #[arg(long, default_value = "generic")]
        vendor: Vendor,

        /// Prompt for the password instead of reading PATROL_PASSWORD
        #[arg(long)]
        ask_pass: bool,

        /// Root directory for backup artifacts
        #[arg(short, long, default_value = "backups")]
        output: PathBuf,
    },

    /// Run a health inspection against one device
    Inspect {
        /// Device address (host or host:port)
        host: String,

        /// Login username
        #[arg(short, long)]
        user: String,

        /// Device vendor (huawei, cisco, h3c, generic)
        #[arg(long, default_value = "generic")]
        vendor: Vendor,

        /// Prompt for the password instead of reading PATROL_PASSWORD
        #[arg(long)]
        ask_pass: bool,

        /// Extra check in CATEGORY:NAME:COMMAND form (repeatable)
        #[arg(short = 'c', long = "check")]
        checks: Vec<String>,
    },

    /// Register cron tasks over a device list and run until interrupted
    Watch {
        /// Path to a JSON device list (no passwords; see --ask-pass)
        devices: PathBuf,

        /// Cron expression, seconds first (e.g. '0 0 2 * * *')
        #[arg(long)]
        cron: String,

        /// Job kind: backup or inspection
        #[arg(long, default_value = "backup")]
        kind: String,

        /// Prompt for the shared password instead of reading PATROL_PASSWORD
        #[arg(long)]
        ask_pass: bool,

        /// Root directory for backup artifacts
        #[arg(short, long, default_value = "backups")]
        output: PathBuf,
    },
}

/// Device list entry for `watch`. Passwords are deliberately not part of the
/// file format; they are supplied per process and never persisted.
#[derive(Deserialize)]
struct DeviceSpec {
    name: String,
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    username: String,
    #[serde(default)]
    vendor: Option<String>,
}

fn default_port() -> u16 {
    22
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "patrol=debug" } else { "patrol=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Backup {
            host,
            user,
            vendor,
            ask_pass,
            output,
        } => run_backup(host, user, vendor, ask_pass, output).await,
        Commands::Inspect {
            host,
            user,
            vendor,
            ask_pass,
            checks,
        } => run_inspect(host, user, vendor, ask_pass, checks).await,
        Commands::Watch {
            devices,
            cron,
            kind,
            ask_pass,
            output,
        } => run_watch(devices, cron, kind, ask_pass, output).await,
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run_backup(
    host: String,
    user: String,
    vendor: Vendor,
    ask_pass: bool,
    output: PathBuf,
) -> Result<(), PatrolError> {
    let device = make_device(&host, &user, vendor, ask_pass)?;
    let runner = make_runner(output);

    match runner.run(&device, JobKind::Backup, Vec::new()).await? {
        JobOutcome::Backup(backup) => {
            println!(
                "{} {} ({} bytes)",
                "stored".green().bold(),
                backup.path.display(),
                backup.size
            );
            Ok(())
        }
        JobOutcome::Inspection { .. } => unreachable!("backup job returned inspection outcome"),
    }
}

async fn run_inspect(
    host: String,
    user: String,
    vendor: Vendor,
    ask_pass: bool,
    checks: Vec<String>,
) -> Result<(), PatrolError> {
    let device = make_device(&host, &user, vendor, ask_pass)?;
    let runner = make_runner(PathBuf::from("backups"));

    let mut specs = default_checks(vendor);
    for check in &checks {
        specs.push(parse_check(check)?);
    }

    match runner.run(&device, JobKind::Inspection, specs).await? {
        JobOutcome::Inspection { result, .. } => {
            for block in result.iter() {
                println!(
                    "{} {} {}",
                    format!("[{}]", block.category).cyan(),
                    block.name.bold(),
                    match &block.data {
                        Some(data) => data.to_string().green(),
                        None => "(raw)".dimmed(),
                    }
                );
                for line in block.raw.lines() {
                    println!("    {}", line);
                }
            }
            Ok(())
        }
        JobOutcome::Backup(_) => unreachable!("inspection job returned backup outcome"),
    }
}

async fn run_watch(
    devices_path: PathBuf,
    cron: String,
    kind: String,
    ask_pass: bool,
    output: PathBuf,
) -> Result<(), PatrolError> {
    let kind = match kind.as_str() {
        "backup" => JobKind::Backup,
        "inspection" => JobKind::Inspection,
        other => {
            return Err(PatrolError::Schedule {
                message: format!("Unknown job kind '{}'", other),
                suggestion: Some("Use 'backup' or 'inspection'".to_string()),
            })
        }
    };

    let password = read_password(ask_pass)?;
    let devices = load_devices(&devices_path, &password)?;
    let commands = match kind {
        JobKind::Backup => Vec::new(),
        // Shared command list for the whole task, keyed off the first
        // device's vendor
        JobKind::Inspection => default_checks(
            devices.first().map(|d| d.vendor).unwrap_or(Vendor::Generic),
        ),
    };

    let broadcaster = ProgressBroadcaster::default();
    let history = Arc::new(HistoryStore::new());
    let runner = Arc::new(
        JobRunner::new(Arc::new(SshSessionFactory::new()), history.clone())
            .with_broadcaster(broadcaster.clone())
            .with_config(RunnerConfig {
                backup_root: output,
                ..RunnerConfig::default()
            }),
    );
    let scheduler = Scheduler::new(runner, history, broadcaster.clone())
        .with_config(SchedulerConfig::default());

    let task_id = scheduler.create(&cron, devices, kind, commands)?;
    println!(
        "{} task {} ({}), waiting for cron fires. Ctrl-C to stop.",
        "registered".green().bold(),
        task_id,
        cron
    );

    let mut rx = broadcaster.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => {
                if let Ok(event) = event {
                    render_event(&event);
                }
            }
        }
    }

    scheduler.shutdown();
    println!("{}", "stopped".yellow());
    Ok(())
}

fn render_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::JobStarted {
            device_id, kind, ..
        } => println!("{} {} {}", "start".blue().bold(), kind, device_id),
        ProgressEvent::CommandCompleted {
            device_id,
            progress,
            name,
            ..
        } => println!("  {:>3}% {} {}", progress, device_id.dimmed(), name),
        ProgressEvent::JobFinished {
            device_id,
            status,
            error,
            ..
        } => match error {
            Some(error) => println!("{} {} {}", "failed".red().bold(), device_id, error),
            None => println!("{} {} {:?}", "done".green().bold(), device_id, status),
        },
        ProgressEvent::DeviceSkipped {
            device_id, reason, ..
        } => println!("{} {} {}", "skip".yellow().bold(), device_id, reason),
        ProgressEvent::BatchSummary {
            attempted,
            succeeded,
            failed,
            skipped,
            ..
        } => println!(
            "{} attempted {} ok {} failed {} skipped {}",
            "batch".magenta().bold(),
            attempted,
            succeeded,
            failed,
            skipped
        ),
    }
}

fn make_runner(backup_root: PathBuf) -> JobRunner {
    JobRunner::new(
        Arc::new(SshSessionFactory::new()),
        Arc::new(HistoryStore::new()),
    )
    .with_config(RunnerConfig {
        backup_root,
        ..RunnerConfig::default()
    })
}

fn make_device(
    host: &str,
    user: &str,
    vendor: Vendor,
    ask_pass: bool,
) -> Result<Device, PatrolError> {
    let password = read_password(ask_pass)?;
    let (address, port) = split_host_port(host);

    Ok(Device::new(address.clone())
        .with_vendor(vendor)
        .with_credentials(Credentials::new(address, user, password).with_port(port)))
}

fn split_host_port(host: &str) -> (String, u16) {
    match host.rsplit_once(':') {
        Some((h, p)) => match p.parse() {
            Ok(port) => (h.to_string(), port),
            Err(_) => (host.to_string(), 22),
        },
        None => (host.to_string(), 22),
    }
}

fn read_password(ask_pass: bool) -> Result<String, PatrolError> {
    if ask_pass {
        eprint!("Password: ");
        return rpassword::read_password().map_err(|e| PatrolError::Io {
            message: format!("Failed to read password: {}", e),
            path: None,
        });
    }

    std::env::var("PATROL_PASSWORD").map_err(|_| PatrolError::Auth {
        device: "-".to_string(),
        message: "No password supplied".to_string(),
        suggestion: Some("Pass --ask-pass or set PATROL_PASSWORD".to_string()),
    })
}

fn load_devices(path: &PathBuf, password: &str) -> Result<Vec<Device>, PatrolError> {
    let raw = std::fs::read_to_string(path).map_err(|e| PatrolError::Io {
        message: format!("Failed to read device list: {}", e),
        path: Some(path.clone()),
    })?;

    let specs: Vec<DeviceSpec> = serde_json::from_str(&raw).map_err(|e| PatrolError::Io {
        message: format!("Invalid device list: {}", e),
        path: Some(path.clone()),
    })?;

    Ok(specs
        .into_iter()
        .map(|spec| {
            let vendor = spec
                .vendor
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or(Vendor::Generic);
            Device::new(spec.name)
                .with_vendor(vendor)
                .with_credentials(
                    Credentials::new(spec.host, spec.username, password).with_port(spec.port),
                )
        })
        .collect())
}

fn default_checks(vendor: Vendor) -> Vec<CommandSpec> {
    match vendor {
        Vendor::Huawei | Vendor::H3c => vec![
            CommandSpec::new("CPU", "CPU usage", "display cpu-usage"),
            CommandSpec::new("Memory", "Memory usage", "display memory-usage"),
            CommandSpec::new("System", "Version", "display version"),
        ],
        Vendor::Cisco => vec![
            CommandSpec::new("CPU", "CPU usage", "show processes cpu"),
            CommandSpec::new("System", "Version", "show version"),
        ],
        Vendor::Generic => vec![CommandSpec::new("System", "Version", "show version")],
    }
}

fn parse_check(raw: &str) -> Result<CommandSpec, PatrolError> {
    let mut parts = raw.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(category), Some(name), Some(command))
            if !category.is_empty() && !name.is_empty() && !command.is_empty() =>
        {
            Ok(CommandSpec::new(category, name, command))
        }
        _ => Err(PatrolError::Schedule {
            message: format!("Invalid check '{}'", raw),
            suggestion: Some("Expected CATEGORY:NAME:COMMAND".to_string()),
        }),
    }
}
