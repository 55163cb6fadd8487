// Human-readable error messages for Patrol

use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;

use colored::*;

/// Initialize color output based on TTY detection and NO_COLOR environment variable
fn should_use_colors() -> bool {
    // Check NO_COLOR environment variable first (https://no-color.org/)
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    // Check if stderr is a TTY (errors are typically written to stderr)
    std::io::stderr().is_terminal()
}

/// All error types in Patrol
#[derive(Debug)]
pub enum PatrolError {
    /// TCP/SSH transport could not be established
    Connect {
        device: String,
        message: String,
        suggestion: Option<String>,
    },

    /// Transport came up but the device rejected our credentials
    Auth {
        device: String,
        message: String,
        suggestion: Option<String>,
    },

    /// Shell channel failed after authentication
    Channel { device: String, message: String },

    /// Overall job deadline expired; connection was torn down
    Timeout {
        device: String,
        operation: String,
        duration_secs: u64,
    },

    /// Scheduling errors (invalid cron expression, unknown task)
    Schedule {
        message: String,
        suggestion: Option<String>,
    },

    /// I/O errors (backup artifact storage)
    Io {
        message: String,
        path: Option<PathBuf>,
    },
}

impl PatrolError {
    /// One-line description for history records and progress events, without
    /// the multi-line colored rendering of Display.
    pub fn summary(&self) -> String {
        match self {
            PatrolError::Connect { message, .. } => format!("connect: {}", message),
            PatrolError::Auth { message, .. } => format!("auth: {}", message),
            PatrolError::Channel { message, .. } => format!("channel: {}", message),
            PatrolError::Timeout {
                operation,
                duration_secs,
                ..
            } => format!("timeout: {} after {}s", operation, duration_secs),
            PatrolError::Schedule { message, .. } => format!("schedule: {}", message),
            PatrolError::Io { message, .. } => format!("io: {}", message),
        }
    }

    /// Short classification label used in history records and log fields.
    pub fn class(&self) -> &'static str {
        match self {
            PatrolError::Connect { .. } => "connect",
            PatrolError::Auth { .. } => "auth",
            PatrolError::Channel { .. } => "channel",
            PatrolError::Timeout { .. } => "timeout",
            PatrolError::Schedule { .. } => "schedule",
            PatrolError::Io { .. } => "io",
        }
    }
}

impl std::error::Error for PatrolError {}

impl fmt::Display for PatrolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Set color mode based on TTY detection and NO_COLOR
        let use_colors = should_use_colors();
        if !use_colors {
            colored::control::set_override(false);
        }

        match self {
            PatrolError::Connect {
                device,
                message,
                suggestion,
            } => {
                writeln!(f, "{}: {}", "CONNECT ERROR".red().bold(), message)?;
                writeln!(f, "  {} {}", "Device:".dimmed(), device)?;

                if let Some(suggestion) = suggestion {
                    writeln!(f)?;
                    writeln!(f, "{}: {}", "Hint".yellow().bold(), suggestion)?;
                }

                Ok(())
            }

            PatrolError::Auth {
                device,
                message,
                suggestion,
            } => {
                writeln!(f, "{}: {}", "AUTH ERROR".red().bold(), message)?;
                writeln!(f, "  {} {}", "Device:".dimmed(), device)?;

                if let Some(suggestion) = suggestion {
                    writeln!(f)?;
                    writeln!(f, "{}: {}", "Hint".yellow().bold(), suggestion)?;
                }

                Ok(())
            }

            PatrolError::Channel { device, message } => {
                writeln!(f, "{}: {}", "CHANNEL ERROR".red().bold(), message)?;
                writeln!(f, "  {} {}", "Device:".dimmed(), device)?;
                Ok(())
            }

            PatrolError::Timeout {
                device,
                operation,
                duration_secs,
            } => {
                writeln!(
                    f,
                    "{}: {} timed out after {}s",
                    "TIMEOUT".red().bold(),
                    operation,
                    duration_secs
                )?;
                writeln!(f, "  {} {}", "Device:".dimmed(), device)?;
                Ok(())
            }

            PatrolError::Schedule {
                message,
                suggestion,
            } => {
                writeln!(f, "{}: {}", "SCHEDULE ERROR".red().bold(), message)?;

                if let Some(suggestion) = suggestion {
                    writeln!(f)?;
                    writeln!(f, "{}: {}", "Hint".yellow().bold(), suggestion)?;
                }

                Ok(())
            }

            PatrolError::Io { message, path } => {
                writeln!(f, "{}: {}", "I/O ERROR".red().bold(), message)?;
                if let Some(path) = path {
                    writeln!(f, "  {} {}", "Path:".dimmed(), path.display())?;
                }
                Ok(())
            }
        }
    }
}

/// Suggest common fixes for connection-level failures
pub fn connect_suggestion(e: &std::io::Error) -> Option<String> {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Some("Ensure SSH is enabled on the device management interface".to_string())
        }
        std::io::ErrorKind::TimedOut => {
            Some("Check network connectivity and firewall rules".to_string())
        }
        std::io::ErrorKind::PermissionDenied => {
            Some("Check management-plane ACLs on the device".to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        let err = PatrolError::Auth {
            device: "core-sw-01".to_string(),
            message: "Authentication failed".to_string(),
            suggestion: Some("Verify the device username and password".to_string()),
        };

        let output = format!("{}", err);
        // Strip ANSI codes for comparison
        let clean_output = console::strip_ansi_codes(&output);

        assert!(clean_output.contains("Authentication failed"));
        assert!(clean_output.contains("core-sw-01"));
        assert!(clean_output.contains("Verify the device"));
    }

    #[test]
    fn test_error_class_labels() {
        let err = PatrolError::Timeout {
            device: "edge-rt-02".to_string(),
            operation: "backup job".to_string(),
            duration_secs: 120,
        };
        assert_eq!(err.class(), "timeout");

        let err = PatrolError::Schedule {
            message: "bad cron".to_string(),
            suggestion: None,
        };
        assert_eq!(err.class(), "schedule");
    }
}
