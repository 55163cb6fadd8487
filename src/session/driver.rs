// Interactive session driver
//
// Drives one fixed command list over one authenticated shell and returns a
// raw transcript. The stream has no explicit terminator: completion is
// detected by pacing windows and an inactivity heuristic, and an overall
// dead-man deadline bounds every run.

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::InteractiveShell;
use crate::device::VendorProfile;
use crate::output::errors::PatrolError;

/// Timing tunables for one session run.
///
/// These are empirically tuned against real devices, not derived values;
/// adjust per deployment rather than treating them as fixed.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// How long to wait for the first inbound data after the shell opens
    pub ready_timeout: Duration,
    /// Drain window after each command write, before the next command
    pub inter_command_delay: Duration,
    /// Inactivity window that declares the final output finished
    pub quiet_window: Duration,
    /// Dead-man deadline for the whole run
    pub overall_timeout: Duration,
    /// Sleep between polls when no data is pending
    pub poll_interval: Duration,
}

impl DriverConfig {
    /// Defaults for multi-command inspections.
    pub fn inspection() -> Self {
        DriverConfig {
            ready_timeout: Duration::from_secs(15),
            inter_command_delay: Duration::from_millis(800),
            quiet_window: Duration::from_secs(2),
            overall_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(10),
        }
    }

    /// Defaults for full-configuration backups. The dump has no reliable
    /// terminator and may paginate unpredictably, so the quiet window is
    /// longer and the deadline generous.
    pub fn backup() -> Self {
        DriverConfig {
            quiet_window: Duration::from_secs(5),
            overall_timeout: Duration::from_secs(120),
            ..Self::inspection()
        }
    }

    pub fn with_quiet_window(mut self, window: Duration) -> Self {
        self.quiet_window = window;
        self
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    pub fn with_inter_command_delay(mut self, delay: Duration) -> Self {
        self.inter_command_delay = delay;
        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::inspection()
    }
}

/// Drives one run over one shell. Consumed by `run`; the shell is closed on
/// every exit path.
pub struct SessionDriver {
    shell: Box<dyn InteractiveShell>,
    profile: &'static VendorProfile,
    config: DriverConfig,
    device: String,
}

impl SessionDriver {
    pub fn new(
        shell: Box<dyn InteractiveShell>,
        profile: &'static VendorProfile,
        config: DriverConfig,
        device: impl Into<String>,
    ) -> Self {
        SessionDriver {
            shell,
            profile,
            config,
            device: device.into(),
        }
    }

    /// Run the command list and return the raw transcript.
    ///
    /// `on_command_done` fires once per command after its drain window, in
    /// supplied order. On failure the partial buffer is diagnostic only and
    /// is never returned as a transcript.
    pub fn run(
        mut self,
        commands: &[String],
        on_command_done: &mut dyn FnMut(usize),
    ) -> Result<String, PatrolError> {
        let deadline = Instant::now() + self.config.overall_timeout;
        let mut buffer: Vec<u8> = Vec::new();

        let result = self.drive(commands, on_command_done, deadline, &mut buffer);

        // Connection and channel are released on every exit path
        self.shell.close();

        match result {
            Ok(()) => Ok(String::from_utf8_lossy(&buffer).into_owned()),
            Err(e) => {
                if !buffer.is_empty() {
                    debug!(
                        device = %self.device,
                        partial_bytes = buffer.len(),
                        "discarding partial transcript after failure"
                    );
                }
                Err(e)
            }
        }
    }

    fn drive(
        &mut self,
        commands: &[String],
        on_command_done: &mut dyn FnMut(usize),
        deadline: Instant,
        buffer: &mut Vec<u8>,
    ) -> Result<(), PatrolError> {
        self.await_ready(deadline, buffer)?;

        for (idx, command) in commands.iter().enumerate() {
            self.check_deadline(deadline)?;

            trace!(device = %self.device, %command, "writing command");
            self.write(command.as_bytes())?;
            self.write(b"\n")?;

            // Fixed pacing between commands so we never race a prompt redraw
            self.drain_for(self.config.inter_command_delay, deadline, buffer)?;
            on_command_done(idx);
        }

        self.drain_until_quiet(deadline, buffer)
    }

    /// First inbound data means the session is ready: there is no uniform
    /// login banner across vendors to match on.
    fn await_ready(&mut self, deadline: Instant, buffer: &mut Vec<u8>) -> Result<(), PatrolError> {
        let started = Instant::now();
        let mut chunk = [0u8; 4096];

        loop {
            self.check_deadline(deadline)?;

            if started.elapsed() >= self.config.ready_timeout {
                return Err(PatrolError::Timeout {
                    device: self.device.clone(),
                    operation: "session ready".to_string(),
                    duration_secs: self.config.ready_timeout.as_secs(),
                });
            }

            match self.shell.read_chunk(&mut chunk) {
                Ok(0) => {
                    if self.shell.eof() {
                        return Ok(());
                    }
                    std::thread::sleep(self.config.poll_interval);
                }
                Ok(n) => {
                    self.absorb(&chunk[..n], buffer)?;
                    return Ok(());
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(self.config.poll_interval);
                }
                Err(e) => {
                    return Err(PatrolError::Channel {
                        device: self.device.clone(),
                        message: format!("Read failed while waiting for shell: {}", e),
                    });
                }
            }
        }
    }

    /// Drain inbound data for a fixed window, answering pagination.
    fn drain_for(
        &mut self,
        window: Duration,
        deadline: Instant,
        buffer: &mut Vec<u8>,
    ) -> Result<(), PatrolError> {
        let started = Instant::now();
        let mut chunk = [0u8; 4096];

        while started.elapsed() < window {
            self.check_deadline(deadline)?;

            if self.shell.eof() {
                return Ok(());
            }

            match self.shell.read_chunk(&mut chunk) {
                Ok(0) => std::thread::sleep(self.config.poll_interval),
                Ok(n) => self.absorb(&chunk[..n], buffer)?,
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(self.config.poll_interval)
                }
                // Remote close finalizes whatever we have
                Err(_) => return Ok(()),
            }
        }

        Ok(())
    }

    /// Drain until the quiet window elapses with no new bytes, or the
    /// channel closes. This is the completion heuristic for output with no
    /// terminator; the deadline converts a stuck stream into a Timeout.
    fn drain_until_quiet(
        &mut self,
        deadline: Instant,
        buffer: &mut Vec<u8>,
    ) -> Result<(), PatrolError> {
        let mut last_activity = Instant::now();
        let mut chunk = [0u8; 4096];

        loop {
            self.check_deadline(deadline)?;

            if self.shell.eof() {
                return Ok(());
            }

            match self.shell.read_chunk(&mut chunk) {
                Ok(0) => {
                    if last_activity.elapsed() >= self.config.quiet_window {
                        return Ok(());
                    }
                    std::thread::sleep(self.config.poll_interval);
                }
                Ok(n) => {
                    self.absorb(&chunk[..n], buffer)?;
                    last_activity = Instant::now();
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if last_activity.elapsed() >= self.config.quiet_window {
                        return Ok(());
                    }
                    std::thread::sleep(self.config.poll_interval);
                }
                Err(_) => return Ok(()),
            }
        }
    }

    /// Append a chunk to the transcript, answering each pagination marker
    /// with exactly one continuation keystroke. Markers count as activity,
    /// never as completion.
    fn absorb(&mut self, chunk: &[u8], buffer: &mut Vec<u8>) -> Result<(), PatrolError> {
        buffer.extend_from_slice(chunk);

        let text = String::from_utf8_lossy(chunk);
        let hits = self.profile.pagination_hits(&text);
        let continuation = self.profile.continuation;
        for _ in 0..hits {
            trace!(device = %self.device, "answering pagination marker");
            self.write(continuation)?;
        }

        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PatrolError> {
        self.shell
            .write_all(data)
            .map_err(|e| PatrolError::Channel {
                device: self.device.clone(),
                message: format!("Write failed: {}", e),
            })
    }

    fn check_deadline(&self, deadline: Instant) -> Result<(), PatrolError> {
        if Instant::now() >= deadline {
            warn!(device = %self.device, "session deadline expired, tearing down");
            return Err(PatrolError::Timeout {
                device: self.device.clone(),
                operation: "session".to_string(),
                duration_secs: self.config.overall_timeout.as_secs(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Vendor;
    use crate::session::testing::ScriptedShell;

    fn test_config() -> DriverConfig {
        DriverConfig {
            ready_timeout: Duration::from_millis(200),
            inter_command_delay: Duration::from_millis(30),
            quiet_window: Duration::from_millis(40),
            overall_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_collects_transcript_across_commands() {
        let shell = ScriptedShell::with_chunks(vec![
            "<sw1>",
            "display version\r\nVRP software version 8.1\r\n<sw1>",
            "display cpu-usage\r\nCPU Usage   : 37%\r\n<sw1>",
        ]);
        let driver = SessionDriver::new(
            Box::new(shell),
            Vendor::Huawei.profile(),
            test_config(),
            "sw1",
        );

        let mut completed = Vec::new();
        let transcript = driver
            .run(
                &["display version".to_string(), "display cpu-usage".to_string()],
                &mut |idx| completed.push(idx),
            )
            .unwrap();

        assert_eq!(completed, vec![0, 1]);
        assert!(transcript.contains("VRP software version"));
        assert!(transcript.contains("CPU Usage"));
    }

    #[test]
    fn test_one_continuation_keystroke_per_pagination_marker() {
        let shell = ScriptedShell::with_chunks(vec![
            "<sw1>",
            "display long\r\npage one\r\n---- More ----",
            "page two\r\n---- More ----",
            "page three\r\n<sw1>",
        ]);
        let writes = shell.writes();
        let driver = SessionDriver::new(
            Box::new(shell),
            Vendor::Huawei.profile(),
            test_config(),
            "sw1",
        );

        let mut completed = Vec::new();
        let transcript = driver
            .run(&["display long".to_string()], &mut |idx| completed.push(idx))
            .unwrap();

        // Pagination never advances the command index
        assert_eq!(completed, vec![0]);
        assert!(transcript.contains("page three"));

        let continuations = writes
            .lock()
            .iter()
            .filter(|w| w.as_slice() == b" ")
            .count();
        assert_eq!(continuations, 2);
    }

    #[test]
    fn test_quiet_window_finishes_run_without_trailing_prompt() {
        // No prompt ever arrives; only the inactivity window ends the run
        let shell =
            ScriptedShell::with_chunks(vec!["<sw1>", "backup line 1\r\nbackup line 2\r\n"]);
        let driver = SessionDriver::new(
            Box::new(shell),
            Vendor::Huawei.profile(),
            test_config(),
            "sw1",
        );

        let started = Instant::now();
        let transcript = driver
            .run(&["display current-configuration".to_string()], &mut |_| {})
            .unwrap();

        assert!(transcript.contains("backup line 2"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_deadline_classifies_endless_output_as_timeout() {
        let shell = ScriptedShell::endless("<sw1>", "spam\r\n");
        let closed = shell.closed_flag();
        let driver = SessionDriver::new(
            Box::new(shell),
            Vendor::Huawei.profile(),
            test_config().with_overall_timeout(Duration::from_millis(80)),
            "sw1",
        );

        let err = driver
            .run(&["display current-configuration".to_string()], &mut |_| {})
            .unwrap_err();

        assert_eq!(err.class(), "timeout");
        // Guaranteed release on the failure path too
        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_silent_shell_times_out_waiting_for_ready() {
        let shell = ScriptedShell::silent();
        let driver = SessionDriver::new(
            Box::new(shell),
            Vendor::Generic.profile(),
            test_config(),
            "sw1",
        );

        let err = driver
            .run(&["show version".to_string()], &mut |_| {})
            .unwrap_err();
        assert_eq!(err.class(), "timeout");
    }

    #[test]
    fn test_shell_closed_after_successful_run() {
        let shell = ScriptedShell::with_chunks(vec!["<sw1>", "ok\r\n<sw1>"]);
        let closed = shell.closed_flag();
        let driver = SessionDriver::new(
            Box::new(shell),
            Vendor::Huawei.profile(),
            test_config(),
            "sw1",
        );

        driver
            .run(&["display version".to_string()], &mut |_| {})
            .unwrap();
        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
    }
}
