// Session module - interactive shell driving and transcript segmentation

pub mod driver;
pub mod segmenter;
pub mod ssh;

#[cfg(test)]
pub(crate) mod testing;

pub use driver::{DriverConfig, SessionDriver};
pub use segmenter::{clean_output, segment, NO_OUTPUT_SENTINEL};
pub use ssh::SshSessionFactory;

use std::io;

use crate::device::Device;
use crate::output::errors::PatrolError;

/// One authenticated interactive shell.
///
/// The driver is written against this trait so the same loop runs over a
/// real ssh2 channel and over scripted in-memory shells in tests. Reads are
/// non-blocking: a read with nothing pending returns `ErrorKind::WouldBlock`.
pub trait InteractiveShell: Send {
    /// Read whatever is currently pending into `buf`.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write raw bytes to the shell.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Whether the remote side has closed the channel.
    fn eof(&self) -> bool;

    /// Close channel and connection. Must be safe to call more than once.
    fn close(&mut self);
}

/// Opens authenticated shells for devices.
///
/// The production implementation speaks SSH; tests substitute scripted
/// factories so jobs and ticks run without a network.
pub trait SessionFactory: Send + Sync {
    fn open(&self, device: &Device) -> Result<Box<dyn InteractiveShell>, PatrolError>;
}
