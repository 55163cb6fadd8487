// Scripted in-memory shells for driving the session loop in tests

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{InteractiveShell, SessionFactory};
use crate::device::Device;
use crate::output::errors::PatrolError;

/// A shell that replays a fixed chunk script, one chunk per read call, and
/// records every write.
pub(crate) struct ScriptedShell {
    chunks: VecDeque<Vec<u8>>,
    /// When set, every read after the script drains returns this chunk again
    endless: Option<Vec<u8>>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

impl ScriptedShell {
    pub fn with_chunks(chunks: Vec<&str>) -> Self {
        ScriptedShell {
            chunks: chunks.into_iter().map(|c| c.as_bytes().to_vec()).collect(),
            endless: None,
            writes: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A shell that sends a banner, then repeats `chunk` forever.
    pub fn endless(banner: &str, chunk: &str) -> Self {
        ScriptedShell {
            chunks: VecDeque::from([banner.as_bytes().to_vec()]),
            endless: Some(chunk.as_bytes().to_vec()),
            writes: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A shell that never produces any data.
    pub fn silent() -> Self {
        Self::with_chunks(Vec::new())
    }

    pub fn writes(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        self.writes.clone()
    }

    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

impl InteractiveShell for ScriptedShell {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = match self.chunks.pop_front() {
            Some(chunk) => chunk,
            None => match &self.endless {
                Some(chunk) => chunk.clone(),
                None => return Err(io::Error::from(io::ErrorKind::WouldBlock)),
            },
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.writes.lock().push(data.to_vec());
        Ok(())
    }

    fn eof(&self) -> bool {
        false
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory that builds scripted shells and counts open attempts, so tests
/// can assert which devices were actually connected to.
pub(crate) struct ScriptedFactory {
    #[allow(clippy::type_complexity)]
    builder: Box<dyn Fn(&Device) -> Result<Box<dyn InteractiveShell>, PatrolError> + Send + Sync>,
    opens: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new(
        builder: impl Fn(&Device) -> Result<Box<dyn InteractiveShell>, PatrolError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        ScriptedFactory {
            builder: Box::new(builder),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn open_count(&self) -> Arc<AtomicUsize> {
        self.opens.clone()
    }
}

impl SessionFactory for ScriptedFactory {
    fn open(&self, device: &Device) -> Result<Box<dyn InteractiveShell>, PatrolError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        (self.builder)(device)
    }
}
