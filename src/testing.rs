//! In-memory stand-in for a serial port.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LinkError;
use crate::link::{Connector, Link};

/// Both directions of a simulated device. Clones are handles onto the same
/// device, like `try_clone` on a real port.
#[derive(Clone)]
pub struct MemoryLink {
    name: String,
    to_host: Arc<Mutex<VecDeque<u8>>>,
    from_host: Arc<Mutex<Vec<u8>>>,
    broken: Arc<AtomicBool>,
}

impl MemoryLink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            to_host: Arc::default(),
            from_host: Arc::default(),
            broken: Arc::default(),
        }
    }

    /// Queues bytes as if the instrument had sent them.
    pub fn inject(&self, bytes: &[u8]) {
        self.to_host.lock().unwrap().extend(bytes.iter().copied());
    }

    /// Everything the host has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.from_host.lock().unwrap().clone()
    }

    /// Makes every read fail as a port closed underneath a reader does.
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }
}

impl Read for MemoryLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "device closed"));
        }
        let mut pending = self.to_host.lock().unwrap();
        if pending.is_empty() {
            return Err(io::Error::new(ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(pending.len());
        for (slot, byte) in buf.iter_mut().zip(pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MemoryLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.from_host.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for MemoryLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_clone_link(&self) -> io::Result<Box<dyn Link>> {
        Ok(Box::new(self.clone()))
    }
}

pub struct MemoryConnector {
    device: MemoryLink,
    refuse: Arc<AtomicBool>,
}

impl MemoryConnector {
    pub fn new(device: MemoryLink) -> Self {
        Self {
            device,
            refuse: Arc::default(),
        }
    }

    /// Shared switch that makes `connect` fail, for resume-failure tests.
    pub fn refusal_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.refuse)
    }
}

impl Connector for MemoryConnector {
    fn connect(&self) -> Result<Box<dyn Link>, LinkError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(LinkError::Io(io::Error::new(ErrorKind::NotFound, "device unplugged")));
        }
        Ok(Box::new(self.device.clone()))
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.device.name)
    }
}

/// `Write` sink whose contents can be inspected from the test.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Plays back one read result per call, then reports a read timeout.
#[derive(Default)]
pub struct ScriptedReader(VecDeque<io::Result<Vec<u8>>>);

impl ScriptedReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk(mut self, bytes: &[u8]) -> Self {
        self.0.push_back(Ok(bytes.to_vec()));
        self
    }

    /// A read that fails as a port closed underneath the reader does.
    pub fn broken(mut self) -> Self {
        self.0.push_back(Err(io::Error::new(ErrorKind::BrokenPipe, "port closed")));
        self
    }
}

impl Read for ScriptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.pop_front() {
            None => Err(io::Error::new(ErrorKind::TimedOut, "no data")),
            Some(Err(err)) => Err(err),
            Some(Ok(chunk)) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
        }
    }
}
