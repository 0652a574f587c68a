//! Serial links to the instrument.
//!
//! The instrument exposes a Zephyr port (tagged frames) and optionally a
//! separate log port (free text). When both share one device there is a single
//! link. The session writes on its own handle; the reader worker gets cloned
//! handles of the same ports, so neither side shares state with the other.

use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::info;

use crate::error::LinkError;

/// Which logical channel a link carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Zephyr,
    Log,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Channel::Zephyr => "zephyr",
            Channel::Log => "log",
        })
    }
}

/// A byte-oriented duplex endpoint.
pub trait Link: Read + Write + Send {
    fn name(&self) -> &str;

    /// A second handle onto the same endpoint.
    fn try_clone_link(&self) -> io::Result<Box<dyn Link>>;
}

/// Opens a link on demand; used at start-up and on every resume.
pub trait Connector: Send {
    fn connect(&self) -> Result<Box<dyn Link>, LinkError>;

    fn describe(&self) -> String;
}

pub struct SerialLink {
    name: String,
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Opens `path` with a short read timeout, so a read with nothing pending
    /// returns promptly, and drops anything queued before we attached.
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self, LinkError> {
        let open_err = |source| LinkError::Open {
            port: path.to_string(),
            source,
        };
        let port = serialport::new(path, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(open_err)?;
        port.clear(ClearBuffer::Input).map_err(open_err)?;
        info!(port = path, baud_rate, "opened serial link");
        Ok(Self {
            name: path.to_string(),
            port,
        })
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Link for SerialLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_clone_link(&self) -> io::Result<Box<dyn Link>> {
        let port = self.port.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(SerialLink {
            name: self.name.clone(),
            port,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct SerialConnector {
    pub path: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Connector for SerialConnector {
    fn connect(&self) -> Result<Box<dyn Link>, LinkError> {
        let link = SerialLink::open(&self.path, self.baud_rate, self.read_timeout)?;
        Ok(Box::new(link))
    }

    fn describe(&self) -> String {
        format!("{} @ {}", self.path, self.baud_rate)
    }
}

/// The open links of a session.
pub struct LinkSet {
    pub zephyr: Box<dyn Link>,
    /// `None` when the log channel shares the Zephyr link.
    pub log: Option<Box<dyn Link>>,
}

impl LinkSet {
    pub fn open(zephyr: &dyn Connector, log: Option<&dyn Connector>) -> Result<Self, LinkError> {
        let zephyr = zephyr.connect()?;
        let log = log.map(|c| c.connect()).transpose()?;
        Ok(Self { zephyr, log })
    }

    /// Handles for the reader, log channel first.
    pub fn reader_handles(&self) -> Result<Vec<(Channel, Box<dyn Link>)>, LinkError> {
        let mut handles = Vec::with_capacity(2);
        if let Some(log) = &self.log {
            handles.push((Channel::Log, log.try_clone_link()?));
        }
        handles.push((Channel::Zephyr, self.zephyr.try_clone_link()?));
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryConnector, MemoryLink};

    #[test]
    fn shared_link_yields_one_reader() {
        let zephyr = MemoryLink::new("zephyr");
        let links = LinkSet::open(&MemoryConnector::new(zephyr), None).unwrap();
        let readers = links.reader_handles().unwrap();
        assert_eq!(readers.len(), 1);
        assert_eq!(readers[0].0, Channel::Zephyr);
        assert_eq!(readers[0].1.name(), "zephyr");
    }

    #[test]
    fn separate_log_link_is_read_first() {
        let zephyr = MemoryConnector::new(MemoryLink::new("zephyr"));
        let log = MemoryConnector::new(MemoryLink::new("log"));
        let links = LinkSet::open(&zephyr, Some(&log as &dyn Connector)).unwrap();
        let channels: Vec<Channel> = links.reader_handles().unwrap().into_iter().map(|(c, _)| c).collect();
        assert_eq!(channels, [Channel::Log, Channel::Zephyr]);
    }

    #[test]
    fn cloned_handles_see_the_same_endpoint() {
        let device = MemoryLink::new("zephyr");
        let mut links = LinkSet::open(&MemoryConnector::new(device.clone()), None).unwrap();
        links.zephyr.write_all(b"hello").unwrap();
        assert_eq!(device.written(), b"hello");

        device.inject(b"from instrument\n");
        let (_, mut reader) = links.reader_handles().unwrap().pop().unwrap();
        let mut buf = [0u8; 64];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"from instrument\n");
    }

    #[test]
    fn reports_missing_serial_device() {
        let connector = SerialConnector {
            path: "/dev/obc-sim-does-not-exist".into(),
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(1),
        };
        assert!(matches!(connector.connect(), Err(LinkError::Open { .. })));
        assert_eq!(connector.describe(), "/dev/obc-sim-does-not-exist @ 115200");
    }
}
