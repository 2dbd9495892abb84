//! Output sinks for the re-emitted stream
//!
//! A transport is connected once, then every write happens between
//! [`Transport::lock`] and [`Transport::unlock`]. [`send`] wraps that
//! sequence for whole buffers.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::OutputMode;
use crate::retry::retry_with_backoff;

/// Default connect timeout for the viewer socket
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("transport is already locked")]
    AlreadyLocked,

    #[error("no address found for {0}")]
    Unresolved(String),

    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to create {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Destination of the filtered stream
pub trait Transport {
    /// Open the underlying file or socket
    fn connect(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Start a write. The sink stays valid until [`Transport::unlock`].
    fn lock(&mut self) -> Result<&mut dyn Write, TransportError>;

    fn unlock(&mut self);

    fn flush(&mut self) -> Result<(), TransportError>;

    /// Bytes written since connecting
    fn written(&self) -> u64;

    fn describe(&self) -> String;
}

/// Write `bytes` inside one lock/unlock pair
pub fn send(transport: &mut dyn Transport, bytes: &[u8]) -> Result<(), TransportError> {
    let result = transport
        .lock()
        .and_then(|out| out.write_all(bytes).map_err(TransportError::from));
    transport.unlock();
    result
}

/// Build the transport for an output mode, not yet connected
pub fn open(mode: &OutputMode) -> Box<dyn Transport> {
    match mode {
        OutputMode::None => Box::new(NullTransport::default()),
        OutputMode::File(path) => Box::new(FileTransport::new(path.clone())),
        OutputMode::Network { address, port } => {
            Box::new(SocketTransport::new(address.clone(), *port))
        }
    }
}

struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Connection state shared by every transport
struct Channel<W> {
    out: Option<CountingWriter<W>>,
    locked: bool,
}

impl<W> Default for Channel<W> {
    fn default() -> Self {
        Self {
            out: None,
            locked: false,
        }
    }
}

impl<W: Write> Channel<W> {
    fn attach(&mut self, inner: W) {
        self.out = Some(CountingWriter { inner, count: 0 });
        self.locked = false;
    }

    fn is_attached(&self) -> bool {
        self.out.is_some()
    }

    fn lock(&mut self) -> Result<&mut dyn Write, TransportError> {
        if self.locked {
            return Err(TransportError::AlreadyLocked);
        }
        let out = self.out.as_mut().ok_or(TransportError::NotConnected)?;
        self.locked = true;
        Ok(out)
    }

    fn unlock(&mut self) {
        self.locked = false;
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        let out = self.out.as_mut().ok_or(TransportError::NotConnected)?;
        out.flush()?;
        Ok(())
    }

    fn written(&self) -> u64 {
        self.out.as_ref().map_or(0, |out| out.count)
    }
}

/// Discards everything; used when the filter only audits a capture
pub struct NullTransport {
    channel: Channel<io::Sink>,
}

impl Default for NullTransport {
    fn default() -> Self {
        let mut channel = Channel::default();
        channel.attach(io::sink());
        Self { channel }
    }
}

impl Transport for NullTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn lock(&mut self) -> Result<&mut dyn Write, TransportError> {
        self.channel.lock()
    }

    fn unlock(&mut self) {
        self.channel.unlock();
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn written(&self) -> u64 {
        self.channel.written()
    }

    fn describe(&self) -> String {
        "nowhere".to_string()
    }
}

pub struct FileTransport {
    path: PathBuf,
    channel: Channel<BufWriter<File>>,
}

impl FileTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            channel: Channel::default(),
        }
    }
}

impl Transport for FileTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        let file = File::create(&self.path).map_err(|source| TransportError::Create {
            path: self.path.clone(),
            source,
        })?;
        self.channel.attach(BufWriter::new(file));
        info!("Writing filtered stream to {}", self.path.display());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.channel.is_attached()
    }

    fn lock(&mut self) -> Result<&mut dyn Write, TransportError> {
        self.channel.lock()
    }

    fn unlock(&mut self) {
        self.channel.unlock();
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.channel.flush()
    }

    fn written(&self) -> u64 {
        self.channel.written()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// TCP connection to a listening viewer
pub struct SocketTransport {
    address: String,
    port: u16,
    timeout: Duration,
    attempts: u32,
    channel: Channel<BufWriter<TcpStream>>,
}

impl SocketTransport {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            timeout: CONNECT_TIMEOUT,
            attempts: CONNECT_ATTEMPTS,
            channel: Channel::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    fn target(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    fn try_connect(&self) -> Result<TcpStream, TransportError> {
        let addrs: Vec<SocketAddr> = (self.address.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Connect {
                target: self.target(),
                source,
            })?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            debug!("Connecting to {}", addr);
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }

        match last_err {
            Some(source) => Err(TransportError::Connect {
                target: self.target(),
                source,
            }),
            None => Err(TransportError::Unresolved(self.target())),
        }
    }
}

impl Transport for SocketTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        let stream = retry_with_backoff("Connecting to viewer", self.attempts, CONNECT_BACKOFF, || {
            self.try_connect()
        })?;
        stream.set_nodelay(true)?;
        self.channel.attach(BufWriter::new(stream));
        info!("Streaming filtered events to {}", self.target());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.channel.is_attached()
    }

    fn lock(&mut self) -> Result<&mut dyn Write, TransportError> {
        self.channel.lock()
    }

    fn unlock(&mut self) {
        self.channel.unlock();
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.channel.flush()
    }

    fn written(&self) -> u64 {
        self.channel.written()
    }

    fn describe(&self) -> String {
        self.target()
    }
}
