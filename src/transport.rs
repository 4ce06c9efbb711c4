//! Transport stream contract and its TCP implementation

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::trace;

/// A connected, bidirectional byte stream.
///
/// Deadlines are absolute instants applying to every future read or write
/// until changed; `None` disables the timeout. An expired deadline surfaces
/// as [`io::ErrorKind::TimedOut`].
#[async_trait]
pub trait Transport: Send + 'static {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Shut down the write half of the stream
    async fn close(&mut self) -> io::Result<()>;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()>;

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()>;

    /// Set both the read and the write deadline
    fn set_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.set_read_deadline(deadline)?;
        self.set_write_deadline(deadline)
    }
}

/// Opens new transport streams to a `host:port` address
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Stream: Transport;

    async fn dial(&self, address: &str, connect_timeout: Duration) -> io::Result<Self::Stream>;
}

/// Dials plain TCP connections through tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpTransport;

    async fn dial(&self, address: &str, connect_timeout: Duration) -> io::Result<TcpTransport> {
        match timeout(connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => {
                trace!("Dialed {}", address);
                Ok(TcpTransport::new(stream))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("Connection to {} timed out after {:?}", address, connect_timeout),
            )),
        }
    }
}

/// TCP stream with read and write deadlines
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_deadline: None,
            write_deadline: None,
        }
    }

    pub fn into_inner(self) -> TcpStream {
        self.stream
    }
}

fn deadline_exceeded(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{} deadline exceeded", op))
}

#[async_trait]
impl Transport for TcpTransport {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read_deadline {
            Some(deadline) => timeout_at(deadline, self.stream.read(buf))
                .await
                .map_err(|_| deadline_exceeded("read"))?,
            None => self.stream.read(buf).await,
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.write_deadline {
            Some(deadline) => timeout_at(deadline, self.stream.write(buf))
                .await
                .map_err(|_| deadline_exceeded("write"))?,
            None => self.stream.write(buf).await,
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.read_deadline = deadline;
        Ok(())
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.write_deadline = deadline;
        Ok(())
    }
}
