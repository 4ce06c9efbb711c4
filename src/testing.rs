//! In-process dialers used by unit tests

use crate::transport::{Dialer, Transport};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Stream that echoes written bytes back on read
#[derive(Debug)]
pub(crate) struct MockStream {
    pub id: usize,
    pub address: String,
    pub buffer: Vec<u8>,
}

#[async_trait]
impl Transport for MockStream {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.buffer.len());
        buf[..n].copy_from_slice(&self.buffer[..n]);
        self.buffer.drain(..n);
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([127, 0, 0, 1], 40000 + self.id as u16)))
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.address
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }

    fn set_read_deadline(&mut self, _deadline: Option<Instant>) -> io::Result<()> {
        Ok(())
    }

    fn set_write_deadline(&mut self, _deadline: Option<Instant>) -> io::Result<()> {
        Ok(())
    }
}

/// Hands out numbered [`MockStream`]s and counts dials
#[derive(Debug, Default)]
pub(crate) struct MockDialer {
    dials: AtomicUsize,
}

impl MockDialer {
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for MockDialer {
    type Stream = MockStream;

    async fn dial(&self, address: &str, _connect_timeout: Duration) -> io::Result<MockStream> {
        let id = self.dials.fetch_add(1, Ordering::SeqCst);
        Ok(MockStream {
            id,
            address: address.to_string(),
            buffer: Vec::new(),
        })
    }
}

/// Refuses every dial
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct FailingDialer;

#[async_trait]
impl Dialer for FailingDialer {
    type Stream = MockStream;

    async fn dial(&self, address: &str, _connect_timeout: Duration) -> io::Result<MockStream> {
        Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!("{} refused the connection", address),
        ))
    }
}

/// Dial that never completes
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct HangingDialer;

#[async_trait]
impl Dialer for HangingDialer {
    type Stream = MockStream;

    async fn dial(&self, _address: &str, _connect_timeout: Duration) -> io::Result<MockStream> {
        std::future::pending().await
    }
}
