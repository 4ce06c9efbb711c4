//! Lazily bound connection façade

use crate::destination::DestinationEntry;
use crate::errors::PoolResult;
use crate::factory::PoolFactory;
use crate::selector::{DestinationSelector, RandomSelector};
use crate::transport::{Dialer, TcpDialer, Transport};

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::trace;

struct Binding<D: Dialer> {
    entry: Arc<DestinationEntry<D>>,
    stream: D::Stream,
}

/// A stream handle drawn from a [`PoolFactory`].
///
/// The first I/O call picks a destination and checks out a stream; every
/// later call uses that same stream until [`close`](Self::close), which hands
/// it back to its destination's idle queue. The handle can then be used for
/// another checkout. Dropping a bound handle returns its stream as well.
///
/// A handle belongs to one caller at a time; operations take `&mut self`.
///
/// Deadlines are set on the underlying stream and travel with it back into
/// the idle queue. Clear them with `set_deadline(None)` before `close` if the
/// stream should be reused without them.
pub struct PooledConnection<D: Dialer = TcpDialer, S: DestinationSelector = RandomSelector> {
    factory: PoolFactory<D, S>,
    bound: Option<Binding<D>>,
}

impl<D: Dialer, S: DestinationSelector> PooledConnection<D, S> {
    pub(crate) fn new(factory: PoolFactory<D, S>) -> Self {
        Self {
            factory,
            bound: None,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Address of the bound destination, if any
    pub fn destination(&self) -> Option<&str> {
        self.bound.as_ref().map(|binding| binding.entry.address())
    }

    async fn stream(&mut self) -> PoolResult<&mut D::Stream> {
        let binding = match self.bound.take() {
            Some(binding) => binding,
            None => {
                let entry = Arc::clone(self.factory.choose());
                let stream = entry.acquire().await?;
                trace!("Bound connection to {}", entry.address());
                Binding { entry, stream }
            }
        };
        Ok(&mut self.bound.insert(binding).stream)
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> PoolResult<usize> {
        Ok(self.stream().await?.read(buf).await?)
    }

    pub async fn write(&mut self, buf: &[u8]) -> PoolResult<usize> {
        Ok(self.stream().await?.write(buf).await?)
    }

    /// Write the whole buffer, looping over short writes
    pub async fn write_all(&mut self, mut buf: &[u8]) -> PoolResult<()> {
        let stream = self.stream().await?;
        while !buf.is_empty() {
            let n = stream.write(buf).await?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero).into());
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Fill the whole buffer, failing on a premature end of stream
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> PoolResult<()> {
        let stream = self.stream().await?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = stream.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            filled += n;
        }
        Ok(())
    }

    pub async fn local_addr(&mut self) -> PoolResult<SocketAddr> {
        Ok(self.stream().await?.local_addr()?)
    }

    pub async fn peer_addr(&mut self) -> PoolResult<SocketAddr> {
        Ok(self.stream().await?.peer_addr()?)
    }

    /// Set the read and write deadlines; `None` clears them
    pub async fn set_deadline(&mut self, deadline: Option<Instant>) -> PoolResult<()> {
        Ok(self.stream().await?.set_deadline(deadline)?)
    }

    pub async fn set_read_deadline(&mut self, deadline: Option<Instant>) -> PoolResult<()> {
        Ok(self.stream().await?.set_read_deadline(deadline)?)
    }

    pub async fn set_write_deadline(&mut self, deadline: Option<Instant>) -> PoolResult<()> {
        Ok(self.stream().await?.set_write_deadline(deadline)?)
    }

    /// Hand the bound stream back to its destination. Closing an unbound
    /// handle does nothing.
    pub fn close(&mut self) -> PoolResult<()> {
        if let Some(Binding { entry, stream }) = self.bound.take() {
            trace!("Releasing connection to {}", entry.address());
            entry.release(stream);
        }
        Ok(())
    }

    /// Drop the bound stream instead of returning it, for streams the caller
    /// knows to be broken
    pub fn invalidate(&mut self) {
        if let Some(Binding { entry, stream }) = self.bound.take() {
            entry.discard(stream);
        }
    }
}

impl<D: Dialer, S: DestinationSelector> Drop for PooledConnection<D, S> {
    fn drop(&mut self) {
        if let Some(Binding { entry, stream }) = self.bound.take() {
            entry.release(stream);
        }
    }
}

impl<D: Dialer, S: DestinationSelector> std::fmt::Debug for PooledConnection<D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("destination", &self.destination())
            .finish()
    }
}
