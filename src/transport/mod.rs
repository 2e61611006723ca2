//! Uniform non-blocking access to the peer, either in the clear or over TLS.
//!
//! Operations never wait. When the underlying socket is not ready they return
//! a `Retry` carrying the readiness the caller must wait for before calling
//! again. For TLS that direction is not tied to the operation: a `write` may
//! need the socket to become readable (and a `read` writable) while the
//! handshake or a renegotiation is in flight.

mod plain;
mod tls;

pub use plain::PlainSession;
pub use tls::{TlsClientConfig, TlsSession};

use crate::error::Result;
use std::io;
use tokio::io::{Interest, Ready};

pub const READ_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// All bytes were accepted.
    Complete,
    /// Nothing was accepted; call again with the same bytes once the socket
    /// reports this readiness.
    Retry(Interest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were placed at the start of the buffer.
    Data(usize),
    EndOfStream,
    Retry(Interest),
}

#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Readiness the session currently needs from the socket.
    fn interest(&self) -> Interest;

    /// Waits until the socket reports any of `interest`.
    async fn ready(&self, interest: Interest) -> io::Result<Ready>;

    fn write(&mut self, buf: &[u8]) -> Result<WriteOutcome>;

    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome>;

    /// Tells the peer nothing more will be sent.
    fn shutdown_write(&mut self) -> Result<()>;

    /// Releases the transport. Failures are logged, not returned.
    fn close(self);
}

pub enum TransportSession {
    Plain(PlainSession),
    Tls(Box<TlsSession>),
}

impl Transport for TransportSession {
    fn interest(&self) -> Interest {
        match self {
            Self::Plain(s) => s.interest(),
            Self::Tls(s) => s.interest(),
        }
    }

    async fn ready(&self, interest: Interest) -> io::Result<Ready> {
        match self {
            Self::Plain(s) => s.ready(interest).await,
            Self::Tls(s) => s.ready(interest).await,
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<WriteOutcome> {
        match self {
            Self::Plain(s) => s.write(buf),
            Self::Tls(s) => s.write(buf),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        match self {
            Self::Plain(s) => s.read(buf),
            Self::Tls(s) => s.read(buf),
        }
    }

    fn shutdown_write(&mut self) -> Result<()> {
        match self {
            Self::Plain(s) => s.shutdown_write(),
            Self::Tls(s) => s.shutdown_write(),
        }
    }

    fn close(self) {
        match self {
            Self::Plain(s) => s.close(),
            Self::Tls(s) => (*s).close(),
        }
    }
}
