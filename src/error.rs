use std::{io, time::Duration};

/// Every failure is terminal for the relay session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to resolve {host}:{port}: {reason}")]
    Resolution {
        host: String,
        port: String,
        reason: String,
    },
    #[error("{host}:{port}: connection refused")]
    ConnectionRefused { host: String, port: String },
    #[error("readiness wait failed: {0}")]
    Poll(#[source] io::Error),
    #[error("no activity for {0:?}")]
    Timeout(Duration),
    #[error("tls: {0}")]
    Tls(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Self::Tls(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
