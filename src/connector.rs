use crate::{
    error::{Error, Result},
    resolver::ConnectionCandidate,
};
use socket2::Socket;
use std::net::TcpStream;

/// Tries each candidate in order and returns the first connected stream.
///
/// Connects block until the OS reports an outcome. The socket of a failed
/// candidate is released before the next one is tried; if releasing it
/// fails, that error is returned at once. `host` and `port` are only used
/// for reporting.
pub fn connect<I>(host: &str, port: &str, candidates: I) -> Result<TcpStream>
where
    I: IntoIterator<Item = ConnectionCandidate>,
{
    for candidate in candidates {
        let socket = match Socket::new(candidate.domain, candidate.socket_type, candidate.protocol) {
            Ok(socket) => socket,
            Err(e) => {
                log::debug!("failed to open a socket for {}: {}", candidate.addr, e);
                continue;
            }
        };

        match socket.connect(&candidate.addr.into()) {
            Ok(()) => {
                log::info!("connected to {} ({}:{})", candidate.addr, host, port);
                return Ok(socket.into());
            }
            Err(e) => {
                log::warn!("failed to connect to {}: {}", candidate.addr, e);
                release(socket)?;
            }
        }
    }

    Err(Error::ConnectionRefused {
        host: host.to_owned(),
        port: port.to_owned(),
    })
}

/// Closes `socket`, reporting the error `Drop` would swallow.
#[cfg(unix)]
fn release(socket: Socket) -> Result<()> {
    use std::os::fd::IntoRawFd;

    nix::unistd::close(socket.into_raw_fd()).map_err(|errno| {
        log::error!("failed to close a socket: {}", errno);
        Error::Io(errno.into())
    })
}

#[cfg(not(unix))]
fn release(socket: Socket) -> Result<()> {
    drop(socket);
    Ok(())
}
