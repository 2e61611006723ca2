//! Readiness-driven relay between local input/output and a [`Transport`].
//!
//! Each round waits, bounded by the idle timeout, for either a complete line
//! of local input or the readiness the transport currently asks for, then
//! dispatches on what became ready. A line the transport could not take yet
//! is held and offered again, unchanged, on the next peer readiness; no new
//! input is read until it has been accepted. Local end-of-input half-closes
//! the transport and removes local input from the wait set for good. The
//! relay ends when the peer reaches end-of-stream or on the first error.

use crate::{
    error::{Error, Result},
    transport::{ReadOutcome, Transport, WriteOutcome, READ_BUFFER_SIZE},
};
use std::{io, time::Duration};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Ready},
    time,
};

enum Readiness {
    /// `read_until` finished with this many new bytes; zero means end-of-input.
    Input(usize),
    Peer(Ready),
}

struct RelayState {
    input_open: bool,
    /// The line buffer holds a unit the transport has not accepted yet.
    write_pending: bool,
}

pub struct RelayLoop<T, I, O> {
    transport: T,
    input: I,
    output: O,
    idle_timeout: Option<Duration>,
}

impl<T, I, O> RelayLoop<T, I, O>
where
    T: Transport,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    /// `idle_timeout` bounds every single wait; `None` waits forever.
    pub fn new(transport: T, input: I, output: O, idle_timeout: Option<Duration>) -> Self {
        Self {
            transport,
            input,
            output,
            idle_timeout,
        }
    }

    /// Relays until the peer closes. The transport is closed on every exit
    /// path.
    pub async fn run(mut self) -> Result<()> {
        let result = self.relay().await;
        match &result {
            Ok(()) => log::info!("peer closed the connection"),
            Err(e) => log::debug!("relay failed: {}", e),
        }
        self.transport.close();
        result
    }

    async fn relay(&mut self) -> Result<()> {
        let mut line = Vec::new();
        let mut chunk = vec![0u8; READ_BUFFER_SIZE];
        let mut state = RelayState {
            input_open: true,
            write_pending: false,
        };

        loop {
            let poll_input = state.input_open && !state.write_pending;
            let readiness = wait(
                &self.transport,
                &mut self.input,
                &mut line,
                poll_input,
                self.idle_timeout,
            )
            .await?;

            match readiness {
                Readiness::Input(0) if line.is_empty() => {
                    log::debug!("local input closed");
                    self.transport.shutdown_write()?;
                    state.input_open = false;
                }
                Readiness::Input(_) => {
                    state.write_pending = !self.send(&line)?;
                    if !state.write_pending {
                        line.clear();
                    }
                }
                Readiness::Peer(ready) => {
                    log::trace!("peer ready: {:?}", ready);
                    if state.write_pending {
                        state.write_pending = !self.send(&line)?;
                        if !state.write_pending {
                            line.clear();
                        }
                    }
                    if !self.receive(&mut chunk).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Returns whether the transport accepted `unit`.
    fn send(&mut self, unit: &[u8]) -> Result<bool> {
        match self.transport.write(unit)? {
            WriteOutcome::Complete => Ok(true),
            WriteOutcome::Retry(interest) => {
                log::trace!("write of {} bytes must wait for {:?}", unit.len(), interest);
                Ok(false)
            }
        }
    }

    /// Returns whether the peer is still open.
    async fn receive(&mut self, chunk: &mut [u8]) -> Result<bool> {
        match self.transport.read(chunk)? {
            ReadOutcome::Data(n) => {
                self.output.write_all(&chunk[..n]).await?;
                self.output.flush().await?;
                Ok(true)
            }
            ReadOutcome::EndOfStream => Ok(false),
            ReadOutcome::Retry(interest) => {
                log::trace!("read must wait for {:?}", interest);
                Ok(true)
            }
        }
    }
}

async fn wait<T, I>(
    transport: &T,
    input: &mut I,
    line: &mut Vec<u8>,
    poll_input: bool,
    idle_timeout: Option<Duration>,
) -> Result<Readiness>
where
    T: Transport,
    I: AsyncBufRead + Unpin,
{
    enum Event {
        Input(io::Result<usize>),
        Peer(io::Result<Ready>),
    }

    loop {
        let interest = transport.interest();
        // `read_until` keeps partial lines in `line` when cancelled.
        let event = async {
            tokio::select! {
                read = input.read_until(b'\n', &mut *line), if poll_input => Event::Input(read),
                ready = transport.ready(interest) => Event::Peer(ready),
            }
        };

        let event = match idle_timeout {
            Some(limit) => time::timeout(limit, event)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => event.await,
        };

        match event {
            Event::Input(read) => return Ok(Readiness::Input(read?)),
            Event::Peer(Ok(ready)) => return Ok(Readiness::Peer(ready)),
            Event::Peer(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
            Event::Peer(Err(e)) => return Err(Error::Poll(e)),
        }
    }
}
