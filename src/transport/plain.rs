use super::{ReadOutcome, Transport, WriteOutcome};
use crate::error::{Error, Result};
use socket2::SockRef;
use std::{io, net::Shutdown};
use tokio::{
    io::{Interest, Ready},
    net::TcpStream,
};

pub struct PlainSession {
    stream: TcpStream,
    interest: Interest,
}

impl PlainSession {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            interest: Interest::READABLE,
        }
    }
}

impl Transport for PlainSession {
    fn interest(&self) -> Interest {
        self.interest
    }

    async fn ready(&self, interest: Interest) -> io::Result<Ready> {
        self.stream.ready(interest).await
    }

    /// A short send is a failure, never a partial acceptance.
    fn write(&mut self, buf: &[u8]) -> Result<WriteOutcome> {
        match self.stream.try_write(buf) {
            Ok(n) if n == buf.len() => {
                self.interest = Interest::READABLE;
                Ok(WriteOutcome::Complete)
            }
            Ok(n) => Err(Error::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send: {} of {} bytes", n, buf.len()),
            ))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                log::trace!("send would block");
                self.interest = Interest::READABLE | Interest::WRITABLE;
                Ok(WriteOutcome::Retry(Interest::WRITABLE))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        match self.stream.try_read(buf) {
            Ok(0) => Ok(ReadOutcome::EndOfStream),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                Ok(ReadOutcome::Retry(Interest::READABLE))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn shutdown_write(&mut self) -> Result<()> {
        SockRef::from(&self.stream).shutdown(Shutdown::Write)?;
        log::debug!("sent end of stream to the peer");
        Ok(())
    }

    fn close(self) {
        // Dropping the stream closes the descriptor.
        log::debug!("dropping plain connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{io::AsyncReadExt, net::TcpListener};

    async fn pair() -> (PlainSession, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (PlainSession::new(client.unwrap()), server.unwrap().0)
    }

    #[tokio::test]
    async fn write_accepts_whole_buffer() {
        let (mut session, mut server) = pair().await;

        session.ready(Interest::WRITABLE).await.unwrap();
        assert_eq!(session.write(b"ping\n").unwrap(), WriteOutcome::Complete);

        let mut received = [0u8; 5];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"ping\n");
    }

    #[tokio::test]
    async fn read_without_data_asks_for_readability() {
        let (mut session, _server) = pair().await;
        let mut buf = [0u8; 16];

        assert_eq!(
            session.read(&mut buf).unwrap(),
            ReadOutcome::Retry(Interest::READABLE)
        );
    }

    #[tokio::test]
    async fn shutdown_write_delivers_eof_and_keeps_reading() {
        let (mut session, mut server) = pair().await;

        session.shutdown_write().unwrap();
        let mut rest = Vec::new();
        assert_eq!(server.read_to_end(&mut rest).await.unwrap(), 0);

        tokio::io::AsyncWriteExt::write_all(&mut server, b"late")
            .await
            .unwrap();
        drop(server);

        let mut buf = [0u8; 16];
        let mut received = Vec::new();
        loop {
            session.ready(Interest::READABLE).await.unwrap();
            match session.read(&mut buf).unwrap() {
                ReadOutcome::Data(n) => received.extend_from_slice(&buf[..n]),
                ReadOutcome::EndOfStream => break,
                ReadOutcome::Retry(_) => continue,
            }
        }
        assert_eq!(received, b"late");
    }
}
