use super::{ReadOutcome, Transport, WriteOutcome};
use crate::error::{Error, Result};
use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{self, CryptoProvider},
    pki_types::{CertificateDer, ServerName, UnixTime},
    ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, SignatureScheme,
};
use std::{
    fs::File,
    io::{self, BufReader, Read, Write},
    path::PathBuf,
    sync::Arc,
};
use tokio::{
    io::{Interest, Ready},
    net::TcpStream,
};

/// Trust settings for the TLS variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsClientConfig {
    /// Skips certificate chain and hostname verification.
    pub insecure: bool,
    /// PEM file with additional trust anchors.
    pub ca_file: Option<PathBuf>,
}

impl TlsClientConfig {
    pub fn build(&self) -> Result<Arc<ClientConfig>> {
        let provider = Arc::new(crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;

        let config = if self.insecure {
            log::warn!("TLS certificate verification is disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
                .with_no_client_auth()
        } else {
            builder
                .with_root_certificates(self.root_store()?)
                .with_no_client_auth()
        };

        Ok(Arc::new(config))
    }

    fn root_store(&self) -> Result<RootCertStore> {
        let mut roots = RootCertStore::empty();

        let native = rustls_native_certs::load_native_certs();
        for e in &native.errors {
            log::warn!("failed to load platform certificates: {}", e);
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        log::debug!(
            "loaded {} platform certificates ({} ignored)",
            added,
            ignored
        );

        if roots.is_empty() {
            log::warn!("no usable platform certificates, falling back to bundled roots");
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }

        if let Some(path) = &self.ca_file {
            let mut reader = BufReader::new(File::open(path)?);
            for cert in rustls_pemfile::certs(&mut reader) {
                roots.add(cert?)?;
            }
        }

        Ok(roots)
    }
}

#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Blocking-free `Read`/`Write` over the socket for rustls record I/O.
struct SocketIo<'a>(&'a TcpStream);

impl Read for SocketIo<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.try_read(buf)
    }
}

impl Write for SocketIo<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.try_write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// TLS client session over a connected socket.
///
/// The handshake is driven lazily by the first `read` or `write`. Plaintext
/// handed to `write` is buffered by the session once accepted; ciphertext the
/// socket could not take yet is flushed by later calls, and until then the
/// session also asks for writability.
pub struct TlsSession {
    stream: TcpStream,
    conn: ClientConnection,
    interest: Interest,
    peer_closed: bool,
}

impl TlsSession {
    pub fn new(stream: TcpStream, config: Arc<ClientConfig>, host: &str) -> Result<Self> {
        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|e| Error::Tls(format!("invalid server name '{}': {}", host, e)))?;
        let mut conn = ClientConnection::new(config, server_name)?;
        conn.set_buffer_limit(None);

        Ok(Self {
            stream,
            conn,
            interest: Interest::WRITABLE,
            peer_closed: false,
        })
    }

    /// Sends queued records. `false` means the socket filled up first.
    fn flush_records(&mut self) -> Result<bool> {
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut SocketIo(&self.stream)) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    /// Receives and processes available records. `false` means nothing was
    /// available.
    fn fill_records(&mut self) -> Result<bool> {
        match self.conn.read_tls(&mut SocketIo(&self.stream)) {
            Ok(0) => self.peer_closed = true,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.conn.process_new_packets() {
            // Best effort delivery of the alert rustls queued for the peer.
            let _ = self.flush_records();
            return Err(e.into());
        }
        Ok(true)
    }

    /// Advances the handshake as far as the socket allows. Returns the
    /// readiness needed to continue, or `None` once it is done.
    fn handshake(&mut self) -> Result<Option<Interest>> {
        while self.conn.is_handshaking() {
            if self.conn.wants_write() {
                if !self.flush_records()? {
                    return Ok(Some(Interest::WRITABLE));
                }
                continue;
            }

            if self.peer_closed {
                return Err(Error::Tls(
                    "connection closed during handshake".to_owned(),
                ));
            }
            if !self.fill_records()? {
                return Ok(Some(Interest::READABLE));
            }
        }
        Ok(None)
    }

    fn retry_handshake(&mut self) -> Result<Option<Interest>> {
        let pending = self.handshake()?;
        if let Some(interest) = pending {
            log::trace!("handshake must wait for {:?}", interest);
            self.interest = interest;
        }
        Ok(pending)
    }

    fn steady_interest(flushed: bool) -> Interest {
        if flushed {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }
}

impl Transport for TlsSession {
    fn interest(&self) -> Interest {
        self.interest
    }

    async fn ready(&self, interest: Interest) -> io::Result<Ready> {
        self.stream.ready(interest).await
    }

    fn write(&mut self, buf: &[u8]) -> Result<WriteOutcome> {
        if let Some(interest) = self.retry_handshake()? {
            return Ok(WriteOutcome::Retry(interest));
        }

        if !self.flush_records()? {
            self.interest = Self::steady_interest(false);
            return Ok(WriteOutcome::Retry(Interest::WRITABLE));
        }

        self.conn.writer().write_all(buf)?;
        let flushed = self.flush_records()?;
        self.interest = Self::steady_interest(flushed);
        Ok(WriteOutcome::Complete)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        if let Some(interest) = self.retry_handshake()? {
            return Ok(ReadOutcome::Retry(interest));
        }

        let flushed = self.flush_records()?;
        self.interest = Self::steady_interest(flushed);

        loop {
            match self.conn.reader().read(buf) {
                Ok(0) => return Ok(ReadOutcome::EndOfStream),
                Ok(n) => return Ok(ReadOutcome::Data(n)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    log::warn!("peer closed the connection without close_notify");
                    return Ok(ReadOutcome::EndOfStream);
                }
                Err(e) => return Err(Error::Tls(e.to_string())),
            }

            if self.peer_closed {
                return Ok(ReadOutcome::EndOfStream);
            }
            if !self.fill_records()? {
                return Ok(ReadOutcome::Retry(self.interest));
            }
        }
    }

    /// TLS has no half-close: close_notify ends the whole session, so the
    /// write side is left open.
    fn shutdown_write(&mut self) -> Result<()> {
        log::debug!("half-close is not supported over TLS, write side stays open");
        Ok(())
    }

    fn close(mut self) {
        self.conn.send_close_notify();
        match self.flush_records() {
            Ok(true) => log::debug!("sent close_notify"),
            Ok(false) => log::debug!("socket busy, close_notify not fully sent"),
            Err(e) => log::warn!("failed to send close_notify: {}", e),
        }
    }
}
