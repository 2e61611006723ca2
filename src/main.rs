use anyhow::Context;
use clap::Parser;
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use tcp_tls_relay::{
    connector,
    relay::RelayLoop,
    relay_config::{DirtyRelayConfig, RelayConfig},
    resolver,
    transport::{PlainSession, TlsSession, TransportSession},
};
use tokio::{
    io::{self, BufReader},
    net::TcpStream,
    runtime::Builder,
};

/// Connects to a TCP (optionally TLS) peer and relays standard input and
/// output over the connection.
///
/// Every line read from standard input is sent to the peer, everything the
/// peer sends is written to standard output unchanged. End of standard input
/// half-closes the connection; the program exits when the peer closes it.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Host name or address to connect to.
    host: String,

    /// Port number or service name.
    port: String,

    /// Secure the connection with TLS.
    #[arg(long, overrides_with = "no_tls")]
    tls: bool,

    /// Use a plain connection even if the config file enables TLS.
    #[arg(long, overrides_with = "tls")]
    no_tls: bool,

    /// Do not verify the peer's TLS certificate.
    ///
    /// Anyone on the network path can impersonate the peer when this is set.
    #[arg(long, overrides_with = "verify")]
    insecure: bool,

    /// Verify the peer's TLS certificate even if the config file sets
    /// "insecure".
    #[arg(long, overrides_with = "insecure")]
    verify: bool,

    /// PEM file with additional trusted certificate authorities.
    #[arg(long)]
    ca_file: Option<PathBuf>,

    /// Seconds to wait for any activity before giving up, 0 waits forever
    /// [default: 5].
    #[arg(short = 'w', long = "timeout")]
    timeout_secs: Option<u64>,

    /// Path to a config file in JSON format.
    ///
    /// Config is a JSON object with the optional keys "tls", "insecure",
    /// "ca_file" and "timeout_secs". Command line options take precedence.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Args {
    fn dirty_config(&self) -> DirtyRelayConfig {
        DirtyRelayConfig {
            tls: flag(self.tls, self.no_tls),
            insecure: flag(self.insecure, self.verify),
            ca_file: self.ca_file.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

/// `None` leaves the decision to the config file.
fn flag(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

async fn relay(
    args: &Args,
    config: &RelayConfig,
    tls: Option<Arc<rustls::ClientConfig>>,
    stream: std::net::TcpStream,
) -> anyhow::Result<()> {
    let stream = TcpStream::from_std(stream).context("failed to register the connection")?;
    let transport = match tls {
        Some(tls) => TransportSession::Tls(Box::new(TlsSession::new(stream, tls, &args.host)?)),
        None => TransportSession::Plain(PlainSession::new(stream)),
    };

    RelayLoop::new(
        transport,
        BufReader::new(io::stdin()),
        io::stdout(),
        config.idle_timeout,
    )
    .run()
    .await?;

    Ok(())
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = {
        let file_config = match &args.config {
            Some(path) => DirtyRelayConfig::from_file(path)?,
            None => DirtyRelayConfig::default(),
        };
        RelayConfig::try_from(args.dirty_config().or(file_config)).context("invalid config")?
    };
    let tls = config
        .tls
        .as_ref()
        .map(|tls| tls.build())
        .transpose()
        .context("failed to set up TLS")?;

    let stream = {
        let candidates = resolver::resolve(&args.host, &args.port)?;
        connector::connect(&args.host, &args.port, candidates)?
    };
    stream
        .set_nodelay(true)
        .context("failed to set TCP_NODELAY to true")?;
    stream
        .set_nonblocking(true)
        .context("failed to make the connection non-blocking")?;

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    let result = runtime
        .block_on(relay(&args, &config, tls, stream))
        .with_context(|| format!("{}:{}", args.host, args.port));

    // A blocked read of standard input must not keep the process alive.
    runtime.shutdown_background();
    result
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}
