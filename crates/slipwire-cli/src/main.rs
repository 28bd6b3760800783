//! `slipwire`: send one request to a gateway and log the response.
//!
//! ```text
//! slipwire --host 192.168.1.20 --tls --insecure --packet 000C
//! slipwire --host 192.168.1.20 --hex c000030003 --retries 3
//! slipwire --host 192.168.1.20 --tls --insecure          # poll only
//! ```
//!
//! Output goes through `tracing`; set `RUST_LOG=slipwire_core=debug` to watch
//! the session lifecycle.

use std::{process::ExitCode, time::Duration};

use clap::Parser;
use slipwire_core::{
    Client, Frame, Packet, TcpTransport, TlsTransport, Transport, TransportConfig, TransportError,
};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "slipwire", about = "Send one framed request to a gateway")]
struct Args {
    /// Gateway host name or address
    #[arg(long)]
    host: String,

    /// Gateway port
    #[arg(long, default_value_t = 51200)]
    port: u16,

    /// Wrap the connection in TLS
    #[arg(long)]
    tls: bool,

    /// Accept any server certificate (self-signed gateways)
    #[arg(long, requires = "tls")]
    insecure: bool,

    /// Raw request bytes in hex, sent as-is
    #[arg(long, conflicts_with = "packet")]
    hex: Option<String>,

    /// Packet to encode and send, as CMD[:DATA] in hex (e.g. 000C or 0003:0102)
    #[arg(long)]
    packet: Option<String>,

    /// Attempts before giving up
    #[arg(long, default_value_t = 5)]
    retries: u32,

    /// Response timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Connect and handshake timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    establish_timeout_ms: u64,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("packet command must be 4 hex digits, got {0:?}")]
    Command(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] slipwire_core::ConfigError),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] slipwire_core::TlsError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] slipwire_proto::ProtocolError),
}

/// What to send.
#[derive(Debug, PartialEq, Eq)]
enum Request {
    Poll,
    Raw(Vec<u8>),
    Packet(Packet),
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "request failed");
            ExitCode::FAILURE
        },
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    let request = parse_request(args.hex.as_deref(), args.packet.as_deref())?;
    let config = TransportConfig::new(args.host.clone(), args.port)
        .with_retries(args.retries)
        .with_establish_timeout(Duration::from_millis(args.establish_timeout_ms))
        .with_response_timeout(Duration::from_millis(args.timeout_ms));

    if !args.tls {
        return exchange(TcpTransport, config, &request);
    }
    let transport = if args.insecure {
        TlsTransport::accept_any_certificate()?
    } else {
        TlsTransport::with_webpki_roots()?
    };
    exchange(transport, config, &request)
}

fn exchange<T: Transport>(
    transport: T,
    config: TransportConfig,
    request: &Request,
) -> Result<(), CliError> {
    let client = Client::new(transport, config)?;
    info!(endpoint = %client.config().endpoint(), "sending request");

    let response = match request {
        Request::Poll => client.poll()?,
        Request::Raw(bytes) => client.io(bytes)?,
        Request::Packet(packet) => client.io(packet.encode()?.as_bytes())?,
    };

    match response {
        Some(frame) => report(&frame, matches!(request, Request::Packet(_))),
        None => info!("no frame received"),
    }

    let health = client.health();
    info!(
        frames = health.stats.frames_received,
        anomalies = health.stats.anomalies,
        failed_attempts = health.stats.failed_attempts,
        "done"
    );
    client.reset_connection();
    Ok(())
}

fn report(frame: &Frame, decode: bool) {
    info!(len = frame.len(), frame = %hex::encode(frame.as_bytes()), "response");
    if !decode {
        return;
    }
    match Packet::decode(frame) {
        Ok(packet) => info!(
            command = format_args!("{:04X}", packet.command),
            data = %hex::encode(&packet.data),
            "decoded"
        ),
        Err(err) => error!(error = %err, "response is not a valid packet"),
    }
}

fn parse_request(hex_bytes: Option<&str>, packet: Option<&str>) -> Result<Request, CliError> {
    if let Some(raw) = hex_bytes {
        return Ok(Request::Raw(hex::decode(raw)?));
    }
    let Some(arg) = packet else {
        return Ok(Request::Poll);
    };

    let (command, data) = arg.split_once(':').unwrap_or((arg, ""));
    let command: [u8; 2] = hex::decode(command)?
        .try_into()
        .map_err(|_| CliError::Command(command.to_string()))?;
    Ok(Request::Packet(Packet::new(u16::from_be_bytes(command), hex::decode(data)?)))
}
