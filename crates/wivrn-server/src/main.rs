//! `wivrn-server`: accepts a headset's TCP connection, runs the pairing
//! handshake, and drives the session runtime until the connection drops.
//!
//! CLI/logging shape grounded on `examples/eisbaw-ost/src/main.rs`'s
//! `clap::Parser` + `tracing_subscriber::registry()` setup; persisted state
//! (`keys.json`, `config.json`) and XDG resolution come straight from
//! `wivrn_session::{KeyStore, Config, paths}`.

mod runtime;
mod video;

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wivrn_crypto::{DhKeypair, StreamCipherKey};
use wivrn_proto::packets::VideoCodec;
use wivrn_session::{default_config_dir, default_data_dir, generate_pin, run_server_handshake, Config, KeyStore, PreferredCodec};
use wivrn_transport::{DatagramChannel, ReliableChannel, StreamChannel};

use crate::runtime::ServerRuntime;
use crate::video::NullVideoSource;

/// Runs the WiVRn session server: pairs with a headset over TCP, then
/// streams tracking, video, and audio over a paired UDP channel.
#[derive(Parser, Debug)]
#[command(name = "wivrn-server", version, about)]
struct Args {
    /// TCP port to listen on; overrides the value stored in config.json.
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding keys.json; defaults to $XDG_DATA_HOME/wivrn.
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,

    /// Directory holding config.json; defaults to $XDG_CONFIG_HOME/wivrn.
    #[arg(long)]
    config_dir: Option<std::path::PathBuf>,

    /// Increase log verbosity; repeat for more (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all logging below error level.
    #[arg(short, long)]
    quiet: bool,
}

fn init_tracing(args: &Args) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "wivrn_server=info,wivrn_session=info",
            1 => "wivrn_server=debug,wivrn_session=debug",
            _ => "wivrn_server=trace,wivrn_session=trace,wivrn_transport=trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
}

fn to_wire_codec(codec: PreferredCodec) -> VideoCodec {
    match codec {
        PreferredCodec::H264 => VideoCodec::H264,
        PreferredCodec::H265 => VideoCodec::H265,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("wivrn-server exiting: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> wivrn_session::Result<()> {
    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let config_dir = match args.config_dir {
        Some(dir) => dir,
        None => default_config_dir()?,
    };

    let mut keystore = KeyStore::load(data_dir.join("keys.json"))?;
    let config_path = config_dir.join("config.json");
    let config = Config::load(&config_path)?;
    config.save(&config_path)?;

    let port = args.port.unwrap_or(config.listen_port);
    let wire_codec = to_wire_codec(config.preferred_codec);

    // A fresh identity per run: pairing is keyed on the headset's public
    // key in keys.json, not the server's, so the server has nothing that
    // needs to survive a restart.
    let local_keypair = DhKeypair::generate_x25519();

    let listener = tokio::net::TcpListener::bind(("::", port)).await?;
    info!(port, "wivrn-server listening");

    loop {
        let (tcp, peer) = listener.accept().await?;
        info!(%peer, "accepted connection");

        let reliable = match ReliableChannel::new(tcp) {
            Ok(r) => r,
            Err(e) => {
                warn!("failed to wrap accepted connection: {e}");
                continue;
            }
        };

        let pin = generate_pin();
        info!(pin = %pin, "pairing pin for this connection (share with the headset if unpaired)");

        let outcome = match run_server_handshake(reliable, &mut keystore, &local_keypair, None, || pin.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("handshake with {peer} failed: {e}");
                continue;
            }
        };

        info!(peer_key = %hex::encode(outcome.peer_public_key), "handshake complete, starting session runtime");

        // Same port as the TCP control channel (spec.md §6: "TCP + UDP on
        // the same port"); fine to rebind sequentially since this demo
        // serves one headset session at a time (multi-headset fan-out is a
        // Non-goal).
        let datagram = DatagramChannel::bind(port).await?;
        let stream = StreamChannel::new(
            datagram,
            StreamCipherKey::new(outcome.secrets.stream_key, outcome.secrets.stream_iv_header_to_headset),
            StreamCipherKey::new(outcome.secrets.stream_key, outcome.secrets.stream_iv_header_from_headset),
        );
        let control = outcome.control;

        let runtime = ServerRuntime::new(control, stream, NullVideoSource, wire_codec, 1600, 1440);
        let cancel = CancellationToken::new();
        if let Err(e) = runtime.run(cancel).await {
            warn!("session with {peer} ended: {e}");
        } else {
            info!("session with {peer} ended cleanly");
        }
    }
}
