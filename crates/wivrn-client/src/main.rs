//! `wivrn-client`: a headset-side demo that pairs with a `wivrn-server`,
//! then runs the session runtime against a stub pose source and a
//! logging decoder sink.
//!
//! Real engine/decoder integration is out of scope (spec.md §1); this
//! binary exists to exercise the handshake and runtime end to end, the
//! way a protocol test harness would.

use std::net::SocketAddr;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wivrn_accumulator::{DecoderSink, SamplerHandle};
use wivrn_crypto::{DhKeypair, StreamCipherKey};
use wivrn_proto::{Feedback, Pose, ViewInfo};
use wivrn_session::{run_client_handshake, PoseSource, SessionRuntime};
use wivrn_transport::{DatagramChannel, ReliableChannel, StreamChannel};

/// Connects to a WiVRn session server and runs the headset side of the
/// session runtime.
#[derive(Parser, Debug)]
#[command(name = "wivrn-client", version, about)]
struct Args {
    /// Server address, e.g. 127.0.0.1:9757.
    #[arg(long)]
    connect: SocketAddr,

    /// Pairing PIN shown by the server on first connection; omit if
    /// already paired.
    #[arg(long)]
    pin: Option<String>,

    /// Display name advertised to the server during pairing.
    #[arg(long, default_value = "wivrn-client demo")]
    display_name: String,

    /// Increase log verbosity; repeat for more (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(args: &Args) {
    let default_level = match args.verbose {
        0 => "wivrn_client=info,wivrn_session=info",
        1 => "wivrn_client=debug,wivrn_session=debug",
        _ => "wivrn_client=trace,wivrn_session=trace,wivrn_transport=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
}

/// Logs each completed frame instead of decoding it; stands in for the
/// out-of-scope hardware decoder.
struct LoggingSink {
    frames_completed: u64,
}

impl DecoderSink for LoggingSink {
    fn push_data(&mut self, payload: &[&[u8]], frame_index: u64, partial: bool) {
        let total: usize = payload.iter().map(|p| p.len()).sum();
        info!(frame_index, total_bytes = total, partial, "decoder received data");
    }

    fn frame_completed(&mut self, feedback: &Feedback, _view_info: &ViewInfo) {
        self.frames_completed += 1;
        info!(
            frame_index = feedback.frame_index,
            frames_completed = self.frames_completed,
            "frame completed"
        );
    }

    fn sampler(&self) -> SamplerHandle {
        SamplerHandle(0)
    }

    fn extent(&self) -> (u32, u32) {
        (1600, 1440)
    }
}

/// Reports a fixed, centered pose; no real tracking hardware is attached.
struct StubPoseSource;

impl PoseSource for StubPoseSource {
    fn sample(&mut self, now_ns: i64) -> (ViewInfo, Pose) {
        let pose = Pose::default();
        (
            ViewInfo {
                poses: vec![pose, pose],
                fovs: vec![],
                display_time_ns: now_ns,
            },
            pose,
        )
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();
    init_tracing(&args);

    match run(args).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("wivrn-client exiting: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> wivrn_session::Result<()> {
    let tcp = tokio::net::TcpStream::connect(args.connect).await?;
    let reliable = ReliableChannel::new(tcp)?;

    let local_keypair = DhKeypair::generate_x25519();
    info!(server = %args.connect, "connecting and running handshake");

    let outcome = run_client_handshake(reliable, &local_keypair, Some(args.display_name), args.pin).await?;
    info!("handshake complete, session secrets derived");

    let datagram = DatagramChannel::bind(0).await?;
    datagram.connect(args.connect).await?;
    let stream = StreamChannel::new(
        datagram,
        StreamCipherKey::new(outcome.secrets.stream_key, outcome.secrets.stream_iv_header_from_headset),
        StreamCipherKey::new(outcome.secrets.stream_key, outcome.secrets.stream_iv_header_to_headset),
    );

    let runtime = SessionRuntime::new(outcome.control, stream, LoggingSink { frames_completed: 0 }, 250.0);
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("ctrl-c received, shutting down session");
        shutdown.cancel();
    });

    runtime.run(cancel, StubPoseSource).await
}
