//! Handshake state machine, persisted state, and the runtime event loop
//! tying together `wivrn_proto`, `wivrn_crypto`, `wivrn_transport`, and
//! `wivrn_accumulator` into one WiVRn session (spec.md §4.D/§4.F).

pub mod config;
pub mod error;
pub mod handshake;
pub mod keystore;
pub mod nal;
pub mod paths;
pub mod runtime;
pub mod timebase;

pub use config::{Config, PreferredCodec};
pub use error::{Result, SessionError};
pub use handshake::{generate_pin, run_client_handshake, run_server_handshake, HandshakeOutcome};
pub use keystore::{KeyStore, PairedHeadset};
pub use nal::{split_and_classify, Codec, Nal, NalClass};
pub use paths::{default_config_dir, default_data_dir, project_dirs, InstallCookie};
pub use runtime::{PoseSource, SessionRuntime};
pub use timebase::{ClockOffsetEstimator, TrackingPacer};
