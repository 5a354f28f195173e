//! Socket transport: the length-prefixed reliable (TCP) channel and the
//! batched, encrypted, replay-protected datagram (UDP) channel that carry
//! the packet family defined in `wivrn_proto`.

pub mod control_channel;
pub mod datagram;
pub mod error;
pub mod reliable;
pub mod replay_window;
pub mod stream_channel;

pub use control_channel::ControlChannel;
pub use datagram::{DatagramChannel, ReceivedDatagram};
pub use error::{Result, TransportError};
pub use reliable::ReliableChannel;
pub use replay_window::ReplayWindow;
pub use stream_channel::StreamChannel;
