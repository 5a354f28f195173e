//! Wire serialization, type-hash, and packet taxonomy shared by both ends
//! of a WiVRn session.
//!
//! This crate has no I/O of its own: [`wivrn_transport`](../wivrn_transport)
//! frames these bytes onto sockets, and [`wivrn_session`](../wivrn_session)
//! interprets the decoded packets.

pub mod error;
pub mod hash;
pub mod packets;
pub mod shard;
pub mod wire;

pub use error::{DeserializationError, Result};
pub use hash::{type_hash_of, HashContext};
pub use packets::{FromHeadset, ToHeadset, TransportClass};
pub use shard::{Feedback, Fov, Pose, ShardFlags, TimingInfo, VideoStreamDataShard, ViewInfo, MAX_SHARD_SIZE};
pub use wire::{DeserializationPacket, DurationNs, SerializationPacket, TypeHash, WireEncode};

/// The protocol version exchanged in `client_announce`: the FNV-1a type-hash
/// of the full `variant<FromHeadset, ToHeadset>` schema. Two peers with
/// matching values are guaranteed wire-compatible; any mismatch is a fatal
/// `protocol_mismatch` at handshake time.
pub fn protocol_version() -> u64 {
    let mut ctx = HashContext::new();
    hash::feed_variant(&mut ctx, &[FromHeadset::type_hash, ToHeadset::type_hash]);
    ctx.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_version_is_deterministic() {
        assert_eq!(protocol_version(), protocol_version());
    }
}
