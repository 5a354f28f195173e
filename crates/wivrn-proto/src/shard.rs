//! Video shard, timing and view metadata, and per-frame feedback — the wire
//! types the shard accumulator consumes and produces.

use crate::hash::{feed_structure, HashContext};
use crate::wire::{DeserializationPacket, SerializationPacket, TypeHash, WireEncode};

/// Declares a small bitflags-style newtype without pulling in the `bitflags`
/// crate for three bits.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(pub $repr);

        impl $name {
            $(pub const $flag: $name = $name($value);)*

            pub fn contains(&self, other: $name) -> bool {
                (self.0 & other.0) == other.0
            }

            pub fn union(self, other: $name) -> $name {
                $name(self.0 | other.0)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                self.union(rhs)
            }
        }

        impl WireEncode for $name {
            fn serialize(&self, packet: &mut SerializationPacket) {
                self.0.serialize(packet);
            }
            fn deserialize(packet: &mut DeserializationPacket<'_>) -> crate::error::Result<Self> {
                Ok($name(<$repr>::deserialize(packet)?))
            }
        }

        impl TypeHash for $name {
            fn type_hash(ctx: &mut HashContext) {
                <$repr>::type_hash(ctx);
            }
        }
    };
}

bitflags_like! {
    /// Bit flags packed into the shard's single `flags` byte.
    pub struct ShardFlags: u8 {
        const START_OF_SLICE = 0b001;
        const END_OF_SLICE   = 0b010;
        const END_OF_FRAME   = 0b100;
    }
}

/// Per-eye field of view, in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Fov {
    pub left: f32,
    pub right: f32,
    pub up: f32,
    pub down: f32,
}

impl WireEncode for Fov {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.left.serialize(packet);
        self.right.serialize(packet);
        self.up.serialize(packet);
        self.down.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> crate::error::Result<Self> {
        Ok(Fov {
            left: f32::deserialize(packet)?,
            right: f32::deserialize(packet)?,
            up: f32::deserialize(packet)?,
            down: f32::deserialize(packet)?,
        })
    }
}

impl TypeHash for Fov {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(
            ctx,
            &[
                f32::type_hash,
                f32::type_hash,
                f32::type_hash,
                f32::type_hash,
            ],
        );
    }
}

/// Position + orientation, in the headset's local reference space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub position: [f32; 3],
    pub orientation: [f32; 4],
}

impl WireEncode for Pose {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.position.serialize(packet);
        self.orientation.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> crate::error::Result<Self> {
        Ok(Pose {
            position: <[f32; 3]>::deserialize(packet)?,
            orientation: <[f32; 4]>::deserialize(packet)?,
        })
    }
}

impl TypeHash for Pose {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(ctx, &[<[f32; 3]>::type_hash, <[f32; 4]>::type_hash]);
    }
}

/// Per-view pose, FOV, and display time, attached to the first shard of a
/// frame so the decoder/compositor can reproject without a round trip.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewInfo {
    pub poses: Vec<Pose>,
    pub fovs: Vec<Fov>,
    pub display_time_ns: i64,
}

impl WireEncode for ViewInfo {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.poses.serialize(packet);
        self.fovs.serialize(packet);
        self.display_time_ns.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> crate::error::Result<Self> {
        Ok(ViewInfo {
            poses: Vec::<Pose>::deserialize(packet)?,
            fovs: Vec::<Fov>::deserialize(packet)?,
            display_time_ns: i64::deserialize(packet)?,
        })
    }
}

impl TypeHash for ViewInfo {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(
            ctx,
            &[Vec::<Pose>::type_hash, Vec::<Fov>::type_hash, i64::type_hash],
        );
    }
}

/// Encoder/send timestamps, attached to the last shard of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimingInfo {
    pub encode_begin_ns: i64,
    pub encode_end_ns: i64,
    pub send_begin_ns: i64,
    pub send_end_ns: i64,
}

impl WireEncode for TimingInfo {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.encode_begin_ns.serialize(packet);
        self.encode_end_ns.serialize(packet);
        self.send_begin_ns.serialize(packet);
        self.send_end_ns.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> crate::error::Result<Self> {
        Ok(TimingInfo {
            encode_begin_ns: i64::deserialize(packet)?,
            encode_end_ns: i64::deserialize(packet)?,
            send_begin_ns: i64::deserialize(packet)?,
            send_end_ns: i64::deserialize(packet)?,
        })
    }
}

impl TypeHash for TimingInfo {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(ctx, &[i64::type_hash, i64::type_hash, i64::type_hash, i64::type_hash]);
    }
}

/// A single UDP-sized slice of an encoded video frame.
///
/// `frame_index` is carried at full `u64` width on the wire; the
/// accumulator's distance computation wraps over the full `u64` range
/// rather than the legacy `u8` shard-header field's width (see
/// `wivrn_accumulator::accumulator`'s module doc comment): indices more
/// than `u64::MAX/2` behind the current high-water mark are rejected as
/// irrecoverably ambiguous rather than guessed at.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamDataShard {
    pub stream_index: u8,
    pub frame_index: u64,
    pub shard_index: u16,
    pub flags: ShardFlags,
    pub view_info: Option<ViewInfo>,
    pub timing_info: Option<TimingInfo>,
    pub payload: Vec<u8>,
}

/// Datagram-safe upper bound on a shard's serialized size.
pub const MAX_SHARD_SIZE: usize = 1200;

impl VideoStreamDataShard {
    pub fn start_of_slice(&self) -> bool {
        self.flags.contains(ShardFlags::START_OF_SLICE)
    }

    pub fn end_of_slice(&self) -> bool {
        self.flags.contains(ShardFlags::END_OF_SLICE)
    }

    pub fn end_of_frame(&self) -> bool {
        self.flags.contains(ShardFlags::END_OF_FRAME)
    }
}

impl WireEncode for VideoStreamDataShard {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.stream_index.serialize(packet);
        self.frame_index.serialize(packet);
        self.shard_index.serialize(packet);
        self.flags.serialize(packet);
        self.view_info.serialize(packet);
        self.timing_info.serialize(packet);
        self.payload.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> crate::error::Result<Self> {
        Ok(VideoStreamDataShard {
            stream_index: u8::deserialize(packet)?,
            frame_index: u64::deserialize(packet)?,
            shard_index: u16::deserialize(packet)?,
            flags: ShardFlags::deserialize(packet)?,
            view_info: Option::<ViewInfo>::deserialize(packet)?,
            timing_info: Option::<TimingInfo>::deserialize(packet)?,
            payload: Vec::<u8>::deserialize(packet)?,
        })
    }
}

impl TypeHash for VideoStreamDataShard {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(
            ctx,
            &[
                u8::type_hash,
                u64::type_hash,
                u16::type_hash,
                u8::type_hash,
                Option::<ViewInfo>::type_hash,
                Option::<TimingInfo>::type_hash,
                Vec::<u8>::type_hash,
            ],
        );
    }
}

/// Emitted upstream once per completed (or abandoned) frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Feedback {
    pub frame_index: u64,
    pub stream_index: u8,
    pub received_first_packet_ns: i64,
    pub received_last_packet_ns: i64,
    pub sent_to_decoder_ns: i64,
    pub received_from_decoder_ns: i64,
    pub blitted_ns: i64,
    pub displayed_ns: i64,
    pub real_pose: [Pose; 2],
    pub encode_begin_ns: i64,
    pub encode_end_ns: i64,
    pub send_begin_ns: i64,
    pub send_end_ns: i64,
}

impl WireEncode for Feedback {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.frame_index.serialize(packet);
        self.stream_index.serialize(packet);
        self.received_first_packet_ns.serialize(packet);
        self.received_last_packet_ns.serialize(packet);
        self.sent_to_decoder_ns.serialize(packet);
        self.received_from_decoder_ns.serialize(packet);
        self.blitted_ns.serialize(packet);
        self.displayed_ns.serialize(packet);
        self.real_pose.serialize(packet);
        self.encode_begin_ns.serialize(packet);
        self.encode_end_ns.serialize(packet);
        self.send_begin_ns.serialize(packet);
        self.send_end_ns.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> crate::error::Result<Self> {
        Ok(Feedback {
            frame_index: u64::deserialize(packet)?,
            stream_index: u8::deserialize(packet)?,
            received_first_packet_ns: i64::deserialize(packet)?,
            received_last_packet_ns: i64::deserialize(packet)?,
            sent_to_decoder_ns: i64::deserialize(packet)?,
            received_from_decoder_ns: i64::deserialize(packet)?,
            blitted_ns: i64::deserialize(packet)?,
            displayed_ns: i64::deserialize(packet)?,
            real_pose: <[Pose; 2]>::deserialize(packet)?,
            encode_begin_ns: i64::deserialize(packet)?,
            encode_end_ns: i64::deserialize(packet)?,
            send_begin_ns: i64::deserialize(packet)?,
            send_end_ns: i64::deserialize(packet)?,
        })
    }
}

impl TypeHash for Feedback {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(
            ctx,
            &[
                u64::type_hash,
                u8::type_hash,
                i64::type_hash,
                i64::type_hash,
                i64::type_hash,
                i64::type_hash,
                i64::type_hash,
                i64::type_hash,
                <[Pose; 2]>::type_hash,
                i64::type_hash,
                i64::type_hash,
                i64::type_hash,
                i64::type_hash,
            ],
        );
    }
}
