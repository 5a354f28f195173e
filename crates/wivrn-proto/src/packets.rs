//! The two top-level packet unions and their concrete message variants.
//!
//! `FromHeadset` and `ToHeadset` are tagged unions whose outer discriminant
//! is a single declaration-order byte — narrower than the generic `u32`
//! variant-index rule §4.A gives for nested tagged unions, because the
//! packet family is itself the thing version-gated by the handshake and
//! keeping its tag small matters on the datagram path. Every variant is
//! additionally tagged with the transport class it travels on, fixed per
//! variant rather than chosen per message.

use crate::hash::{feed_structure, feed_variant, HashContext};
use crate::shard::{Feedback, Pose, ViewInfo, VideoStreamDataShard};
use crate::wire::{DeserializationPacket, SerializationPacket, TypeHash, WireEncode};
use crate::error::{DeserializationError, Result};

/// Which socket a variant travels on, fixed per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportClass {
    /// Reliable channel (TCP): rare, order- and loss-sensitive.
    Control,
    /// Datagram channel (UDP): frequent, loss-tolerant.
    Stream,
}

/// `{protocol_version, client_version}` — the first message on the reliable
/// channel, compared against the local type-hash before anything else is
/// trusted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientAnnounce {
    pub protocol_version: u64,
    pub client_version: String,
}

impl WireEncode for ClientAnnounce {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.protocol_version.serialize(packet);
        self.client_version.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        Ok(ClientAnnounce {
            protocol_version: u64::deserialize(packet)?,
            client_version: String::deserialize(packet)?,
        })
    }
}

impl TypeHash for ClientAnnounce {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(ctx, &[u64::type_hash, String::type_hash]);
    }
}

/// Static information advertised by the headset once paired: device name,
/// advertised tracking refresh rate, and panel resolution per eye.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadsetInfo {
    pub device_name: String,
    pub refresh_rate_hz: f32,
    pub recommended_eye_width: u32,
    pub recommended_eye_height: u32,
}

impl WireEncode for HeadsetInfo {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.device_name.serialize(packet);
        self.refresh_rate_hz.serialize(packet);
        self.recommended_eye_width.serialize(packet);
        self.recommended_eye_height.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        Ok(HeadsetInfo {
            device_name: String::deserialize(packet)?,
            refresh_rate_hz: f32::deserialize(packet)?,
            recommended_eye_width: u32::deserialize(packet)?,
            recommended_eye_height: u32::deserialize(packet)?,
        })
    }
}

impl TypeHash for HeadsetInfo {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(
            ctx,
            &[String::type_hash, f32::type_hash, u32::type_hash, u32::type_hash],
        );
    }
}

/// One stereo tracking update, sent on the stream channel at the headset's
/// sampling rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracking {
    pub view_info: ViewInfo,
    pub headset_pose: Pose,
}

impl WireEncode for Tracking {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.view_info.serialize(packet);
        self.headset_pose.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        Ok(Tracking {
            view_info: ViewInfo::deserialize(packet)?,
            headset_pose: Pose::deserialize(packet)?,
        })
    }
}

impl TypeHash for Tracking {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(ctx, &[ViewInfo::type_hash, Pose::type_hash]);
    }
}

/// A hand's 26 joints packed as 3 wrist-position floats, 3 quantised
/// wrist-rotation bytes, and one byte per remaining degree of freedom.
#[derive(Debug, Clone, PartialEq)]
pub struct HandTracking {
    pub left: Option<HandPose>,
    pub right: Option<HandPose>,
    pub display_time_ns: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandPose {
    pub wrist_position: [f32; 3],
    pub wrist_rotation_quantized: [u8; 3],
    pub joint_dofs: Vec<u8>,
}

impl WireEncode for HandPose {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.wrist_position.serialize(packet);
        self.wrist_rotation_quantized.serialize(packet);
        self.joint_dofs.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        Ok(HandPose {
            wrist_position: <[f32; 3]>::deserialize(packet)?,
            wrist_rotation_quantized: <[u8; 3]>::deserialize(packet)?,
            joint_dofs: Vec::<u8>::deserialize(packet)?,
        })
    }
}

impl TypeHash for HandPose {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(
            ctx,
            &[<[f32; 3]>::type_hash, <[u8; 3]>::type_hash, Vec::<u8>::type_hash],
        );
    }
}

impl WireEncode for HandTracking {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.left.serialize(packet);
        self.right.serialize(packet);
        self.display_time_ns.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        Ok(HandTracking {
            left: Option::<HandPose>::deserialize(packet)?,
            right: Option::<HandPose>::deserialize(packet)?,
            display_time_ns: i64::deserialize(packet)?,
        })
    }
}

impl TypeHash for HandTracking {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(
            ctx,
            &[
                Option::<HandPose>::type_hash,
                Option::<HandPose>::type_hash,
                i64::type_hash,
            ],
        );
    }
}

/// A batch of 16-bit PCM microphone samples at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    pub timestamp_ns: i64,
    pub samples: Vec<i16>,
}

impl WireEncode for AudioData {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.timestamp_ns.serialize(packet);
        (self.samples.len() as u16).serialize(packet);
        for s in &self.samples {
            s.serialize(packet);
        }
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        let timestamp_ns = i64::deserialize(packet)?;
        let len = u16::deserialize(packet)? as usize;
        if len * 2 > packet.remaining() {
            return Err(DeserializationError::OversizeLength {
                len,
                remaining: packet.remaining(),
            });
        }
        let mut samples = Vec::with_capacity(len);
        for _ in 0..len {
            samples.push(i16::deserialize(packet)?);
        }
        Ok(AudioData {
            timestamp_ns,
            samples,
        })
    }
}

impl TypeHash for AudioData {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(ctx, &[i64::type_hash, Vec::<i16>::type_hash]);
    }
}

/// One message of the pairing/DH handshake. The payload is opaque at this
/// layer — interpretation (ephemeral public key, SMP message, DH public key)
/// is the session handshake's job; this type only carries bytes plus a
/// `stage` discriminant across the wire so the handshake state machine can
/// dispatch without a second deserialization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CryptoHandshake {
    pub stage: u8,
    pub payload: Vec<u8>,
}

impl WireEncode for CryptoHandshake {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.stage.serialize(packet);
        self.payload.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        Ok(CryptoHandshake {
            stage: u8::deserialize(packet)?,
            payload: Vec::<u8>::deserialize(packet)?,
        })
    }
}

impl TypeHash for CryptoHandshake {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(ctx, &[u8::type_hash, Vec::<u8>::type_hash]);
    }
}

/// The sentinel that must be the first payload encrypted with the derived
/// session keys on each channel; receiving it confirms key agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandshakeComplete;

impl WireEncode for HandshakeComplete {
    fn serialize(&self, _packet: &mut SerializationPacket) {}
    fn deserialize(_packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        Ok(HandshakeComplete)
    }
}

impl TypeHash for HandshakeComplete {
    fn type_hash(ctx: &mut HashContext) {
        ctx.feed_str("structure{}");
    }
}

/// Advertises one video stream's index and codec before any shards arrive.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamDescription {
    pub stream_index: u8,
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264 = 0,
    H265 = 1,
}

impl WireEncode for VideoCodec {
    fn serialize(&self, packet: &mut SerializationPacket) {
        (*self as u8).serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        match u8::deserialize(packet)? {
            0 => Ok(VideoCodec::H264),
            1 => Ok(VideoCodec::H265),
            tag => Err(DeserializationError::InvalidVariantTag {
                tag: tag as u32,
                count: 2,
            }),
        }
    }
}

impl TypeHash for VideoCodec {
    fn type_hash(ctx: &mut HashContext) {
        ctx.feed_str("uint8");
    }
}

impl WireEncode for VideoStreamDescription {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.stream_index.serialize(packet);
        self.codec.serialize(packet);
        self.width.serialize(packet);
        self.height.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        Ok(VideoStreamDescription {
            stream_index: u8::deserialize(packet)?,
            codec: VideoCodec::deserialize(packet)?,
            width: u32::deserialize(packet)?,
            height: u32::deserialize(packet)?,
        })
    }
}

impl TypeHash for VideoStreamDescription {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(
            ctx,
            &[u8::type_hash, VideoCodec::type_hash, u32::type_hash, u32::type_hash],
        );
    }
}

/// A pairing-derived session key exchange: the peer's long-term X25519
/// public key plus, the first time a given peer connects, a chosen display
/// name to persist alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionKeyExchange {
    pub public_key: [u8; 32],
    pub display_name: Option<String>,
}

impl WireEncode for SessionKeyExchange {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.public_key.serialize(packet);
        self.display_name.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        Ok(SessionKeyExchange {
            public_key: <[u8; 32]>::deserialize(packet)?,
            display_name: Option::<String>::deserialize(packet)?,
        })
    }
}

impl TypeHash for SessionKeyExchange {
    fn type_hash(ctx: &mut HashContext) {
        feed_structure(ctx, &[<[u8; 32]>::type_hash, Option::<String>::type_hash]);
    }
}

/// Messages originated by the headset.
#[derive(Debug, Clone, PartialEq)]
pub enum FromHeadset {
    ClientAnnounce(ClientAnnounce),
    HeadsetInfo(HeadsetInfo),
    CryptoHandshake(CryptoHandshake),
    SessionKeyExchange(SessionKeyExchange),
    HandshakeComplete(HandshakeComplete),
    Tracking(Tracking),
    HandTracking(HandTracking),
    Feedback(Feedback),
    AudioData(AudioData),
}

impl FromHeadset {
    pub fn transport_class(&self) -> TransportClass {
        match self {
            FromHeadset::ClientAnnounce(_)
            | FromHeadset::HeadsetInfo(_)
            | FromHeadset::CryptoHandshake(_)
            | FromHeadset::SessionKeyExchange(_)
            | FromHeadset::HandshakeComplete(_) => TransportClass::Control,
            FromHeadset::Tracking(_)
            | FromHeadset::HandTracking(_)
            | FromHeadset::Feedback(_)
            | FromHeadset::AudioData(_) => TransportClass::Stream,
        }
    }

    const VARIANT_COUNT: u8 = 9;
}

impl WireEncode for FromHeadset {
    fn serialize(&self, packet: &mut SerializationPacket) {
        match self {
            FromHeadset::ClientAnnounce(v) => {
                0u8.serialize(packet);
                v.serialize(packet);
            }
            FromHeadset::HeadsetInfo(v) => {
                1u8.serialize(packet);
                v.serialize(packet);
            }
            FromHeadset::CryptoHandshake(v) => {
                2u8.serialize(packet);
                v.serialize(packet);
            }
            FromHeadset::SessionKeyExchange(v) => {
                3u8.serialize(packet);
                v.serialize(packet);
            }
            FromHeadset::HandshakeComplete(v) => {
                4u8.serialize(packet);
                v.serialize(packet);
            }
            FromHeadset::Tracking(v) => {
                5u8.serialize(packet);
                v.serialize(packet);
            }
            FromHeadset::HandTracking(v) => {
                6u8.serialize(packet);
                v.serialize(packet);
            }
            FromHeadset::Feedback(v) => {
                7u8.serialize(packet);
                v.serialize(packet);
            }
            FromHeadset::AudioData(v) => {
                8u8.serialize(packet);
                v.serialize(packet);
            }
        }
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        let tag = u8::deserialize(packet)?;
        Ok(match tag {
            0 => FromHeadset::ClientAnnounce(ClientAnnounce::deserialize(packet)?),
            1 => FromHeadset::HeadsetInfo(HeadsetInfo::deserialize(packet)?),
            2 => FromHeadset::CryptoHandshake(CryptoHandshake::deserialize(packet)?),
            3 => FromHeadset::SessionKeyExchange(SessionKeyExchange::deserialize(packet)?),
            4 => FromHeadset::HandshakeComplete(HandshakeComplete::deserialize(packet)?),
            5 => FromHeadset::Tracking(Tracking::deserialize(packet)?),
            6 => FromHeadset::HandTracking(HandTracking::deserialize(packet)?),
            7 => FromHeadset::Feedback(Feedback::deserialize(packet)?),
            8 => FromHeadset::AudioData(AudioData::deserialize(packet)?),
            tag => {
                return Err(DeserializationError::InvalidVariantTag {
                    tag: tag as u32,
                    count: Self::VARIANT_COUNT as u32,
                })
            }
        })
    }
}

impl TypeHash for FromHeadset {
    fn type_hash(ctx: &mut HashContext) {
        feed_variant(
            ctx,
            &[
                ClientAnnounce::type_hash,
                HeadsetInfo::type_hash,
                CryptoHandshake::type_hash,
                SessionKeyExchange::type_hash,
                HandshakeComplete::type_hash,
                Tracking::type_hash,
                HandTracking::type_hash,
                Feedback::type_hash,
                AudioData::type_hash,
            ],
        );
    }
}

/// Messages originated by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ToHeadset {
    ProtocolMismatch { server_version: u64 },
    CryptoHandshake(CryptoHandshake),
    SessionKeyExchange(SessionKeyExchange),
    HandshakeComplete(HandshakeComplete),
    VideoStreamDescription(VideoStreamDescription),
    VideoStreamDataShard(VideoStreamDataShard),
    AudioData(AudioData),
}

impl ToHeadset {
    pub fn transport_class(&self) -> TransportClass {
        match self {
            ToHeadset::ProtocolMismatch { .. }
            | ToHeadset::CryptoHandshake(_)
            | ToHeadset::SessionKeyExchange(_)
            | ToHeadset::HandshakeComplete(_)
            | ToHeadset::VideoStreamDescription(_) => TransportClass::Control,
            ToHeadset::VideoStreamDataShard(_) | ToHeadset::AudioData(_) => TransportClass::Stream,
        }
    }

    const VARIANT_COUNT: u8 = 7;
}

impl WireEncode for ToHeadset {
    fn serialize(&self, packet: &mut SerializationPacket) {
        match self {
            ToHeadset::ProtocolMismatch { server_version } => {
                0u8.serialize(packet);
                server_version.serialize(packet);
            }
            ToHeadset::CryptoHandshake(v) => {
                1u8.serialize(packet);
                v.serialize(packet);
            }
            ToHeadset::SessionKeyExchange(v) => {
                2u8.serialize(packet);
                v.serialize(packet);
            }
            ToHeadset::HandshakeComplete(v) => {
                3u8.serialize(packet);
                v.serialize(packet);
            }
            ToHeadset::VideoStreamDescription(v) => {
                4u8.serialize(packet);
                v.serialize(packet);
            }
            ToHeadset::VideoStreamDataShard(v) => {
                5u8.serialize(packet);
                v.serialize(packet);
            }
            ToHeadset::AudioData(v) => {
                6u8.serialize(packet);
                v.serialize(packet);
            }
        }
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        let tag = u8::deserialize(packet)?;
        Ok(match tag {
            0 => ToHeadset::ProtocolMismatch {
                server_version: u64::deserialize(packet)?,
            },
            1 => ToHeadset::CryptoHandshake(CryptoHandshake::deserialize(packet)?),
            2 => ToHeadset::SessionKeyExchange(SessionKeyExchange::deserialize(packet)?),
            3 => ToHeadset::HandshakeComplete(HandshakeComplete::deserialize(packet)?),
            4 => ToHeadset::VideoStreamDescription(VideoStreamDescription::deserialize(packet)?),
            5 => ToHeadset::VideoStreamDataShard(VideoStreamDataShard::deserialize(packet)?),
            6 => ToHeadset::AudioData(AudioData::deserialize(packet)?),
            tag => {
                return Err(DeserializationError::InvalidVariantTag {
                    tag: tag as u32,
                    count: Self::VARIANT_COUNT as u32,
                })
            }
        })
    }
}

impl TypeHash for ToHeadset {
    fn type_hash(ctx: &mut HashContext) {
        feed_variant(
            ctx,
            &[
                u64::type_hash,
                CryptoHandshake::type_hash,
                SessionKeyExchange::type_hash,
                HandshakeComplete::type_hash,
                VideoStreamDescription::type_hash,
                VideoStreamDataShard::type_hash,
                AudioData::type_hash,
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: WireEncode + PartialEq + std::fmt::Debug>(value: T) {
        let mut packet = SerializationPacket::new();
        packet.serialize(&value);
        let bytes = packet.into_bytes();
        let mut reader = DeserializationPacket::new(&bytes);
        let decoded = T::deserialize(&mut reader).expect("decode");
        assert_eq!(value, decoded);
        assert!(reader.is_empty());
    }

    #[test]
    fn client_announce_roundtrips() {
        roundtrip(ClientAnnounce {
            protocol_version: 0x1234_5678_9abc_def0,
            client_version: "1.2.3".to_string(),
        });
    }

    #[test]
    fn tracking_roundtrips_inside_from_headset() {
        roundtrip(FromHeadset::Tracking(Tracking {
            view_info: ViewInfo {
                poses: vec![Pose::default(), Pose::default()],
                fovs: vec![],
                display_time_ns: 42,
            },
            headset_pose: Pose::default(),
        }));
    }

    #[test]
    fn transport_class_split_is_fixed_per_variant() {
        assert_eq!(
            FromHeadset::Feedback(Feedback::default()).transport_class(),
            TransportClass::Stream
        );
        assert_eq!(
            FromHeadset::ClientAnnounce(ClientAnnounce {
                protocol_version: 0,
                client_version: String::new(),
            })
            .transport_class(),
            TransportClass::Control
        );
    }

    #[test]
    fn invalid_variant_tag_is_rejected() {
        let bytes = [200u8];
        let mut reader = DeserializationPacket::new(&bytes);
        let err = FromHeadset::deserialize(&mut reader).unwrap_err();
        assert!(matches!(err, DeserializationError::InvalidVariantTag { .. }));
    }

    #[test]
    fn video_stream_data_shard_roundtrips_with_view_info() {
        roundtrip(VideoStreamDataShard {
            stream_index: 0,
            frame_index: 1,
            shard_index: 0,
            flags: crate::shard::ShardFlags::START_OF_SLICE
                | crate::shard::ShardFlags::END_OF_SLICE
                | crate::shard::ShardFlags::END_OF_FRAME,
            view_info: Some(ViewInfo {
                poses: vec![Pose::default(); 2],
                fovs: vec![],
                display_time_ns: 7,
            }),
            timing_info: None,
            payload: vec![0xAA; 32],
        });
    }
}
