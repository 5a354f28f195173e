//! Splitting one encoded access unit into datagram-sized shards
//! (spec.md §3 "Entity: Video shard").
//!
//! The actual encoder is out of scope (spec.md §1: "OS-specific video
//! encoders/decoders... the core defines the packetised bitstream contract
//! they must feed"); [`VideoSource`] is that contract. A real integration
//! implements it by pulling the next Annex-B access unit off whatever
//! encoder session is attached.

use wivrn_proto::shard::{ShardFlags, TimingInfo, VideoStreamDataShard, ViewInfo, MAX_SHARD_SIZE};
use wivrn_session::{split_and_classify, Codec, NalClass};

/// One complete encoded frame, still in Annex-B form, ready to be split into
/// shards and sent. The codec is the runtime's configured codec, not stored
/// per-unit — a session doesn't switch codecs mid-stream.
pub struct AccessUnit {
    pub view_info: ViewInfo,
    pub data: Vec<u8>,
    pub encode_begin_ns: i64,
    pub encode_end_ns: i64,
}

/// Supplies encoded frames to the session runtime. The real implementation
/// lives outside this crate's scope; tests use a canned bitstream.
pub trait VideoSource: Send {
    fn next_access_unit(&mut self, now_ns: i64) -> Option<AccessUnit>;
}

/// Never produces a frame. The default until a real encoder is wired in —
/// the session still runs, pairs, and exchanges tracking/feedback without
/// it.
pub struct NullVideoSource;

impl VideoSource for NullVideoSource {
    fn next_access_unit(&mut self, _now_ns: i64) -> Option<AccessUnit> {
        None
    }
}

/// Leaves headroom under [`MAX_SHARD_SIZE`] for the shard's other
/// serialized fields (indices, flags, optional view/timing info) so the
/// whole frame stays datagram-safe; not an exact fit, a safety margin.
const PAYLOAD_BUDGET: usize = MAX_SHARD_SIZE - 64;

/// Splits one access unit into shards: garbage NALs (AUD, filler) are
/// dropped, CSD and data NALs are concatenated and chunked to
/// [`PAYLOAD_BUDGET`], `view_info` rides the first shard, `timing_info`
/// the last, and `send_begin_ns`/`send_end_ns` are filled in by the caller
/// once it's actually sending (this function only knows the encode side).
pub fn split_into_shards(
    stream_index: u8,
    frame_index: u64,
    codec: Codec,
    unit: &AccessUnit,
    send_begin_ns: i64,
    send_end_ns: i64,
) -> Vec<VideoStreamDataShard> {
    let mut payload = Vec::with_capacity(unit.data.len());
    for nal in split_and_classify(&unit.data, codec) {
        if nal.class != NalClass::Garbage {
            payload.extend_from_slice(nal.payload);
        }
    }
    if payload.is_empty() {
        return Vec::new();
    }

    let chunks: Vec<&[u8]> = payload.chunks(PAYLOAD_BUDGET).collect();
    let last_index = chunks.len() - 1;

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut flags = ShardFlags::default();
            if i == 0 {
                flags = flags | ShardFlags::START_OF_SLICE;
            }
            if i == last_index {
                flags = flags | ShardFlags::END_OF_SLICE | ShardFlags::END_OF_FRAME;
            }
            VideoStreamDataShard {
                stream_index,
                frame_index,
                shard_index: i as u16,
                flags,
                view_info: if i == 0 { Some(unit.view_info.clone()) } else { None },
                timing_info: if i == last_index {
                    Some(TimingInfo {
                        encode_begin_ns: unit.encode_begin_ns,
                        encode_end_ns: unit.encode_end_ns,
                        send_begin_ns,
                        send_end_ns,
                    })
                } else {
                    None
                },
                payload: chunk.to_vec(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wivrn_proto::shard::Pose;

    fn annex_b(nals: &[(u8, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (header, body) in nals {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.push(*header);
            out.extend_from_slice(body);
        }
        out
    }

    fn view_info() -> ViewInfo {
        ViewInfo {
            poses: vec![Pose::default(); 2],
            fovs: vec![],
            display_time_ns: 0,
        }
    }

    #[test]
    fn single_small_frame_is_one_shard_with_both_boundary_flags() {
        let data = annex_b(&[(0x67, &[1, 2, 3]), (0x65, &[9; 16])]); // SPS + IDR slice
        let unit = AccessUnit {
            view_info: view_info(),
            data,
            encode_begin_ns: 1,
            encode_end_ns: 2,
        };
        let shards = split_into_shards(0, 7, Codec::H264, &unit, 3, 4);
        assert_eq!(shards.len(), 1);
        assert!(shards[0].start_of_slice());
        assert!(shards[0].end_of_slice());
        assert!(shards[0].end_of_frame());
        assert!(shards[0].view_info.is_some());
        assert!(shards[0].timing_info.is_some());
        assert_eq!(shards[0].frame_index, 7);
    }

    #[test]
    fn garbage_nals_are_stripped_before_shard_splitting() {
        let data = annex_b(&[(0x09, &[0xF0]), (0x65, &[9; 8])]); // AUD + slice
        let unit = AccessUnit {
            view_info: view_info(),
            data,
            encode_begin_ns: 0,
            encode_end_ns: 0,
        };
        let shards = split_into_shards(0, 0, Codec::H264, &unit, 0, 0);
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].payload, vec![9u8; 8]);
    }

    #[test]
    fn large_frame_splits_into_multiple_shards_with_flags_at_the_edges() {
        let big = vec![0xABu8; PAYLOAD_BUDGET * 2 + 10];
        let data = annex_b(&[(0x65, &big)]);
        let unit = AccessUnit {
            view_info: view_info(),
            data,
            encode_begin_ns: 0,
            encode_end_ns: 0,
        };
        let shards = split_into_shards(1, 3, Codec::H264, &unit, 0, 0);
        assert_eq!(shards.len(), 3);
        assert!(shards[0].start_of_slice() && !shards[0].end_of_slice());
        assert!(!shards[1].start_of_slice() && !shards[1].end_of_slice());
        assert!(shards[2].end_of_slice() && shards[2].end_of_frame());
        assert!(shards[1].view_info.is_none());
        assert!(shards[1].timing_info.is_none());
        for shard in &shards {
            assert_eq!(shard.stream_index, 1);
            assert_eq!(shard.frame_index, 3);
        }
    }

    #[test]
    fn all_garbage_frame_yields_no_shards() {
        let data = annex_b(&[(0x09, &[0xF0]), (0x0C, &[0x00])]); // AUD + filler
        let unit = AccessUnit {
            view_info: view_info(),
            data,
            encode_begin_ns: 0,
            encode_end_ns: 0,
        };
        assert!(split_into_shards(0, 0, Codec::H264, &unit, 0, 0).is_empty());
    }
}
