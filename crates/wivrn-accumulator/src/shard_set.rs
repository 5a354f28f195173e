//! Per-frame shard collection for one video stream.
//!
//! Ported from `shard_accumulator::shard_set` in
//! `examples/original_source/client/decoder/shard_accumulator.{h,cpp}`.

use wivrn_proto::{Feedback, VideoStreamDataShard};

/// Densely-indexed shard storage for a single frame, plus the feedback
/// record being accumulated for it.
pub struct ShardSet {
    data: Vec<Option<VideoStreamDataShard>>,
    pub feedback: Feedback,
}

impl ShardSet {
    pub fn new(stream_index: u8) -> Self {
        let mut feedback = Feedback::default();
        feedback.stream_index = stream_index;
        ShardSet {
            data: Vec::new(),
            feedback,
        }
    }

    /// Clears accumulated shards and restarts `feedback` for `frame_index`,
    /// preserving the stream index.
    pub fn reset(&mut self, frame_index: u64) {
        let stream_index = self.feedback.stream_index;
        self.data.clear();
        self.feedback = Feedback::default();
        self.feedback.frame_index = frame_index;
        self.feedback.stream_index = stream_index;
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn frame_index(&self) -> u64 {
        self.feedback.frame_index
    }

    pub fn shard(&self, idx: usize) -> Option<&VideoStreamDataShard> {
        self.data.get(idx).and_then(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Inserts `shard` at its own `shard_index`, growing the vector as
    /// needed. Returns the index it landed at, or `None` if that slot was
    /// already filled (a duplicate, e.g. a replayed datagram).
    pub fn insert(&mut self, shard: VideoStreamDataShard, now_ns: i64) -> Option<u16> {
        if self.is_empty() {
            self.feedback.received_first_packet_ns = now_ns;
        }
        let idx = shard.shard_index as usize;
        if idx >= self.data.len() {
            self.data.resize_with(idx + 1, || None);
        }
        if self.data[idx].is_some() {
            return None;
        }
        self.data[idx] = Some(shard);
        Some(idx as u16)
    }

    /// A frame is complete iff every shard slot is filled and the last
    /// shard carries `timing_info` (only the frame's last shard does).
    pub fn is_complete(&self) -> bool {
        match self.data.last() {
            None => false,
            Some(None) => false,
            Some(Some(last)) => {
                if last.timing_info.is_none() {
                    return false;
                }
                self.data.iter().all(|s| s.is_some())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wivrn_proto::ShardFlags;

    fn shard(idx: u16, flags: ShardFlags, timing: bool) -> VideoStreamDataShard {
        VideoStreamDataShard {
            stream_index: 0,
            frame_index: 1,
            shard_index: idx,
            flags,
            view_info: None,
            timing_info: timing.then(|| wivrn_proto::TimingInfo {
                encode_begin_ns: 1,
                encode_end_ns: 2,
                send_begin_ns: 3,
                send_end_ns: 4,
            }),
            payload: vec![0xAA],
        }
    }

    #[test]
    fn empty_set_is_never_complete() {
        let set = ShardSet::new(0);
        assert!(!set.is_complete());
    }

    #[test]
    fn single_shard_with_end_of_frame_and_timing_is_complete() {
        let mut set = ShardSet::new(0);
        set.insert(shard(0, ShardFlags::END_OF_FRAME, true), 0);
        assert!(set.is_complete());
    }

    #[test]
    fn missing_middle_shard_is_not_complete() {
        let mut set = ShardSet::new(0);
        set.insert(shard(0, ShardFlags::default(), false), 0);
        set.insert(shard(2, ShardFlags::END_OF_FRAME, true), 0);
        assert!(!set.is_complete());
    }

    #[test]
    fn duplicate_insert_returns_none_and_does_not_replace() {
        let mut set = ShardSet::new(0);
        assert_eq!(set.insert(shard(0, ShardFlags::default(), false), 0), Some(0));
        assert_eq!(set.insert(shard(0, ShardFlags::default(), false), 5), None);
    }

    #[test]
    fn reset_preserves_stream_index_and_clears_data() {
        let mut set = ShardSet::new(7);
        set.insert(shard(0, ShardFlags::default(), false), 0);
        set.reset(42);
        assert!(set.is_empty());
        assert_eq!(set.frame_index(), 42);
        assert_eq!(set.feedback.stream_index, 7);
    }
}
