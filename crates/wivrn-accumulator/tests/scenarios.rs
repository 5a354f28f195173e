use wivrn_accumulator::{DecoderSink, SamplerHandle, ShardAccumulator};
use wivrn_proto::{Feedback, ShardFlags, TimingInfo, VideoStreamDataShard, ViewInfo};

mod helpers {
    use super::*;

    #[derive(Default)]
    pub struct RecordingSink {
        pub push_calls: Vec<(Vec<u8>, u64, bool)>,
        pub completed: Vec<(Feedback, ViewInfo)>,
    }

    impl DecoderSink for RecordingSink {
        fn push_data(&mut self, payload: &[&[u8]], frame_index: u64, partial: bool) {
            let flat: Vec<u8> = payload.iter().flat_map(|p| p.iter().copied()).collect();
            self.push_calls.push((flat, frame_index, partial));
        }

        fn frame_completed(&mut self, feedback: &Feedback, view_info: &ViewInfo) {
            self.completed.push((*feedback, view_info.clone()));
        }

        fn sampler(&self) -> SamplerHandle {
            SamplerHandle(0)
        }

        fn extent(&self) -> (u32, u32) {
            (1832, 1920)
        }
    }

    pub fn shard(
        frame_index: u64,
        shard_index: u16,
        flags: ShardFlags,
        view_info: Option<ViewInfo>,
        timing_info: Option<TimingInfo>,
        payload: u8,
    ) -> VideoStreamDataShard {
        VideoStreamDataShard {
            stream_index: 0,
            frame_index,
            shard_index,
            flags,
            view_info,
            timing_info,
            payload: vec![payload],
        }
    }

    pub fn sample_view_info() -> ViewInfo {
        ViewInfo {
            poses: Vec::new(),
            fovs: Vec::new(),
            display_time_ns: 1000,
        }
    }

    pub fn sample_timing() -> TimingInfo {
        TimingInfo {
            encode_begin_ns: 1,
            encode_end_ns: 2,
            send_begin_ns: 3,
            send_end_ns: 4,
        }
    }

    pub fn complete_single_shard(frame_index: u64, payload: u8) -> VideoStreamDataShard {
        shard(
            frame_index,
            0,
            ShardFlags::START_OF_SLICE | ShardFlags::END_OF_SLICE | ShardFlags::END_OF_FRAME,
            Some(sample_view_info()),
            Some(sample_timing()),
            payload,
        )
    }
}

use helpers::*;

// A freshly constructed accumulator starts with `current.frame_index() == 0`
// and `next.frame_index() == 1` (mirroring the original's constructor, which
// resets `next` to frame 1 right away). Every test below feeds its first
// shard for frame 0 so it lands in `current` directly, matching how a real
// session looks once steady state is reached rather than exercising the
// one-time bootstrap path.

#[test]
fn single_shard_frame_happy_path() {
    let mut acc = ShardAccumulator::new(0, RecordingSink::default());

    let feedbacks = acc.push_shard(complete_single_shard(0, 0xAA), 100);

    assert_eq!(feedbacks.len(), 1);
    assert_eq!(feedbacks[0].frame_index, 0);
    assert_eq!(acc.sink().push_calls, vec![(vec![0xAA], 0, false)]);
    assert_eq!(acc.sink().completed.len(), 1);
    assert_eq!(acc.current_frame_index(), 1);
}

#[test]
fn out_of_order_within_a_frame() {
    let mut acc = ShardAccumulator::new(0, RecordingSink::default());

    let shard2 = shard(0, 2, ShardFlags::END_OF_FRAME, None, Some(sample_timing()), 2);
    let shard0 = shard(0, 0, ShardFlags::START_OF_SLICE, Some(sample_view_info()), None, 0);
    let shard1 = shard(0, 1, ShardFlags::default(), None, None, 1);

    assert!(acc.push_shard(shard2, 0).is_empty());
    assert!(acc.sink().push_calls.is_empty(), "idx=2 alone submits nothing");

    assert!(acc.push_shard(shard0, 0).is_empty());
    assert_eq!(acc.sink().push_calls, vec![(vec![0], 0, true)]);

    let feedbacks = acc.push_shard(shard1, 0);
    assert_eq!(feedbacks.len(), 1);
    assert_eq!(
        acc.sink().push_calls[1],
        (vec![1, 2], 0, false),
        "idx=1 unblocks the contiguous run through idx=2"
    );
}

#[test]
fn lost_first_shard_emits_feedback_for_abandoned_frame() {
    let mut acc = ShardAccumulator::new(0, RecordingSink::default());

    let shard1 = shard(0, 1, ShardFlags::default(), None, None, 1);
    let shard2 = shard(0, 2, ShardFlags::END_OF_FRAME, None, Some(sample_timing()), 2);
    assert!(acc.push_shard(shard1, 0).is_empty());
    assert!(acc.push_shard(shard2, 0).is_empty());
    assert!(acc.sink().push_calls.is_empty(), "frame 0 never becomes contiguous (idx=0 missing)");

    let feedbacks = acc.push_shard(complete_single_shard(1, 0xBB), 0);

    assert_eq!(feedbacks.len(), 2, "abandon frame 0, then complete frame 1");
    assert_eq!(feedbacks[0].frame_index, 0);
    assert_eq!(feedbacks[1].frame_index, 1);
    assert_eq!(acc.current_frame_index(), 2);
}

#[test]
fn two_frame_leap_emits_feedback_for_both_skipped_frames() {
    let mut acc = ShardAccumulator::new(0, RecordingSink::default());

    assert_eq!(acc.push_shard(complete_single_shard(0, 1), 0).len(), 1);
    assert_eq!(acc.current_frame_index(), 1);
    assert_eq!(acc.next_frame_index(), 2);

    // current=1 (empty, just rotated in), next=2 (empty); a shard for frame
    // 4 is a diff of 3 relative to `current`, the same "more than one frame
    // lost" gap as the spec's frame 10 -> frame 13 example.
    let leap_shard = shard(4, 0, ShardFlags::default(), None, None, 2);
    let feedbacks = acc.push_shard(leap_shard, 0);

    assert_eq!(feedbacks.len(), 2, "feedback for the two abandoned in-flight frames");
    assert_eq!(feedbacks[0].frame_index, 1);
    assert_eq!(feedbacks[1].frame_index, 2);
    assert_eq!(acc.current_frame_index(), 4);
    assert_eq!(acc.next_frame_index(), 5);
}

#[test]
fn permutations_of_a_complete_frame_yield_exactly_one_completion_in_index_order() {
    let flags_last = ShardFlags::END_OF_SLICE | ShardFlags::END_OF_FRAME;
    let shards = vec![
        shard(0, 0, ShardFlags::START_OF_SLICE, Some(sample_view_info()), None, 10),
        shard(0, 1, ShardFlags::default(), None, None, 20),
        shard(0, 2, flags_last, None, Some(sample_timing()), 30),
    ];

    for perm in [
        vec![0, 1, 2],
        vec![2, 1, 0],
        vec![1, 0, 2],
        vec![2, 0, 1],
        vec![0, 2, 1],
        vec![1, 2, 0],
    ] {
        let mut acc = ShardAccumulator::new(0, RecordingSink::default());
        let mut completions = 0;
        for &i in &perm {
            let fbs = acc.push_shard(shards[i].clone(), 0);
            completions += fbs.len();
        }
        assert_eq!(completions, 1, "permutation {perm:?} must complete exactly once");

        let assembled: Vec<u8> = acc
            .sink()
            .push_calls
            .iter()
            .flat_map(|(bytes, _, _)| bytes.clone())
            .collect();
        // Every push_data call only ever emits contiguous runs in index
        // order, so concatenating them in call order reproduces the
        // original payload order regardless of arrival order.
        assert_eq!(assembled, vec![10, 20, 30]);
    }
}

#[test]
fn shard_index_beyond_high_water_mark_resizes_without_panicking() {
    let mut acc = ShardAccumulator::new(0, RecordingSink::default());
    let shard = shard(0, 50, ShardFlags::default(), None, None, 0xFF);
    assert!(acc.push_shard(shard, 0).is_empty());
}

#[test]
fn end_of_frame_on_shard_index_zero_is_a_valid_single_shard_frame() {
    let mut acc = ShardAccumulator::new(0, RecordingSink::default());
    let feedbacks = acc.push_shard(complete_single_shard(0, 0x11), 0);
    assert_eq!(feedbacks.len(), 1);
    assert_eq!(acc.sink().push_calls[0].2, false, "immediate partial=false");
}
