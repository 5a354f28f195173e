//! The decoder capability the accumulator drives.
//!
//! `shard_accumulator` in `examples/original_source/client/decoder/
//! shard_accumulator.h` talks to a concrete Vulkan-backed decoder
//! (`push_data`, `frame_completed`, `sampler`, `image_size`). Vulkan
//! rendering and the YCbCr sampler plumbing are out of scope here, so that
//! object is reduced to the capability trait `spec.md` §9's Design Notes
//! name but never elaborate: `{push_data, frame_completed, sampler,
//! extent}`.

use wivrn_proto::{Feedback, ViewInfo};

/// Opaque handle to a renderer-owned texture sampler. The accumulator
/// never interprets this value; it only forwards whatever the sink hands
/// back so a (not-in-scope) compositor can bind the right sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerHandle(pub u64);

/// What the shard accumulator expects from a video decoder.
pub trait DecoderSink {
    /// Hands a contiguous run of shard payloads for `frame_index` to the
    /// decoder. `partial` is `true` when more shards for this frame are
    /// still expected; the decoder may start feeding a hardware decoder
    /// incrementally rather than waiting for the whole frame.
    fn push_data(&mut self, payload: &[&[u8]], frame_index: u64, partial: bool);

    /// Called once per frame, after the last shard arrives, with the
    /// aggregated feedback record and the view info carried by the first
    /// shard.
    fn frame_completed(&mut self, feedback: &Feedback, view_info: &ViewInfo);

    /// The sampler the decoder currently renders into.
    fn sampler(&self) -> SamplerHandle;

    /// Current negotiated frame extent (width, height).
    fn extent(&self) -> (u32, u32);
}
