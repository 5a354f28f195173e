//! Shard-based video reassembly: the hardest component in the system.
//! Reassembles out-of-order, possibly partial UDP shards into frames and
//! drives at-most-once dispatch to a decoder.

pub mod accumulator;
pub mod shard_set;
pub mod sink;

pub use accumulator::ShardAccumulator;
pub use shard_set::ShardSet;
pub use sink::{DecoderSink, SamplerHandle};
