//! Deterministic binary encoding for every wire message.
//!
//! Mirrors the traits/packet split of the upstream serializer: a growable
//! write buffer, a cursor-based read buffer, and a pair of traits
//! (`WireEncode`/`TypeHash`) implemented once per primitive and propagated
//! through containers by blanket impls.

use crate::error::{DeserializationError, Result};
use crate::hash::HashContext;

/// Accumulates serialized bytes for a single outbound message.
#[derive(Default)]
pub struct SerializationPacket {
    buffer: Vec<u8>,
}

impl SerializationPacket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn serialize<T: WireEncode>(&mut self, value: &T) {
        value.serialize(self);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }
}

/// Cursor over a received buffer; reads never copy the remainder.
pub struct DeserializationPacket<'a> {
    buffer: &'a [u8],
    read_index: usize,
}

impl<'a> DeserializationPacket<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        DeserializationPacket {
            buffer,
            read_index: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.read_index
    }

    pub fn is_empty(&self) -> bool {
        self.read_index >= self.buffer.len()
    }

    fn check_remaining(&self, needed: usize) -> Result<()> {
        if needed > self.remaining() {
            Err(DeserializationError::BufferUnderflow {
                needed,
                remaining: self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    pub fn read(&mut self, n: usize) -> Result<&'a [u8]> {
        self.check_remaining(n)?;
        let slice = &self.buffer[self.read_index..self.read_index + n];
        self.read_index += n;
        Ok(slice)
    }

    pub fn deserialize<T: WireEncode>(&mut self) -> Result<T> {
        T::deserialize(self)
    }
}

/// A type that can be written to and read from the wire format.
pub trait WireEncode: Sized {
    fn serialize(&self, packet: &mut SerializationPacket);
    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self>;
}

/// A type whose wire schema contributes to the compile-time protocol hash.
///
/// Implemented separately from [`WireEncode`] because the hash is computed
/// once, at startup, over a zero-sized witness (`PhantomData`-style call),
/// while encode/decode run per message.
pub trait TypeHash {
    fn type_hash(ctx: &mut HashContext);
}

macro_rules! impl_primitive {
    ($ty:ty, $hash_name:literal) => {
        impl WireEncode for $ty {
            fn serialize(&self, packet: &mut SerializationPacket) {
                packet.write(&self.to_le_bytes());
            }

            fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
                let bytes = packet.read(std::mem::size_of::<$ty>())?;
                Ok(<$ty>::from_le_bytes(bytes.try_into().expect("exact-size read")))
            }
        }

        impl TypeHash for $ty {
            fn type_hash(ctx: &mut HashContext) {
                ctx.feed_str($hash_name);
            }
        }
    };
}

impl_primitive!(u8, "uint8");
impl_primitive!(u16, "uint16");
impl_primitive!(u32, "uint32");
impl_primitive!(u64, "uint64");
impl_primitive!(i8, "int8");
impl_primitive!(i16, "int16");
impl_primitive!(i32, "int32");
impl_primitive!(i64, "int64");
impl_primitive!(f32, "float32");
impl_primitive!(f64, "float64");

impl WireEncode for bool {
    fn serialize(&self, packet: &mut SerializationPacket) {
        packet.write(&[if *self { 1 } else { 0 }]);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        Ok(packet.read(1)?[0] != 0)
    }
}

impl TypeHash for bool {
    fn type_hash(ctx: &mut HashContext) {
        // A bool is serialized as a single byte, same wire shape as uint8.
        ctx.feed_str("uint8");
    }
}

impl WireEncode for String {
    fn serialize(&self, packet: &mut SerializationPacket) {
        let bytes = self.as_bytes();
        (bytes.len() as u16).serialize(packet);
        packet.write(bytes);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        let len = u16::deserialize(packet)? as usize;
        if len > packet.remaining() {
            return Err(DeserializationError::OversizeLength {
                len,
                remaining: packet.remaining(),
            });
        }
        let bytes = packet.read(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

impl TypeHash for String {
    fn type_hash(ctx: &mut HashContext) {
        ctx.feed_str("string");
    }
}

impl<T: WireEncode> WireEncode for Vec<T> {
    fn serialize(&self, packet: &mut SerializationPacket) {
        (self.len() as u16).serialize(packet);
        for item in self {
            item.serialize(packet);
        }
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        let len = u16::deserialize(packet)? as usize;
        // A zero-length element hint still bounds len by remaining bytes so a
        // corrupt count can't force an unbounded allocation.
        if len > packet.remaining() {
            return Err(DeserializationError::OversizeLength {
                len,
                remaining: packet.remaining(),
            });
        }
        let mut out = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            out.push(T::deserialize(packet)?);
        }
        Ok(out)
    }
}

impl<T: TypeHash> TypeHash for Vec<T> {
    fn type_hash(ctx: &mut HashContext) {
        ctx.feed_str("vector<");
        T::type_hash(ctx);
        ctx.feed_str(">");
    }
}

impl<T: WireEncode> WireEncode for Option<T> {
    fn serialize(&self, packet: &mut SerializationPacket) {
        match self {
            Some(value) => {
                true.serialize(packet);
                value.serialize(packet);
            }
            None => false.serialize(packet),
        }
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        if bool::deserialize(packet)? {
            Ok(Some(T::deserialize(packet)?))
        } else {
            Ok(None)
        }
    }
}

impl<T: TypeHash> TypeHash for Option<T> {
    fn type_hash(ctx: &mut HashContext) {
        ctx.feed_str("optional<");
        T::type_hash(ctx);
        ctx.feed_str(">");
    }
}

/// Fixed-width byte array: back-to-back elements, no length prefix.
macro_rules! impl_array {
    ($($n:literal),* $(,)?) => {
        $(
        impl<T: WireEncode + Copy + Default> WireEncode for [T; $n] {
            fn serialize(&self, packet: &mut SerializationPacket) {
                for item in self {
                    item.serialize(packet);
                }
            }

            fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
                let mut out = [T::default(); $n];
                for slot in out.iter_mut() {
                    *slot = T::deserialize(packet)?;
                }
                Ok(out)
            }
        }

        impl<T: TypeHash> TypeHash for [T; $n] {
            fn type_hash(ctx: &mut HashContext) {
                ctx.feed_str("array<");
                T::type_hash(ctx);
                ctx.feed_str(",");
                ctx.feed_unsigned($n);
                ctx.feed_str(">");
            }
        }
        )*
    };
}

impl_array!(2, 3, 4, 8, 16, 26, 32);

/// Wraps a duration in nanoseconds, matching the `i64` wire representation of
/// `std::chrono::nanoseconds` in the upstream protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct DurationNs(pub i64);

impl WireEncode for DurationNs {
    fn serialize(&self, packet: &mut SerializationPacket) {
        self.0.serialize(packet);
    }

    fn deserialize(packet: &mut DeserializationPacket<'_>) -> Result<Self> {
        Ok(DurationNs(i64::deserialize(packet)?))
    }
}

impl TypeHash for DurationNs {
    fn type_hash(ctx: &mut HashContext) {
        ctx.feed_str("duration<int64,1/1000000000>");
    }
}

impl From<i64> for DurationNs {
    fn from(value: i64) -> Self {
        DurationNs(value)
    }
}
