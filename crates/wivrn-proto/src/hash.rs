//! Compile-time-shaped protocol hash.
//!
//! Every wire type contributes a canonical name string to a running FNV-1a
//! accumulator; the final value is exchanged during `client_announce` as
//! `protocol_version` and gates the connection before anything else is
//! parsed. The scheme is ported from the upstream `details::hash_context`:
//! unsigned integers are fed as ASCII decimal digits, strings are fed
//! verbatim, and aggregate types are fed as `structure{field1,field2,...}`.

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Accumulates an FNV-1a hash over a sequence of type-hash fragments.
pub struct HashContext {
    state: u64,
}

impl Default for HashContext {
    fn default() -> Self {
        HashContext {
            state: FNV_OFFSET_BASIS,
        }
    }
}

impl HashContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn feed_byte(&mut self, byte: u8) {
        self.state ^= byte as u64;
        self.state = self.state.wrapping_mul(FNV_PRIME);
    }

    /// Feed raw bytes (e.g. an ASCII type name) into the hash.
    pub fn feed_str(&mut self, s: &str) {
        for b in s.as_bytes() {
            self.feed_byte(*b);
        }
    }

    /// Feed an unsigned integer as its ASCII decimal digits, matching
    /// `hash_context::feed_unsigned` in the reference implementation: the
    /// higher digits are fed first by recursing on `value / 10` before
    /// feeding the final digit, the same as
    /// `if (n >= 10) feed(n / 10); feed('0' + n % 10)`.
    pub fn feed_unsigned(&mut self, value: u64) {
        if value >= 10 {
            self.feed_unsigned(value / 10);
        }
        self.feed_byte(b'0' + (value % 10) as u8);
    }

    pub fn finish(&self) -> u64 {
        self.state
    }
}

/// Computes the FNV-1a type-hash for `T`, the wire-schema fingerprint
/// exchanged at handshake time as the protocol version.
pub fn type_hash_of<T: crate::wire::TypeHash>() -> u64 {
    let mut ctx = HashContext::new();
    T::type_hash(&mut ctx);
    ctx.finish()
}

/// Helper for composing a `structure{...}` type-hash fragment from a fixed
/// list of field-hash closures, mirroring how `boost::pfr`-driven reflection
/// feeds each field of an aggregate in the reference implementation.
pub fn feed_structure(ctx: &mut HashContext, fields: &[fn(&mut HashContext)]) {
    ctx.feed_str("structure{");
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            ctx.feed_str(",");
        }
        field(ctx);
    }
    ctx.feed_str("}");
}

/// Helper for composing a `variant<...>` type-hash fragment.
pub fn feed_variant(ctx: &mut HashContext, fields: &[fn(&mut HashContext)]) {
    ctx.feed_str("variant<");
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            ctx.feed_str(",");
        }
        field(ctx);
    }
    ctx.feed_str(">");
}
