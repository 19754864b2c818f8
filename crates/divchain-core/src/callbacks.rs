//! User-supplied key/value capabilities.
//!
//! The C original passes raw function pointers (`cmp_key`, `rdc_key`,
//! `free_elt`); here they are trait objects instead, with byte-wise
//! default implementations that cover the common case.

/// Byte-wise key equality. `true` iff equal.
///
/// Default: exact byte comparison (`a == b`), matching the C
/// original's default when no `cmp_key` is supplied.
pub trait KeyCompare: Send + Sync {
    fn keys_equal(&self, a: &[u8], b: &[u8]) -> bool;
}

/// Default byte-wise comparator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteKeyCompare;

impl KeyCompare for ByteKeyCompare {
    fn keys_equal(&self, a: &[u8], b: &[u8]) -> bool {
        a == b
    }
}

/// Reduces an arbitrary-length key to one `u64` used for hashing.
///
/// Default: interpret the key bytes little-endian and sum into one
/// word, in whole 8-byte strides with a residual tail — the same
/// `std_key` scheme as the C original, byte order of the host is
/// irrelevant because bytes are always consumed least-significant
/// first.
pub trait KeyReduce: Send + Sync {
    fn reduce_key(&self, key: &[u8]) -> u64;
}

/// Default little-endian summing reducer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SumKeyReduce;

impl KeyReduce for SumKeyReduce {
    fn reduce_key(&self, key: &[u8]) -> u64 {
        let mut acc: u64 = 0;
        let mut chunks = key.chunks_exact(8);
        for chunk in &mut chunks {
            let word = u64::from_le_bytes(chunk.try_into().expect("chunks_exact(8)"));
            acc = acc.wrapping_add(word);
        }
        let rem = chunks.remainder();
        if !rem.is_empty() {
            let mut buf = [0u8; 8];
            buf[..rem.len()].copy_from_slice(rem);
            acc = acc.wrapping_add(u64::from_le_bytes(buf));
        }
        acc
    }
}

/// Releases resources owned by a value area's bytes before the area
/// is overwritten (update-insert) or the node is deallocated
/// (`remove`/`delete`/`free`). Must leave the bytes inert — the
/// default no-op is correct whenever the value area holds no
/// out-of-line resource (e.g. it is itself a handle/index, not an
/// owning pointer).
pub trait FreeElt: Send + Sync {
    fn free_elt(&self, value: &mut [u8]);
}

/// No-op: the common case, where the value area owns nothing that
/// needs releasing beyond what dropping the bytes themselves covers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFreeElt;

impl FreeElt for NoopFreeElt {
    fn free_elt(&self, _value: &mut [u8]) {}
}
