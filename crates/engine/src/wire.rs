//! Fixed-layout little-endian encoding for everything that crosses a
//! process boundary or the disk: edge payloads, message payloads and
//! vertex-array elements.

use crate::VertexId;

/// A scalar with a fixed little-endian byte layout.
///
/// Implementations must read and write exactly [`Wire::BYTES`] bytes so that
/// records can be located by offset arithmetic alone. The unit type encodes
/// to zero bytes and is used for unweighted edges.
pub trait Wire: Copy + Default + Send + Sync + 'static {
    /// Encoded size in bytes.
    const BYTES: usize;

    fn encode(self, out: &mut Vec<u8>);

    /// Decodes a value from the first [`Wire::BYTES`] bytes of `bytes`.
    fn decode(bytes: &[u8]) -> Self;

    /// A total order key used to keep adjacency lists in a reproducible
    /// order across runs. Values that compare equal under this key are
    /// interchangeable copies.
    fn sort_key(self) -> u64;
}

impl Wire for () {
    const BYTES: usize = 0;

    fn encode(self, _out: &mut Vec<u8>) {}

    fn decode(_bytes: &[u8]) -> Self {}

    fn sort_key(self) -> u64 {
        0
    }
}

impl Wire for u32 {
    const BYTES: usize = 4;

    fn encode(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        u32::from_le_bytes(bytes[..4].try_into().unwrap())
    }

    fn sort_key(self) -> u64 {
        u64::from(self)
    }
}

impl Wire for u64 {
    const BYTES: usize = 8;

    fn encode(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        u64::from_le_bytes(bytes[..8].try_into().unwrap())
    }

    fn sort_key(self) -> u64 {
        self
    }
}

impl Wire for f32 {
    const BYTES: usize = 4;

    fn encode(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        f32::from_le_bytes(bytes[..4].try_into().unwrap())
    }

    fn sort_key(self) -> u64 {
        u64::from(self.to_bits())
    }
}

impl Wire for f64 {
    const BYTES: usize = 8;

    fn encode(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        f64::from_le_bytes(bytes[..8].try_into().unwrap())
    }

    fn sort_key(self) -> u64 {
        self.to_bits()
    }
}

/// Size of a `(vertex, message)` envelope on the wire.
pub(crate) const fn envelope_bytes<M: Wire>() -> usize {
    std::mem::size_of::<VertexId>() + M::BYTES
}

pub(crate) fn encode_envelope<M: Wire>(vertex: VertexId, msg: M, out: &mut Vec<u8>) {
    vertex.encode(out);
    msg.encode(out);
}

pub(crate) fn decode_envelope<M: Wire>(bytes: &[u8]) -> (VertexId, M) {
    let vertex = VertexId::decode(bytes);
    let msg = M::decode(&bytes[std::mem::size_of::<VertexId>()..]);
    (vertex, msg)
}
