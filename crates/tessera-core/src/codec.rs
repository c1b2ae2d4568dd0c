//! The [`TileCodec`] capability.
//!
//! A codec turns one tile's pixel bytes into a self-contained payload and
//! back. The store uses one when flushing tiles to the swap file, and
//! grid persistence uses one per written tile. Codecs are stateless and
//! shared across threads.

use crate::error::CodecError;

/// Encodes and decodes the pixel bytes of a single tile.
pub trait TileCodec: Send + Sync {
    /// Short identifier written next to every persisted tile.
    fn name(&self) -> &str;

    /// Append the encoded form of `pixels` to `out`.
    fn encode(&self, pixels: &[u8], out: &mut Vec<u8>);

    /// Decode `payload` into `pixels`, which must be filled exactly.
    fn decode(&self, payload: &[u8], pixels: &mut [u8]) -> Result<(), CodecError>;
}
