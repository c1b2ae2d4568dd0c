//! Reference [`TileCodec`] implementations.
//!
//! - [`RawCodec`] stores pixel bytes verbatim.
//! - [`Lz4Codec`] stores a little-endian `u32` length followed by an LZ4
//!   block. Tiles are usually flat or smooth, so this is the default codec
//!   for the swap file.
//!
//! [`codec_by_name`] resolves the name recorded next to persisted tiles.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

use std::sync::Arc;

use tessera_core::{CodecError, TileCodec};

/// Identity codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawCodec;

impl RawCodec {
    /// Name recorded for raw tiles.
    pub const NAME: &'static str = "raw";
}

impl TileCodec for RawCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn encode(&self, pixels: &[u8], out: &mut Vec<u8>) {
        out.extend_from_slice(pixels);
    }

    fn decode(&self, payload: &[u8], pixels: &mut [u8]) -> Result<(), CodecError> {
        if payload.len() != pixels.len() {
            return Err(CodecError::LengthMismatch {
                expected: pixels.len(),
                actual: payload.len(),
            });
        }
        pixels.copy_from_slice(payload);
        Ok(())
    }
}

/// LZ4 block codec with a length prefix.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lz4Codec;

impl Lz4Codec {
    /// Name recorded for LZ4 tiles.
    pub const NAME: &'static str = "lz4";

    const PREFIX_LEN: usize = 4;
}

impl TileCodec for Lz4Codec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn encode(&self, pixels: &[u8], out: &mut Vec<u8>) {
        out.extend_from_slice(&(pixels.len() as u32).to_le_bytes());
        out.extend_from_slice(&lz4_flex::block::compress(pixels));
    }

    fn decode(&self, payload: &[u8], pixels: &mut [u8]) -> Result<(), CodecError> {
        if payload.len() < Self::PREFIX_LEN {
            return Err(CodecError::Corrupt {
                detail: format!("payload of {} bytes has no length prefix", payload.len()),
            });
        }
        let (prefix, body) = payload.split_at(Self::PREFIX_LEN);
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(prefix);
        let declared = u32::from_le_bytes(len_bytes) as usize;
        if declared != pixels.len() {
            return Err(CodecError::LengthMismatch {
                expected: pixels.len(),
                actual: declared,
            });
        }
        let written =
            lz4_flex::block::decompress_into(body, pixels).map_err(|e| CodecError::Corrupt {
                detail: e.to_string(),
            })?;
        if written != pixels.len() {
            return Err(CodecError::LengthMismatch {
                expected: pixels.len(),
                actual: written,
            });
        }
        Ok(())
    }
}

/// Look up a reference codec by its recorded name.
pub fn codec_by_name(name: &str) -> Option<Arc<dyn TileCodec>> {
    match name {
        RawCodec::NAME => Some(Arc::new(RawCodec)),
        Lz4Codec::NAME => Some(Arc::new(Lz4Codec)),
        _ => None,
    }
}

/// The codec used for swap when none is configured.
pub fn default_codec() -> Arc<dyn TileCodec> {
    Arc::new(Lz4Codec)
}
