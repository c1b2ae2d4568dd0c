//! Error types for the Tessera tile store, organized by subsystem:
//! configuration, swap file, codec, tile-data store and persistence.
//!
//! Misses (absent tiles, purging a memento twice, rolling back an empty
//! history) are not errors anywhere in the workspace. These enums only
//! describe resource exhaustion, corrupt input and violated invariants.

use std::error::Error;
use std::fmt;
use std::io;
use std::time::Duration;

/// Rejected [`StoreConfig`](crate::StoreConfig) values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A field that must be non-zero is zero.
    ZeroValue {
        /// Name of the offending field.
        field: &'static str,
    },
    /// The soft memory limit exceeds the hard limit.
    SoftLimitAboveHard {
        /// Configured soft limit in bytes.
        soft: usize,
        /// Configured hard limit in bytes.
        hard: usize,
    },
    /// A swap size is not a multiple of the mapping granularity.
    Misaligned {
        /// Name of the offending field.
        field: &'static str,
        /// The configured value.
        value: u64,
        /// Required granularity.
        granularity: u64,
    },
    /// The swap ceiling is smaller than one growth slab.
    SwapCeilingTooSmall {
        /// Configured ceiling in bytes.
        max: u64,
        /// Configured slab size in bytes.
        slab: u64,
    },
    /// Worker backoff bounds are zero or inverted.
    InvertedBackoff {
        /// Configured minimum.
        min: Duration,
        /// Configured maximum.
        max: Duration,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroValue { field } => write!(f, "{field} must be non-zero"),
            Self::SoftLimitAboveHard { soft, hard } => {
                write!(f, "soft memory limit {soft} exceeds hard limit {hard}")
            }
            Self::Misaligned {
                field,
                value,
                granularity,
            } => write!(
                f,
                "{field} = {value} is not a non-zero multiple of {granularity}"
            ),
            Self::SwapCeilingTooSmall { max, slab } => {
                write!(f, "max swap size {max} is smaller than one slab ({slab})")
            }
            Self::InvertedBackoff { min, max } => {
                write!(f, "invalid worker backoff bounds: min={min:?}, max={max:?}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Errors from the swap file and its chunk allocator.
#[derive(Debug)]
pub enum SwapError {
    /// Creating, growing or mapping the swap file failed.
    Io(io::Error),
    /// The swap file would have to grow beyond its ceiling.
    Exhausted {
        /// Bytes requested.
        requested: u64,
        /// Configured ceiling.
        max: u64,
    },
    /// A chunk of zero bytes was requested.
    ZeroSizedChunk,
    /// A chunk passed to `free_chunk` or `read` is not allocated.
    UnknownChunk {
        /// Start of the chunk.
        begin: u64,
        /// End of the chunk (exclusive).
        end: u64,
    },
}

impl fmt::Display for SwapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "swap I/O error: {e}"),
            Self::Exhausted { requested, max } => write!(
                f,
                "swap file exhausted: {requested} more bytes requested, ceiling is {max}"
            ),
            Self::ZeroSizedChunk => write!(f, "zero-sized swap chunk requested"),
            Self::UnknownChunk { begin, end } => {
                write!(f, "swap chunk [{begin}, {end}) is not allocated")
            }
        }
    }
}

impl Error for SwapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SwapError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Errors from a [`TileCodec`](crate::TileCodec).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// The encoded payload could not be decoded.
    Corrupt {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// The decoded payload does not fill the destination buffer exactly.
    LengthMismatch {
        /// Length of the destination buffer.
        expected: usize,
        /// Length produced by the decoder.
        actual: usize,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt { detail } => write!(f, "corrupt tile payload: {detail}"),
            Self::LengthMismatch { expected, actual } => write!(
                f,
                "decoded tile has {actual} bytes, expected {expected}"
            ),
        }
    }
}

impl Error for CodecError {}

/// Errors from the tile-data store.
#[derive(Debug)]
pub enum StoreError {
    /// A swap-in or swap-out failed at the file level.
    Swap(SwapError),
    /// A swapped buffer could not be decoded.
    Codec(CodecError),
    /// Pixel buffers were still alive when the store shut down.
    LeakedTileData {
        /// Number of live buffers.
        count: usize,
    },
    /// The store configuration was rejected.
    Config(ConfigError),
    /// A background worker thread could not be spawned.
    Spawn(io::Error),
    /// A buffer of the wrong pixel size was handed to a grid.
    PixelSizeMismatch {
        /// Pixel size of the grid.
        expected: usize,
        /// Pixel size supplied.
        actual: usize,
    },
    /// A caller-supplied buffer cannot hold the requested pixels.
    BufferTooSmall {
        /// Bytes the operation needs.
        needed: usize,
        /// Bytes supplied.
        actual: usize,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Swap(e) => write!(f, "swap failed: {e}"),
            Self::Codec(e) => write!(f, "swapped tile unreadable: {e}"),
            Self::LeakedTileData { count } => {
                write!(f, "{count} tile buffers still alive at store shutdown")
            }
            Self::Config(e) => write!(f, "invalid store configuration: {e}"),
            Self::Spawn(e) => write!(f, "failed to spawn store worker: {e}"),
            Self::PixelSizeMismatch { expected, actual } => {
                write!(f, "pixel size mismatch: expected {expected}, got {actual}")
            }
            Self::BufferTooSmall { needed, actual } => {
                write!(f, "buffer of {actual} bytes cannot hold {needed} bytes")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Swap(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for StoreError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<SwapError> for StoreError {
    fn from(e: SwapError) -> Self {
        Self::Swap(e)
    }
}

impl From<CodecError> for StoreError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

/// Errors from writing or reading a whole grid through a codec.
#[derive(Debug)]
pub enum PersistError {
    /// An I/O error occurred during read or write.
    Io(io::Error),
    /// A header or tile line could not be parsed.
    MalformedHeader {
        /// The offending line.
        line: String,
    },
    /// The format version is not supported by this build.
    UnsupportedVersion {
        /// The version found in the stream.
        found: u32,
    },
    /// The stream was written with different tile dimensions.
    TileSizeMismatch {
        /// Width found in the stream.
        width: i32,
        /// Height found in the stream.
        height: i32,
    },
    /// The stream was written for a different pixel size.
    PixelSizeMismatch {
        /// Pixel size of the grid.
        expected: usize,
        /// Pixel size in the stream.
        found: usize,
    },
    /// A tile was encoded with a codec other than the one supplied.
    CodecMismatch {
        /// Name of the supplied codec.
        expected: String,
        /// Name recorded in the stream.
        found: String,
    },
    /// A tile line declares a payload longer than any encoded tile.
    PayloadTooLarge {
        /// Declared payload length.
        len: usize,
        /// Raw byte length of one tile.
        tile_len: usize,
    },
    /// A tile payload could not be decoded.
    Codec(CodecError),
    /// The store failed while materializing tiles.
    Store(StoreError),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::MalformedHeader { line } => write!(f, "malformed line: {line:?}"),
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported format version {found}")
            }
            Self::TileSizeMismatch { width, height } => {
                write!(f, "stream uses {width}x{height} tiles")
            }
            Self::PixelSizeMismatch { expected, found } => {
                write!(f, "stream pixel size {found}, grid pixel size {expected}")
            }
            Self::CodecMismatch { expected, found } => {
                write!(f, "tile encoded with '{found}', codec is '{expected}'")
            }
            Self::PayloadTooLarge { len, tile_len } => {
                write!(f, "tile payload of {len} bytes for a {tile_len}-byte tile")
            }
            Self::Codec(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl Error for PersistError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PersistError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<CodecError> for PersistError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<StoreError> for PersistError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
