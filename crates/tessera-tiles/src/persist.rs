//! Whole-grid serialization.
//!
//! ```text
//! VERSION 2
//! TILEWIDTH 64
//! TILEHEIGHT 64
//! PIXELSIZE <bytes per pixel>
//! DATA <tile count>
//! <left>,<top>,<codec name>,<payload length>
//! <payload bytes>
//! ...
//! ```
//!
//! Tile positions are pixel coordinates of the tile's top-left corner.
//! Every payload is one tile encoded with the supplied [`TileCodec`].

use std::io::{self, BufRead, Read, Write};

use tessera_core::{PersistError, TileCodec, TileCoord, TILE_HEIGHT, TILE_PIXELS, TILE_WIDTH};

use crate::data_manager::TiledDataManager;

/// Format version written by [`TiledDataManager::write`].
pub const FORMAT_VERSION: u32 = 2;

impl TiledDataManager {
    /// Write every tile through `codec`.
    pub fn write(&self, codec: &dyn TileCodec, out: &mut impl Write) -> Result<(), PersistError> {
        let tiles = self.tiles();
        write!(
            out,
            "VERSION {FORMAT_VERSION}\nTILEWIDTH {TILE_WIDTH}\nTILEHEIGHT {TILE_HEIGHT}\nPIXELSIZE {}\nDATA {}\n",
            self.pixel_size(),
            tiles.len()
        )?;
        let mut payload = Vec::new();
        for tile in &tiles {
            payload.clear();
            {
                let pixels = tile.lock_for_read()?;
                codec.encode(&pixels, &mut payload);
            }
            let coord = tile.coord();
            writeln!(
                out,
                "{},{},{},{}",
                coord.left(),
                coord.top(),
                codec.name(),
                payload.len()
            )?;
            out.write_all(&payload)?;
        }
        tracing::debug!(tiles = tiles.len(), codec = codec.name(), "wrote grid");
        Ok(())
    }

    /// Replace the grid's content with tiles read through `codec`.
    ///
    /// Clearing the old content and loading the new one form a single
    /// named transaction, committed also when reading fails part way, so
    /// one rollback restores the previous grid.
    pub fn read(
        &self,
        codec: &dyn TileCodec,
        input: &mut impl BufRead,
    ) -> Result<(), PersistError> {
        let _memento = self.get_memento();
        self.clear_all();
        let result = self.read_tiles(codec, input);
        self.commit();
        if let Err(e) = &result {
            tracing::warn!(error = %e, "grid load failed");
        }
        result
    }

    fn read_tiles(
        &self,
        codec: &dyn TileCodec,
        input: &mut impl BufRead,
    ) -> Result<(), PersistError> {
        let count = self.read_header(input)?;
        let tile_len = self.pixel_size() * TILE_PIXELS;
        let mut payload = Vec::new();
        let mut pixels = vec![0u8; tile_len];
        for _ in 0..count {
            let line = next_line(input)?;
            let (x, y, name, len) = parse_tile_line(&line)?;
            if name != codec.name() {
                return Err(PersistError::CodecMismatch {
                    expected: codec.name().to_owned(),
                    found: name.to_owned(),
                });
            }
            read_payload(input, len, tile_len, &mut payload)?;
            codec.decode(&payload, &mut pixels)?;
            let data = self.store().create_from_bytes(self.pixel_size(), &pixels)?;
            let coord = TileCoord::containing(x, y);
            if self.tile_exists(coord.col, coord.row) {
                tracing::warn!(%coord, "duplicate tile in stream, keeping the last");
                self.extent_manager().notify_tile_removed(coord);
            }
            self.add_shared(coord, data);
        }
        Ok(())
    }

    fn read_header(&self, input: &mut impl BufRead) -> Result<usize, PersistError> {
        let first = next_line(input)?;
        let version = match first.split_once(' ') {
            Some(("VERSION", v)) => parse_number::<u32>(v, &first)?,
            _ => return Err(PersistError::MalformedHeader { line: first }),
        };
        if version != FORMAT_VERSION {
            return Err(PersistError::UnsupportedVersion { found: version });
        }
        let mut width = None;
        let mut height = None;
        let mut pixel_size = None;
        loop {
            let line = next_line(input)?;
            let Some((key, value)) = line.split_once(' ') else {
                return Err(PersistError::MalformedHeader { line });
            };
            match key {
                "TILEWIDTH" => width = Some(parse_number::<i32>(value, &line)?),
                "TILEHEIGHT" => height = Some(parse_number::<i32>(value, &line)?),
                "PIXELSIZE" => pixel_size = Some(parse_number::<usize>(value, &line)?),
                "DATA" => {
                    let count = parse_number::<usize>(value, &line)?;
                    let (Some(width), Some(height), Some(found)) = (width, height, pixel_size)
                    else {
                        return Err(PersistError::MalformedHeader { line });
                    };
                    if width != TILE_WIDTH || height != TILE_HEIGHT {
                        return Err(PersistError::TileSizeMismatch { width, height });
                    }
                    if found != self.pixel_size() {
                        return Err(PersistError::PixelSizeMismatch {
                            expected: self.pixel_size(),
                            found,
                        });
                    }
                    return Ok(count);
                }
                _ => return Err(PersistError::MalformedHeader { line }),
            }
        }
    }
}

fn next_line(input: &mut impl BufRead) -> Result<String, PersistError> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(PersistError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "grid stream ended early",
        )));
    }
    Ok(line.trim().to_owned())
}

/// Read a `len`-byte payload without trusting `len` for the allocation.
///
/// Encoded tiles never exceed twice the raw tile size; longer lengths
/// are rejected before anything is read.
fn read_payload(
    input: &mut impl BufRead,
    len: usize,
    tile_len: usize,
    payload: &mut Vec<u8>,
) -> Result<(), PersistError> {
    if len > 2 * tile_len + 64 {
        return Err(PersistError::PayloadTooLarge { len, tile_len });
    }
    payload.clear();
    let got = input.by_ref().take(len as u64).read_to_end(payload)?;
    if got != len {
        return Err(PersistError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "tile payload ended early",
        )));
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(value: &str, line: &str) -> Result<T, PersistError> {
    value.trim().parse().map_err(|_| PersistError::MalformedHeader {
        line: line.to_owned(),
    })
}

fn parse_tile_line(line: &str) -> Result<(i32, i32, &str, usize), PersistError> {
    let mut fields = line.split(',');
    let (Some(x), Some(y), Some(name), Some(len), None) = (
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
    ) else {
        return Err(PersistError::MalformedHeader {
            line: line.to_owned(),
        });
    };
    Ok((
        parse_number(x, line)?,
        parse_number(y, line)?,
        name,
        parse_number(len, line)?,
    ))
}
