//! Line and rectangle pixel iterators.
//!
//! An iterator starts on its first pixel. `next_pixel` moves one step and
//! returns `false`, staying put, once the range is exhausted. The byte
//! accessors address the run of [`n_conseq_pixels`](HLineIterator::n_conseq_pixels)
//! pixels that are contiguous in memory from the current position.
//!
//! ```no_run
//! # use tessera_tiles::TiledDataManager;
//! # fn fill(dm: &TiledDataManager) -> Result<(), tessera_core::StoreError> {
//! let mut it = dm.hline_iterator(0, 0, 200, true)?;
//! loop {
//!     let n = it.n_conseq_pixels();
//!     if let Some(bytes) = it.raw_data_mut() {
//!         bytes.fill(0xFF);
//!     }
//!     if !it.next_pixels(n)? {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use tessera_core::{contiguous_columns, Rect, StoreError, TileCoord};

use crate::cursor::TileCursor;
use crate::data_manager::TiledDataManager;

impl TiledDataManager {
    /// Iterate `width` pixels of row `y` from column `x`.
    pub fn hline_iterator(
        &self,
        x: i32,
        y: i32,
        width: i32,
        writable: bool,
    ) -> Result<HLineIterator<'_>, StoreError> {
        HLineIterator::new(self, x, y, width, writable)
    }

    /// Iterate `height` pixels of column `x` from row `y`.
    pub fn vline_iterator(
        &self,
        x: i32,
        y: i32,
        height: i32,
        writable: bool,
    ) -> Result<VLineIterator<'_>, StoreError> {
        VLineIterator::new(self, x, y, height, writable)
    }

    /// Iterate `rect` row by row.
    pub fn rect_iterator(&self, rect: Rect, writable: bool) -> Result<RectIterator<'_>, StoreError> {
        RectIterator::new(self, rect, writable)
    }
}

// ── HLineIterator ───────────────────────────────────────────────

/// Walks a horizontal span of pixels.
pub struct HLineIterator<'a> {
    cursor: TileCursor<'a>,
    left: i32,
    right: i32,
    x: i32,
    y: i32,
}

impl<'a> HLineIterator<'a> {
    fn new(
        dm: &'a TiledDataManager,
        x: i32,
        y: i32,
        width: i32,
        writable: bool,
    ) -> Result<Self, StoreError> {
        let mut cursor = TileCursor::new(dm, writable);
        cursor.seek(TileCoord::containing(x, y))?;
        Ok(Self {
            cursor,
            left: x,
            right: x + width.max(0),
            x,
            y,
        })
    }

    /// Current column.
    pub fn x(&self) -> i32 {
        self.x
    }

    /// Current row.
    pub fn y(&self) -> i32 {
        self.y
    }

    /// Step one pixel right.
    pub fn next_pixel(&mut self) -> Result<bool, StoreError> {
        self.next_pixels(1)
    }

    /// Step `n` pixels right.
    pub fn next_pixels(&mut self, n: i32) -> Result<bool, StoreError> {
        if self.x + n >= self.right {
            return Ok(false);
        }
        self.x += n;
        self.cursor.seek(TileCoord::containing(self.x, self.y))?;
        Ok(true)
    }

    /// Restart on the next row.
    pub fn next_row(&mut self) -> Result<(), StoreError> {
        self.x = self.left;
        self.y += 1;
        self.cursor.seek(TileCoord::containing(self.x, self.y))
    }

    /// Pixels contiguous in memory from the current one within the span.
    pub fn n_conseq_pixels(&self) -> i32 {
        contiguous_columns(self.x).min(self.right - self.x).max(0)
    }

    /// Current run of pixels.
    pub fn raw_data(&self) -> &[u8] {
        self.cursor.run(self.x, self.y, self.n_conseq_pixels() as usize)
    }

    /// Current run of pixels for writing; `None` on a read-only iterator.
    pub fn raw_data_mut(&mut self) -> Option<&mut [u8]> {
        let n = self.n_conseq_pixels() as usize;
        self.cursor.run_mut(self.x, self.y, n)
    }

    /// Current run as it was before the open named transaction.
    pub fn old_raw_data(&self) -> &[u8] {
        self.cursor
            .old_run(self.x, self.y, self.n_conseq_pixels() as usize)
    }

    /// Whether the iterator can write.
    pub fn is_writable(&self) -> bool {
        self.cursor.is_writable()
    }
}

// ── VLineIterator ───────────────────────────────────────────────

/// Walks a vertical span of pixels.
///
/// Vertically adjacent pixels are never contiguous, so every run is one
/// pixel long.
pub struct VLineIterator<'a> {
    cursor: TileCursor<'a>,
    top: i32,
    bottom: i32,
    x: i32,
    y: i32,
}

impl<'a> VLineIterator<'a> {
    fn new(
        dm: &'a TiledDataManager,
        x: i32,
        y: i32,
        height: i32,
        writable: bool,
    ) -> Result<Self, StoreError> {
        let mut cursor = TileCursor::new(dm, writable);
        cursor.seek(TileCoord::containing(x, y))?;
        Ok(Self {
            cursor,
            top: y,
            bottom: y + height.max(0),
            x,
            y,
        })
    }

    /// Current column.
    pub fn x(&self) -> i32 {
        self.x
    }

    /// Current row.
    pub fn y(&self) -> i32 {
        self.y
    }

    /// Step one pixel down.
    pub fn next_pixel(&mut self) -> Result<bool, StoreError> {
        if self.y + 1 >= self.bottom {
            return Ok(false);
        }
        self.y += 1;
        self.cursor.seek(TileCoord::containing(self.x, self.y))?;
        Ok(true)
    }

    /// Restart on the next column.
    pub fn next_column(&mut self) -> Result<(), StoreError> {
        self.y = self.top;
        self.x += 1;
        self.cursor.seek(TileCoord::containing(self.x, self.y))
    }

    /// Always 1 within the span.
    pub fn n_conseq_pixels(&self) -> i32 {
        i32::from(self.y < self.bottom)
    }

    /// Current pixel.
    pub fn raw_data(&self) -> &[u8] {
        self.cursor.run(self.x, self.y, self.n_conseq_pixels() as usize)
    }

    /// Current pixel for writing; `None` on a read-only iterator.
    pub fn raw_data_mut(&mut self) -> Option<&mut [u8]> {
        let n = self.n_conseq_pixels() as usize;
        self.cursor.run_mut(self.x, self.y, n)
    }

    /// Current pixel as it was before the open named transaction.
    pub fn old_raw_data(&self) -> &[u8] {
        self.cursor
            .old_run(self.x, self.y, self.n_conseq_pixels() as usize)
    }
}

// ── RectIterator ────────────────────────────────────────────────

/// Walks a rectangle row by row.
pub struct RectIterator<'a> {
    cursor: TileCursor<'a>,
    rect: Rect,
    x: i32,
    y: i32,
}

impl<'a> RectIterator<'a> {
    fn new(dm: &'a TiledDataManager, rect: Rect, writable: bool) -> Result<Self, StoreError> {
        let mut cursor = TileCursor::new(dm, writable);
        cursor.seek(TileCoord::containing(rect.x, rect.y))?;
        Ok(Self {
            cursor,
            rect,
            x: rect.x,
            y: rect.y,
        })
    }

    /// Current column.
    pub fn x(&self) -> i32 {
        self.x
    }

    /// Current row.
    pub fn y(&self) -> i32 {
        self.y
    }

    /// Step one pixel, wrapping to the start of the next row.
    pub fn next_pixel(&mut self) -> Result<bool, StoreError> {
        self.next_pixels(1)
    }

    /// Step `n` pixels along the current row, or to the start of the next
    /// row when that overruns it.
    pub fn next_pixels(&mut self, n: i32) -> Result<bool, StoreError> {
        if self.x + n < self.rect.right() {
            self.x += n;
        } else if self.y + 1 < self.rect.bottom() {
            self.x = self.rect.left();
            self.y += 1;
        } else {
            return Ok(false);
        }
        self.cursor.seek(TileCoord::containing(self.x, self.y))?;
        Ok(true)
    }

    /// Pixels contiguous in memory from the current one within the row.
    pub fn n_conseq_pixels(&self) -> i32 {
        contiguous_columns(self.x)
            .min(self.rect.right() - self.x)
            .max(0)
    }

    /// Current run of pixels.
    pub fn raw_data(&self) -> &[u8] {
        self.cursor.run(self.x, self.y, self.n_conseq_pixels() as usize)
    }

    /// Current run for writing; `None` on a read-only iterator.
    pub fn raw_data_mut(&mut self) -> Option<&mut [u8]> {
        let n = self.n_conseq_pixels() as usize;
        self.cursor.run_mut(self.x, self.y, n)
    }

    /// Current run as it was before the open named transaction.
    pub fn old_raw_data(&self) -> &[u8] {
        self.cursor
            .old_run(self.x, self.y, self.n_conseq_pixels() as usize)
    }
}
