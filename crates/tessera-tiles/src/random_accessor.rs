//! Random pixel access with a small tile cache.

use tessera_core::{contiguous_columns, contiguous_rows, StoreError, TileCoord, TILE_PIXELS};

use crate::cursor::TileCursor;
use crate::data_manager::{offset_in_tile, TiledDataManager};

impl TiledDataManager {
    /// An accessor positioned on pixel `(x, y)`.
    pub fn random_accessor(
        &self,
        x: i32,
        y: i32,
        writable: bool,
    ) -> Result<RandomAccessor<'_>, StoreError> {
        let mut accessor = RandomAccessor {
            cursor: TileCursor::new(self, writable),
            pixel_size: self.pixel_size(),
            x,
            y,
        };
        accessor.move_to(x, y)?;
        Ok(accessor)
    }
}

/// Jumps between arbitrary pixels, keeping the last few tiles locked.
///
/// The byte accessors return the rest of the current tile from the
/// current pixel; rows inside it are [`row_stride`](Self::row_stride)
/// bytes apart.
pub struct RandomAccessor<'a> {
    cursor: TileCursor<'a>,
    pixel_size: usize,
    x: i32,
    y: i32,
}

impl RandomAccessor<'_> {
    /// Move to pixel `(x, y)`.
    pub fn move_to(&mut self, x: i32, y: i32) -> Result<(), StoreError> {
        self.cursor.seek(TileCoord::containing(x, y))?;
        self.x = x;
        self.y = y;
        Ok(())
    }

    /// Current column.
    pub fn x(&self) -> i32 {
        self.x
    }

    /// Current row.
    pub fn y(&self) -> i32 {
        self.y
    }

    fn remaining(&self) -> usize {
        TILE_PIXELS - offset_in_tile(self.x, self.y, self.pixel_size) / self.pixel_size
    }

    /// Bytes of the current tile from the current pixel on.
    pub fn raw_data(&self) -> &[u8] {
        self.cursor.run(self.x, self.y, self.remaining())
    }

    /// Writable bytes from the current pixel on; `None` when read-only.
    pub fn raw_data_mut(&mut self) -> Option<&mut [u8]> {
        let n = self.remaining();
        self.cursor.run_mut(self.x, self.y, n)
    }

    /// Old-version bytes from the current pixel on.
    pub fn old_raw_data(&self) -> &[u8] {
        self.cursor.old_run(self.x, self.y, self.remaining())
    }

    /// Pixels from column `x` to the right edge of its tile.
    pub fn num_contiguous_columns(&self, x: i32) -> i32 {
        contiguous_columns(x)
    }

    /// Pixels from row `y` to the bottom edge of its tile.
    pub fn num_contiguous_rows(&self, y: i32) -> i32 {
        contiguous_rows(y)
    }

    /// Bytes between vertically adjacent pixels in [`raw_data`](Self::raw_data).
    pub fn row_stride(&self) -> usize {
        tessera_core::TILE_WIDTH as usize * self.pixel_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::Rect;
    use tessera_test_utils::TestStore;

    #[test]
    fn jumps_between_tiles() {
        let store = TestStore::new();
        let dm = TiledDataManager::new(store.handle(), &[0, 0]).unwrap();
        let points = [(0, 0), (-1, -1), (500, 3), (64, 64), (0, 1), (-1, -1)];
        {
            let mut acc = dm.random_accessor(0, 0, true).unwrap();
            for (i, &(x, y)) in points.iter().enumerate() {
                acc.move_to(x, y).unwrap();
                acc.raw_data_mut().unwrap()[..2].copy_from_slice(&[i as u8, 1]);
            }
        }
        assert_eq!(dm.pixel(500, 3).unwrap(), vec![2, 1]);
        assert_eq!(dm.pixel(-1, -1).unwrap(), vec![5, 1]);
        assert_eq!(dm.pixel(0, 1).unwrap(), vec![4, 1]);
    }

    #[test]
    fn raw_data_spans_rest_of_tile() {
        let store = TestStore::new();
        let dm = TiledDataManager::new(store.handle(), &[0]).unwrap();
        dm.set_pixel(10, 11, &[4]).unwrap();
        let acc = dm.random_accessor(10, 10, false).unwrap();
        let stride = acc.row_stride();
        assert_eq!(stride, 64);
        assert_eq!(acc.raw_data()[stride], 4);
        assert_eq!(acc.raw_data().len(), 4096 - (10 * 64 + 10));
        assert_eq!(acc.num_contiguous_columns(10), 54);
        assert_eq!(acc.num_contiguous_rows(-3), 3);
    }

    #[test]
    fn old_data_during_transaction() {
        let store = TestStore::new();
        let dm = TiledDataManager::new(store.handle(), &[0]).unwrap();
        dm.clear(Rect::new(0, 0, 64, 64), &[8]).unwrap();
        let _m = dm.get_memento();
        let mut acc = dm.random_accessor(5, 5, true).unwrap();
        acc.raw_data_mut().unwrap()[0] = 1;
        assert_eq!(acc.raw_data()[0], 1);
        assert_eq!(acc.old_raw_data()[0], 8);
    }
}
