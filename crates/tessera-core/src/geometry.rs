//! Tile coordinates, pixel rectangles and the fixed tile dimensions.
//!
//! Pixel space is addressed with signed 32-bit coordinates. Tile space
//! divides it into `TILE_WIDTH × TILE_HEIGHT` blocks using floor
//! division, so tile `(-1, -1)` covers pixels `-64..0` on both axes.

use std::fmt;

/// Width of every tile in pixels.
pub const TILE_WIDTH: i32 = 64;

/// Height of every tile in pixels.
pub const TILE_HEIGHT: i32 = 64;

/// Number of pixels in one tile.
pub const TILE_PIXELS: usize = (TILE_WIDTH * TILE_HEIGHT) as usize;

/// Position of a tile in the sparse grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    /// Tile column (`x / TILE_WIDTH`, rounded toward negative infinity).
    pub col: i32,
    /// Tile row (`y / TILE_HEIGHT`, rounded toward negative infinity).
    pub row: i32,
}

impl TileCoord {
    /// Create a coordinate from a column and row.
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    /// The tile containing pixel `(x, y)`.
    pub fn containing(x: i32, y: i32) -> Self {
        Self {
            col: x.div_euclid(TILE_WIDTH),
            row: y.div_euclid(TILE_HEIGHT),
        }
    }

    /// X coordinate of the tile's leftmost pixel column.
    pub fn left(&self) -> i32 {
        self.col * TILE_WIDTH
    }

    /// Y coordinate of the tile's topmost pixel row.
    pub fn top(&self) -> i32 {
        self.row * TILE_HEIGHT
    }

    /// The pixel rectangle covered by this tile.
    pub fn rect(&self) -> Rect {
        Rect::new(self.left(), self.top(), TILE_WIDTH, TILE_HEIGHT)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

impl From<(i32, i32)> for TileCoord {
    fn from((col, row): (i32, i32)) -> Self {
        Self { col, row }
    }
}

/// An axis-aligned pixel rectangle.
///
/// `right()` and `bottom()` are exclusive. A rectangle with a
/// non-positive width or height is empty; all empty rectangles compare
/// as intersecting nothing and contribute nothing to a union.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Rect {
    /// Create a rectangle from its origin and size.
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The canonical empty rectangle.
    pub const fn empty() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Whether the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Left edge (inclusive).
    pub fn left(&self) -> i32 {
        self.x
    }

    /// Top edge (inclusive).
    pub fn top(&self) -> i32 {
        self.y
    }

    /// Right edge (exclusive).
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Bottom edge (exclusive).
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Number of pixels covered.
    pub fn area(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.width as usize * self.height as usize
        }
    }

    /// Whether pixel `(x, y)` lies inside the rectangle.
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.left() && x < self.right() && y >= self.top() && y < self.bottom()
    }

    /// Whether `other` lies entirely inside this rectangle.
    ///
    /// An empty `other` is contained in every non-empty rectangle.
    pub fn contains(&self, other: &Rect) -> bool {
        if self.is_empty() {
            return false;
        }
        if other.is_empty() {
            return true;
        }
        other.left() >= self.left()
            && other.right() <= self.right()
            && other.top() >= self.top()
            && other.bottom() <= self.bottom()
    }

    /// Whether the two rectangles share at least one pixel.
    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersected(other).is_empty()
    }

    /// The overlap of two rectangles, or an empty rectangle.
    pub fn intersected(&self, other: &Rect) -> Rect {
        if self.is_empty() || other.is_empty() {
            return Rect::empty();
        }
        let left = self.left().max(other.left());
        let top = self.top().max(other.top());
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            Rect::empty()
        } else {
            Rect::new(left, top, right - left, bottom - top)
        }
    }

    /// The bounding rectangle of both rectangles.
    pub fn united(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let left = self.left().min(other.left());
        let top = self.top().min(other.top());
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(left, top, right - left, bottom - top)
    }

    /// The range of tiles touched by this rectangle as
    /// `(first, last)`, both inclusive. `None` for an empty rectangle.
    pub fn tile_span(&self) -> Option<(TileCoord, TileCoord)> {
        if self.is_empty() {
            return None;
        }
        Some((
            TileCoord::containing(self.left(), self.top()),
            TileCoord::containing(self.right() - 1, self.bottom() - 1),
        ))
    }

    /// Every tile touched by this rectangle, in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> {
        let span = self.tile_span();
        let (rows, cols) = match span {
            Some((first, last)) => (first.row..=last.row, first.col..=last.col),
            #[allow(clippy::reversed_empty_ranges)]
            None => (1..=0, 1..=0),
        };
        rows.flat_map(move |row| cols.clone().map(move |col| TileCoord::new(col, row)))
    }

    /// The rectangle covering an inclusive span of tiles.
    pub fn from_tile_span(first: TileCoord, last: TileCoord) -> Rect {
        if last.col < first.col || last.row < first.row {
            return Rect::empty();
        }
        Rect::new(
            first.left(),
            first.top(),
            (last.col - first.col + 1) * TILE_WIDTH,
            (last.row - first.row + 1) * TILE_HEIGHT,
        )
    }

    /// The smallest tile-aligned rectangle containing this one.
    pub fn tile_aligned(&self) -> Rect {
        match self.tile_span() {
            Some((first, last)) => Rect::from_tile_span(first, last),
            None => Rect::empty(),
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Number of pixel columns from `x` to the right edge of its tile.
pub fn contiguous_columns(x: i32) -> i32 {
    TILE_WIDTH - x.rem_euclid(TILE_WIDTH)
}

/// Number of pixel rows from `y` to the bottom edge of its tile.
pub fn contiguous_rows(y: i32) -> i32 {
    TILE_HEIGHT - y.rem_euclid(TILE_HEIGHT)
}
