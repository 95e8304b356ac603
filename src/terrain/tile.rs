/// Integer key of one tile within a clip level.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
}

impl Tile {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Tile covering sample `(x, y)` for tiles `tile_size` samples wide.
    pub fn containing(x: i32, y: i32, tile_size: u32) -> Self {
        let size = tile_size as i32;
        Self {
            x: x.div_euclid(size),
            y: y.div_euclid(size),
        }
    }

    /// First sample covered by this tile.
    pub fn origin(&self, tile_size: u32) -> (i32, i32) {
        let size = tile_size as i32;
        (self.x * size, self.y * size)
    }
}

/// Rectangle of level samples whose contents changed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Region {
    pub level: u32,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(level: u32, x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            level,
            x,
            y,
            width,
            height,
        }
    }

    /// Region covered by `tile` at `level`.
    pub fn of_tile(level: u32, tile: Tile, tile_size: u32) -> Self {
        let (x, y) = tile.origin(tile_size);
        Self::new(level, x, y, tile_size, tile_size)
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn intersects(&self, other: &Region) -> bool {
        self.level == other.level
            && self.left() < other.right()
            && other.left() < self.right()
            && self.top() < other.bottom()
            && other.top() < self.bottom()
    }
}

/// Positive modulo: the result is always in `[0, size)`.
#[inline]
pub fn wrap(value: i32, size: i32) -> i32 {
    value.rem_euclid(size)
}
