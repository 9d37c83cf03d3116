use crate::error::{PackError, Result};
use crate::types::{Catalog, PieceKind};

/// Largest grid accepted, in tiles.
pub const MAX_TILES: usize = 1 << 20;

/// Tile count of a `width x height` grid, rejecting empty and oversized grids.
pub fn checked_tile_count(width: usize, height: usize) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(PackError::DegenerateGrid { width, height });
    }
    width
        .checked_mul(height)
        .filter(|&count| count <= MAX_TILES)
        .ok_or_else(|| {
            PackError::MalformedInput(format!(
                "a {}x{} grid exceeds the limit of {} tiles",
                width, height, MAX_TILES
            ))
        })
}

/// Occupancy pattern packed into 64-bit words, one bit per tile in scan order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OccupancyKey(Vec<u64>);

/// Rectangular open/closed tile map.
///
/// Tiles are stored column-major (`x` outer, `y` inner), which is also the scan
/// order used by [`Grid::next_open_tile`] and the greedy fill: every `y` of
/// column 0 first, then column 1, and so on.
#[derive(Debug, Clone)]
pub struct Grid {
    width: usize,
    height: usize,
    open: Vec<bool>,
    /// Per-tile optimistic value, valid until the next open/close.
    optimistic: Option<Vec<f64>>,
}

impl PartialEq for Grid {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.open == other.open
    }
}

impl Eq for Grid {}

impl Grid {
    /// A fully open grid.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        let count = checked_tile_count(width, height)?;
        Self::from_cells(width, height, vec![true; count])
    }

    /// Builds a grid from column-major cells (`cells[x * height + y]`), `true` = open.
    pub fn from_cells(width: usize, height: usize, cells: Vec<bool>) -> Result<Self> {
        let count = checked_tile_count(width, height)?;
        if cells.len() != count {
            return Err(PackError::MalformedInput(format!(
                "expected {} cells for a {}x{} grid, got {}",
                count,
                width,
                height,
                cells.len()
            )));
        }
        Ok(Self {
            width,
            height,
            open: cells,
            optimistic: None,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn tile_count(&self) -> usize {
        self.open.len()
    }

    /// Scan-order index of an in-bounds tile.
    pub fn index(&self, x: usize, y: usize) -> usize {
        x * self.height + y
    }

    /// Tile coordinates of a scan-order index.
    pub fn coords(&self, index: usize) -> (i32, i32) {
        ((index / self.height) as i32, (index % self.height) as i32)
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// False when out of bounds or occupied.
    pub fn is_open(&self, x: i32, y: i32) -> bool {
        self.in_bounds(x, y) && self.open[self.index(x as usize, y as usize)]
    }

    /// True iff the `side x side` square anchored at `(x, y)` is in bounds and fully open.
    pub fn can_place_square(&self, x: i32, y: i32, side: u32) -> bool {
        let side = side as i32;
        if side <= 0 || !self.in_bounds(x, y) || !self.in_bounds(x + side - 1, y + side - 1) {
            return false;
        }
        (x..x + side).all(|tx| {
            let column = self.index(tx as usize, y as usize);
            self.open[column..column + side as usize].iter().all(|&o| o)
        })
    }

    pub fn can_place(&self, x: i32, y: i32, kind: &PieceKind) -> bool {
        self.can_place_square(x, y, kind.side)
    }

    /// First open tile in scan order.
    pub fn next_open_tile(&self) -> Option<(i32, i32)> {
        self.next_open_index(0).map(|i| self.coords(i))
    }

    /// First open scan-order index at or after `start`.
    pub fn next_open_index(&self, start: usize) -> Option<usize> {
        (start..self.open.len()).find(|&i| self.open[i])
    }

    /// Open tiles in scan order.
    pub fn open_tiles(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.open
            .iter()
            .enumerate()
            .filter(|(_, o)| **o)
            .map(|(i, _)| self.coords(i))
    }

    pub fn open_count(&self) -> usize {
        self.open.iter().filter(|&&o| o).count()
    }

    /// Opens or closes the square footprint anchored at `(x, y)`. The caller
    /// guarantees the square is in bounds.
    pub(crate) fn set_square(&mut self, x: i32, y: i32, side: u32, open: bool) {
        for tx in x..x + side as i32 {
            let column = self.index(tx as usize, y as usize);
            self.open[column..column + side as usize].fill(open);
        }
        self.optimistic = None;
    }

    /// Per-tile upper bound on value: for every tile, the highest value per tile
    /// among kinds that fit somewhere covering it. Kinds are considered one at a
    /// time, so overlapping footprints are double counted.
    ///
    /// Cached until the next placement or removal; always pass the same catalog.
    pub fn optimistic_value_per_tile(&mut self, catalog: &Catalog) -> &[f64] {
        if self.optimistic.is_none() {
            self.optimistic = Some(self.compute_optimistic(catalog));
        }
        self.optimistic.as_deref().unwrap_or(&[])
    }

    fn compute_optimistic(&self, catalog: &Catalog) -> Vec<f64> {
        let mut values = vec![0.0; self.open.len()];
        for kind in catalog.iter() {
            let side = kind.side as usize;
            if side > self.width || side > self.height {
                continue;
            }
            for x in 0..=self.width - side {
                for y in 0..=self.height - side {
                    if !self.can_place_square(x as i32, y as i32, kind.side) {
                        continue;
                    }
                    for tx in x..x + side {
                        let column = self.index(tx, y);
                        for v in &mut values[column..column + side] {
                            *v = f64::max(*v, kind.value_per_tile);
                        }
                    }
                }
            }
        }
        values
    }

    /// Sum of the optimistic map over tiles at or after `start` in scan order.
    pub fn optimistic_remaining(&mut self, catalog: &Catalog, start: usize) -> f64 {
        let start = start.min(self.open.len());
        self.optimistic_value_per_tile(catalog)[start..].iter().sum()
    }

    /// Key determined only by which tiles are open.
    pub fn canonical_key(&self) -> OccupancyKey {
        self.suffix_key(0)
    }

    /// Like [`Grid::canonical_key`], but only tiles at or after `start` in scan
    /// order contribute; earlier tiles read as closed.
    pub fn suffix_key(&self, start: usize) -> OccupancyKey {
        let mut words = vec![0u64; self.open.len().div_ceil(64)];
        for (i, _) in self
            .open
            .iter()
            .enumerate()
            .skip(start)
            .filter(|(_, o)| **o)
        {
            words[i / 64] |= 1u64 << (i % 64);
        }
        OccupancyKey(words)
    }
}

impl OccupancyKey {
    /// Appends an extra discriminator word (e.g. a search frontier).
    pub fn with_tag(mut self, tag: u64) -> Self {
        self.0.push(tag);
        self
    }
}
