//! Adapters from interchange formats to a normalized [`Grid`].
//!
//! Every grid is anchored at `(0, 0)`; [`GridFrame::origin`] keeps the offset
//! needed to translate solution anchors back to the caller's coordinates.

use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use crate::error::{PackError, Result};
use crate::grid::{self, Grid};
use crate::types::{Catalog, PieceKind};

#[derive(Debug, Clone)]
pub struct GridFrame {
    pub grid: Grid,
    /// Raw coordinates of grid tile `(0, 0)`.
    pub origin: (i64, i64),
}

/// Parses a text occupancy map, one row per `y`.
///
/// `#` is open; `.`, `_` and space are blocked. Short rows are padded with
/// blocked tiles.
pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<GridFrame> {
    let height = rows.len();
    let width = rows
        .iter()
        .map(|r| r.as_ref().chars().count())
        .max()
        .unwrap_or(0);
    let count = grid::checked_tile_count(width, height)?;

    let mut cells = vec![false; count];
    for (y, row) in rows.iter().enumerate() {
        for (x, ch) in row.as_ref().chars().enumerate() {
            cells[x * height + y] = match ch {
                '#' => true,
                '.' | '_' | ' ' => false,
                other => {
                    return Err(PackError::MalformedInput(format!(
                        "unexpected character '{}' at row {}, column {}",
                        other, y, x
                    )));
                }
            };
        }
    }

    let grid = Grid::from_cells(width, height, cells)?;
    debug!(width, height, open = grid.open_count(), "parsed text grid");
    Ok(GridFrame {
        grid,
        origin: (0, 0),
    })
}

/// Parses a whole text map, ignoring a trailing newline.
pub fn from_text(text: &str) -> Result<GridFrame> {
    let rows: Vec<&str> = text.lines().collect();
    from_rows(&rows)
}

/// Builds the bounding-box grid of a set of raw open tiles. Duplicates are ignored.
pub fn from_tiles<I>(tiles: I) -> Result<GridFrame>
where
    I: IntoIterator<Item = (i64, i64)>,
{
    let tiles: HashSet<(i64, i64)> = tiles.into_iter().collect();
    let (Some(min_x), Some(min_y)) = (
        tiles.iter().map(|t| t.0).min(),
        tiles.iter().map(|t| t.1).min(),
    ) else {
        return Err(PackError::DegenerateGrid {
            width: 0,
            height: 0,
        });
    };
    let max_x = tiles.iter().map(|t| t.0).max().unwrap_or(min_x);
    let max_y = tiles.iter().map(|t| t.1).max().unwrap_or(min_y);

    let width = span(min_x, max_x)?;
    let height = span(min_y, max_y)?;
    let count = grid::checked_tile_count(width, height)?;

    let mut cells = vec![false; count];
    for (x, y) in &tiles {
        let (lx, ly) = ((x - min_x) as usize, (y - min_y) as usize);
        cells[lx * height + ly] = true;
    }

    let grid = Grid::from_cells(width, height, cells)?;
    debug!(
        width,
        height,
        tiles = tiles.len(),
        min_x,
        min_y,
        "normalized raw tiles"
    );
    Ok(GridFrame {
        grid,
        origin: (min_x, min_y),
    })
}

/// Number of tiles from `min` to `max` inclusive.
fn span(min: i64, max: i64) -> Result<usize> {
    max.checked_sub(min)
        .and_then(|d| d.checked_add(1))
        .and_then(|d| usize::try_from(d).ok())
        .ok_or_else(|| {
            PackError::MalformedInput(format!("tile span {}..={} is too large", min, max))
        })
}

/// Parses a JSON array of piece kinds into a validated catalog.
pub fn parse_catalog(json: &str) -> Result<Catalog> {
    let kinds: Vec<PieceKind> = serde_json::from_str(json)?;
    Catalog::new(kinds)
}

pub fn load_catalog(path: impl AsRef<Path>) -> Result<Catalog> {
    let json = std::fs::read_to_string(path)?;
    parse_catalog(&json)
}

pub fn load_grid(path: impl AsRef<Path>) -> Result<GridFrame> {
    let text = std::fs::read_to_string(path)?;
    from_text(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_blocked_and_padded() {
        let frame = from_rows(&["##_#", "#.", "## #"]).unwrap();
        let grid = &frame.grid;
        assert_eq!((grid.width(), grid.height()), (4, 3));
        assert!(grid.is_open(0, 0));
        assert!(!grid.is_open(2, 0));
        assert!(!grid.is_open(1, 1));
        assert!(!grid.is_open(3, 1), "padding is blocked");
        assert!(!grid.is_open(2, 2));
        assert_eq!(grid.open_count(), 7);
        assert_eq!(frame.origin, (0, 0));
    }

    #[test]
    fn test_rows_reject_unknown_characters() {
        assert!(matches!(
            from_rows(&["##", "#x"]),
            Err(PackError::MalformedInput(_))
        ));
        assert!(matches!(
            from_text(""),
            Err(PackError::DegenerateGrid { .. })
        ));
    }

    #[test]
    fn test_text_with_trailing_newline() {
        let frame = from_text("###\n###\n").unwrap();
        assert_eq!((frame.grid.width(), frame.grid.height()), (3, 2));
        assert_eq!(frame.grid.open_count(), 6);
    }

    #[test]
    fn test_tiles_normalized_to_bounding_box() {
        let frame = from_tiles([(-3, 10), (-2, 10), (-3, 11), (0, 12), (0, 12)]).unwrap();
        assert_eq!(frame.origin, (-3, 10));
        let grid = &frame.grid;
        assert_eq!((grid.width(), grid.height()), (4, 3));
        assert_eq!(grid.open_count(), 4);
        assert!(grid.is_open(0, 0));
        assert!(grid.is_open(1, 0));
        assert!(grid.is_open(0, 1));
        assert!(grid.is_open(3, 2));
        assert!(!grid.is_open(1, 1));
    }

    #[test]
    fn test_empty_tiles_rejected() {
        assert!(matches!(
            from_tiles(Vec::new()),
            Err(PackError::DegenerateGrid { .. })
        ));
    }

    #[test]
    fn test_huge_tile_span_rejected() {
        assert!(matches!(
            from_tiles([(0, 0), (i64::MAX, 0)]),
            Err(PackError::MalformedInput(_))
        ));
        assert!(matches!(
            from_tiles([(i64::MIN, 0), (i64::MAX, 0)]),
            Err(PackError::MalformedInput(_))
        ));
        assert!(matches!(
            from_tiles([(0, 0), (3_000_000_000, 3_000_000_000)]),
            Err(PackError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_parse_catalog() {
        let catalog = parse_catalog(
            r#"[
                {"id":"unit","side":1,"value_per_tile":1},
                {"id":"big","side":3,"value_per_tile":20,"role":{"pole":{"supply_area":5,"connect_range":7}}}
            ]"#,
        )
        .unwrap();
        assert_eq!(catalog.kinds()[0].id, "big");
        assert!(catalog.has_poles());

        assert!(matches!(parse_catalog("[]"), Err(PackError::EmptyCatalog)));
        assert!(matches!(parse_catalog("{"), Err(PackError::Json(_))));
    }
}
