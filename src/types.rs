use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PackError, Result};

/// What a piece kind does besides occupying tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceRole {
    /// Ordinary piece. Under `SupplyRule::RequirePoleCoverage` it only scores
    /// when some pole covers it.
    #[default]
    Consumer,
    /// Power source projecting a square supply area centered on itself.
    Pole {
        /// Side of the square supply area, in tiles.
        supply_area: u32,
        /// Maximum center distance at which two poles link up.
        connect_range: u32,
    },
}

/// A catalog entry: a square piece with a value per covered tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceKind {
    pub id: String,
    pub side: u32,
    pub value_per_tile: f64,
    #[serde(default)]
    pub role: PieceRole,
}

impl PieceKind {
    pub fn new(id: impl Into<String>, side: u32, value_per_tile: f64) -> Self {
        Self {
            id: id.into(),
            side,
            value_per_tile,
            role: PieceRole::Consumer,
        }
    }

    /// Builds a kind from the value of one whole piece instead of its per-tile value.
    pub fn with_total_value(id: impl Into<String>, side: u32, total_value: f64) -> Self {
        let area = (side as f64) * (side as f64);
        let value_per_tile = if area > 0.0 { total_value / area } else { 0.0 };
        Self::new(id, side, value_per_tile)
    }

    pub fn pole(mut self, supply_area: u32, connect_range: u32) -> Self {
        self.role = PieceRole::Pole {
            supply_area,
            connect_range,
        };
        self
    }

    pub fn area(&self) -> u64 {
        self.side as u64 * self.side as u64
    }

    pub fn total_value(&self) -> f64 {
        self.value_per_tile * self.area() as f64
    }

    pub fn is_pole(&self) -> bool {
        matches!(self.role, PieceRole::Pole { .. })
    }

    pub fn supply_area(&self) -> Option<u32> {
        match self.role {
            PieceRole::Pole { supply_area, .. } => Some(supply_area),
            PieceRole::Consumer => None,
        }
    }

    pub fn connect_range(&self) -> Option<u32> {
        match self.role {
            PieceRole::Pole { connect_range, .. } => Some(connect_range),
            PieceRole::Consumer => None,
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| PackError::InvalidPiece {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.side == 0 {
            return Err(invalid("side length must be at least 1"));
        }
        if !self.value_per_tile.is_finite() || self.value_per_tile < 0.0 {
            return Err(invalid("value per tile must be a finite, non-negative number"));
        }
        if self.supply_area() == Some(0) {
            return Err(invalid("pole supply area must be non-zero"));
        }
        Ok(())
    }
}

impl std::fmt::Display for PieceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}x{}, {:.2}/tile",
            self.id, self.side, self.side, self.value_per_tile
        )
    }
}

/// Immutable, validated set of piece kinds ordered by value per tile, highest first.
///
/// Kinds with equal value per tile keep their input order.
#[derive(Debug, Clone)]
pub struct Catalog {
    kinds: Vec<Arc<PieceKind>>,
}

impl Catalog {
    pub fn new(kinds: Vec<PieceKind>) -> Result<Self> {
        if kinds.is_empty() {
            return Err(PackError::EmptyCatalog);
        }
        for (i, kind) in kinds.iter().enumerate() {
            kind.validate()?;
            if kinds[..i].iter().any(|k| k.id == kind.id) {
                return Err(PackError::InvalidPiece {
                    id: kind.id.clone(),
                    reason: "duplicate identifier".to_string(),
                });
            }
        }

        let mut kinds: Vec<Arc<PieceKind>> = kinds.into_iter().map(Arc::new).collect();
        // sort_by is stable
        kinds.sort_by(|a, b| b.value_per_tile.total_cmp(&a.value_per_tile));
        Ok(Self { kinds })
    }

    /// The space-solar catalog the tool was built for.
    pub fn space_solar() -> Self {
        Self::new(vec![
            PieceKind::new("se_space_solar_panel", 4, 1050.0),
            PieceKind::new("solar_panel", 3, 100.0),
            PieceKind::new("substation", 2, 10.0).pole(18, 18),
            PieceKind::new("medium_electric_pole", 1, 1.0).pole(7, 9),
        ])
        .expect("built-in catalog is valid")
    }

    pub fn kinds(&self) -> &[Arc<PieceKind>] {
        &self.kinds
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PieceKind>> {
        self.kinds.iter()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<PieceKind>> {
        self.kinds.iter().find(|k| k.id == id)
    }

    pub fn has_poles(&self) -> bool {
        self.kinds.iter().any(|k| k.is_pole())
    }
}

/// Half-open integer rectangle `[x1, x2) x [y1, y2)` in grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl TileRect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// The square of side `side` anchored at `(x, y)`.
    pub fn square(x: i32, y: i32, side: u32) -> Self {
        let side = side as i32;
        Self::new(x, y, x + side, y + side)
    }
}

impl std::fmt::Display for TileRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})-({},{})", self.x1, self.y1, self.x2, self.y2)
    }
}

/// One placed piece in the output, in caller coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub kind: String,
    pub x: i64,
    pub y: i64,
}

/// Why a search stopped. None of these are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Only the greedy baseline was requested.
    Greedy,
    /// Branch-and-bound emptied its queue.
    Exhausted,
    /// Annealing temperature dropped to 1 or below.
    Cooled,
    Cancelled,
    IterationLimit,
    TimeLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::Greedy => "greedy only",
            StopReason::Exhausted => "search exhausted",
            StopReason::Cooled => "cooled",
            StopReason::Cancelled => "cancelled",
            StopReason::IterationLimit => "iteration limit",
            StopReason::TimeLimit => "time limit",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub width: usize,
    pub height: usize,
    pub placements: Vec<Placement>,
    pub score: f64,
    pub baseline_score: f64,
    pub pieces_by_kind: BTreeMap<String, usize>,
    pub pole_networks: usize,
    pub iterations: u64,
    pub stop_reason: StopReason,
}

impl Solution {
    pub fn piece_count(&self) -> usize {
        self.placements.len()
    }

    pub fn improvement(&self) -> f64 {
        self.score - self.baseline_score
    }
}
