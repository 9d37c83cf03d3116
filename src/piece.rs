use std::sync::Arc;

use crate::types::{PieceKind, TileRect};

/// A piece anchored at its lowest corner. Immutable; moving a piece means
/// removing it and placing a new one.
#[derive(Debug, Clone)]
pub struct PlacedPiece {
    x: i32,
    y: i32,
    kind: Arc<PieceKind>,
}

impl PartialEq for PlacedPiece {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y && self.kind.id == other.kind.id
    }
}

impl Eq for PlacedPiece {}

impl PlacedPiece {
    pub fn new(x: i32, y: i32, kind: Arc<PieceKind>) -> Self {
        Self { x, y, kind }
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn kind(&self) -> &Arc<PieceKind> {
        &self.kind
    }

    pub fn side(&self) -> u32 {
        self.kind.side
    }

    pub fn footprint(&self) -> TileRect {
        TileRect::square(self.x, self.y, self.kind.side)
    }

    pub fn center(&self) -> (f64, f64) {
        let half = self.kind.side as f64 / 2.0;
        (self.x as f64 + half, self.y as f64 + half)
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        let side = self.kind.side as i32;
        x >= self.x && x < self.x + side && y >= self.y && y < self.y + side
    }

    pub fn intersects_rect(&self, rect: TileRect) -> bool {
        self.intersects_span(
            rect.x1 as f64,
            rect.y1 as f64,
            rect.x2 as f64,
            rect.y2 as f64,
        )
    }

    // Separating-axis test on half-open intervals.
    fn intersects_span(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> bool {
        let side = self.kind.side as f64;
        let (x, y) = (self.x as f64, self.y as f64);
        !(x + side <= x1 || x >= x2 || y + side <= y1 || y >= y2)
    }

    pub fn is_fully_contained_by(&self, rect: TileRect) -> bool {
        let side = self.kind.side as i32;
        self.x >= rect.x1 && self.y >= rect.y1 && self.x + side <= rect.x2 && self.y + side <= rect.y2
    }

    /// The rectangle cuts through this piece: clearing it would leave part of
    /// the piece behind.
    pub fn is_bisected_by(&self, rect: TileRect) -> bool {
        self.intersects_rect(rect) && !self.is_fully_contained_by(rect)
    }

    /// This piece overlaps the supply square of `pole`. Always false when
    /// `pole` is not a pole.
    pub fn supplied_by(&self, pole: &PlacedPiece) -> bool {
        let Some(area) = pole.kind.supply_area() else {
            return false;
        };
        let half = area as f64 / 2.0;
        let (cx, cy) = pole.center();
        self.intersects_span(cx - half, cy - half, cx + half, cy + half)
    }

    pub fn distance_to(&self, other: &PlacedPiece) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        (ax - bx).hypot(ay - by)
    }

    /// Both pieces are poles within the shorter of their connect ranges.
    pub fn connects_to(&self, other: &PlacedPiece) -> bool {
        match (self.kind.connect_range(), other.kind.connect_range()) {
            (Some(a), Some(b)) => self.distance_to(other) <= a.min(b) as f64,
            _ => false,
        }
    }
}

impl std::fmt::Display for PlacedPiece {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ ({}, {})", self.kind.id, self.x, self.y)
    }
}
