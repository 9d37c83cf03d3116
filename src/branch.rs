use std::collections::VecDeque;
use std::sync::Arc;

use rand::Rng;
use tracing::trace;

use crate::config::SupplyRule;
use crate::error::{PackError, Result};
use crate::grid::{Grid, OccupancyKey};
use crate::piece::PlacedPiece;
use crate::types::{Catalog, PieceKind, Placement, TileRect};

/// Parameters of the annealing neighbour move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Perturbation {
    /// Pieces with a side below this are cleared before every move.
    pub protected_size: u32,
    /// The moved piece shifts by up to this many tiles on each axis.
    pub max_shift: i32,
}

impl Default for Perturbation {
    fn default() -> Self {
        Self {
            protected_size: 3,
            max_shift: 2,
        }
    }
}

/// A partial or complete solution: its own grid, the pieces on it and a score.
///
/// Cloning yields a fully independent branch; only the read-only starting grid
/// is shared.
#[derive(Debug, Clone)]
pub struct Branch {
    grid: Grid,
    origin: Arc<Grid>,
    pieces: Vec<PlacedPiece>,
    score: f64,
    /// Scan-order index below which every tile has been decided by the tree search.
    frontier: usize,
    supply_rule: SupplyRule,
}

impl Branch {
    pub fn new(grid: Grid, supply_rule: SupplyRule) -> Self {
        Self {
            origin: Arc::new(grid.clone()),
            grid,
            pieces: Vec::new(),
            score: 0.0,
            frontier: 0,
            supply_rule,
        }
    }

    /// Starts from an existing set of pieces, rejecting any that overlap, leave
    /// the grid or cover blocked tiles.
    pub fn with_pieces<I>(grid: Grid, pieces: I, supply_rule: SupplyRule) -> Result<Self>
    where
        I: IntoIterator<Item = (i32, i32, Arc<PieceKind>)>,
    {
        let mut branch = Self::new(grid, supply_rule);
        for (x, y, kind) in pieces {
            if !branch.grid.can_place(x, y, &kind) {
                return Err(PackError::MalformedInput(format!(
                    "{} at ({}, {}) does not fit",
                    kind.id, x, y
                )));
            }
            branch.place(x, y, &kind);
        }
        branch.recompute_score();
        Ok(branch)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// The grid the search started from, before any placement.
    pub fn origin(&self) -> &Grid {
        &self.origin
    }

    pub fn pieces(&self) -> &[PlacedPiece] {
        &self.pieces
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn supply_rule(&self) -> SupplyRule {
        self.supply_rule
    }

    pub fn frontier(&self) -> usize {
        self.frontier
    }

    pub(crate) fn set_frontier(&mut self, frontier: usize) {
        self.frontier = frontier;
    }

    /// Places `kind` at `(x, y)` and adds its raw value to the score.
    ///
    /// # Panics
    ///
    /// If the footprint is not fully open. Callers check `can_place` first.
    pub fn place(&mut self, x: i32, y: i32, kind: &Arc<PieceKind>) {
        assert!(
            self.grid.can_place(x, y, kind),
            "invalid placement: {} at ({}, {})",
            kind.id,
            x,
            y
        );
        self.grid.set_square(x, y, kind.side, false);
        self.score += kind.total_value();
        self.pieces.push(PlacedPiece::new(x, y, Arc::clone(kind)));
    }

    /// Removes a placed piece, reopening its footprint.
    ///
    /// # Panics
    ///
    /// If `piece` is not on this branch.
    pub fn remove(&mut self, piece: &PlacedPiece) -> PlacedPiece {
        let idx = self
            .pieces
            .iter()
            .position(|p| p == piece)
            .unwrap_or_else(|| panic!("removing a piece that is not placed: {piece}"));
        let removed = self.pieces.remove(idx);
        self.grid
            .set_square(removed.x(), removed.y(), removed.side(), true);
        self.score -= removed.kind().total_value();
        removed
    }

    /// Removes every piece overlapping `rect`, whole.
    pub fn remove_all_intersecting(&mut self, rect: TileRect) -> Vec<PlacedPiece> {
        let victims: Vec<PlacedPiece> = self
            .pieces
            .iter()
            .filter(|p| p.intersects_rect(rect))
            .cloned()
            .collect();
        let bisected = victims.iter().filter(|p| p.is_bisected_by(rect)).count();
        if bisected > 0 {
            trace!(%rect, bisected, "clearing pieces that stick out of the target");
        }
        for victim in &victims {
            self.remove(victim);
        }
        victims
    }

    pub fn remove_all_smaller_than(&mut self, side: u32) -> Vec<PlacedPiece> {
        let victims: Vec<PlacedPiece> = self
            .pieces
            .iter()
            .filter(|p| p.side() < side)
            .cloned()
            .collect();
        for victim in &victims {
            self.remove(victim);
        }
        victims
    }

    pub fn piece_at(&self, x: i32, y: i32) -> Option<&PlacedPiece> {
        if !self.grid.in_bounds(x, y) {
            return None;
        }
        self.pieces.iter().find(|p| p.contains_point(x, y))
    }

    /// First-fit fill: for each kind, best value per tile first, place it at
    /// every tile in scan order where it still fits. Returns the number of
    /// pieces placed.
    pub fn greedy_fill(&mut self, catalog: &Catalog) -> usize {
        let before = self.pieces.len();
        let (width, height) = (self.grid.width() as i32, self.grid.height() as i32);
        for kind in catalog.iter() {
            for x in 0..width {
                for y in 0..height {
                    if self.grid.can_place(x, y, kind) {
                        self.place(x, y, kind);
                    }
                }
            }
        }
        self.pieces.len() - before
    }

    /// Raw value of every placed piece, ignoring supply.
    pub fn raw_score(&self) -> f64 {
        self.pieces.iter().map(|p| p.kind().total_value()).sum()
    }

    /// Rebuilds the score from the placed pieces. Under
    /// `SupplyRule::RequirePoleCoverage`, a non-pole piece outside every
    /// pole's supply square counts zero; poles always count.
    pub fn recompute_score(&mut self) -> f64 {
        self.score = match self.supply_rule {
            SupplyRule::Ignore => self.raw_score(),
            SupplyRule::RequirePoleCoverage => {
                let poles: Vec<&PlacedPiece> =
                    self.pieces.iter().filter(|p| p.kind().is_pole()).collect();
                self.pieces
                    .iter()
                    .filter(|p| p.kind().is_pole() || poles.iter().any(|pole| p.supplied_by(pole)))
                    .map(|p| p.kind().total_value())
                    .sum()
            }
        };
        self.score
    }

    /// Neighbour move for annealing. Clears the small pieces, nudges one random
    /// remaining piece by a few tiles (evicting whatever it lands on), then
    /// greedily refills. The grid stays consistent throughout.
    ///
    /// The score is left raw; call [`Branch::recompute_score`] afterwards.
    pub fn perturb<R: Rng + ?Sized>(
        &mut self,
        catalog: &Catalog,
        rng: &mut R,
        params: Perturbation,
    ) {
        self.remove_all_smaller_than(params.protected_size);

        if !self.pieces.is_empty() {
            let mover = self.pieces[rng.gen_range(0..self.pieces.len())].clone();
            let shift = params.max_shift.max(0);
            let nx = mover.x() + rng.gen_range(-shift..=shift);
            let ny = mover.y() + rng.gen_range(-shift..=shift);

            self.remove_all_intersecting(TileRect::square(nx, ny, mover.side()));
            if self.pieces.contains(&mover) {
                self.remove(&mover);
            }
            if self.grid.can_place(nx, ny, mover.kind()) {
                self.place(nx, ny, mover.kind());
            }
            trace!(from = %mover, nx, ny, "moved piece");
        }

        self.greedy_fill(catalog);
    }

    /// Optimistic value of the tiles the tree search has not decided yet.
    pub fn optimistic_remaining(&mut self, catalog: &Catalog) -> f64 {
        self.grid.optimistic_remaining(catalog, self.frontier)
    }

    /// Ordering key for best-first search: `score + optimistic * weight`.
    pub fn priority(&mut self, catalog: &Catalog, weight: f64) -> f64 {
        self.score + self.optimistic_remaining(catalog) * weight
    }

    /// Scan-order index of the next tile the tree search must decide.
    pub(crate) fn next_decision(&self) -> Option<usize> {
        self.grid.next_open_index(self.frontier)
    }

    /// Occupancy from the frontier on, plus the frontier. Open tiles before
    /// the frontier can never be covered again, so they are left out: equal keys
    /// mean identical remaining subproblems.
    pub fn search_key(&self) -> OccupancyKey {
        self.grid
            .suffix_key(self.frontier)
            .with_tag(self.frontier as u64)
    }

    /// Number of connected pole networks, linking poles within connect range.
    pub fn pole_networks(&self) -> usize {
        let poles: Vec<&PlacedPiece> = self.pieces.iter().filter(|p| p.kind().is_pole()).collect();
        let mut seen = vec![false; poles.len()];
        let mut networks = 0;
        for start in 0..poles.len() {
            if seen[start] {
                continue;
            }
            networks += 1;
            seen[start] = true;
            let mut queue = VecDeque::from([start]);
            while let Some(i) = queue.pop_front() {
                for j in 0..poles.len() {
                    if !seen[j] && poles[i].connects_to(poles[j]) {
                        seen[j] = true;
                        queue.push_back(j);
                    }
                }
            }
        }
        networks
    }

    /// Placements in grid-local coordinates.
    pub fn placements(&self) -> Vec<Placement> {
        self.pieces
            .iter()
            .map(|p| Placement {
                kind: p.kind().id.clone(),
                x: p.x() as i64,
                y: p.y() as i64,
            })
            .collect()
    }
}

/// Checks the structural invariants: closed tiles are exactly the starting
/// grid's blocked tiles plus the union of footprints, footprints never overlap,
/// and the incrementally kept score matches a rebuild.
#[cfg(test)]
pub(crate) fn assert_branch_consistent(branch: &Branch) {
    let grid = branch.grid();
    let origin = branch.origin();
    let mut owner = vec![None; grid.tile_count()];
    for (pi, p) in branch.pieces().iter().enumerate() {
        for x in p.x()..p.x() + p.side() as i32 {
            for y in p.y()..p.y() + p.side() as i32 {
                assert!(grid.in_bounds(x, y), "{p} leaves the grid");
                assert!(origin.is_open(x, y), "{p} covers a blocked tile ({x},{y})");
                let idx = grid.index(x as usize, y as usize);
                assert!(owner[idx].is_none(), "{p} overlaps another piece at ({x},{y})");
                owner[idx] = Some(pi);
            }
        }
    }
    for x in 0..grid.width() as i32 {
        for y in 0..grid.height() as i32 {
            let covered = owner[grid.index(x as usize, y as usize)].is_some();
            let expected_open = origin.is_open(x, y) && !covered;
            assert_eq!(grid.is_open(x, y), expected_open, "tile ({x},{y}) out of sync");
        }
    }
    let mut rebuilt = branch.clone();
    let expected = rebuilt.recompute_score();
    assert!(
        (expected - branch.score()).abs() <= 1e-6 * expected.abs().max(1.0),
        "score drifted: kept {} but rebuilt {}",
        branch.score(),
        expected
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn kind(id: &str, side: u32, total: f64) -> PieceKind {
        PieceKind::with_total_value(id, side, total)
    }

    fn two_kinds() -> Catalog {
        Catalog::new(vec![kind("big", 4, 1000.0), kind("unit", 1, 1.0)]).unwrap()
    }

    #[test]
    fn test_place_and_remove() {
        let catalog = two_kinds();
        let big = catalog.get("big").unwrap();
        let mut branch = Branch::new(Grid::new(5, 5).unwrap(), SupplyRule::Ignore);

        branch.place(1, 1, big);
        assert_eq!(branch.score(), 1000.0);
        assert_eq!(branch.grid().open_count(), 9);
        assert_branch_consistent(&branch);

        let piece = branch.piece_at(3, 2).cloned().unwrap();
        branch.remove(&piece);
        assert_eq!(branch.score(), 0.0);
        assert_eq!(branch.grid().open_count(), 25);
        assert!(branch.piece_at(3, 2).is_none());
        assert!(branch.piece_at(9, 9).is_none());
    }

    #[test]
    #[should_panic(expected = "invalid placement")]
    fn test_place_over_piece_panics() {
        let catalog = two_kinds();
        let mut branch = Branch::new(Grid::new(5, 5).unwrap(), SupplyRule::Ignore);
        branch.place(0, 0, catalog.get("big").unwrap());
        branch.place(3, 3, catalog.get("unit").unwrap());
    }

    #[test]
    fn test_with_pieces_rejects_overlap() {
        let catalog = two_kinds();
        let big = catalog.get("big").unwrap();
        let result = Branch::with_pieces(
            Grid::new(6, 6).unwrap(),
            [(0, 0, big.clone()), (2, 2, big.clone())],
            SupplyRule::Ignore,
        );
        assert!(matches!(result, Err(PackError::MalformedInput(_))));
    }

    #[test]
    fn test_bulk_removal() {
        let catalog = two_kinds();
        let unit = catalog.get("unit").unwrap();
        let mut branch = Branch::with_pieces(
            Grid::new(8, 8).unwrap(),
            [
                (0, 0, catalog.get("big").unwrap().clone()),
                (4, 4, unit.clone()),
                (5, 5, unit.clone()),
                (7, 7, unit.clone()),
            ],
            SupplyRule::Ignore,
        )
        .unwrap();

        let hit = branch.remove_all_intersecting(TileRect::new(3, 3, 6, 6));
        assert_eq!(hit.len(), 3, "big piece is bisected and goes too");
        assert_eq!(branch.pieces().len(), 1);
        assert_branch_consistent(&branch);

        let small = branch.remove_all_smaller_than(3);
        assert_eq!(small.len(), 1);
        assert!(branch.pieces().is_empty());
        assert_eq!(branch.grid().open_count(), 64);
    }

    #[test]
    fn test_greedy_fill_prefers_value_per_tile() {
        let catalog = two_kinds();
        let mut branch = Branch::new(Grid::new(5, 5).unwrap(), SupplyRule::Ignore);
        let placed = branch.greedy_fill(&catalog);
        assert_eq!(placed, 10);
        assert_eq!(branch.score(), 1009.0);
        assert_eq!(branch.pieces()[0].x(), 0);
        assert_eq!(branch.pieces()[0].side(), 4);
        assert_eq!(branch.grid().open_count(), 0);
        assert_branch_consistent(&branch);
    }

    #[test]
    fn test_greedy_fill_idempotent() {
        let catalog = Catalog::new(vec![kind("big", 3, 90.0), kind("mid", 2, 12.0)]).unwrap();
        let mut branch = Branch::new(Grid::new(7, 5).unwrap(), SupplyRule::Ignore);
        branch.greedy_fill(&catalog);
        let key = branch.grid().canonical_key();
        let score = branch.score();
        assert_eq!(branch.greedy_fill(&catalog), 0);
        assert_eq!(branch.grid().canonical_key(), key);
        assert_eq!(branch.score(), score);
    }

    #[test]
    fn test_clone_is_independent() {
        let catalog = two_kinds();
        let mut original = Branch::new(Grid::new(5, 5).unwrap(), SupplyRule::Ignore);
        original.place(0, 0, catalog.get("big").unwrap());
        let key = original.grid().canonical_key();
        let pieces = original.pieces().to_vec();

        let mut copy = original.clone();
        copy.greedy_fill(&catalog);
        let first = copy.pieces()[0].clone();
        copy.remove(&first);

        assert_eq!(original.grid().canonical_key(), key);
        assert_eq!(original.pieces(), &pieces[..]);
        assert_eq!(original.score(), 1000.0);
        assert!(Arc::ptr_eq(&original.origin, &copy.origin));
    }

    #[test]
    fn test_unsupplied_piece_scores_zero() {
        let catalog = Catalog::new(vec![
            PieceKind::new("panel", 2, 100.0),
            PieceKind::new("pole", 1, 1.0).pole(3, 5),
        ])
        .unwrap();
        let panel = catalog.get("panel").unwrap();
        let pole = catalog.get("pole").unwrap();
        let mut branch = Branch::new(Grid::new(10, 10).unwrap(), SupplyRule::RequirePoleCoverage);
        branch.place(0, 0, pole);
        branch.place(1, 0, panel);
        branch.place(8, 8, panel);

        // Raw score counts everything; the recompute drops the far panel.
        assert_eq!(branch.score(), 801.0);
        assert_eq!(branch.recompute_score(), 401.0);
        assert_eq!(branch.pieces().len(), 3);
        assert!(!branch.grid().is_open(9, 9), "unsupplied piece still occupies its tiles");

        let mut flat = branch.clone();
        flat.supply_rule = SupplyRule::Ignore;
        assert_eq!(flat.recompute_score(), 801.0);
    }

    #[test]
    fn test_perturb_keeps_branch_consistent() {
        let catalog = Catalog::new(vec![
            kind("big", 4, 1000.0),
            kind("mid", 3, 270.0),
            kind("unit", 1, 1.0),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut branch = Branch::new(Grid::new(11, 9).unwrap(), SupplyRule::Ignore);
        branch.greedy_fill(&catalog);
        for _ in 0..200 {
            let mut next = branch.clone();
            next.perturb(&catalog, &mut rng, Perturbation::default());
            next.recompute_score();
            assert_branch_consistent(&next);
            assert_eq!(next.grid().open_count(), 0, "unit pieces refill every gap");
            branch = next;
        }
    }

    #[test]
    fn test_priority() {
        let catalog = two_kinds();
        let mut branch = Branch::new(Grid::new(4, 4).unwrap(), SupplyRule::Ignore);
        assert_eq!(branch.optimistic_remaining(&catalog), 1000.0);
        assert_eq!(branch.priority(&catalog, 0.5), 500.0);
        branch.place(0, 0, catalog.get("unit").unwrap());
        assert_eq!(branch.priority(&catalog, 1.0), 1.0 + 15.0);
    }

    #[test]
    fn test_pole_networks() {
        let catalog = Catalog::new(vec![PieceKind::new("pole", 1, 1.0).pole(3, 4)]).unwrap();
        let pole = catalog.get("pole").unwrap();
        let mut branch = Branch::new(Grid::new(20, 1).unwrap(), SupplyRule::Ignore);
        assert_eq!(branch.pole_networks(), 0);
        for x in [0, 3, 6, 15] {
            branch.place(x, 0, pole);
        }
        assert_eq!(branch.pole_networks(), 2);
    }
}
