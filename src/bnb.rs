//! Best-first branch-and-bound over tile decisions.
//!
//! Each tree level decides the next open tile in scan order: one child per
//! kind whose square fits anchored there, plus a "skip" child that leaves the
//! tile empty for good and moves the frontier past it. No later anchor can
//! cover a skipped tile, so every packing has exactly one path. Children are
//! ordered by `score + optimistic * weight` and pruned by a transposition
//! table and by the optimistic bound against the incumbent.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use fnv::FnvHashMap;
use tracing::debug;

use crate::branch::Branch;
use crate::grid::OccupancyKey;
use crate::solver::{ProgressMetric, SearchEngine, StepResult};
use crate::types::{Catalog, StopReason};

struct Queued {
    priority: f64,
    /// Insertion counter; newer entries win priority ties.
    seq: u64,
    branch: Branch,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Counters for progress reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct BnbStats {
    pub expanded: u64,
    pub pruned_by_table: u64,
    pub pruned_by_bound: u64,
    pub complete: u64,
}

pub struct BranchAndBound {
    catalog: Catalog,
    weight: f64,
    queue: BinaryHeap<Queued>,
    /// Best raw score reached per (occupancy, frontier).
    seen: FnvHashMap<OccupancyKey, f64>,
    incumbent: Branch,
    seq: u64,
    stats: BnbStats,
}

impl BranchAndBound {
    /// `start` is the empty root; `incumbent` is a complete solution to beat,
    /// normally the greedy baseline.
    pub fn new(start: Branch, incumbent: Branch, catalog: Catalog, weight: f64) -> Self {
        let mut engine = Self {
            catalog,
            weight,
            queue: BinaryHeap::new(),
            seen: FnvHashMap::default(),
            incumbent,
            seq: 0,
            stats: BnbStats::default(),
        };
        engine.push(start);
        engine
    }

    pub fn stats(&self) -> BnbStats {
        self.stats
    }

    fn push(&mut self, mut branch: Branch) {
        let priority = branch.priority(&self.catalog, self.weight);
        self.seq += 1;
        self.queue.push(Queued {
            priority,
            seq: self.seq,
            branch,
        });
    }

    fn consider(&mut self, mut child: Branch) {
        let key = child.search_key();
        let score = child.score();
        if self.seen.get(&key).is_some_and(|&best| best >= score) {
            self.stats.pruned_by_table += 1;
            return;
        }
        self.seen.insert(key, score);

        let optimistic = child.optimistic_remaining(&self.catalog);
        if score + optimistic < self.incumbent.score() {
            self.stats.pruned_by_bound += 1;
            return;
        }
        self.push(child);
    }

    /// Expands the most promising branch. Complete branches are scored and
    /// compared against the incumbent instead.
    pub fn step(&mut self) -> StepResult {
        let Some(Queued { mut branch, .. }) = self.queue.pop() else {
            debug!(
                expanded = self.stats.expanded,
                complete = self.stats.complete,
                table = self.seen.len(),
                "branch-and-bound queue exhausted"
            );
            return StepResult::Complete(StopReason::Exhausted);
        };
        self.stats.expanded += 1;

        let Some(index) = branch.next_decision() else {
            self.stats.complete += 1;
            let score = branch.recompute_score();
            if score > self.incumbent.score() {
                debug!(
                    score,
                    previous = self.incumbent.score(),
                    "new incumbent"
                );
                self.incumbent = branch;
            }
            return StepResult::Running;
        };

        let (x, y) = branch.grid().coords(index);
        let children: Vec<Branch> = self
            .catalog
            .iter()
            .filter(|kind| branch.grid().can_place(x, y, kind))
            .map(|kind| {
                let mut child = branch.clone();
                child.place(x, y, kind);
                child.set_frontier(index);
                child
            })
            .collect();
        for child in children {
            self.consider(child);
        }

        branch.set_frontier(index + 1);
        self.consider(branch);
        StepResult::Running
    }
}

impl SearchEngine for BranchAndBound {
    fn step(&mut self) -> StepResult {
        BranchAndBound::step(self)
    }

    fn best(&self) -> &Branch {
        &self.incumbent
    }

    fn metric(&self) -> ProgressMetric {
        ProgressMetric::QueueDepth(self.queue.len())
    }

    fn into_best(self) -> Branch {
        self.incumbent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::assert_branch_consistent;
    use crate::config::SupplyRule;
    use crate::grid::Grid;
    use crate::input;
    use crate::types::PieceKind;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn run(grid: Grid, catalog: &Catalog, weight: f64) -> (Branch, f64, BnbStats) {
        run_with_rule(grid, catalog, weight, SupplyRule::Ignore)
    }

    fn run_with_rule(
        grid: Grid,
        catalog: &Catalog,
        weight: f64,
        rule: SupplyRule,
    ) -> (Branch, f64, BnbStats) {
        let start = Branch::new(grid, rule);
        let mut baseline = start.clone();
        baseline.greedy_fill(catalog);
        baseline.recompute_score();
        let greedy = baseline.score();

        let mut engine = BranchAndBound::new(start, baseline, catalog.clone(), weight);
        let mut steps = 0;
        while let StepResult::Running = engine.step() {
            steps += 1;
            assert!(steps < 1_000_000, "search did not terminate");
        }
        let stats = engine.stats();
        (engine.into_best(), greedy, stats)
    }

    /// Exhaustive search over the same decision sequence: at the next open
    /// tile, leave it empty or anchor any kind that fits.
    fn best_packing(grid: &mut Grid, catalog: &Catalog, start: usize) -> f64 {
        let Some(index) = grid.next_open_index(start) else {
            return 0.0;
        };
        let (x, y) = grid.coords(index);
        let mut best = best_packing(grid, catalog, index + 1);
        for kind in catalog.iter() {
            if grid.can_place(x, y, kind) {
                grid.set_square(x, y, kind.side, false);
                best = best.max(kind.total_value() + best_packing(grid, catalog, index + 1));
                grid.set_square(x, y, kind.side, true);
            }
        }
        best
    }

    fn three_and_two() -> Catalog {
        Catalog::new(vec![
            PieceKind::new("three", 3, 10.0),
            PieceKind::new("two", 2, 1.0),
        ])
        .unwrap()
    }

    fn big_and_unit() -> Catalog {
        Catalog::new(vec![
            PieceKind::with_total_value("big", 4, 1000.0),
            PieceKind::with_total_value("unit", 1, 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_single_big_piece_beats_units() {
        let (best, _, _) = run(Grid::new(4, 4).unwrap(), &big_and_unit(), 0.9);
        assert_eq!(best.score(), 1000.0);
        assert_eq!(best.pieces().len(), 1);
        assert_branch_consistent(&best);
    }

    #[test]
    fn test_five_by_five_exact() {
        let (best, _, _) = run(Grid::new(5, 5).unwrap(), &big_and_unit(), 0.9);
        assert_eq!(best.score(), 1009.0);
        assert_eq!(best.pieces().len(), 10);
        assert_branch_consistent(&best);
    }

    #[test]
    fn test_beats_greedy_when_first_fit_is_wrong() {
        // The 2x2 has the better value per tile, so greedy anchors it first and
        // strands the grid; a single 3x3 is worth much more.
        let catalog = Catalog::new(vec![
            PieceKind::with_total_value("three", 3, 81.0),
            PieceKind::with_total_value("two", 2, 40.0),
            PieceKind::with_total_value("unit", 1, 1.0),
        ])
        .unwrap();
        let (best, greedy, _) = run(Grid::new(3, 3).unwrap(), &catalog, 0.5);
        assert_eq!(greedy, 40.0 + 5.0);
        assert_eq!(best.score(), 81.0);
        assert_eq!(best.pieces().len(), 1);
        assert_branch_consistent(&best);
    }

    #[test]
    fn test_skips_tiles_nothing_fits() {
        // Only 2x2 pieces; the 3x3 grid's last row and column stay open.
        let catalog = Catalog::new(vec![PieceKind::new("two", 2, 5.0)]).unwrap();
        let (best, greedy, _) = run(Grid::new(3, 3).unwrap(), &catalog, 1.0);
        assert_eq!(greedy, 20.0);
        assert_eq!(best.score(), 20.0);
        assert_eq!(best.grid().open_count(), 5);
    }

    #[test]
    fn test_never_worse_than_greedy_on_blocked_grid() {
        let rows = ["#####_#", "###_###", "#######", "##_####", "#######"];
        let (w, h) = (rows[0].len(), rows.len());
        let mut cells = vec![false; w * h];
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                cells[x * h + y] = ch == '#';
            }
        }
        let catalog = Catalog::new(vec![
            PieceKind::new("three", 3, 10.0),
            PieceKind::new("two", 2, 6.0),
            PieceKind::new("unit", 1, 1.0),
        ])
        .unwrap();
        let (best, greedy, stats) = run(Grid::from_cells(w, h, cells).unwrap(), &catalog, 0.8);
        assert!(best.score() >= greedy);
        assert!(stats.expanded > 0);
        assert_branch_consistent(&best);
    }

    #[test]
    fn test_skipping_a_tile_reaches_the_optimum() {
        // Taking the first open tile (0,1) with the 3x3 strands the corner;
        // skipping it lets the 3x3 sit lower and a 2x2 take the top right.
        let grid = input::from_rows(&["_##", "###", "###", "###", "###"])
            .unwrap()
            .grid;
        let (best, greedy, _) = run(grid, &three_and_two(), 1.0);
        assert_eq!(greedy, 90.0);
        assert_eq!(best.score(), 94.0);
        assert_eq!(best.pieces().len(), 2);
        assert_branch_consistent(&best);
    }

    #[test]
    fn test_matches_exhaustive_enumeration() {
        let catalog = three_and_two();
        let mut rng = StdRng::seed_from_u64(2024);
        for round in 0..200 {
            let (w, h) = (rng.gen_range(3..=6), rng.gen_range(3..=6));
            let cells: Vec<bool> = (0..w * h).map(|_| !rng.gen_bool(0.15)).collect();
            let grid = Grid::from_cells(w, h, cells).unwrap();

            let optimum = best_packing(&mut grid.clone(), &catalog, 0);
            let (best, _, _) = run(grid, &catalog, 1.0);
            assert_eq!(
                best.score(),
                optimum,
                "round {round}: {w}x{h} grid finished below the optimum"
            );
            assert_branch_consistent(&best);
        }
    }

    #[test]
    fn test_transposition_table_prunes_repeated_states() {
        // On a 2x1 grid "unit, unit" and "skip, unit" both end at frontier 1
        // with the second tile closed. An empty incumbent keeps the bound out
        // of the way so the weaker path reaches the table.
        let catalog = Catalog::new(vec![PieceKind::new("unit", 1, 1.0)]).unwrap();
        let start = Branch::new(Grid::new(2, 1).unwrap(), SupplyRule::Ignore);
        let mut engine = BranchAndBound::new(start.clone(), start, catalog, 1.0);
        while let StepResult::Running = engine.step() {}

        let stats = engine.stats();
        assert!(stats.pruned_by_table > 0, "stats: {stats:?}");
        assert_eq!(stats.pruned_by_bound, 0);
        assert_eq!(engine.into_best().score(), 2.0);
    }

    #[test]
    fn test_greedy_incumbent_prunes_by_bound() {
        // Greedy already fills both tiles; skipping the first can reach at
        // most 1 and is cut immediately.
        let catalog = Catalog::new(vec![PieceKind::new("unit", 1, 1.0)]).unwrap();
        let (best, greedy, stats) = run(Grid::new(2, 1).unwrap(), &catalog, 1.0);
        assert_eq!(greedy, 2.0);
        assert_eq!(best.score(), 2.0);
        assert!(stats.pruned_by_bound > 0, "stats: {stats:?}");
    }

    #[test]
    fn test_pole_coverage_rescores_complete_branches() {
        // Poles only supply their own tile, so a panel never scores: the raw
        // 40 of one panel loses to four poles worth 1 each.
        let catalog = Catalog::new(vec![
            PieceKind::new("panel", 2, 10.0),
            PieceKind::new("pole", 1, 1.0).pole(1, 1),
        ])
        .unwrap();
        let (best, greedy, _) = run_with_rule(
            Grid::new(2, 2).unwrap(),
            &catalog,
            0.9,
            SupplyRule::RequirePoleCoverage,
        );
        assert_eq!(greedy, 0.0, "greedy places one unsupplied panel");
        assert_eq!(best.score(), 4.0);
        assert!(best.pieces().iter().all(|p| p.kind().is_pole()));
        assert_eq!(best.raw_score(), 4.0);

        let mut rescored = best.clone();
        assert_eq!(rescored.recompute_score(), best.score());
        assert_branch_consistent(&best);
    }
}
