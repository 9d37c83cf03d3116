use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::anneal::Annealer;
use crate::bnb::BranchAndBound;
use crate::branch::Branch;
use crate::config::{SolverConfig, Strategy};
use crate::error::Result;
use crate::grid::Grid;
use crate::types::{Catalog, Placement, Solution, StopReason};

/// Outcome of one engine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// More work remains.
    Running,
    /// The engine finished on its own.
    Complete(StopReason),
}

/// Strategy-specific progress figure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressMetric {
    Temperature(f64),
    QueueDepth(usize),
}

/// Snapshot handed to the progress callback.
pub struct SearchProgress<'a> {
    pub best: &'a Branch,
    pub metric: ProgressMetric,
    pub iteration: u64,
    pub elapsed: Duration,
}

/// A resumable search: `step` does one outer iteration and returns, so the
/// caller decides when to check cancellation, budgets and report progress.
pub trait SearchEngine {
    fn step(&mut self) -> StepResult;
    fn best(&self) -> &Branch;
    fn metric(&self) -> ProgressMetric;
    fn into_best(self) -> Branch;
}

#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub branch: Branch,
    pub baseline_score: f64,
    pub iterations: u64,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

impl SolveOutcome {
    /// Output form, with anchors shifted by `origin` back into the caller's
    /// coordinate system.
    pub fn to_solution(&self, origin: (i64, i64)) -> Solution {
        let placements: Vec<Placement> = self
            .branch
            .placements()
            .into_iter()
            .map(|p| Placement {
                x: p.x + origin.0,
                y: p.y + origin.1,
                ..p
            })
            .collect();

        let mut pieces_by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for p in &placements {
            *pieces_by_kind.entry(p.kind.clone()).or_insert(0) += 1;
        }

        Solution {
            width: self.branch.grid().width(),
            height: self.branch.grid().height(),
            placements,
            score: self.branch.score(),
            baseline_score: self.baseline_score,
            pieces_by_kind,
            pole_networks: self.branch.pole_networks(),
            iterations: self.iterations,
            stop_reason: self.stop_reason,
        }
    }
}

pub struct Solver {
    grid: Grid,
    catalog: Catalog,
    config: SolverConfig,
}

impl Solver {
    /// Grid and catalog are validated on construction; this checks the config.
    pub fn new(grid: Grid, catalog: Catalog, config: SolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            grid,
            catalog,
            config,
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn start_branch(&self) -> Branch {
        Branch::new(self.grid.clone(), self.config.supply_rule)
    }

    /// One greedy fill of the empty grid, scored.
    pub fn baseline(&self) -> Branch {
        let mut branch = self.start_branch();
        branch.greedy_fill(&self.catalog);
        branch.recompute_score();
        branch
    }

    pub fn solve(&self) -> SolveOutcome {
        let cancel = AtomicBool::new(false);
        self.solve_with(&cancel, |_| {})
    }

    /// Runs the configured strategy. Setting `cancel` stops the search at the
    /// next iteration and returns the best branch so far.
    pub fn solve_with<F>(&self, cancel: &AtomicBool, mut progress: F) -> SolveOutcome
    where
        F: FnMut(&SearchProgress),
    {
        let started = Instant::now();
        let baseline = self.baseline();
        let baseline_score = baseline.score();
        info!(
            strategy = ?self.config.strategy,
            width = self.grid.width(),
            height = self.grid.height(),
            open = self.grid.open_count(),
            baseline = baseline_score,
            "starting search"
        );

        let (branch, iterations, stop_reason) = match self.config.strategy {
            Strategy::Greedy => (baseline, 0, StopReason::Greedy),
            Strategy::BranchAndBound => {
                let engine = BranchAndBound::new(
                    self.start_branch(),
                    baseline,
                    self.catalog.clone(),
                    self.config.bound_weight,
                );
                self.drive(engine, cancel, &mut progress, started)
            }
            Strategy::Annealing => {
                let engine = Annealer::new(baseline, self.catalog.clone(), &self.config);
                self.drive(engine, cancel, &mut progress, started)
            }
        };

        let elapsed = started.elapsed();
        info!(
            score = branch.score(),
            improvement = branch.score() - baseline_score,
            pieces = branch.pieces().len(),
            iterations,
            reason = %stop_reason,
            elapsed_ms = elapsed.as_millis() as u64,
            "search finished"
        );

        SolveOutcome {
            branch,
            baseline_score,
            iterations,
            stop_reason,
            elapsed,
        }
    }

    fn drive<E, F>(
        &self,
        mut engine: E,
        cancel: &AtomicBool,
        progress: &mut F,
        started: Instant,
    ) -> (Branch, u64, StopReason)
    where
        E: SearchEngine,
        F: FnMut(&SearchProgress),
    {
        let time_limit = self.config.time_limit();
        let interval = self.config.progress_interval();
        let mut iterations = 0u64;
        let mut last_report = Instant::now();

        let reason = loop {
            if cancel.load(Ordering::Relaxed) {
                break StopReason::Cancelled;
            }
            if self.config.max_iterations > 0 && iterations >= self.config.max_iterations {
                break StopReason::IterationLimit;
            }
            if time_limit.is_some_and(|limit| started.elapsed() >= limit) {
                break StopReason::TimeLimit;
            }

            if let StepResult::Complete(reason) = engine.step() {
                break reason;
            }
            iterations += 1;

            if last_report.elapsed() >= interval {
                let report = SearchProgress {
                    best: engine.best(),
                    metric: engine.metric(),
                    iteration: iterations,
                    elapsed: started.elapsed(),
                };
                debug!(
                    iteration = iterations,
                    best = report.best.score(),
                    metric = ?report.metric,
                    "search progress"
                );
                progress(&report);
                last_report = Instant::now();
            }
        };

        progress(&SearchProgress {
            best: engine.best(),
            metric: engine.metric(),
            iteration: iterations,
            elapsed: started.elapsed(),
        });
        (engine.into_best(), iterations, reason)
    }
}
