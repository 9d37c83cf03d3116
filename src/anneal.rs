//! Simulated annealing over greedy fills.
//!
//! Every step clones the current branch, applies [`Branch::perturb`] and
//! rescores it. Improvements are always accepted; regressions are accepted
//! with probability `exp(delta / temperature)`. The temperature is multiplied
//! by the cooling rate after every step and the run ends once it reaches 1.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::branch::{Branch, Perturbation};
use crate::config::SolverConfig;
use crate::solver::{ProgressMetric, SearchEngine, StepResult};
use crate::types::{Catalog, StopReason};

pub struct Annealer {
    catalog: Catalog,
    current: Branch,
    best: Branch,
    keep_best: bool,
    temperature: f64,
    cooling_rate: f64,
    perturbation: Perturbation,
    rng: StdRng,
    accepted: u64,
}

impl Annealer {
    /// `start` should already be greedily filled and scored.
    pub fn new(start: Branch, catalog: Catalog, config: &SolverConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            catalog,
            best: start.clone(),
            current: start,
            keep_best: config.keep_best,
            temperature: config.initial_temperature,
            cooling_rate: config.cooling_rate,
            perturbation: config.perturbation(),
            rng,
            accepted: 0,
        }
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn current(&self) -> &Branch {
        &self.current
    }

    /// Best state visited so far, regardless of `keep_best`.
    pub fn best_seen(&self) -> &Branch {
        &self.best
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn step(&mut self) -> StepResult {
        if self.temperature <= 1.0 {
            debug!(
                accepted = self.accepted,
                score = self.current.score(),
                best = self.best.score(),
                "annealing cooled"
            );
            return StepResult::Complete(StopReason::Cooled);
        }

        let mut candidate = self.current.clone();
        candidate.perturb(&self.catalog, &mut self.rng, self.perturbation);
        let new_score = candidate.recompute_score();
        let delta = new_score - self.current.score();

        let accept = delta > 0.0 || self.rng.gen_bool((delta / self.temperature).exp());
        if accept {
            self.accepted += 1;
            if new_score > self.best.score() {
                self.best = candidate.clone();
            }
            self.current = candidate;
        }

        self.temperature *= self.cooling_rate;
        StepResult::Running
    }

    /// The branch this run reports: best-ever with `keep_best`, otherwise the
    /// last accepted state.
    pub fn result(&self) -> &Branch {
        if self.keep_best {
            &self.best
        } else {
            &self.current
        }
    }
}

impl SearchEngine for Annealer {
    fn step(&mut self) -> StepResult {
        Annealer::step(self)
    }

    fn best(&self) -> &Branch {
        self.result()
    }

    fn metric(&self) -> ProgressMetric {
        ProgressMetric::Temperature(self.temperature)
    }

    fn into_best(self) -> Branch {
        if self.keep_best { self.best } else { self.current }
    }
}
