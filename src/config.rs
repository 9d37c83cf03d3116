use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::branch::Perturbation;
use crate::error::{PackError, Result};

/// Search strategy run after the greedy baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Greedy fill only.
    Greedy,
    /// Best-first branch-and-bound with a transposition table.
    BranchAndBound,
    /// Simulated annealing over perturbed greedy fills.
    #[default]
    Annealing,
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "greedy" => Ok(Strategy::Greedy),
            "bnb" | "branch-and-bound" => Ok(Strategy::BranchAndBound),
            "anneal" | "annealing" => Ok(Strategy::Annealing),
            _ => Err(format!(
                "invalid strategy '{}', expected: greedy, bnb, or anneal",
                s
            )),
        }
    }
}

/// How placed pieces turn into score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyRule {
    /// Every piece counts its full value.
    #[default]
    Ignore,
    /// Non-pole pieces only count when inside some pole's supply square.
    RequirePoleCoverage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub strategy: Strategy,
    pub supply_rule: SupplyRule,
    /// Weight of the optimistic remainder in the branch-and-bound priority, in `[0, 1]`.
    pub bound_weight: f64,
    pub initial_temperature: f64,
    /// Temperature multiplier per annealing step, in `(0, 1)`.
    pub cooling_rate: f64,
    pub protected_size: u32,
    pub max_shift: i32,
    /// Return the best state annealing visited instead of the last accepted one.
    pub keep_best: bool,
    /// Outer-loop iteration budget, 0 = unlimited.
    pub max_iterations: u64,
    /// Wall-clock budget in milliseconds, 0 = unlimited.
    pub time_limit_ms: u64,
    pub progress_interval_ms: u64,
    /// Annealing RNG seed (None = random)
    pub seed: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Annealing,
            supply_rule: SupplyRule::Ignore,
            bound_weight: 0.9,
            initial_temperature: 100_000.0,
            cooling_rate: 0.9995,
            protected_size: 3,
            max_shift: 2,
            keep_best: true,
            max_iterations: 100_000,
            time_limit_ms: 0,
            progress_interval_ms: 100,
            seed: None,
        }
    }
}

impl SolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_supply_rule(mut self, rule: SupplyRule) -> Self {
        self.supply_rule = rule;
        self
    }

    pub fn with_bound_weight(mut self, weight: f64) -> Self {
        self.bound_weight = weight;
        self
    }

    pub fn with_annealing(mut self, initial_temperature: f64, cooling_rate: f64) -> Self {
        self.initial_temperature = initial_temperature;
        self.cooling_rate = cooling_rate;
        self
    }

    pub fn with_keep_best(mut self, keep_best: bool) -> Self {
        self.keep_best = keep_best;
        self
    }

    pub fn with_max_iterations(mut self, iterations: u64) -> Self {
        self.max_iterations = iterations;
        self
    }

    pub fn with_time_limit_ms(mut self, ms: u64) -> Self {
        self.time_limit_ms = ms;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn perturbation(&self) -> Perturbation {
        Perturbation {
            protected_size: self.protected_size,
            max_shift: self.max_shift,
        }
    }

    pub fn time_limit(&self) -> Option<Duration> {
        (self.time_limit_ms > 0).then(|| Duration::from_millis(self.time_limit_ms))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.bound_weight) {
            return Err(PackError::InvalidConfig(format!(
                "bound_weight must be in [0, 1], got {}",
                self.bound_weight
            )));
        }
        if !(self.cooling_rate > 0.0 && self.cooling_rate < 1.0) {
            return Err(PackError::InvalidConfig(format!(
                "cooling_rate must be in (0, 1), got {}",
                self.cooling_rate
            )));
        }
        if !self.initial_temperature.is_finite() || self.initial_temperature <= 1.0 {
            return Err(PackError::InvalidConfig(format!(
                "initial_temperature must be a finite number above 1, got {}",
                self.initial_temperature
            )));
        }
        if self.max_shift < 0 {
            return Err(PackError::InvalidConfig(format!(
                "max_shift must not be negative, got {}",
                self.max_shift
            )));
        }
        Ok(())
    }
}
