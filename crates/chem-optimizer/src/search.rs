//! Optimizer strategies over a finite candidate pool.

use chem_types::{config_error, ChemResult, ProcessedPoint};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Names accepted by [`optimizer_by_name`].
pub const STRATEGY_NAMES: &[&str] = &["random", "bandit"];

/// Propose/observe contract shared by all strategies.
///
/// Observations may arrive in any order relative to proposals, and points
/// still in flight are never proposed again.
pub trait Optimizer: Send {
    /// Up to `count` new points to evaluate. Fewer (or none) once the
    /// candidate pool runs out.
    fn propose(&mut self, count: usize) -> Vec<ProcessedPoint>;

    /// Feed back a successful evaluation.
    fn observe(&mut self, point: &ProcessedPoint, value: f64);

    /// Feed back a failed evaluation.
    fn observe_failure(&mut self, _point: &ProcessedPoint) {}

    fn name(&self) -> &str;
}

// ---- Random search ----

/// Uniform sampling without replacement.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    candidates: Vec<ProcessedPoint>,
    remaining: Vec<usize>,
    rng: ChaCha8Rng,
}

impl RandomSearch {
    pub fn new(candidates: Vec<ProcessedPoint>, seed: u64) -> Self {
        let remaining = (0..candidates.len()).collect();
        Self {
            candidates,
            remaining,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}

impl Optimizer for RandomSearch {
    fn propose(&mut self, count: usize) -> Vec<ProcessedPoint> {
        let mut batch = Vec::with_capacity(count.min(self.remaining.len()));
        while batch.len() < count && !self.remaining.is_empty() {
            let pick = self.rng.gen_range(0..self.remaining.len());
            let slot = self.remaining.swap_remove(pick);
            batch.push(self.candidates[slot].clone());
        }
        batch
    }

    fn observe(&mut self, _point: &ProcessedPoint, _value: f64) {}

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Bandit search ----

/// Epsilon-greedy explore/exploit over candidate fingerprints.
///
/// With probability `exploration_weight` (and always before the first
/// observation) a random unproposed candidate is drawn. Otherwise the
/// unproposed candidate nearest to the best observed point is picked, lowest
/// pool position first on equal distance.
#[derive(Debug, Clone)]
pub struct BanditSearch {
    candidates: Vec<ProcessedPoint>,
    proposed: Vec<bool>,
    unproposed: usize,
    observations: Vec<(usize, f64)>,
    exploration_weight: f64,
    rng: ChaCha8Rng,
}

impl BanditSearch {
    pub fn new(candidates: Vec<ProcessedPoint>, exploration_weight: f64, seed: u64) -> Self {
        let n = candidates.len();
        Self {
            candidates,
            proposed: vec![false; n],
            unproposed: n,
            observations: Vec::new(),
            exploration_weight,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Slot of the best observation; ties keep the earliest.
    fn best_slot(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for &(slot, value) in &self.observations {
            match best {
                Some((_, v)) if value <= v => {}
                _ => best = Some((slot, value)),
            }
        }
        best.map(|(slot, _)| slot)
    }

    fn explore(&mut self) -> usize {
        let nth = self.rng.gen_range(0..self.unproposed);
        self.proposed
            .iter()
            .enumerate()
            .filter(|(_, taken)| !**taken)
            .nth(nth)
            .map(|(slot, _)| slot)
            .unwrap_or(0)
    }

    fn exploit(&self, anchor: usize) -> Option<usize> {
        let target = &self.candidates[anchor].fingerprint;
        let mut nearest: Option<(usize, f64)> = None;
        for (slot, candidate) in self.candidates.iter().enumerate() {
            if self.proposed[slot] {
                continue;
            }
            let d = candidate.fingerprint.distance(target);
            match nearest {
                Some((_, best)) if d >= best => {}
                _ => nearest = Some((slot, d)),
            }
        }
        nearest.map(|(slot, _)| slot)
    }

    fn slot_of(&self, point: &ProcessedPoint) -> Option<usize> {
        self.candidates.iter().position(|c| c.index == point.index)
    }
}

impl Optimizer for BanditSearch {
    fn propose(&mut self, count: usize) -> Vec<ProcessedPoint> {
        let mut batch = Vec::new();
        while batch.len() < count && self.unproposed > 0 {
            let anchor = self.best_slot();
            let slot = match anchor {
                Some(anchor) if self.rng.gen::<f64>() >= self.exploration_weight => {
                    match self.exploit(anchor) {
                        Some(slot) => slot,
                        None => break,
                    }
                }
                _ => self.explore(),
            };
            self.proposed[slot] = true;
            self.unproposed -= 1;
            batch.push(self.candidates[slot].clone());
        }
        batch
    }

    fn observe(&mut self, point: &ProcessedPoint, value: f64) {
        match self.slot_of(point) {
            Some(slot) => self.observations.push((slot, value)),
            None => tracing::warn!(point = %point, "observation for unknown candidate ignored"),
        }
    }

    fn name(&self) -> &str {
        "bandit"
    }
}

/// Build a configured strategy over `candidates`.
pub fn optimizer_by_name(
    name: &str,
    candidates: Vec<ProcessedPoint>,
    exploration_weight: f64,
    seed: u64,
) -> ChemResult<Box<dyn Optimizer>> {
    match name {
        "random" => Ok(Box::new(RandomSearch::new(candidates, seed))),
        "bandit" => Ok(Box::new(BanditSearch::new(
            candidates,
            exploration_weight,
            seed,
        ))),
        other => Err(config_error!(
            "unknown optimizer strategy '{}', expected one of {:?}",
            other,
            STRATEGY_NAMES
        )),
    }
}
