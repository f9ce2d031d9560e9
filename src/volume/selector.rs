use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

use super::Volume;

/// How a volume is chosen for a new write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    Random,
    #[default]
    RoundRobin,
    RoundRobinExcludingLeastFree,
    MostFree,
    MostFreePercent,
    WeightedFreeRandom,
    WeightedFreePercentRandom,
}

/// Picks a volume from a candidate list according to a [`SelectionStrategy`].
///
/// The rotation counter and the RNG are shared by every caller of one
/// selector and are safe to use concurrently.
pub struct VolumeSelector {
    strategy: SelectionStrategy,
    counter: AtomicUsize,
    rng: Mutex<StdRng>,
}

impl VolumeSelector {
    pub fn new(strategy: SelectionStrategy) -> Self {
        Self {
            strategy,
            counter: AtomicUsize::new(0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// A selector whose randomized strategies replay the same choices.
    pub fn with_seed(strategy: SelectionStrategy, seed: u64) -> Self {
        Self {
            strategy,
            counter: AtomicUsize::new(0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    /// Chooses one of `candidates`. Fails only when the list is empty.
    pub fn select<'a>(&self, candidates: &'a [Volume]) -> Result<&'a Volume> {
        if candidates.is_empty() {
            return Err(Error::NoAvailableVolume);
        }
        let index = match self.strategy {
            SelectionStrategy::Random => self.rng().gen_range(0..candidates.len()),
            SelectionStrategy::RoundRobin => self.next_turn(candidates.len()),
            SelectionStrategy::RoundRobinExcludingLeastFree => {
                self.round_robin_excluding_least_free(candidates)
            }
            SelectionStrategy::MostFree => arg_max(candidates, |v| v.free_bytes() as f64),
            SelectionStrategy::MostFreePercent => arg_max(candidates, Volume::free_fraction),
            SelectionStrategy::WeightedFreeRandom => {
                self.weighted(candidates, |v| v.free_bytes() as f64)
            }
            SelectionStrategy::WeightedFreePercentRandom => {
                self.weighted(candidates, Volume::free_fraction)
            }
        };
        Ok(&candidates[index])
    }

    fn next_turn(&self, len: usize) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % len
    }

    fn round_robin_excluding_least_free(&self, candidates: &[Volume]) -> usize {
        if candidates.len() == 1 {
            return self.next_turn(1);
        }
        let least = arg_min(candidates, |v| v.free_bytes() as f64);
        let turn = self.next_turn(candidates.len() - 1);
        if turn >= least {
            turn + 1
        } else {
            turn
        }
    }

    fn weighted(&self, candidates: &[Volume], weight: impl Fn(&Volume) -> f64) -> usize {
        let weights: Vec<f64> = candidates.iter().map(|v| weight(v).max(0.0)).collect();
        let mut rng = self.rng();
        match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(&mut *rng),
            // All weights zero: every volume is equally full.
            Err(_) => rng.gen_range(0..candidates.len()),
        }
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for VolumeSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeSelector")
            .field("strategy", &self.strategy)
            .field("counter", &self.counter.load(Ordering::Relaxed))
            .finish()
    }
}

/// First index holding the largest key.
fn arg_max(candidates: &[Volume], key: impl Fn(&Volume) -> f64) -> usize {
    let mut best = 0;
    let mut best_key = key(&candidates[0]);
    for (index, volume) in candidates.iter().enumerate().skip(1) {
        let k = key(volume);
        if k > best_key {
            best = index;
            best_key = k;
        }
    }
    best
}

/// First index holding the smallest key.
fn arg_min(candidates: &[Volume], key: impl Fn(&Volume) -> f64) -> usize {
    arg_max(candidates, |v| -key(v))
}
