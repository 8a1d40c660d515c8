use std::{collections::HashSet, fmt, str::FromStr, sync::Mutex};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, Result};

/// Consecutive collisions tolerated by sequential allocation
pub const MAX_SEQUENTIAL_ATTEMPTS: u64 = 1_000_000;
/// Draws tolerated by random allocation
pub const MAX_RANDOM_ATTEMPTS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeidStrategy {
	Sequential,
	Random,
}

impl FromStr for SeidStrategy {
	type Err = ReplayError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"sequential" => Ok(SeidStrategy::Sequential),
			"random" => Ok(SeidStrategy::Random),
			other => Err(ReplayError::Config(format!(
				"unknown SEID strategy {:?} (expected sequential or random)",
				other
			))),
		}
	}
}

impl fmt::Display for SeidStrategy {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			SeidStrategy::Sequential => write!(f, "sequential"),
			SeidStrategy::Random => write!(f, "random"),
		}
	}
}

#[derive(Debug)]
struct SeidPool {
	counter: u64,
	/// Released sequential ids, reused before the counter advances
	freed: Vec<u64>,
	allocated: HashSet<u64>,
	rng: StdRng,
}

/// Issues local SEIDs. 0 is reserved and never issued.
#[derive(Debug)]
pub struct SeidAllocator {
	strategy: SeidStrategy,
	pool: Mutex<SeidPool>,
}

impl SeidAllocator {
	pub fn new(strategy: SeidStrategy, start: u64) -> SeidAllocator {
		Self::with_rng(strategy, start, StdRng::from_entropy())
	}

	pub fn with_rng(strategy: SeidStrategy, start: u64, rng: StdRng) -> SeidAllocator {
		SeidAllocator {
			strategy,
			pool: Mutex::new(SeidPool {
				counter: start.max(1),
				freed: Vec::new(),
				allocated: HashSet::new(),
				rng,
			}),
		}
	}

	pub fn strategy(&self) -> SeidStrategy {
		self.strategy
	}

	pub fn allocate(&self) -> Result<u64> {
		let mut pool = self.pool.lock().unwrap_or_else(|e| e.into_inner());
		match self.strategy {
			SeidStrategy::Sequential => {
				while let Some(id) = pool.freed.pop() {
					if pool.allocated.insert(id) {
						return Ok(id);
					}
				}
				for _ in 0..MAX_SEQUENTIAL_ATTEMPTS {
					let id = pool.counter;
					pool.counter = pool.counter.wrapping_add(1);
					if id == 0 {
						continue;
					}
					if pool.allocated.insert(id) {
						return Ok(id);
					}
				}
				Err(ReplayError::AllocationExhausted {
					attempts: MAX_SEQUENTIAL_ATTEMPTS,
				})
			}
			SeidStrategy::Random => {
				for _ in 0..MAX_RANDOM_ATTEMPTS {
					let id: u64 = pool.rng.gen();
					if id == 0 {
						continue;
					}
					if pool.allocated.insert(id) {
						return Ok(id);
					}
				}
				Err(ReplayError::AllocationExhausted {
					attempts: MAX_RANDOM_ATTEMPTS,
				})
			}
		}
	}

	/// Releasing an id that is not held is a no-op
	pub fn release(&self, id: u64) {
		let mut pool = self.pool.lock().unwrap_or_else(|e| e.into_inner());
		if pool.allocated.remove(&id) && self.strategy == SeidStrategy::Sequential {
			pool.freed.push(id);
		}
	}

	pub fn is_allocated(&self, id: u64) -> bool {
		self.pool.lock().unwrap_or_else(|e| e.into_inner()).allocated.contains(&id)
	}

	pub fn allocated_count(&self) -> usize {
		self.pool.lock().unwrap_or_else(|e| e.into_inner()).allocated.len()
	}
}
