//! xorshift64* random number generator
//!
//! Fast, high-quality PRNG used by the `random` allocation policy.
//!
//! # Determinism
//!
//! Same seed → same sequence. The allocator never carries RNG state across
//! decisions: each selection builds a generator keyed by
//! `(project seed, task id, slot)`, so results do not depend on the order
//! in which tasks or scenarios are scheduled.

use serde::{Deserialize, Serialize};

use crate::models::ids::{Slot, TaskId};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use project_scheduler_core_rs::rng::SlotRng;
///
/// let mut a = SlotRng::new(12345);
/// let mut b = SlotRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotRng {
    /// Internal state (64-bit)
    state: u64,
}

impl SlotRng {
    /// Create a new RNG with the given seed.
    pub fn new(seed: u64) -> Self {
        // Ensure the state is never zero (xorshift requirement)
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Create an RNG keyed by an allocation decision point.
    ///
    /// The three key components are mixed through splitmix64 so that
    /// adjacent slots and task ids do not produce correlated streams.
    pub fn keyed(project_seed: u64, task: TaskId, slot: Slot) -> Self {
        let mut state = splitmix64(project_seed);
        state = splitmix64(state ^ (task.0 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        state = splitmix64(state ^ (slot as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9));
        Self::new(state)
    }

    /// Generate the next random u64 value.
    pub fn next_u64(&mut self) -> u64 {
        // xorshift64* algorithm
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Pick an index in `[0, n)`.
    ///
    /// # Panics
    /// Panics if `n` is zero.
    pub fn pick(&mut self, n: usize) -> usize {
        assert!(n > 0, "cannot pick from an empty set");
        (self.next_u64() % n as u64) as usize
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
