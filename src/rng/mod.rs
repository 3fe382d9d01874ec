//! Deterministic random number generation
//!
//! Uses the xorshift64* algorithm. CRITICAL: all randomness in the
//! scheduler MUST go through this module; the `random` allocation policy
//! derives its generator from `(project seed, task id, slot)`.

mod xorshift;

pub use xorshift::SlotRng;
