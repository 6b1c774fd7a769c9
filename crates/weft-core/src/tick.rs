#![forbid(unsafe_code)]

//! Tick sequence numbers.
//!
//! One tick = one flush of externally batched mutations plus the cascading
//! recomputation it triggers. Asynchronous completions carry the tick they
//! were started in; a completion whose tick no longer matches the node's
//! pending tick is stale and must be discarded (last-write-wins by tick).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Monotonically increasing batch counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tick(pub u64);

impl Tick {
    /// The tick before any flush has run.
    pub const ZERO: Tick = Tick(0);

    /// The next tick in sequence.
    #[must_use]
    pub fn next(self) -> Tick {
        Tick(self.0 + 1)
    }

    /// Ticks elapsed since `earlier` (saturating).
    #[must_use]
    pub fn since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}
