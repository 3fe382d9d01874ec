//! Stable integer identifiers for the frozen structural graph.
//!
//! Every entity created by the builder receives a dense index into the
//! corresponding table of [`ProjectGraph`](crate::models::ProjectGraph).
//! Relations between entities (dependencies, allocations, bookings,
//! account links) are stored as ids and resolved through the graph, never
//! as owning pointers.
//!
//! # Critical Invariants
//!
//! 1. Ids are dense: `id.index()` is a valid index into the entity table
//!    of the graph that issued it.
//! 2. Ids are only meaningful for the graph that issued them; they are
//!    never reused across graphs.

use serde::{Deserialize, Serialize};

/// Discrete time index into the project window.
///
/// All derived times are integer multiples of the project slot duration.
/// A half-open interval `[a, b)` covers slots `a..b`; an exclusive end
/// bound may equal the total slot count of the grid.
pub type Slot = usize;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            /// Index into the owning entity table.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier of a task node.
    TaskId
);
entity_id!(
    /// Identifier of a resource node (leaf or group).
    ResourceId
);
entity_id!(
    /// Identifier of a scenario.
    ScenarioId
);
entity_id!(
    /// Identifier of a working-time calendar.
    CalendarId
);
entity_id!(
    /// Identifier of a ledger account node.
    AccountId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_round_trip() {
        let id = TaskId(7);
        assert_eq!(id.index(), 7);
        assert_eq!(format!("{}", id), "TaskId#7");
    }

    #[test]
    fn test_ids_are_ordered() {
        assert!(ResourceId(1) < ResourceId(2));
    }
}
