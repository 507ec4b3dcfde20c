//! Priority queue ordering dirty combiners for baking by visual importance.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::ids::CombinerId;

/// Factors that determine a combiner's bake priority.
#[derive(Clone, Copy, Debug)]
pub struct BakePriority {
    /// Whether any member is inside an observer's view frustum.
    pub visible: bool,
    /// Squared distance from the nearest member to the nearest observer.
    pub distance_squared: f32,
}

impl BakePriority {
    /// Lowest possible priority: invisible and infinitely far away.
    pub const LOWEST: Self = Self {
        visible: false,
        distance_squared: f32::INFINITY,
    };

    /// Combine two priorities, keeping the more urgent factors of each.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            visible: self.visible || other.visible,
            distance_squared: self.distance_squared.min(other.distance_squared),
        }
    }
}

impl PartialEq for BakePriority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BakePriority {}

impl PartialOrd for BakePriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Visible beats invisible; among equals, nearer beats farther.
impl Ord for BakePriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.visible
            .cmp(&other.visible)
            .then_with(|| other.distance_squared.total_cmp(&self.distance_squared))
    }
}

/// Heap entry. Field order is comparison order: priority, then earlier
/// insertion.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    priority: BakePriority,
    order: Reverse<u64>,
    combiner: CombinerId,
}

/// Combiners waiting to bake, most urgent first.
///
/// The scheduler refills it every frame from its dirty set, so each combiner
/// is pushed at most once between clears.
#[derive(Debug, Default)]
pub struct BakeQueue {
    heap: BinaryHeap<Entry>,
    pushed: u64,
}

impl BakeQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, combiner: CombinerId, priority: BakePriority) {
        self.heap.push(Entry {
            priority,
            order: Reverse(self.pushed),
            combiner,
        });
        self.pushed += 1;
    }

    /// Take the most urgent combiner. Equal priorities come out in push order.
    pub fn pop(&mut self) -> Option<CombinerId> {
        self.heap.pop().map(|entry| entry.combiner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.pushed = 0;
    }
}
