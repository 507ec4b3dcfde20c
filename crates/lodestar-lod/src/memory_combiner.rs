//! In-memory [`Combiner`] that tracks merged membership and vertex totals.
//!
//! Bake cost is modelled rather than measured: a fixed overhead per bake plus
//! a cost per touched vertex. This keeps `estimate_bake_time` exact, which
//! the scheduler's budget accounting relies on in tests and the demo.

use std::time::Duration;

use lodestar_config::CombinerPrototype;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::combiner::{
    BakeOutcome, Combiner, CombinerBackend, Completion, CompletionKind, MergeInput,
};
use crate::ids::EntityId;

/// Cost model for [`MemoryCombiner`] bakes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BakeCostModel {
    /// Fixed cost of any non-empty bake.
    pub overhead: Duration,
    /// Cost per vertex written into the merged output.
    pub per_vertex: Duration,
}

impl Default for BakeCostModel {
    fn default() -> Self {
        Self {
            overhead: Duration::from_micros(100),
            per_vertex: Duration::from_nanos(50),
        }
    }
}

impl BakeCostModel {
    fn vertices(&self, count: u32) -> Duration {
        self.per_vertex * count
    }
}

/// Creates [`MemoryCombiner`]s sharing one cost model.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    cost: BakeCostModel,
}

impl MemoryBackend {
    /// Backend whose combiners use `cost`.
    pub fn new(cost: BakeCostModel) -> Self {
        Self { cost }
    }
}

impl CombinerBackend for MemoryBackend {
    fn create_combiner(&mut self, prototype: &CombinerPrototype) -> Box<dyn Combiner> {
        Box::new(MemoryCombiner::new(prototype, self.cost))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Operation {
    Add(MergeInput),
    Update(MergeInput),
    Delete,
}

#[derive(Clone, Copy, Debug)]
struct PendingEntry {
    entity: EntityId,
    operation: Operation,
    urgent: bool,
}

/// A merge group held entirely in memory.
#[derive(Debug)]
pub struct MemoryCombiner {
    max_vertices: u64,
    time_budget: Duration,
    cost: BakeCostModel,
    members: FxHashMap<EntityId, MergeInput>,
    total_vertices: u64,
    pending: Vec<PendingEntry>,
    scratch: Vec<u32>,
    bakes: u64,
}

impl MemoryCombiner {
    /// Empty combiner configured from `prototype`.
    pub fn new(prototype: &CombinerPrototype, cost: BakeCostModel) -> Self {
        let budget_secs = f64::from(prototype.time_budget_ms.max(0.0)) / 1000.0;
        Self {
            max_vertices: u64::from(prototype.max_vertices),
            time_budget: Duration::try_from_secs_f64(budget_secs).unwrap_or(Duration::MAX),
            cost,
            members: FxHashMap::default(),
            total_vertices: 0,
            pending: Vec::new(),
            scratch: Vec::new(),
            bakes: 0,
        }
    }

    /// Vertices in the merged output.
    pub fn total_vertices(&self) -> u64 {
        self.total_vertices
    }

    /// Whether `entity` is part of the merged output.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.members.contains_key(&entity)
    }

    /// Outstanding requests.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Capacity of the scratch buffer kept between bakes.
    pub fn scratch_capacity(&self) -> usize {
        self.scratch.capacity()
    }

    /// Bakes performed so far.
    pub fn bakes(&self) -> u64 {
        self.bakes
    }

    fn enqueue(&mut self, entity: EntityId, operation: Operation, urgent: bool) {
        self.pending.retain(|p| p.entity != entity);
        self.pending.push(PendingEntry {
            entity,
            operation,
            urgent,
        });
    }

    fn entry_vertices(&self, entry: &PendingEntry) -> u32 {
        match entry.operation {
            Operation::Add(input) | Operation::Update(input) => input.vertex_count,
            Operation::Delete => self
                .members
                .get(&entry.entity)
                .map_or(0, |m| m.vertex_count),
        }
    }

    /// Pick the entries the next bake processes, in processing order.
    ///
    /// Urgent entries always go in. Others follow in request order while the
    /// group's time budget allows, and a bake never processes nothing.
    fn plan_batch(&self) -> (Vec<usize>, Duration) {
        if self.pending.is_empty() {
            return (Vec::new(), Duration::ZERO);
        }
        let mut batch = Vec::with_capacity(self.pending.len());
        let mut cost = self.cost.overhead;
        for (index, entry) in self.pending.iter().enumerate() {
            if entry.urgent {
                batch.push(index);
                cost += self.cost.vertices(self.entry_vertices(entry));
            }
        }
        for (index, entry) in self.pending.iter().enumerate() {
            if entry.urgent {
                continue;
            }
            let entry_cost = self.cost.vertices(self.entry_vertices(entry));
            if !batch.is_empty() && cost + entry_cost > self.time_budget {
                break;
            }
            batch.push(index);
            cost += entry_cost;
        }
        (batch, cost)
    }

    fn apply(&mut self, entry: PendingEntry) -> CompletionKind {
        match entry.operation {
            Operation::Add(input) => {
                let previous = self.members.get(&entry.entity).map_or(0, |m| m.vertex_count);
                let total =
                    self.total_vertices - u64::from(previous) + u64::from(input.vertex_count);
                if total > self.max_vertices {
                    debug!(
                        "merged output full ({total} > {} vertices), cancelling add of {:?}",
                        self.max_vertices, entry.entity
                    );
                    return CompletionKind::Cancelled;
                }
                self.total_vertices = total;
                self.members.insert(entry.entity, input);
                CompletionKind::Added
            }
            Operation::Update(input) => {
                let Some(previous) = self.members.get(&entry.entity).map(|m| m.vertex_count) else {
                    debug!("update for non-member {:?}, cancelling", entry.entity);
                    return CompletionKind::Cancelled;
                };
                let total =
                    self.total_vertices - u64::from(previous) + u64::from(input.vertex_count);
                if total > self.max_vertices {
                    debug!(
                        "merged output full ({total} > {} vertices), cancelling update of {:?}",
                        self.max_vertices, entry.entity
                    );
                    return CompletionKind::Cancelled;
                }
                self.total_vertices = total;
                self.members.insert(entry.entity, input);
                CompletionKind::Updated
            }
            Operation::Delete => {
                if let Some(member) = self.members.remove(&entry.entity) {
                    self.total_vertices -= u64::from(member.vertex_count);
                }
                CompletionKind::Removed
            }
        }
    }
}

impl Combiner for MemoryCombiner {
    fn request_add(&mut self, input: MergeInput) {
        self.enqueue(input.entity, Operation::Add(input), input.urgent);
    }

    fn request_update(&mut self, input: MergeInput) {
        self.enqueue(input.entity, Operation::Update(input), input.urgent);
    }

    fn request_delete(&mut self, entity: EntityId, urgent: bool) {
        self.enqueue(entity, Operation::Delete, urgent);
    }

    fn cancel(&mut self, entity: EntityId) {
        self.pending.retain(|p| p.entity != entity);
    }

    fn bake(&mut self) -> BakeOutcome {
        let (batch, elapsed) = self.plan_batch();
        if batch.is_empty() {
            return BakeOutcome::default();
        }

        let mut taken = Vec::with_capacity(batch.len());
        let mut remaining = Vec::with_capacity(self.pending.len() - batch.len());
        let mut in_batch = vec![false; self.pending.len()];
        for &index in &batch {
            in_batch[index] = true;
        }
        for (index, entry) in self.pending.drain(..).enumerate() {
            if in_batch[index] {
                taken.push((index, entry));
            } else {
                remaining.push(entry);
            }
        }
        self.pending = remaining;
        // Process in batch order: urgent entries first.
        taken.sort_by_key(|(index, entry)| (!entry.urgent, *index));

        let touched: usize = taken
            .iter()
            .map(|(_, e)| self.entry_vertices(e) as usize)
            .sum();
        self.scratch.clear();
        self.scratch.resize(touched, 0);

        let completions = taken
            .into_iter()
            .map(|(_, entry)| Completion {
                entity: entry.entity,
                kind: self.apply(entry),
            })
            .collect::<Vec<_>>();

        self.bakes += 1;
        trace!(
            "baked {} requests ({} left), {} members, {} vertices",
            completions.len(),
            self.pending.len(),
            self.members.len(),
            self.total_vertices
        );
        BakeOutcome {
            elapsed,
            completions,
        }
    }

    fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    fn num_immediate_bakes_pending(&self) -> usize {
        self.pending.iter().filter(|p| p.urgent).count()
    }

    fn estimate_bake_time(&self) -> Duration {
        self.plan_batch().1
    }

    fn reclaim(&mut self) {
        self.scratch = Vec::new();
        self.members.shrink_to_fit();
        self.pending.shrink_to_fit();
    }

    fn member_count(&self) -> usize {
        self.members.len()
    }
}
