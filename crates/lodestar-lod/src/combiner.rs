//! The combiner contract: asynchronous merge groups that bake queued
//! add/update/delete requests and report completions back to the scheduler.

use std::time::Duration;

use lodestar_config::CombinerPrototype;
use tracing::{debug, warn};

use crate::error::PrototypeError;
use crate::ids::{EntityId, MeshHandle, ProxyHandle};

/// Geometry handed to a combiner for one entity level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergeInput {
    /// Entity the geometry belongs to.
    pub entity: EntityId,
    /// Level being merged.
    pub level: usize,
    /// Proxy of that level.
    pub proxy: ProxyHandle,
    /// Mesh bound to the proxy at request time.
    pub mesh: Option<MeshHandle>,
    /// Vertices contributed to the merged output.
    pub vertex_count: u32,
    /// The scene already shows this level; bake it next frame regardless of budget.
    pub urgent: bool,
}

/// What a bake did for one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompletionKind {
    /// The entity's level is now part of the merged output.
    Added,
    /// The entity's merged level was replaced.
    Updated,
    /// The entity is no longer part of the merged output.
    Removed,
    /// The combiner could not honour the request.
    Cancelled,
}

/// A completion reported by [`Combiner::bake`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Completion {
    /// Entity the completion is for.
    pub entity: EntityId,
    /// Outcome.
    pub kind: CompletionKind,
}

/// Result of one bake.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BakeOutcome {
    /// Time the bake took (measured or modelled).
    pub elapsed: Duration,
    /// Completions in the order they were processed.
    pub completions: Vec<Completion>,
}

/// A merge group combining the geometry of many entities.
///
/// Requests are queued and only take effect on [`bake`](Combiner::bake). At
/// most one request per entity is outstanding: a new request or a
/// [`cancel`](Combiner::cancel) replaces the previous one. A cancel issued
/// by the scheduler produces no completion.
pub trait Combiner {
    /// Queue merging an entity level.
    fn request_add(&mut self, input: MergeInput);

    /// Queue replacing an entity's merged level.
    fn request_update(&mut self, input: MergeInput);

    /// Queue dropping an entity from the merged output.
    fn request_delete(&mut self, entity: EntityId, urgent: bool);

    /// Drop any outstanding request for `entity`.
    fn cancel(&mut self, entity: EntityId);

    /// Process outstanding requests.
    fn bake(&mut self) -> BakeOutcome;

    /// Whether any request is outstanding.
    fn is_dirty(&self) -> bool;

    /// Outstanding urgent requests.
    fn num_immediate_bakes_pending(&self) -> usize;

    /// Predicted duration of the next [`bake`](Combiner::bake).
    fn estimate_bake_time(&self) -> Duration;

    /// Release scratch memory held between bakes.
    fn reclaim(&mut self);

    /// Entities currently in the merged output.
    fn member_count(&self) -> usize;
}

/// Factory for combiners, one per prototype instance.
pub trait CombinerBackend {
    /// Create an empty combiner configured from `prototype`.
    fn create_combiner(&mut self, prototype: &CombinerPrototype) -> Box<dyn Combiner>;
}

/// Reject prototypes a combiner cannot be built from.
pub fn validate_prototype(prototype: &CombinerPrototype) -> Result<(), PrototypeError> {
    if !(prototype.time_budget_ms > 0.0) {
        return Err(PrototypeError::NonPositiveTimeBudget(prototype.time_budget_ms));
    }
    if !(prototype.cell_size > 0.0) {
        return Err(PrototypeError::NonPositiveCellSize(prototype.cell_size));
    }
    if prototype.max_vertices == 0 {
        return Err(PrototypeError::ZeroMaxVertices);
    }
    if prototype.materials.is_empty() {
        return Err(PrototypeError::EmptyMaterialSet);
    }
    Ok(())
}

/// What an entity's level-0 renderer looks like to prototype resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeKey {
    /// Material ids of the renderer.
    pub materials: Vec<u32>,
    /// Lightmap index, `-1` for none.
    pub lightmap_index: i32,
    /// Optional label selecting among several matching prototypes.
    pub label: Option<String>,
}

impl MergeKey {
    /// Key for the given materials without a lightmap or label.
    pub fn new(materials: impl Into<Vec<u32>>) -> Self {
        Self {
            materials: materials.into(),
            lightmap_index: -1,
            label: None,
        }
    }

    /// Set the lightmap index.
    #[must_use]
    pub fn with_lightmap(mut self, lightmap_index: i32) -> Self {
        self.lightmap_index = lightmap_index;
        self
    }

    /// Set the disambiguating label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Find the prototype an entity should be combined with.
///
/// `candidates` yields `(index, prototype)` pairs of usable prototypes.
/// A matching label narrows the choice; remaining ambiguity is logged and
/// the first match wins.
pub fn resolve_prototype<'a>(
    candidates: impl IntoIterator<Item = (usize, &'a CombinerPrototype)>,
    key: &MergeKey,
) -> Option<usize> {
    let matches: Vec<(usize, &CombinerPrototype)> = candidates
        .into_iter()
        .filter(|(_, p)| {
            p.lightmap_index == key.lightmap_index && p.matches_materials(&key.materials)
        })
        .collect();

    let labelled: Vec<usize> = match &key.label {
        Some(label) => matches
            .iter()
            .filter(|(_, p)| p.label.as_deref() == Some(label.as_str()))
            .map(|(i, _)| *i)
            .collect(),
        None => Vec::new(),
    };

    let chosen: Vec<usize> = if labelled.is_empty() {
        matches.iter().map(|(i, _)| *i).collect()
    } else {
        labelled
    };

    match chosen.as_slice() {
        [] => {
            debug!(
                "no combiner prototype matches materials {:?} (lightmap {})",
                key.materials, key.lightmap_index
            );
            None
        }
        [only] => Some(*only),
        [first, ..] => {
            warn!(
                "{} combiner prototypes match materials {:?} (lightmap {}); \
                 using prototype {first}. Give the prototypes distinct labels to choose explicitly",
                chosen.len(),
                key.materials,
                key.lightmap_index
            );
            Some(*first)
        }
    }
}
