//! Error types for level validation, prototype validation, protocol checks and
//! scheduler operations.
//!
//! None of these abort the frame loop: configuration and protocol errors are
//! logged and the affected entity or combiner is disabled or repaired.

use crate::entity::TransitionState;
use crate::ids::EntityId;

/// A level set that cannot produce switch distances.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LevelSetError {
    /// The entity has no levels at all.
    #[error("entity has no levels")]
    NoLevels,

    /// A screen percentage is zero, negative or not a number.
    #[error("level {index} has non-positive screen percentage {value}")]
    NonPositiveScreenPercentage {
        /// Offending level.
        index: usize,
        /// Its screen percentage.
        value: f32,
    },

    /// Screen percentages must strictly decrease with the level index.
    #[error(
        "screen percentage of level {index} ({value}) is not below the previous level ({previous})"
    )]
    NonDecreasingScreenPercentage {
        /// Offending level.
        index: usize,
        /// Its screen percentage.
        value: f32,
        /// Screen percentage of level `index - 1`.
        previous: f32,
    },

    /// A level's proxy has no bounds or zero characteristic size.
    #[error("level {index} has zero characteristic size")]
    ZeroSize {
        /// Offending level.
        index: usize,
    },

    /// The largest and smallest level sizes differ by more than the allowed ratio.
    #[error("level sizes diverge by {ratio:.2}x (smallest {min}, largest {max})")]
    DivergentSizes {
        /// `max / min`.
        ratio: f32,
        /// Smallest characteristic size.
        min: f32,
        /// Largest characteristic size.
        max: f32,
    },

    /// A level that shares level 0's proxy renders through a different proxy kind.
    #[error("level {index} shares level 0's proxy but its proxy kind differs")]
    SharedProxyKindMismatch {
        /// Offending level.
        index: usize,
    },
}

/// A combiner prototype that cannot be used.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PrototypeError {
    /// Per-group time budget must be positive.
    #[error("non-positive time budget {0} ms")]
    NonPositiveTimeBudget(f32),

    /// Cell size must be positive.
    #[error("non-positive cell size {0}")]
    NonPositiveCellSize(f32),

    /// A merged output must be able to hold at least one vertex.
    #[error("max_vertices is zero")]
    ZeroMaxVertices,

    /// The prototype matches no material.
    #[error("empty material set")]
    EmptyMaterialSet,
}

/// An entity whose state does not satisfy the transition invariants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolViolation {
    /// `(queued, merged, action)` is not one of the legal rows.
    #[error("illegal transition state {0:?}")]
    IllegalState(TransitionState),

    /// A level index lies outside `0..=levels.len()`.
    #[error("{which} level {value} out of range (level count {count})")]
    LevelOutOfRange {
        /// Which index field is broken.
        which: &'static str,
        /// Its value.
        value: usize,
        /// Number of levels.
        count: usize,
    },

    /// An idle entity whose next or shown level differs from its current one.
    #[error("idle entity has {which} level {value} but current level {current}")]
    IdleMismatch {
        /// Which index field is broken.
        which: &'static str,
        /// Its value.
        value: usize,
        /// Current level.
        current: usize,
    },

    /// A completion callback arrived while the entity was in another state.
    #[error("{callback} received in state {state:?}")]
    UnexpectedCallback {
        /// Callback name.
        callback: &'static str,
        /// State at the time of the callback.
        state: TransitionState,
    },
}

/// Errors returned by scheduler operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    /// The scheduler has been shut down; entities are inert.
    #[error("scheduler is shut down")]
    ShutDown,

    /// No entity with this id is registered.
    #[error("unknown entity {0:?}")]
    UnknownEntity(EntityId),

    /// A forced level outside the entity's level range.
    #[error("forced level {level} out of range (entity has {count} levels)")]
    InvalidForcedLevel {
        /// Requested level.
        level: usize,
        /// Number of levels.
        count: usize,
    },

    /// The entity is waiting for its combiner to drop it and accepts no more requests.
    #[error("entity {0:?} is pending disposal")]
    PendingDisposal(EntityId),
}
