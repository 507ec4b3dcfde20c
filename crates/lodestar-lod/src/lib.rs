//! Level-of-detail scheduling: screen-size level selection, a transactional
//! per-entity transition state machine, and a frame-budgeted scheduler that
//! drives incremental mesh combiners.

mod combiner;
mod entity;
mod error;
mod frustum;
mod ids;
mod level;
mod memory_combiner;
mod observer;
mod priority_queue;
mod relation;
mod scene;
mod scheduler;
mod swap;

pub use combiner::{
    BakeOutcome, Combiner, CombinerBackend, Completion, CompletionKind, MergeInput, MergeKey,
    resolve_prototype, validate_prototype,
};
pub use entity::{
    CombinerRequest, LodEntity, PendingAction, RequestKind, TransitionPlan, TransitionState,
};
pub use error::{LevelSetError, PrototypeError, ProtocolViolation, SchedulerError};
pub use frustum::{Aabb, Frustum};
pub use ids::{CombinerId, EntityId, MeshHandle, ProxyHandle};
pub use level::{
    LevelDescriptor, LevelGeometry, MAX_SIZE_RATIO, REFERENCE_HALF_SCREEN, compute_switch_distances,
    measure_levels, reference_distance, switch_distance, validate_screen_percentages,
};
pub use memory_combiner::{BakeCostModel, MemoryBackend, MemoryCombiner};
pub use observer::{Observer, ObserverView, Projection};
pub use priority_queue::{BakePriority, BakeQueue};
pub use relation::RelationTable;
pub use scene::{MemoryScene, ProxyKind, SceneAccess};
pub use scheduler::{EntityDesc, FrameReport, LodScheduler, RemovalOutcome};
