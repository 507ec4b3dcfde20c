//! The frame-budgeted LOD scheduler.
//!
//! Each [`tick`](LodScheduler::tick) evaluates entities against the current
//! observers, forwards resulting requests to their combiners, then bakes
//! dirty combiners: first everything that must finish this frame, then the
//! rest in priority order until the frame budget is used up. Combiners that
//! did not fit stay dirty and compete again next frame.

use std::time::Duration;

use glam::IVec3;
use lodestar_config::{CombinerPrototype, SchedulerConfig};
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;
use tracing::{debug, error, info, warn};

use crate::combiner::{
    BakeOutcome, Combiner, CombinerBackend, CompletionKind, MergeInput, MergeKey,
    resolve_prototype, validate_prototype,
};
use crate::entity::{LodEntity, RequestKind, TransitionPlan};
use crate::error::SchedulerError;
use crate::ids::{CombinerId, EntityId};
use crate::level::LevelDescriptor;
use crate::observer::{Observer, ObserverView};
use crate::priority_queue::{BakePriority, BakeQueue};
use crate::relation::RelationTable;
use crate::scene::{ProxyKind, SceneAccess};

/// Everything needed to register an entity.
#[derive(Clone, Debug)]
pub struct EntityDesc {
    /// Levels, highest detail first.
    pub levels: Vec<LevelDescriptor>,
    /// Grouping key for combining; `None` keeps the entity uncombined.
    pub merge_key: Option<MergeKey>,
}

impl EntityDesc {
    /// An entity that is never combined.
    pub fn new(levels: Vec<LevelDescriptor>) -> Self {
        Self {
            levels,
            merge_key: None,
        }
    }

    /// Combine the entity with others sharing `key`.
    #[must_use]
    pub fn with_merge_key(mut self, key: MergeKey) -> Self {
        self.merge_key = Some(key);
        self
    }
}

/// How [`LodScheduler::remove_entity`] handled an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The entity is gone.
    Disposed,
    /// The entity waits for its combiner to drop it and is disposed when
    /// the removal completes.
    Deferred,
}

/// Summary of one [`LodScheduler::tick`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    /// Frame index.
    pub frame: u64,
    /// Entities whose target level was evaluated.
    pub evaluated: usize,
    /// Requests forwarded to combiners.
    pub requests: usize,
    /// Outstanding requests rolled back and cancelled.
    pub cancellations: usize,
    /// Bakes in the immediate pass.
    pub immediate_bakes: usize,
    /// Bakes in the budgeted pass.
    pub budgeted_bakes: usize,
    /// Combiners left dirty at the end of the frame.
    pub deferred_combiners: usize,
    /// Bake time spent in the immediate pass.
    pub immediate_time: Duration,
    /// Bake time spent in the budgeted pass; never exceeds the frame budget
    /// when estimates are exact.
    pub budgeted_time: Duration,
    /// Completions dispatched to entities.
    pub completions: usize,
    /// Whether combiners reclaimed memory this frame.
    pub reclaimed: bool,
    /// Empty combiners released during reclamation.
    pub released_combiners: usize,
    /// Failed integrity checks: after each entity mutation this frame, plus
    /// one per entity still inconsistent at the end of the frame.
    pub integrity_violations: usize,
}

impl FrameReport {
    /// Total bake time of the frame.
    pub fn bake_time(&self) -> Duration {
        self.immediate_time + self.budgeted_time
    }

    /// Total bakes of the frame.
    pub fn bakes(&self) -> usize {
        self.immediate_bakes + self.budgeted_bakes
    }
}

struct CombinerSlot {
    combiner: Box<dyn Combiner>,
    prototype: usize,
    cell: IVec3,
    kind: ProxyKind,
    deferred_frames: u32,
}

/// Owns entities, combiners and the frame loop.
pub struct LodScheduler {
    frame_budget: Duration,
    check_interval: u32,
    reclaim_interval: u32,
    max_deferred_frames: u32,
    integrity_checks: bool,
    fov_y: f32,

    prototypes: Vec<CombinerPrototype>,
    prototype_enabled: Vec<bool>,
    backend: Box<dyn CombinerBackend>,

    entities: SlotMap<EntityId, LodEntity>,
    combiners: SlotMap<CombinerId, CombinerSlot>,
    cells: FxHashMap<(usize, IVec3), CombinerId>,
    relations: RelationTable,
    dirty: FxHashSet<CombinerId>,
    queue: BakeQueue,
    orphans: FxHashSet<EntityId>,

    frame: u64,
    bakes_since_reclaim: u32,
    next_phase: u32,
    shut_down: bool,
}

impl LodScheduler {
    /// Create a scheduler. Invalid prototypes are logged and disabled; a
    /// non-positive frame budget falls back to the default.
    pub fn new(
        config: &SchedulerConfig,
        prototypes: Vec<CombinerPrototype>,
        backend: Box<dyn CombinerBackend>,
    ) -> Self {
        let defaults = SchedulerConfig::default();
        let budget_ms = if config.frame_budget_ms > 0.0 && config.frame_budget_ms.is_finite() {
            config.frame_budget_ms
        } else {
            warn!(
                "Invalid frame budget {} ms, using {} ms",
                config.frame_budget_ms, defaults.frame_budget_ms
            );
            defaults.frame_budget_ms
        };
        let fov_degrees = if config.default_fov_degrees > 0.0 && config.default_fov_degrees < 180.0
        {
            config.default_fov_degrees
        } else {
            warn!(
                "Default field of view {} degrees out of range, using {}",
                config.default_fov_degrees, defaults.default_fov_degrees
            );
            defaults.default_fov_degrees
        };

        let prototype_enabled = prototypes
            .iter()
            .enumerate()
            .map(|(index, prototype)| match validate_prototype(prototype) {
                Ok(()) => true,
                Err(e) => {
                    error!("Combiner prototype {index} disabled: {e}");
                    false
                }
            })
            .collect();

        Self {
            frame_budget: Duration::try_from_secs_f64(budget_ms / 1000.0).unwrap_or(Duration::MAX),
            check_interval: config.check_interval_frames.max(1),
            reclaim_interval: config.reclaim_interval_bakes,
            max_deferred_frames: config.max_deferred_frames,
            integrity_checks: config.integrity_checks,
            fov_y: fov_degrees.to_radians(),
            prototypes,
            prototype_enabled,
            backend,
            entities: SlotMap::with_key(),
            combiners: SlotMap::with_key(),
            cells: FxHashMap::default(),
            relations: RelationTable::new(),
            dirty: FxHashSet::default(),
            queue: BakeQueue::new(),
            orphans: FxHashSet::default(),
            frame: 0,
            bakes_since_reclaim: 0,
            next_phase: 0,
            shut_down: false,
        }
    }

    // --- accessors ---

    /// Ceiling on budgeted bake time per frame.
    pub fn frame_budget(&self) -> Duration {
        self.frame_budget
    }

    /// Field of view switch distances are computed for.
    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    /// Index of the next frame.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// A registered entity.
    pub fn entity(&self, id: EntityId) -> Option<&LodEntity> {
        self.entities.get(id)
    }

    /// Registered entities, including those pending disposal.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Live combiners.
    pub fn combiner_count(&self) -> usize {
        self.combiners.len()
    }

    /// A live combiner.
    pub fn combiner(&self, id: CombinerId) -> Option<&dyn Combiner> {
        self.combiners.get(id).map(|slot| slot.combiner.as_ref())
    }

    /// Combiner an entity is assigned to.
    pub fn combiner_of(&self, entity: EntityId) -> Option<CombinerId> {
        self.relations.combiner_of(entity)
    }

    /// Number of prototype instances of prototype `index`.
    pub fn combiners_for_prototype(&self, index: usize) -> usize {
        self.combiners
            .values()
            .filter(|slot| slot.prototype == index)
            .count()
    }

    /// Whether a combiner has outstanding work.
    pub fn is_dirty(&self, id: CombinerId) -> bool {
        self.combiners
            .get(id)
            .is_some_and(|slot| slot.combiner.is_dirty())
    }

    /// Frames a dirty combiner has waited without baking.
    pub fn deferred_frames(&self, id: CombinerId) -> Option<u32> {
        self.combiners.get(id).map(|slot| slot.deferred_frames)
    }

    /// Force-disposed entities whose combiner removal is still outstanding.
    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    // --- entity lifecycle ---

    /// Register an entity. It starts showing no level; the next tick selects one.
    ///
    /// Invalid level sets are logged and the entity is registered disabled.
    pub fn register_entity(
        &mut self,
        desc: EntityDesc,
        scene: &mut dyn SceneAccess,
    ) -> Result<EntityId, SchedulerError> {
        if self.shut_down {
            return Err(SchedulerError::ShutDown);
        }
        let mut entity = LodEntity::new(desc.levels);
        entity.attach(scene);
        entity.set_integrity_checks(self.integrity_checks);
        entity.set_check_phase(self.next_phase);
        self.next_phase = (self.next_phase + 1) % self.check_interval;
        let valid = match entity.refresh_geometry(self.fov_y, scene) {
            Ok(()) => true,
            Err(e) => {
                error!("Entity disabled, invalid level set: {e}");
                false
            }
        };

        let id = self.entities.insert(entity);
        if valid && let Some(key) = desc.merge_key {
            self.assign_combiner(id, &key, scene);
        }
        Ok(id)
    }

    fn assign_combiner(&mut self, id: EntityId, key: &MergeKey, scene: &dyn SceneAccess) {
        let Some(entity) = self.entities.get(id) else {
            return;
        };
        if !entity.levels().iter().any(|l| l.participates_in_combining) {
            return;
        }
        let Some(bounds) = entity.bounds() else {
            return;
        };
        let candidates = self
            .prototypes
            .iter()
            .enumerate()
            .filter(|(index, _)| self.prototype_enabled[*index]);
        let Some(prototype) = resolve_prototype(candidates, key) else {
            return;
        };
        let kind = scene.kind(entity.levels()[0].proxy);
        let cell = (bounds.center() / self.prototypes[prototype].cell_size)
            .floor()
            .as_ivec3();

        let combiner = match self.cells.get(&(prototype, cell)) {
            Some(&combiner) => combiner,
            None => {
                let instance = self.backend.create_combiner(&self.prototypes[prototype]);
                let combiner = self.combiners.insert(CombinerSlot {
                    combiner: instance,
                    prototype,
                    cell,
                    kind,
                    deferred_frames: 0,
                });
                self.cells.insert((prototype, cell), combiner);
                debug!("Created combiner {combiner:?} for prototype {prototype} cell {cell}");
                combiner
            }
        };
        let group_kind = self.combiners[combiner].kind;
        if group_kind != kind {
            error!(
                "Entity {id:?} renders as {kind:?} but combiner group {combiner:?} \
                 holds {group_kind:?}; leaving it uncombined"
            );
            return;
        }
        self.relations.link(id, combiner);
        if let Some(entity) = self.entities.get_mut(id) {
            entity.set_has_combiner(true);
        }
    }

    /// Remove an entity through its combiner.
    ///
    /// A merged entity is hidden at once, asked to leave its combiner, and
    /// disposed when the removal completes. Anything else is disposed now.
    pub fn remove_entity(
        &mut self,
        id: EntityId,
        scene: &mut dyn SceneAccess,
    ) -> Result<RemovalOutcome, SchedulerError> {
        if self.shut_down {
            return Err(SchedulerError::ShutDown);
        }
        let entity = self
            .entities
            .get_mut(id)
            .ok_or(SchedulerError::UnknownEntity(id))?;
        if entity.is_pending_disposal() {
            return Err(SchedulerError::PendingDisposal(id));
        }

        let cancelled = entity.cancel_pending(scene);
        let mut plan = TransitionPlan {
            cancelled,
            request: None,
        };
        if entity.is_merged() {
            let none = entity.no_level();
            plan.request = entity.request_transition(none, scene).request;
            entity.set_pending_disposal();
            let mut report = FrameReport::default();
            self.apply_plan(id, plan, scene, &mut report);
            debug!("Entity {id:?} removal deferred until its combiner drops it");
            return Ok(RemovalOutcome::Deferred);
        }

        self.apply_plan(id, plan, scene, &mut FrameReport::default());
        if let Some(mut entity) = self.entities.remove(id) {
            entity.dispose(scene);
        }
        self.relations.unlink(id);
        Ok(RemovalOutcome::Disposed)
    }

    /// Dispose an entity without waiting for its combiner.
    ///
    /// Disposing a merged entity this way is a misuse: it is logged, the
    /// combiner is still told to drop the entity, and the id is tracked as
    /// an orphan until that completes.
    pub fn force_dispose(
        &mut self,
        id: EntityId,
        scene: &mut dyn SceneAccess,
    ) -> Result<(), SchedulerError> {
        let mut entity = self
            .entities
            .remove(id)
            .ok_or(SchedulerError::UnknownEntity(id))?;
        let slot = self
            .relations
            .combiner_of(id)
            .and_then(|c| self.combiners.get_mut(c).map(|slot| (c, slot)));

        if entity.is_merged() {
            error!(
                "Entity {id:?} disposed while merged into a combiner; \
                 call remove_entity and let the combiner drop it first"
            );
            if let Some((combiner, slot)) = slot {
                slot.combiner.request_delete(id, true);
                self.dirty.insert(combiner);
            }
            self.orphans.insert(id);
        } else {
            if entity.is_queued()
                && let Some((_, slot)) = slot
            {
                slot.combiner.cancel(id);
            }
            self.relations.unlink(id);
        }
        entity.dispose(scene);
        Ok(())
    }

    /// Pin an entity to a level, or release it with `None`.
    pub fn set_forced_level(
        &mut self,
        id: EntityId,
        level: Option<usize>,
    ) -> Result<(), SchedulerError> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or(SchedulerError::UnknownEntity(id))?;
        if entity.set_forced_level(level) {
            return Ok(());
        }
        let count = entity.levels().len();
        let level = level.unwrap_or(count);
        warn!("Ignoring forced level {level} for entity {id:?} with {count} levels");
        Err(SchedulerError::InvalidForcedLevel { level, count })
    }

    /// Re-measure an entity's levels after its geometry changed.
    pub fn refresh_entity(
        &mut self,
        id: EntityId,
        scene: &dyn SceneAccess,
    ) -> Result<(), SchedulerError> {
        let fov_y = self.fov_y;
        let entity = self
            .entities
            .get_mut(id)
            .ok_or(SchedulerError::UnknownEntity(id))?;
        if let Err(e) = entity.refresh_geometry(fov_y, scene) {
            error!("Entity {id:?} disabled, invalid level set: {e}");
        }
        Ok(())
    }

    /// Dispose every entity and drop every combiner. Later ticks do nothing.
    pub fn shutdown(&mut self, scene: &mut dyn SceneAccess) {
        if self.shut_down {
            return;
        }
        let entities = self.entities.len();
        for (_, mut entity) in self.entities.drain() {
            entity.dispose(scene);
        }
        let combiners = self.combiners.len();
        self.combiners.clear();
        self.cells.clear();
        self.relations = RelationTable::new();
        self.dirty.clear();
        self.queue.clear();
        self.orphans.clear();
        self.shut_down = true;
        info!("LOD scheduler shut down ({entities} entities, {combiners} combiners released)");
    }

    // --- frame loop ---

    /// Run one frame.
    pub fn tick(&mut self, observers: &[Observer], scene: &mut dyn SceneAccess) -> FrameReport {
        let mut report = FrameReport {
            frame: self.frame,
            ..FrameReport::default()
        };
        if self.shut_down {
            return report;
        }
        let view = ObserverView::new(observers);

        if let Some(fov_y) = view.fov_y()
            && (fov_y - self.fov_y).abs() > f32::EPSILON
        {
            self.set_fov(fov_y, scene);
        }

        // Evaluate.
        let mut plans = Vec::new();
        for (id, entity) in &mut self.entities {
            if !entity.due_for_check(self.frame, self.check_interval) {
                continue;
            }
            report.evaluated += 1;
            if let Some(plan) = entity.evaluate(&view, scene) {
                plans.push((id, plan));
            }
        }
        for (id, plan) in plans {
            self.apply_plan(id, plan, scene, &mut report);
        }

        // Collect and prioritize.
        let dirty: Vec<CombinerId> = self
            .dirty
            .drain()
            .filter(|&c| self.combiners.get(c).is_some_and(|s| s.combiner.is_dirty()))
            .collect();
        self.queue.clear();
        for &combiner in &dirty {
            let priority = self.priority_of(combiner, &view);
            self.queue.push(combiner, priority);
        }
        let mut immediate = Vec::new();
        let mut budgeted = Vec::new();
        while let Some(combiner) = self.queue.pop() {
            let Some(slot) = self.combiners.get(combiner) else {
                continue;
            };
            if slot.combiner.num_immediate_bakes_pending() > 0
                || slot.deferred_frames > self.max_deferred_frames
            {
                immediate.push(combiner);
            } else {
                budgeted.push(combiner);
            }
        }

        let mut baked = FxHashSet::default();
        for combiner in immediate {
            if let Some(outcome) = self.bake(combiner) {
                report.immediate_bakes += 1;
                report.immediate_time += outcome.elapsed;
                self.dispatch(outcome, scene, &mut report);
                baked.insert(combiner);
            }
        }

        let mut spent = Duration::ZERO;
        for combiner in budgeted {
            let Some(slot) = self.combiners.get(combiner) else {
                continue;
            };
            if spent + slot.combiner.estimate_bake_time() > self.frame_budget {
                break;
            }
            if let Some(outcome) = self.bake(combiner) {
                report.budgeted_bakes += 1;
                spent += outcome.elapsed;
                self.dispatch(outcome, scene, &mut report);
                baked.insert(combiner);
            }
        }
        report.budgeted_time = spent;

        // Whatever is still dirty waits for a later frame.
        for combiner in dirty {
            let Some(slot) = self.combiners.get_mut(combiner) else {
                continue;
            };
            if baked.contains(&combiner) {
                slot.deferred_frames = 0;
            }
            if slot.combiner.is_dirty() {
                if !baked.contains(&combiner) {
                    slot.deferred_frames += 1;
                }
                report.deferred_combiners += 1;
                self.dirty.insert(combiner);
            }
        }

        let bakes = u32::try_from(report.bakes()).unwrap_or(u32::MAX);
        self.bakes_since_reclaim = self.bakes_since_reclaim.saturating_add(bakes);
        if self.reclaim_interval > 0 && self.bakes_since_reclaim >= self.reclaim_interval {
            report.released_combiners = self.reclaim();
            report.reclaimed = true;
            self.bakes_since_reclaim = 0;
        }

        if self.integrity_checks {
            for (id, entity) in &mut self.entities {
                report.integrity_violations += entity.take_integrity_failures() as usize;
                if let Err(violation) = entity.check_integrity() {
                    error!("Entity {id:?} failed integrity check: {violation}");
                    report.integrity_violations += 1;
                }
            }
        }

        if report.bakes() > 0 || report.requests > 0 {
            debug!(
                "Frame {}: {} evaluated, {} requests, {}+{} bakes in {:?}, {} deferred",
                report.frame,
                report.evaluated,
                report.requests,
                report.immediate_bakes,
                report.budgeted_bakes,
                report.bake_time(),
                report.deferred_combiners
            );
        }
        self.frame += 1;
        report
    }

    fn set_fov(&mut self, fov_y: f32, scene: &dyn SceneAccess) {
        debug!(
            "Field of view changed to {:.1} degrees, recomputing switch distances",
            fov_y.to_degrees()
        );
        self.fov_y = fov_y;
        for (id, entity) in &mut self.entities {
            if let Err(e) = entity.refresh_geometry(fov_y, scene) {
                error!("Entity {id:?} disabled, invalid level set: {e}");
            }
        }
    }

    /// Forward an entity's transition plan to its combiner.
    fn apply_plan(
        &mut self,
        id: EntityId,
        plan: TransitionPlan,
        scene: &dyn SceneAccess,
        report: &mut FrameReport,
    ) {
        if plan.cancelled {
            report.cancellations += 1;
        }
        let Some(combiner) = self.relations.combiner_of(id) else {
            if plan.request.is_some() {
                warn!("Entity {id:?} requested combiner work without a combiner");
            }
            return;
        };
        let Some(slot) = self.combiners.get_mut(combiner) else {
            return;
        };
        if plan.cancelled {
            slot.combiner.cancel(id);
        }
        if let Some(request) = plan.request {
            match (request.kind, request.proxy) {
                (RequestKind::Add | RequestKind::Update, Some(proxy)) => {
                    let input = MergeInput {
                        entity: id,
                        level: request.level,
                        proxy,
                        mesh: scene.mesh(proxy),
                        vertex_count: scene.vertex_count(proxy),
                        urgent: request.urgent,
                    };
                    if request.kind == RequestKind::Add {
                        slot.combiner.request_add(input);
                    } else {
                        slot.combiner.request_update(input);
                    }
                }
                (RequestKind::Delete, _) => slot.combiner.request_delete(id, request.urgent),
                (kind, None) => {
                    error!("Entity {id:?} requested {kind:?} toward no level");
                    return;
                }
            }
            report.requests += 1;
        }
        if slot.combiner.is_dirty() {
            self.dirty.insert(combiner);
        }
    }

    fn priority_of(&self, combiner: CombinerId, view: &ObserverView) -> BakePriority {
        self.relations
            .members(combiner)
            .filter_map(|id| self.entities.get(id))
            .filter_map(LodEntity::bounds)
            .map(|bounds| BakePriority {
                visible: view.is_visible(&bounds),
                distance_squared: view.nearest_distance_squared(&bounds),
            })
            .fold(BakePriority::LOWEST, BakePriority::merge)
    }

    fn bake(&mut self, combiner: CombinerId) -> Option<BakeOutcome> {
        let slot = self.combiners.get_mut(combiner)?;
        Some(slot.combiner.bake())
    }

    /// Deliver completions to their entities.
    fn dispatch(
        &mut self,
        outcome: BakeOutcome,
        scene: &mut dyn SceneAccess,
        report: &mut FrameReport,
    ) {
        let mut follow_ups = Vec::new();
        for completion in outcome.completions {
            report.completions += 1;
            let id = completion.entity;
            let Some(entity) = self.entities.get_mut(id) else {
                if self.orphans.remove(&id) {
                    self.relations.unlink(id);
                    debug!("Orphaned entity {id:?} dropped by its combiner");
                } else {
                    warn!("Completion {:?} for unknown entity {id:?}", completion.kind);
                }
                continue;
            };
            match completion.kind {
                CompletionKind::Added => entity.on_added(scene),
                CompletionKind::Updated => entity.on_updated(scene),
                CompletionKind::Removed => {
                    entity.on_removed(scene);
                    if !entity.has_combiner() {
                        self.relations.unlink(id);
                    }
                }
                CompletionKind::Cancelled => {
                    let wanted = entity.next_level();
                    entity.on_cancelled(scene);
                    // The group cannot hold the wanted level: leave it and
                    // show that level directly. A merged entity has to be
                    // deleted from the group first.
                    if !entity.is_pending_disposal() {
                        entity.set_has_combiner(false);
                        let plan = entity.request_transition(wanted, scene);
                        if entity.is_merged() {
                            debug!("Entity {id:?} refused an update, leaving its combiner");
                            follow_ups.push((id, plan));
                        } else {
                            self.relations.unlink(id);
                            debug!("Entity {id:?} refused by its combiner, now uncombined");
                        }
                        continue;
                    }
                }
            }
            if entity.is_pending_disposal() && !entity.is_queued() {
                if entity.is_merged() {
                    warn!("Combiner refused to drop entity {id:?}; disposing it anyway");
                }
                if let Some(mut entity) = self.entities.remove(id) {
                    entity.dispose(scene);
                }
                self.relations.unlink(id);
            }
        }
        for (id, plan) in follow_ups {
            self.apply_plan(id, plan, &*scene, report);
        }
    }

    /// Release scratch memory and drop empty idle combiners. Returns the
    /// number of combiners dropped.
    fn reclaim(&mut self) -> usize {
        let mut released = Vec::new();
        for (id, slot) in &mut self.combiners {
            slot.combiner.reclaim();
            if slot.combiner.member_count() == 0
                && !slot.combiner.is_dirty()
                && self.relations.member_count(id) == 0
            {
                released.push(id);
            }
        }
        for id in &released {
            if let Some(slot) = self.combiners.remove(*id) {
                self.cells.remove(&(slot.prototype, slot.cell));
            }
            self.dirty.remove(id);
        }
        debug!(
            "Reclaimed combiner memory, released {} empty combiners",
            released.len()
        );
        released.len()
    }
}
