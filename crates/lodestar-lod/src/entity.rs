//! Per-entity LOD state machine.
//!
//! An entity tracks three level indices:
//! - `current`: the level the scheduler has committed to,
//! - `next`: the level requested from the combiner (equals `current` when idle),
//! - `shown`: the level whose proxy the scene presents right now.
//!
//! `levels.len()` stands for "no level". Transitions toward the combiner are
//! transactional: a new request first rolls back an outstanding one, and the
//! committed state only changes when the combiner reports completion.
//!
//! Legal `(queued, merged, action)` rows at rest:
//!
//! | queued | merged | action |
//! |--------|--------|--------|
//! | false  | false  | None   |
//! | false  | true   | None   |
//! | true   | false  | Add    |
//! | true   | true   | Update |
//! | true   | true   | Delete |

use glam::Vec3;
use tracing::{error, warn};

use crate::error::{LevelSetError, ProtocolViolation};
use crate::frustum::Aabb;
use crate::ids::{MeshHandle, ProxyHandle};
use crate::level::{
    LevelDescriptor, compute_switch_distances, measure_levels, validate_screen_percentages,
};
use crate::observer::ObserverView;
use crate::scene::SceneAccess;
use crate::swap::present;

/// Work an entity has asked its combiner to perform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PendingAction {
    /// Nothing outstanding.
    #[default]
    None,
    /// Merge the entity's next level.
    Add,
    /// Replace the merged level with the next level.
    Update,
    /// Drop the entity from the merged output.
    Delete,
}

/// The `(queued, merged, action)` tuple of an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TransitionState {
    /// A request is outstanding with the combiner.
    pub queued: bool,
    /// The current level's geometry lives in the combiner's merged output.
    pub merged: bool,
    /// The outstanding request.
    pub action: PendingAction,
}

impl TransitionState {
    /// Build a state tuple.
    pub const fn new(queued: bool, merged: bool, action: PendingAction) -> Self {
        Self {
            queued,
            merged,
            action,
        }
    }

    /// Whether this is one of the five legal rows.
    pub fn is_legal(&self) -> bool {
        matches!(
            (self.queued, self.merged, self.action),
            (false, _, PendingAction::None)
                | (true, false, PendingAction::Add)
                | (true, true, PendingAction::Update | PendingAction::Delete)
        )
    }
}

/// Kind of combiner request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    /// Merge a level.
    Add,
    /// Replace the merged level.
    Update,
    /// Remove the entity.
    Delete,
}

/// A request the scheduler forwards to the entity's combiner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CombinerRequest {
    /// What to do.
    pub kind: RequestKind,
    /// Target level (`levels.len()` for deletes toward "no level").
    pub level: usize,
    /// Proxy of the target level, if the target is a real level.
    pub proxy: Option<ProxyHandle>,
    /// The scene already shows the target, so the merged output is stale
    /// until this request is baked.
    pub urgent: bool,
}

/// Outcome of a transition request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransitionPlan {
    /// An outstanding combiner transaction was rolled back and must be cancelled.
    pub cancelled: bool,
    /// A new combiner request to enqueue.
    pub request: Option<CombinerRequest>,
}

/// A spatial entity with several levels of detail.
#[derive(Debug)]
pub struct LodEntity {
    levels: Vec<LevelDescriptor>,
    current: usize,
    next: usize,
    shown: usize,
    state: TransitionState,
    forced_level: Option<usize>,
    has_combiner: bool,
    saved_mesh: Option<MeshHandle>,
    sizes: Vec<f32>,
    bounds: Option<Aabb>,
    disabled: bool,
    pending_disposal: bool,
    force_evaluation: bool,
    check_phase: u32,
    integrity_checks: bool,
    integrity_failures: u32,
}

impl LodEntity {
    /// Create an entity showing no level. Call [`attach`](Self::attach) and
    /// [`refresh_geometry`](Self::refresh_geometry) before evaluating it.
    pub fn new(levels: Vec<LevelDescriptor>) -> Self {
        let none = levels.len();
        Self {
            levels,
            current: none,
            next: none,
            shown: none,
            state: TransitionState::default(),
            forced_level: None,
            has_combiner: false,
            saved_mesh: None,
            sizes: Vec::new(),
            bounds: None,
            disabled: false,
            pending_disposal: false,
            force_evaluation: true,
            check_phase: 0,
            integrity_checks: false,
            integrity_failures: 0,
        }
    }

    /// Hide every level proxy so the scene matches the entity's initial
    /// "no level" state.
    pub fn attach(&mut self, scene: &mut dyn SceneAccess) {
        for level in &self.levels {
            scene.deactivate(level.proxy);
        }
    }

    /// Re-measure level geometry and recompute switch distances for `fov_y`.
    ///
    /// On failure the entity is disabled and keeps whatever it shows.
    pub fn refresh_geometry(
        &mut self,
        fov_y: f32,
        scene: &dyn SceneAccess,
    ) -> Result<(), LevelSetError> {
        let result = validate_screen_percentages(&self.levels)
            .and_then(|()| measure_levels(&self.levels, scene));
        match result {
            Ok(geometry) => {
                compute_switch_distances(&mut self.levels, &geometry.sizes, fov_y);
                self.sizes = geometry.sizes;
                self.bounds = Some(geometry.bounds);
                self.disabled = false;
                self.force_evaluation = true;
                Ok(())
            }
            Err(err) => {
                self.disabled = true;
                Err(err)
            }
        }
    }

    // --- accessors ---

    /// The entity's levels.
    pub fn levels(&self) -> &[LevelDescriptor] {
        &self.levels
    }

    /// Index meaning "no level".
    pub fn no_level(&self) -> usize {
        self.levels.len()
    }

    /// Committed level.
    pub fn current_level(&self) -> usize {
        self.current
    }

    /// Requested level.
    pub fn next_level(&self) -> usize {
        self.next
    }

    /// Level whose proxy the scene presents.
    pub fn shown_level(&self) -> usize {
        self.shown
    }

    /// The `(queued, merged, action)` tuple.
    pub fn state(&self) -> TransitionState {
        self.state
    }

    /// Whether a request is outstanding.
    pub fn is_queued(&self) -> bool {
        self.state.queued
    }

    /// Whether the committed level lives in a combiner's merged output.
    pub fn is_merged(&self) -> bool {
        self.state.merged
    }

    /// Override applied instead of distance selection.
    pub fn forced_level(&self) -> Option<usize> {
        self.forced_level
    }

    /// World bounds covering every level, once geometry was measured.
    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    /// Excluded from evaluation after a configuration error.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Waiting for its combiner to drop it before disposal.
    pub fn is_pending_disposal(&self) -> bool {
        self.pending_disposal
    }

    pub(crate) fn set_pending_disposal(&mut self) {
        self.pending_disposal = true;
    }

    pub(crate) fn has_combiner(&self) -> bool {
        self.has_combiner
    }

    pub(crate) fn set_has_combiner(&mut self, has_combiner: bool) {
        self.has_combiner = has_combiner;
    }

    pub(crate) fn set_check_phase(&mut self, phase: u32) {
        self.check_phase = phase;
    }

    pub(crate) fn set_integrity_checks(&mut self, enabled: bool) {
        self.integrity_checks = enabled;
    }

    /// Whether the throttle lets this entity evaluate on `frame`.
    pub(crate) fn due_for_check(&self, frame: u64, interval: u32) -> bool {
        self.force_evaluation
            || interval <= 1
            || (frame + u64::from(self.check_phase)) % u64::from(interval) == 0
    }

    /// Pin the entity to a level, or release it with `None`.
    ///
    /// Returns `false` (and changes nothing) if `level` is out of range.
    pub fn set_forced_level(&mut self, level: Option<usize>) -> bool {
        if let Some(index) = level
            && index >= self.levels.len()
        {
            return false;
        }
        self.forced_level = level;
        self.force_evaluation = true;
        true
    }

    // --- level selection ---

    /// Pick the level the entity should show for this frame's observers.
    pub fn select_target(&self, view: &ObserverView) -> usize {
        let none = self.levels.len();
        if let Some(forced) = self.forced_level
            && forced < none
        {
            return forced;
        }

        let mut target = self
            .center()
            .and_then(|center| view.nearest_perspective_distance_squared(center))
            .and_then(|d2| {
                self.levels
                    .iter()
                    .position(|l| l.switch_distance_squared() > d2)
            })
            .unwrap_or(none);

        if let Some(&size) = self.sizes.first() {
            for &height in view.orthographic_heights() {
                if height <= 0.0 {
                    continue;
                }
                let percentage = size / height;
                let ortho_target = self
                    .levels
                    .iter()
                    .position(|l| percentage > l.screen_percentage)
                    .unwrap_or(none);
                target = target.min(ortho_target);
            }
        }

        target
    }

    /// Select a target level and start a transition if it differs from the
    /// requested one.
    pub fn evaluate(
        &mut self,
        view: &ObserverView,
        scene: &mut dyn SceneAccess,
    ) -> Option<TransitionPlan> {
        self.force_evaluation = false;
        if self.disabled || self.pending_disposal {
            return None;
        }
        let target = self.select_target(view);
        (target != self.next).then(|| self.request_transition(target, scene))
    }

    fn center(&self) -> Option<Vec3> {
        self.bounds.map(|b| b.center())
    }

    // --- transition protocol ---

    fn eligible(&self, level: usize) -> bool {
        self.has_combiner
            && self
                .levels
                .get(level)
                .is_some_and(|l| l.participates_in_combining)
    }

    /// Present `level`. Callers check integrity once their whole operation
    /// has committed; mid-transition the tuple is legitimately out of step.
    fn swap_to(&mut self, level: usize, scene: &mut dyn SceneAccess) {
        present(&self.levels, self.shown, level, &mut self.saved_mesh, scene);
        self.shown = level;
    }

    /// Undo an outstanding request: restore the committed presentation and
    /// clear the queue. Returns whether anything was outstanding.
    fn roll_back(&mut self, scene: &mut dyn SceneAccess) -> bool {
        if !self.state.queued {
            return false;
        }
        let current = self.current;
        self.swap_to(current, scene);
        self.state.queued = false;
        self.state.action = PendingAction::None;
        self.next = current;
        true
    }

    /// Request a transition to `target` (`levels.len()` = no level).
    ///
    /// Rolls back any outstanding request first; the returned plan tells the
    /// scheduler what to cancel and enqueue on the combiner.
    pub fn request_transition(
        &mut self,
        target: usize,
        scene: &mut dyn SceneAccess,
    ) -> TransitionPlan {
        let none = self.levels.len();
        let target = target.min(none);
        let mut plan = TransitionPlan {
            cancelled: self.roll_back(scene),
            request: None,
        };
        if target == self.current {
            self.after_mutation("request_transition");
            return plan;
        }

        let action = match (self.state.merged, self.eligible(target)) {
            (true, false) => PendingAction::Delete,
            (true, true) => PendingAction::Update,
            (false, true) => PendingAction::Add,
            (false, false) => PendingAction::None,
        };

        let immediate = (action == PendingAction::Add && self.current == none)
            || (action == PendingAction::Delete && target == none);
        if immediate {
            self.swap_to(target, scene);
        }

        self.next = target;
        let kind = match action {
            PendingAction::None => {
                self.current = target;
                self.swap_to(target, scene);
                self.after_mutation("request_transition");
                return plan;
            }
            PendingAction::Add => RequestKind::Add,
            PendingAction::Update => RequestKind::Update,
            PendingAction::Delete => RequestKind::Delete,
        };

        self.state.action = action;
        self.state.queued = true;
        plan.request = Some(CombinerRequest {
            kind,
            level: target,
            proxy: self.levels.get(target).map(|l| l.proxy),
            urgent: immediate,
        });
        self.after_mutation("request_transition");
        plan
    }

    /// Cancel an outstanding request from the entity's side. Returns whether
    /// the combiner must be told to drop its entry.
    pub fn cancel_pending(&mut self, scene: &mut dyn SceneAccess) -> bool {
        let cancelled = self.roll_back(scene);
        self.after_mutation("cancel_pending");
        cancelled
    }

    /// Commit the outstanding request with the combiner's resulting merge
    /// state. A callback arriving in the wrong state is logged and its end
    /// state applied anyway.
    fn complete(
        &mut self,
        callback: &'static str,
        expected: TransitionState,
        merged: bool,
        scene: &mut dyn SceneAccess,
    ) {
        if self.state != expected {
            error!(
                "{}",
                ProtocolViolation::UnexpectedCallback {
                    callback,
                    state: self.state,
                }
            );
        }
        let next = self.next;
        self.swap_to(next, scene);
        self.current = next;
        self.state = TransitionState::new(false, merged, PendingAction::None);
        self.after_mutation(callback);
    }

    /// The combiner merged the next level.
    pub fn on_added(&mut self, scene: &mut dyn SceneAccess) {
        self.complete(
            "on_added",
            TransitionState::new(true, false, PendingAction::Add),
            true,
            scene,
        );
    }

    /// The combiner replaced the merged level with the next level.
    pub fn on_updated(&mut self, scene: &mut dyn SceneAccess) {
        self.complete(
            "on_updated",
            TransitionState::new(true, true, PendingAction::Update),
            true,
            scene,
        );
    }

    /// The combiner dropped the entity from its merged output.
    pub fn on_removed(&mut self, scene: &mut dyn SceneAccess) {
        self.complete(
            "on_removed",
            TransitionState::new(true, true, PendingAction::Delete),
            false,
            scene,
        );
    }

    /// The combiner gave up on the outstanding request. The committed level
    /// and merge state are kept; the presentation returns to the committed level.
    pub fn on_cancelled(&mut self, scene: &mut dyn SceneAccess) {
        if !self.state.queued {
            warn!("on_cancelled received with nothing queued");
        }
        self.roll_back(scene);
        self.after_mutation("on_cancelled");
    }

    /// Hide the entity and restore level 0's mesh. The entity is unusable
    /// afterwards.
    pub fn dispose(&mut self, scene: &mut dyn SceneAccess) {
        let none = self.levels.len();
        self.swap_to(none, scene);
        self.current = none;
        self.next = none;
        self.state = TransitionState::default();
        self.after_mutation("dispose");
    }

    // --- invariants ---

    /// Validate the state tuple and level indices.
    pub fn check_integrity(&self) -> Result<(), ProtocolViolation> {
        if !self.state.is_legal() {
            return Err(ProtocolViolation::IllegalState(self.state));
        }
        let count = self.levels.len();
        for (which, value) in [
            ("current", self.current),
            ("next", self.next),
            ("shown", self.shown),
        ] {
            if value > count {
                return Err(ProtocolViolation::LevelOutOfRange {
                    which,
                    value,
                    count,
                });
            }
        }
        if !self.state.queued {
            for (which, value) in [("next", self.next), ("shown", self.shown)] {
                if value != self.current {
                    return Err(ProtocolViolation::IdleMismatch {
                        which,
                        value,
                        current: self.current,
                    });
                }
            }
        }
        Ok(())
    }

    /// Failed checks since the last call, for the frame report.
    pub(crate) fn take_integrity_failures(&mut self) -> u32 {
        std::mem::take(&mut self.integrity_failures)
    }

    fn after_mutation(&mut self, operation: &str) {
        if !self.integrity_checks {
            return;
        }
        if let Err(violation) = self.check_integrity() {
            error!("integrity check failed after {operation}: {violation}");
            self.integrity_failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Observer;
    use crate::scene::{MemoryScene, ProxyKind};

    const FOV: f32 = std::f32::consts::FRAC_PI_3;

    /// Unit-sized levels at the origin.
    fn unit_levels(scene: &mut MemoryScene, percentages: &[f32]) -> Vec<LevelDescriptor> {
        percentages
            .iter()
            .map(|&pct| {
                let mesh = scene.add_mesh(100);
                let proxy = scene.spawn_proxy(
                    ProxyKind::Static,
                    Aabb::from_center_size(Vec3::ZERO, Vec3::ONE),
                    mesh,
                );
                LevelDescriptor::new(proxy, pct)
            })
            .collect()
    }

    fn entity(scene: &mut MemoryScene, percentages: &[f32], combined: bool) -> LodEntity {
        let levels = unit_levels(scene, percentages);
        measured(scene, levels, combined)
    }

    /// Attach and measure `levels`, with integrity checks on.
    fn measured(
        scene: &mut MemoryScene,
        levels: Vec<LevelDescriptor>,
        combined: bool,
    ) -> LodEntity {
        let mut entity = LodEntity::new(levels);
        entity.attach(scene);
        entity.refresh_geometry(FOV, scene).unwrap();
        entity.set_has_combiner(combined);
        entity.set_integrity_checks(true);
        entity
    }

    fn view_at(distance: f32) -> ObserverView {
        ObserverView::new(&[Observer::perspective(Vec3::new(0.0, 0.0, distance), FOV)])
    }

    /// Drive an entity into the merged state at `level`.
    fn merged_at(scene: &mut MemoryScene, entity: &mut LodEntity, level: usize) {
        let plan = entity.request_transition(level, scene);
        assert_eq!(plan.request.map(|r| r.kind), Some(RequestKind::Add));
        entity.on_added(scene);
        assert_eq!(entity.state(), TransitionState::new(false, true, PendingAction::None));
    }

    #[test]
    fn test_legal_rows() {
        use PendingAction::*;
        let legal = [
            (false, false, None),
            (false, true, None),
            (true, false, Add),
            (true, true, Update),
            (true, true, Delete),
        ];
        for queued in [false, true] {
            for merged in [false, true] {
                for action in [None, Add, Update, Delete] {
                    let state = TransitionState::new(queued, merged, action);
                    assert_eq!(
                        state.is_legal(),
                        legal.contains(&(queued, merged, action)),
                        "{state:?}"
                    );
                }
            }
        }
    }

    /// Queued, not merged, Update is never a legal state.
    #[test]
    fn test_queued_unmerged_update_is_illegal() {
        assert!(!TransitionState::new(true, false, PendingAction::Update).is_legal());
    }

    /// Levels [h=1, 0.5], [h=1, 0.2] at 60 degrees.
    #[test]
    fn test_basic_demotion_selects_by_distance() {
        let mut scene = MemoryScene::new();
        let entity = entity(&mut scene, &[0.5, 0.2], true);
        assert_eq!(entity.select_target(&view_at(0.0)), 0);
        // switch_distance[0] is about 3.46
        assert_eq!(entity.select_target(&view_at(5.0)), 1);
        // switch_distance[1] is about 8.66
        assert_eq!(entity.select_target(&view_at(9.0)), 2);
    }

    #[test]
    fn test_no_perspective_observer_selects_no_level() {
        let mut scene = MemoryScene::new();
        let entity = entity(&mut scene, &[0.5, 0.2], true);
        assert_eq!(entity.select_target(&ObserverView::default()), 2);
    }

    #[test]
    fn test_forced_level_ignores_distance() {
        let mut scene = MemoryScene::new();
        let mut entity = entity(&mut scene, &[0.5, 0.2], true);
        assert!(entity.set_forced_level(Some(1)));
        for distance in [0.0, 5.0, 100.0, 10_000.0] {
            assert_eq!(entity.select_target(&view_at(distance)), 1);
        }
        assert!(!entity.set_forced_level(Some(2)));
        assert_eq!(entity.forced_level(), Some(1));
    }

    /// Orthographic observers only ever raise detail.
    #[test]
    fn test_orthographic_override_takes_minimum() {
        let mut scene = MemoryScene::new();
        let entity = entity(&mut scene, &[0.5, 0.2, 0.1], true);
        // Between switch_distance[1] (8.66) and switch_distance[2] (17.3).
        let perspective = Observer::perspective(Vec3::new(0.0, 0.0, 12.0), FOV);
        assert_eq!(entity.select_target(&ObserverView::new(&[perspective.clone()])), 2);

        // Unit object in a view volume 1 unit high covers 100% of it.
        let ortho = Observer::orthographic(Vec3::new(0.0, 0.0, 50.0), 0.5);
        let view = ObserverView::new(&[perspective.clone(), ortho]);
        assert_eq!(entity.select_target(&view), 0);

        // A huge orthographic volume cannot lower detail below the perspective target.
        let wide = Observer::orthographic(Vec3::new(0.0, 0.0, 50.0), 500.0);
        let view = ObserverView::new(&[perspective, wide]);
        assert_eq!(entity.select_target(&view), 2);
    }

    /// First appearance shows the level at once and queues an urgent Add.
    #[test]
    fn test_first_add_swaps_immediately() {
        let mut scene = MemoryScene::new();
        let mut entity = entity(&mut scene, &[0.5, 0.2], true);
        let plan = entity.evaluate(&view_at(0.0), &mut scene).unwrap();
        let request = plan.request.unwrap();
        assert_eq!(request.kind, RequestKind::Add);
        assert!(request.urgent);
        assert!(!plan.cancelled);
        assert_eq!(entity.state(), TransitionState::new(true, false, PendingAction::Add));
        assert_eq!(entity.shown_level(), 0);
        assert_eq!(entity.current_level(), 2);
        assert!(scene.is_active(entity.levels()[0].proxy));

        entity.on_added(&mut scene);
        assert_eq!(entity.current_level(), 0);
        assert!(entity.is_merged());
        assert!(entity.check_integrity().is_ok());
    }

    /// A merged entity changing level issues a deferred Update.
    #[test]
    fn test_merged_level_change_updates() {
        let mut scene = MemoryScene::new();
        let mut entity = entity(&mut scene, &[0.5, 0.2], true);
        merged_at(&mut scene, &mut entity, 0);

        let plan = entity.request_transition(1, &mut scene);
        let request = plan.request.unwrap();
        assert_eq!(request.kind, RequestKind::Update);
        assert!(!request.urgent);
        // Nothing visible changes until the combiner bakes.
        assert_eq!(entity.shown_level(), 0);
        assert_eq!(entity.state(), TransitionState::new(true, true, PendingAction::Update));

        entity.on_updated(&mut scene);
        assert_eq!(entity.current_level(), 1);
        assert_eq!(entity.shown_level(), 1);
        assert!(scene.is_active(entity.levels()[1].proxy));
        assert!(!scene.is_active(entity.levels()[0].proxy));
    }

    /// Leaving every level while merged deletes and hides at once.
    #[test]
    fn test_merged_to_no_level_deletes_immediately() {
        let mut scene = MemoryScene::new();
        let mut entity = entity(&mut scene, &[0.5, 0.2], true);
        merged_at(&mut scene, &mut entity, 0);

        let request = entity.request_transition(2, &mut scene).request.unwrap();
        assert_eq!(request.kind, RequestKind::Delete);
        assert!(request.urgent);
        assert_eq!(scene.active_count(), 0);

        entity.on_removed(&mut scene);
        assert_eq!(entity.state(), TransitionState::default());
        assert_eq!(entity.current_level(), 2);
    }

    /// A non-participating target level takes the entity out of the combiner.
    #[test]
    fn test_non_participating_target_deletes() {
        let mut scene = MemoryScene::new();
        let mut levels = unit_levels(&mut scene, &[0.5, 0.2]);
        levels[1] = levels[1].clone().with_combining(false);
        let mut entity = measured(&mut scene, levels, true);
        merged_at(&mut scene, &mut entity, 0);

        let request = entity.request_transition(1, &mut scene).request.unwrap();
        assert_eq!(request.kind, RequestKind::Delete);
        assert!(!request.urgent);
        entity.on_removed(&mut scene);
        assert_eq!(entity.current_level(), 1);
        assert!(!entity.is_merged());
        assert!(scene.is_active(entity.levels()[1].proxy));
    }

    /// Without a combiner every transition commits on the spot.
    #[test]
    fn test_uncombined_entity_commits_immediately() {
        let mut scene = MemoryScene::new();
        let mut entity = entity(&mut scene, &[0.5, 0.2], false);
        let plan = entity.evaluate(&view_at(5.0), &mut scene).unwrap();
        assert_eq!(plan, TransitionPlan::default());
        assert_eq!(entity.current_level(), 1);
        assert_eq!(entity.state(), TransitionState::default());
        assert!(scene.is_active(entity.levels()[1].proxy));
        assert!(entity.evaluate(&view_at(5.0), &mut scene).is_none());
    }

    /// Re-requesting the same target before a bake leaves the state unchanged.
    #[test]
    fn test_repeated_request_is_idempotent() {
        let mut scene = MemoryScene::new();
        let mut entity = entity(&mut scene, &[0.5, 0.2], true);
        let first = entity.request_transition(0, &mut scene);
        let state = entity.state();
        let levels = (entity.current_level(), entity.next_level(), entity.shown_level());

        let second = entity.request_transition(0, &mut scene);
        assert!(second.cancelled);
        assert_eq!(second.request, first.request);
        assert_eq!(entity.state(), state);
        assert_eq!(
            (entity.current_level(), entity.next_level(), entity.shown_level()),
            levels
        );
    }

    /// Going back to the committed level while queued only rolls back.
    #[test]
    fn test_request_back_to_current_rolls_back() {
        let mut scene = MemoryScene::new();
        let mut entity = entity(&mut scene, &[0.5, 0.2], true);
        merged_at(&mut scene, &mut entity, 0);
        entity.request_transition(1, &mut scene);

        let plan = entity.request_transition(0, &mut scene);
        assert!(plan.cancelled);
        assert!(plan.request.is_none());
        assert_eq!(entity.state(), TransitionState::new(false, true, PendingAction::None));
        assert_eq!(entity.next_level(), 0);
    }

    /// Rolling back an urgent Add hides the speculatively shown level again.
    #[test]
    fn test_cancel_restores_presentation() {
        let mut scene = MemoryScene::new();
        let mut entity = entity(&mut scene, &[0.5, 0.2], true);
        entity.request_transition(0, &mut scene);
        assert!(scene.is_active(entity.levels()[0].proxy));

        entity.on_cancelled(&mut scene);
        assert_eq!(entity.state(), TransitionState::default());
        assert_eq!(entity.shown_level(), 2);
        assert_eq!(entity.current_level(), 2);
        assert_eq!(scene.active_count(), 0);
    }

    /// A completion with nothing queued still lands in a legal state.
    #[test]
    fn test_stray_callback_is_repaired() {
        let mut scene = MemoryScene::new();
        let mut entity = entity(&mut scene, &[0.5, 0.2], true);
        entity.on_removed(&mut scene);
        assert_eq!(entity.state(), TransitionState::default());
        assert!(entity.check_integrity().is_ok());
    }

    /// A completion for the wrong action still commits the queued level.
    #[test]
    fn test_mismatched_callback_commits() {
        let mut scene = MemoryScene::new();
        let mut entity = entity(&mut scene, &[0.5, 0.2], true);
        entity.request_transition(0, &mut scene);
        entity.on_updated(&mut scene);
        assert_eq!(entity.current_level(), 0);
        assert_eq!(entity.state(), TransitionState::new(false, true, PendingAction::None));
        assert!(entity.check_integrity().is_ok());
    }

    /// Legal flows that swap mid-transition never trip the integrity checks.
    #[test]
    fn test_swaps_inside_transitions_pass_integrity_checks() {
        let mut scene = MemoryScene::new();
        let mut entity = entity(&mut scene, &[0.5, 0.2], true);
        // Urgent first appearance.
        merged_at(&mut scene, &mut entity, 0);
        // Urgent delete toward no level.
        entity.request_transition(2, &mut scene);
        entity.on_removed(&mut scene);
        // Direct commit, then disposal while shown.
        entity.set_has_combiner(false);
        entity.request_transition(1, &mut scene);
        assert_eq!(entity.shown_level(), 1);
        entity.dispose(&mut scene);
        assert_eq!(entity.take_integrity_failures(), 0);
    }

    /// A broken invariant is counted once per failed check.
    #[test]
    fn test_integrity_failures_are_counted() {
        let mut scene = MemoryScene::new();
        let mut entity = entity(&mut scene, &[0.5, 0.2], true);
        entity.shown = 1;
        entity.cancel_pending(&mut scene);
        assert_eq!(entity.take_integrity_failures(), 1);
        assert_eq!(entity.take_integrity_failures(), 0);
    }

    /// Switching into a level sharing level 0's proxy toggles nothing and
    /// switching back restores the original mesh.
    #[test]
    fn test_shared_proxy_level_round_trip() {
        let mut scene = MemoryScene::new();
        let bounds = Aabb::from_center_size(Vec3::ZERO, Vec3::ONE);
        let rig_mesh = scene.add_mesh(5000);
        let low_mesh = scene.add_mesh(900);
        let rig = scene.spawn_proxy(ProxyKind::Skinned, bounds, rig_mesh);
        let low = scene.spawn_proxy(ProxyKind::Skinned, bounds, low_mesh);
        let mut entity = LodEntity::new(vec![
            LevelDescriptor::new(rig, 0.5),
            LevelDescriptor::new(low, 0.2).sharing_level_zero(),
        ]);
        entity.attach(&mut scene);
        entity.refresh_geometry(FOV, &scene).unwrap();
        entity.request_transition(0, &mut scene);
        assert!(scene.is_active(rig));

        let toggles = scene.toggles();
        entity.request_transition(1, &mut scene);
        assert_eq!(scene.toggles(), toggles);
        assert_eq!(scene.mesh(rig), Some(low_mesh));

        entity.request_transition(0, &mut scene);
        assert_eq!(scene.toggles(), toggles);
        assert_eq!(scene.mesh(rig), Some(rig_mesh));
        assert!(scene.is_active(rig));
    }

    #[test]
    fn test_invalid_geometry_disables_entity() {
        let mut scene = MemoryScene::new();
        let mut entity = entity(&mut scene, &[0.5, 0.2], true);
        entity.levels[1].screen_percentage = 0.9;
        assert!(entity.refresh_geometry(FOV, &scene).is_err());
        assert!(entity.is_disabled());
        assert!(entity.evaluate(&view_at(0.0), &mut scene).is_none());
    }

    #[test]
    fn test_check_throttle() {
        let mut scene = MemoryScene::new();
        let mut entity = entity(&mut scene, &[0.5, 0.2], true);
        entity.set_check_phase(1);
        // A fresh entity is always due.
        assert!(entity.due_for_check(0, 4));
        entity.evaluate(&view_at(100.0), &mut scene);
        assert!(!entity.due_for_check(0, 4));
        assert!(entity.due_for_check(3, 4));
        assert!(entity.due_for_check(2, 1));
    }
}
