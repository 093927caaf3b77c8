//! Render-side scene model and the [`RenderSurface`] that fills it.
//!
//! The engine runs on its own thread and writes into a [`SceneModel`] behind
//! an `Arc<Mutex<_>>`; the egui thread reads the same model every frame.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use grove_core::{
    error::SurfaceError,
    placement::Placement,
    surface::RenderSurface,
    types::{CycleState, ElementId, ProgressAttribute, ProgressHandle, StateTag},
};

/// A linear interpolation owned by the surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tween {
    pub handle: ProgressHandle,
    pub attribute: ProgressAttribute,
    pub from: f32,
    pub to: f32,
    pub started: Instant,
    pub duration: Duration,
}

impl Tween {
    /// Interpolated value at `now`, clamped to `to` once the tween is over.
    pub fn value_at(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return self.to;
        }
        let t = now.saturating_duration_since(self.started).as_secs_f32()
            / self.duration.as_secs_f32();
        self.from + (self.to - self.from) * t.clamp(0.0, 1.0)
    }

    /// The same tween stopped at its value at `now`.
    fn frozen_at(&self, now: Instant) -> Self {
        let value = self.value_at(now);
        Self {
            from: value,
            to: value,
            duration: Duration::ZERO,
            ..*self
        }
    }
}

/// What the viewer knows about one element.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementView {
    pub visible: bool,
    pub tag: StateTag,
    /// When `tag` last changed; drives reveal fades and the fruit fall.
    pub tag_since: Option<Instant>,
    pub placement: Option<Placement>,
    /// Last progress interpolation started for this element.
    pub tween: Option<Tween>,
    /// Open/closed flag; only the seed receives it.
    pub open: bool,
}

#[derive(Debug, Default)]
pub struct SceneModel {
    elements: BTreeMap<ElementId, ElementView>,
    cycle: CycleState,
    next_handle: u64,
}

impl SceneModel {
    pub fn element(&self, id: ElementId) -> Option<&ElementView> {
        self.elements.get(&id)
    }

    /// Visible leaves in id order.
    pub fn visible_leaves(&self) -> impl Iterator<Item = (usize, &ElementView)> {
        self.elements.iter().filter_map(|(id, view)| match id {
            ElementId::Leaf(n) if view.visible => Some((*n, view)),
            _ => None,
        })
    }

    pub fn cycle(&self) -> CycleState {
        self.cycle
    }

    /// Progress of `attribute` on `id`; `1.0` when nothing was ever started.
    pub fn progress(&self, id: ElementId, now: Instant) -> f32 {
        self.elements
            .get(&id)
            .and_then(|e| e.tween)
            .map_or(1.0, |t| t.value_at(now))
    }

    /// `true` while any tween or timed state still changes over time.
    pub fn is_animating(&self, now: Instant, settle: Duration) -> bool {
        matches!(self.cycle, CycleState::Running { .. })
            || self.elements.values().any(|e| {
                e.tween
                    .is_some_and(|t| now < t.started + t.duration)
                    || e.tag_since.is_some_and(|since| now < since + settle)
            })
    }

    fn entry(&mut self, id: ElementId) -> &mut ElementView {
        self.elements.entry(id).or_default()
    }
}

pub type SharedModel = Arc<Mutex<SceneModel>>;

/// [`RenderSurface`] backed by a [`SharedModel`].
///
/// Each call locks the model once and asks egui for a repaint.
#[derive(Clone)]
pub struct SharedSurface {
    model: SharedModel,
    ctx: Option<egui::Context>,
}

impl SharedSurface {
    pub fn new(model: SharedModel, ctx: Option<egui::Context>) -> Self {
        Self { model, ctx }
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, SceneModel>, SurfaceError> {
        self.model
            .lock()
            .map_err(|_| SurfaceError::new(operation, "scene model lock poisoned"))
    }

    fn repaint(&self) {
        if let Some(ctx) = &self.ctx {
            ctx.request_repaint();
        }
    }
}

impl RenderSurface for SharedSurface {
    fn set_visible(&mut self, id: ElementId, visible: bool) -> Result<(), SurfaceError> {
        self.lock("set_visible")?.entry(id).visible = visible;
        self.repaint();
        Ok(())
    }

    fn set_state(&mut self, id: ElementId, tag: StateTag) -> Result<(), SurfaceError> {
        {
            let mut model = self.lock("set_state")?;
            let view = model.entry(id);
            match tag {
                StateTag::Opened => view.open = true,
                StateTag::Closed => view.open = false,
                _ => {
                    if view.tag != tag {
                        view.tag_since = Some(Instant::now());
                    }
                    view.tag = tag;
                }
            }
        }
        self.repaint();
        Ok(())
    }

    fn apply_placement(
        &mut self,
        id: ElementId,
        placement: &Placement,
    ) -> Result<(), SurfaceError> {
        self.lock("apply_placement")?.entry(id).placement = Some(*placement);
        self.repaint();
        Ok(())
    }

    fn begin_progress(
        &mut self,
        id: ElementId,
        attribute: ProgressAttribute,
        from: f32,
        to: f32,
        duration: Duration,
    ) -> Result<ProgressHandle, SurfaceError> {
        let handle = {
            let mut model = self.lock("begin_progress")?;
            let handle = ProgressHandle(model.next_handle);
            model.next_handle += 1;
            model.entry(id).tween = Some(Tween {
                handle,
                attribute,
                from,
                to,
                started: Instant::now(),
                duration,
            });
            handle
        };
        self.repaint();
        Ok(handle)
    }

    fn cancel_progress(&mut self, handle: ProgressHandle) -> Result<(), SurfaceError> {
        let now = Instant::now();
        let mut model = self.lock("cancel_progress")?;
        let view = model
            .elements
            .values_mut()
            .find(|v| v.tween.is_some_and(|t| t.handle == handle))
            .ok_or_else(|| {
                SurfaceError::new(
                    "cancel_progress",
                    format!("unknown progress handle {}", handle.0),
                )
            })?;
        view.tween = view.tween.map(|t| t.frozen_at(now));
        Ok(())
    }

    fn observe_cycle(&mut self, state: CycleState) {
        if let Ok(mut model) = self.model.lock() {
            model.cycle = state;
        }
        self.repaint();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> (SharedModel, SharedSurface) {
        let model = SharedModel::default();
        let surface = SharedSurface::new(Arc::clone(&model), None);
        (model, surface)
    }

    #[test]
    fn tween_interpolates_and_clamps() {
        let started = Instant::now();
        let tween = Tween {
            handle: ProgressHandle(0),
            attribute: ProgressAttribute::Height,
            from: 0.0,
            to: 1.0,
            started,
            duration: Duration::from_millis(1000),
        };

        assert_eq!(tween.value_at(started), 0.0);
        let half = tween.value_at(started + Duration::from_millis(500));
        assert!((half - 0.5).abs() < 1e-4, "half = {half}");
        assert_eq!(tween.value_at(started + Duration::from_secs(5)), 1.0);
    }

    #[test]
    fn seed_open_flag_does_not_replace_its_state() {
        let (model, mut surface) = surface();
        surface
            .set_state(ElementId::Seed, StateTag::Revealing)
            .unwrap();
        surface.set_state(ElementId::Seed, StateTag::Opened).unwrap();

        let model = model.lock().unwrap();
        let seed = model.element(ElementId::Seed).unwrap();
        assert_eq!(seed.tag, StateTag::Revealing);
        assert!(seed.open);
        assert!(seed.tag_since.is_some());
    }

    #[test]
    fn cancelled_progress_freezes() {
        let (model, mut surface) = surface();
        let handle = surface
            .begin_progress(
                ElementId::Stem,
                ProgressAttribute::Height,
                0.0,
                1.0,
                Duration::from_secs(3600),
            )
            .unwrap();
        surface.cancel_progress(handle).unwrap();

        let model = model.lock().unwrap();
        let tween = model.element(ElementId::Stem).unwrap().tween.unwrap();
        assert!(tween.duration.is_zero());
        assert_eq!(tween.from, tween.to);
        assert!(tween.to < 0.01);
    }

    #[test]
    fn unknown_progress_handle_is_rejected() {
        let (_model, mut surface) = surface();
        let err = surface.cancel_progress(ProgressHandle(7)).unwrap_err();
        assert_eq!(err.operation, "cancel_progress");

        let handle = surface
            .begin_progress(
                ElementId::Stem,
                ProgressAttribute::Height,
                0.0,
                1.0,
                Duration::from_secs(1),
            )
            .unwrap();
        assert!(surface.cancel_progress(ProgressHandle(handle.0 + 1)).is_err());
        // Cancelling twice is fine; the frozen tween keeps its handle.
        surface.cancel_progress(handle).unwrap();
        surface.cancel_progress(handle).unwrap();
    }

    #[test]
    fn visible_leaves_skip_hidden_ones() {
        let (model, mut surface) = surface();
        surface.set_visible(ElementId::Leaf(0), true).unwrap();
        surface.set_visible(ElementId::Leaf(1), false).unwrap();
        surface.set_visible(ElementId::Leaf(2), true).unwrap();

        let model = model.lock().unwrap();
        let leaves: Vec<usize> = model.visible_leaves().map(|(n, _)| n).collect();
        assert_eq!(leaves, [0, 2]);
        assert_eq!(model.progress(ElementId::Stem, Instant::now()), 1.0);
    }

    #[test]
    fn poisoned_model_is_a_surface_error() {
        let (model, mut surface) = surface();
        let poisoner = Arc::clone(&model);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the scene model");
        })
        .join();

        let err = surface.set_visible(ElementId::Bud, true).unwrap_err();
        assert_eq!(err.operation, "set_visible");
    }
}
