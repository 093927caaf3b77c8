//! Interactive growth animation viewer built with eframe/egui.
//!
//! [`Viewer`] owns the [`EngineHost`] and paints the shared [`SceneModel`]
//! every frame. World space has the ground at `y = 0` with y pointing up;
//! the seed sits at the origin and the stem grows up to the crown center.

use std::{
    f32::consts::PI,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use eframe::App;
use glam::Vec2;
use grove_core::{
    Bounds, EngineConfig,
    types::{CycleState, ElementId, StateTag},
};

use crate::{
    host::{EngineHost, HostCommand},
    surface::{ElementView, SceneModel, SharedModel, SharedSurface},
};

/// Fade-in time of a revealed element.
const REVEAL_FADE: Duration = Duration::from_millis(350);

const BARK: egui::Color32 = egui::Color32::from_rgb(120, 84, 52);
const LEAF: egui::Color32 = egui::Color32::from_rgb(88, 170, 84);
const BUD: egui::Color32 = egui::Color32::from_rgb(170, 210, 110);
const FRUIT: egui::Color32 = egui::Color32::from_rgb(214, 64, 52);
const SEED: egui::Color32 = egui::Color32::from_rgb(160, 112, 64);
const GROUND: egui::Color32 = egui::Color32::from_rgb(90, 72, 56);

/// World-to-screen mapping of the central panel.
///
/// ### Fields
/// - `zoom` - Pixels per world unit.
/// - `pan` - Screen-space offset in pixels, applied after scaling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub zoom: f32,
    pub pan: egui::Vec2,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: egui::Vec2::ZERO,
        }
    }
}

impl Camera {
    /// Converts a world-space position to screen-space, flipping y so that
    /// positive y goes up.
    pub fn world_to_screen(&self, p: Vec2, rect: egui::Rect) -> egui::Pos2 {
        let center = rect.center();
        egui::pos2(
            center.x + p.x * self.zoom + self.pan.x,
            center.y - p.y * self.zoom + self.pan.y,
        )
    }

    /// Inverse of [`Camera::world_to_screen`] up to rounding.
    pub fn screen_to_world(&self, p: egui::Pos2, rect: egui::Rect) -> Vec2 {
        let center = rect.center();
        let x = (p.x - center.x - self.pan.x) / self.zoom;
        let y = (center.y - p.y + self.pan.y) / self.zoom;
        Vec2::new(x, y)
    }

    /// Puts the ground line at 90% of the panel height.
    fn anchor_ground(&mut self, rect: egui::Rect) {
        self.pan = egui::vec2(0.0, rect.height() * 0.4);
    }
}

/// Crown bounds that fit a canvas of `size` pixels at `zoom`.
///
/// The crown takes half of the visible width and a third of the visible
/// height, centered horizontally and a little above mid-height.
pub fn bounds_for_canvas(size: egui::Vec2, zoom: f32) -> Bounds {
    let world = Vec2::new(size.x, size.y) / zoom.max(f32::EPSILON);
    Bounds {
        width: (world.x * 0.5).max(40.0),
        height: (world.y * 0.3).max(30.0),
        center: Vec2::new(0.0, world.y * 0.55),
    }
}

/// Main application state.
///
/// ### Fields
/// - `model` - Scene written by the engine thread.
/// - `host` - The engine thread; dropped with the viewer.
/// - `config` - Engine configuration, also used for animation lengths.
/// - `camera` - World-to-screen mapping.
/// - `bounds` - Crown bounds last sent to the engine.
/// - `last_canvas` - Canvas size and zoom the bounds were computed for.
pub struct Viewer {
    model: SharedModel,
    host: Option<EngineHost>,
    config: EngineConfig,
    camera: Camera,
    bounds: Bounds,
    last_canvas: Option<(egui::Vec2, f32)>,
}

impl Viewer {
    /// Creates the viewer and starts the engine thread.
    pub fn new(ctx: egui::Context, config: EngineConfig) -> anyhow::Result<Self> {
        let model = SharedModel::new(Mutex::new(SceneModel::default()));
        let surface = SharedSurface::new(Arc::clone(&model), Some(ctx));
        let bounds = config.bounds;
        let host = EngineHost::spawn(config.clone(), surface)?;
        Ok(Self::with_host(model, Some(host), config, bounds))
    }

    fn with_host(
        model: SharedModel,
        host: Option<EngineHost>,
        config: EngineConfig,
        bounds: Bounds,
    ) -> Self {
        Self {
            model,
            host,
            config,
            camera: Camera::default(),
            bounds,
            last_canvas: None,
        }
    }

    fn send(&self, command: HostCommand) {
        if let Some(host) = &self.host {
            host.send(command);
        }
    }

    /// Recomputes the crown bounds when the canvas size or zoom changed.
    ///
    /// Returns the new bounds if the engine has to be told.
    fn track_canvas(&mut self, size: egui::Vec2) -> Option<Bounds> {
        let changed = match self.last_canvas {
            Some((last, zoom)) => {
                (last - size).length() > 1.0 || (zoom - self.camera.zoom).abs() > f32::EPSILON
            }
            None => true,
        };
        if !changed || size.x <= 0.0 || size.y <= 0.0 {
            return None;
        }
        self.last_canvas = Some((size, self.camera.zoom));
        self.bounds = bounds_for_canvas(size, self.camera.zoom);
        Some(self.bounds)
    }

    fn status_text(&self, cycle: CycleState) -> String {
        match cycle {
            CycleState::Idle => "idle".to_owned(),
            CycleState::Running { cycle_index } => {
                format!("cycle {} / {}", cycle_index + 1, self.config.max_cycles)
            }
            CycleState::Terminal => format!("finished {} cycles", self.config.max_cycles),
        }
    }

    /// Builds the top panel UI (restart, zoom, cycle state).
    fn ui_top_panel(&mut self, ctx: &egui::Context, cycle: CycleState) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("⟲ Restart").clicked() {
                    self.send(HostCommand::Restart);
                }
                ui.separator();
                ui.add(egui::Slider::new(&mut self.camera.zoom, 0.5..=3.0).text("Zoom"));
                ui.separator();
                ui.label(self.status_text(cycle));
            });
        });
    }

    /// Builds the bottom status bar (leaf count, crown bounds).
    fn ui_status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format!(
                    "crown = {:.0} × {:.0}",
                    self.bounds.width, self.bounds.height
                ));
                ui.separator();
                ui.label(format!("leaves = {}", self.config.leaf_count));
            });
        });
    }

    /// Builds the central panel and paints the scene.
    fn ui_central_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let (rect, _response) =
                ui.allocate_exact_size(ui.available_size(), egui::Sense::hover());
            let painter = ui.painter_at(rect);
            self.camera.anchor_ground(rect);

            if let Some(bounds) = self.track_canvas(rect.size()) {
                self.send(HostCommand::Resize(bounds));
            }

            let now = Instant::now();
            let model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
            ScenePainter {
                painter: &painter,
                rect,
                camera: self.camera,
                bounds: self.bounds,
                fall: self.config.timings.fall(),
                now,
            }
            .scene(&model);

            if model.is_animating(now, self.config.timings.fall().max(REVEAL_FADE)) {
                ctx.request_repaint();
            }
        });
    }
}

impl App for Viewer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let cycle = self
            .model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cycle();
        self.ui_top_panel(ctx, cycle);
        self.ui_status_bar(ctx);
        self.ui_central_panel(ctx);
    }
}

/// One frame worth of scene painting.
struct ScenePainter<'a> {
    painter: &'a egui::Painter,
    rect: egui::Rect,
    camera: Camera,
    bounds: Bounds,
    fall: Duration,
    now: Instant,
}

impl ScenePainter<'_> {
    fn to_screen(&self, p: Vec2) -> egui::Pos2 {
        self.camera.world_to_screen(p, self.rect)
    }

    fn px(&self, world: f32) -> f32 {
        world * self.camera.zoom
    }

    /// Opacity of an element, fading in while it is revealing.
    fn alpha(&self, view: &ElementView) -> f32 {
        match (view.tag, view.tag_since) {
            (StateTag::Revealing, Some(since)) => {
                let t = self.now.saturating_duration_since(since).as_secs_f32();
                (t / REVEAL_FADE.as_secs_f32()).clamp(0.0, 1.0)
            }
            _ => 1.0,
        }
    }

    fn shown<'m>(&self, model: &'m SceneModel, id: ElementId) -> Option<(&'m ElementView, f32)> {
        let view = model.element(id).filter(|v| v.visible)?;
        Some((view, self.alpha(view)))
    }

    fn fork(&self) -> Vec2 {
        self.bounds.center
    }

    fn crown_top(&self) -> Vec2 {
        self.bounds.center + Vec2::new(0.0, self.bounds.half_height() * 0.95)
    }

    fn scene(&self, model: &SceneModel) {
        self.ground();
        self.stem(model);
        self.branches(model);
        self.leaves(model);
        self.seed(model);
        self.bud(model);
        self.fruit(model);
        self.ground_marker(model);
    }

    fn ground(&self) {
        let left = self.camera.screen_to_world(self.rect.left_center(), self.rect).x;
        let right = self.camera.screen_to_world(self.rect.right_center(), self.rect).x;
        self.painter.line_segment(
            [
                self.to_screen(Vec2::new(left, 0.0)),
                self.to_screen(Vec2::new(right, 0.0)),
            ],
            egui::Stroke::new(2.0, GROUND),
        );
    }

    fn stem(&self, model: &SceneModel) {
        let Some((_, alpha)) = self.shown(model, ElementId::Stem) else {
            return;
        };
        let grown = model.progress(ElementId::Stem, self.now);
        let top = self.crown_top();
        self.painter.line_segment(
            [self.to_screen(Vec2::ZERO), self.to_screen(top * grown)],
            egui::Stroke::new(self.px(5.0).max(2.0), BARK.gamma_multiply(alpha)),
        );
    }

    fn branches(&self, model: &SceneModel) {
        let reach = Vec2::new(self.bounds.half_width() * 0.55, self.bounds.half_height() * 0.45);
        for (id, sign) in [(ElementId::BranchLeft, -1.0), (ElementId::BranchRight, 1.0)] {
            let Some((_, alpha)) = self.shown(model, id) else {
                continue;
            };
            let tip = self.fork() + Vec2::new(sign * reach.x, reach.y);
            self.painter.line_segment(
                [self.to_screen(self.fork()), self.to_screen(tip)],
                egui::Stroke::new(self.px(3.0).max(1.5), BARK.gamma_multiply(alpha)),
            );
        }
    }

    fn leaves(&self, model: &SceneModel) {
        for (_, view) in model.visible_leaves() {
            let Some(placement) = view.placement else {
                continue;
            };
            let alpha = self.alpha(view);
            let (sin, cos) = placement.rotation.to_radians().sin_cos();
            let points: Vec<egui::Pos2> = leaf_outline()
                .map(|local| {
                    let scaled = local * Vec2::new(placement.scale_x, placement.scale_y);
                    let rotated =
                        Vec2::new(scaled.x * cos - scaled.y * sin, scaled.x * sin + scaled.y * cos);
                    self.to_screen(placement.position + rotated)
                })
                .collect();
            self.painter.add(egui::Shape::convex_polygon(
                points,
                LEAF.gamma_multiply(alpha),
                egui::Stroke::NONE,
            ));
        }
    }

    fn seed(&self, model: &SceneModel) {
        let Some((view, alpha)) = self.shown(model, ElementId::Seed) else {
            return;
        };
        let r = self.px(9.0).max(3.0);
        let color = SEED.gamma_multiply(alpha);
        if view.open {
            let gap = self.px(7.0);
            let base = self.to_screen(Vec2::ZERO);
            self.painter
                .circle_filled(base - egui::vec2(gap, 0.0), r * 0.8, color);
            self.painter
                .circle_filled(base + egui::vec2(gap, 0.0), r * 0.8, color);
        } else {
            self.painter.circle_filled(self.to_screen(Vec2::ZERO), r, color);
        }
    }

    fn bud(&self, model: &SceneModel) {
        if let Some((_, alpha)) = self.shown(model, ElementId::Bud) {
            self.painter.circle_filled(
                self.to_screen(self.crown_top()),
                self.px(6.0).max(2.0),
                BUD.gamma_multiply(alpha),
            );
        }
    }

    fn fruit(&self, model: &SceneModel) {
        let Some((view, alpha)) = self.shown(model, ElementId::Fruit) else {
            return;
        };
        let start = self.crown_top();
        let position = match (view.tag, view.tag_since) {
            (StateTag::Falling, Some(since)) => {
                let t = fall_fraction(self.now.saturating_duration_since(since), self.fall);
                Vec2::new(start.x, start.y * (1.0 - t))
            }
            _ => start,
        };
        self.painter.circle_filled(
            self.to_screen(position),
            self.px(9.0).max(3.0),
            FRUIT.gamma_multiply(alpha),
        );
    }

    fn ground_marker(&self, model: &SceneModel) {
        let Some((_, alpha)) = self.shown(model, ElementId::GroundMarker) else {
            return;
        };
        let x = self.crown_top().x;
        let half = self.px(12.0);
        let base = self.to_screen(Vec2::new(x, 0.0));
        self.painter.line_segment(
            [base - egui::vec2(half, 0.0), base + egui::vec2(half, 0.0)],
            egui::Stroke::new(self.px(4.0).max(2.0), FRUIT.gamma_multiply(alpha * 0.7)),
        );
    }
}

/// Eased fall progress: slow at the top, fastest at the ground.
fn fall_fraction(elapsed: Duration, fall: Duration) -> f32 {
    if fall.is_zero() {
        return 1.0;
    }
    let t = (elapsed.as_secs_f32() / fall.as_secs_f32()).clamp(0.0, 1.0);
    t * t
}

/// Leaf outline in local coordinates, stem at the origin pointing right.
fn leaf_outline() -> impl Iterator<Item = Vec2> {
    const SEGMENTS: usize = 12;
    const LENGTH: f32 = 22.0;
    const WIDTH: f32 = 5.0;
    (0..SEGMENTS).map(|i| {
        let a = i as f32 / SEGMENTS as f32 * 2.0 * PI;
        let x = (1.0 - a.cos()) * 0.5 * LENGTH;
        Vec2::new(x, a.sin() * WIDTH)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rect() -> egui::Rect {
        egui::Rect::from_min_size(egui::Pos2::new(0.0, 0.0), egui::vec2(800.0, 600.0))
    }

    fn offline_viewer() -> Viewer {
        let config = EngineConfig::default();
        let bounds = config.bounds;
        Viewer::with_host(SharedModel::default(), None, config, bounds)
    }

    #[test]
    fn world_to_screen_and_back_is_roundtrip() {
        let camera = Camera {
            zoom: 2.0,
            pan: egui::vec2(15.0, -7.0),
        };
        let rect = test_rect();

        for p in [
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, -5.0),
            Vec2::new(-3.5, 8.25),
        ] {
            let back = camera.screen_to_world(camera.world_to_screen(p, rect), rect);
            assert!(
                (back - p).length() < 1e-5,
                "roundtrip mismatch: p={p:?}, back={back:?}"
            );
        }
    }

    #[test]
    fn ground_is_anchored_near_the_bottom() {
        let mut camera = Camera::default();
        let rect = test_rect();
        camera.anchor_ground(rect);

        let ground = camera.world_to_screen(Vec2::ZERO, rect);
        assert!((ground.y - 540.0).abs() < 1e-3);
    }

    #[test]
    fn canvas_bounds_fit_above_the_ground() {
        let bounds = bounds_for_canvas(egui::vec2(800.0, 600.0), 2.0);

        assert!((bounds.width - 200.0).abs() < 1e-3);
        assert!((bounds.height - 90.0).abs() < 1e-3);
        assert!(bounds.validate().is_ok());
        // Crown top stays inside the 270 world units visible above ground.
        assert!(bounds.center.y + bounds.half_height() < 270.0);
    }

    #[test]
    fn tiny_canvas_still_yields_valid_bounds() {
        let bounds = bounds_for_canvas(egui::vec2(1.0, 1.0), 3.0);
        assert!(bounds.validate().is_ok());
    }

    #[test]
    fn resize_is_sent_only_when_the_canvas_changes() {
        let mut viewer = offline_viewer();
        let size = egui::vec2(800.0, 600.0);

        assert!(viewer.track_canvas(size).is_some());
        assert!(viewer.track_canvas(size).is_none());
        assert!(viewer.track_canvas(size + egui::vec2(0.5, 0.0)).is_none());
        assert!(viewer.track_canvas(egui::vec2(640.0, 480.0)).is_some());

        viewer.camera.zoom = 2.0;
        assert_eq!(
            viewer.track_canvas(egui::vec2(640.0, 480.0)),
            Some(bounds_for_canvas(egui::vec2(640.0, 480.0), 2.0))
        );
        assert!(viewer.track_canvas(egui::vec2(0.0, 480.0)).is_none());
    }

    #[test]
    fn status_reports_cycle_progress() {
        let viewer = offline_viewer();
        assert_eq!(viewer.status_text(CycleState::Idle), "idle");
        assert_eq!(
            viewer.status_text(CycleState::Running { cycle_index: 0 }),
            "cycle 1 / 2"
        );
        assert_eq!(viewer.status_text(CycleState::Terminal), "finished 2 cycles");
    }

    #[test]
    fn fruit_fall_accelerates_to_the_ground() {
        let fall = Duration::from_millis(1000);
        assert_eq!(fall_fraction(Duration::ZERO, fall), 0.0);
        assert!(fall_fraction(Duration::from_millis(500), fall) < 0.5);
        assert_eq!(fall_fraction(Duration::from_secs(2), fall), 1.0);
        assert_eq!(fall_fraction(Duration::from_secs(2), Duration::ZERO), 1.0);
    }

    #[test]
    fn leaf_outline_starts_at_the_stem() {
        let outline: Vec<Vec2> = leaf_outline().collect();
        assert_eq!(outline[0], Vec2::ZERO);
        assert!(outline.iter().all(|p| p.x >= 0.0 && p.x <= 22.0));
    }
}
