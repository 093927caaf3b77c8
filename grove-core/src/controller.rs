//! Cycle controller: runs the stage plan a fixed number of times.
//!
//! [`Engine`] owns the scene, the leaf placements and the cycle state. It is a
//! cheap, single-threaded handle (`Rc` inside): clones share the same engine,
//! which is how a host can call [`Engine::restart`] while a run started by
//! [`Engine::start`] is suspended on another branch of the same task.
//!
//! State machine:
//!
//! ```text
//! Idle -> Running(0) -> (reset) -> Running(1) -> ... -> Terminal
//!   ^                                                      |
//!   +------------- restart / error / cancel ---------------+
//! ```

use std::{
    cell::{Cell, Ref, RefCell},
    future::Future,
    rc::Rc,
};

use rand::{SeedableRng, rngs::StdRng};
use tracing::{debug, info, warn};

use crate::{
    config::{Bounds, EngineConfig},
    error::{EngineError, Result},
    placement::{self, Placement},
    registry::SceneRegistry,
    scene::Scene,
    surface::RenderSurface,
    timeline::{self, Epoch, RunOutcome, StagePlan},
    types::{CycleState, ElementId},
};

struct Inner<S> {
    config: EngineConfig,
    scene: RefCell<Scene<S>>,
    rng: RefCell<StdRng>,
    placements: RefCell<Vec<Placement>>,
    bounds: Cell<Bounds>,
    state: Cell<CycleState>,
    completed: Cell<u32>,
    max_cycles: Cell<u32>,
    epoch: Epoch,
}

/// The choreography engine.
pub struct Engine<S> {
    inner: Rc<Inner<S>>,
}

impl<S> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: RenderSurface + 'static> Engine<S> {
    /// Creates an idle engine. Nothing is sent to the surface until
    /// [`Engine::start`].
    ///
    /// ### Errors
    /// [`EngineError::Configuration`] if `config` does not validate.
    pub fn new(config: EngineConfig, surface: S, rng: StdRng) -> Result<Self> {
        config.validate()?;
        let registry = SceneRegistry::new(config.leaf_count);
        let inner = Inner {
            scene: RefCell::new(Scene::new(registry, surface)),
            rng: RefCell::new(rng),
            placements: RefCell::new(Vec::new()),
            bounds: Cell::new(config.bounds),
            state: Cell::new(CycleState::Idle),
            completed: Cell::new(0),
            max_cycles: Cell::new(config.max_cycles),
            epoch: Epoch::new(),
            config,
        };
        Ok(Self {
            inner: Rc::new(inner),
        })
    }

    /// Like [`Engine::new`], seeding the RNG from `config.seed` or the OS.
    pub fn from_config(config: EngineConfig, surface: S) -> Result<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(config, surface, rng)
    }

    /// Runs the choreography `max_cycles` times, then commits the terminal
    /// scene.
    ///
    /// Any run already in flight is invalidated before this returns, so it
    /// will not mutate the scene again. The returned future does the rest:
    /// full reset, leaf generation, the cycle loop.
    ///
    /// ### Errors
    /// - [`EngineError::Configuration`] if `max_cycles` is zero.
    /// - Any error raised by an action; the controller goes back to `Idle`
    ///   and the scene keeps whatever partial state it reached.
    pub fn start(&self, max_cycles: u32) -> impl Future<Output = Result<RunOutcome>> + use<S> {
        let prepared = self.prepare(max_cycles);
        let engine = self.clone();
        async move {
            let run_epoch = prepared?;
            engine.run_cycles(run_epoch).await
        }
    }

    /// Starts over from cycle zero with the current cycle count.
    pub fn restart(&self) -> impl Future<Output = Result<RunOutcome>> + use<S> {
        info!(
            completed = self.inner.completed.get(),
            "restart requested"
        );
        self.start(self.inner.max_cycles.get())
    }

    /// Regenerates and re-applies leaf placements for new bounds.
    ///
    /// Leaf states are untouched; a run in progress keeps its reveal order
    /// until the next cycle.
    pub fn resize(&self, bounds: Bounds) -> Result<()> {
        bounds.validate()?;
        self.inner.bounds.set(bounds);
        debug!(width = bounds.width, height = bounds.height, "resize");
        self.regenerate_placements()
    }

    /// Where the cycle state machine currently is.
    pub fn state(&self) -> CycleState {
        self.inner.state.get()
    }

    /// Cycles finished by the current run; reset to zero by `start`.
    pub fn completed_cycles(&self) -> u32 {
        self.inner.completed.get()
    }

    /// The validated configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Bounds the current placements were generated for.
    pub fn bounds(&self) -> Bounds {
        self.inner.bounds.get()
    }

    /// Current leaf placements in generation order.
    pub fn placements(&self) -> Vec<Placement> {
        self.inner.placements.borrow().clone()
    }

    /// Borrows the registry.
    ///
    /// Drop the guard before awaiting; a run in progress needs the scene
    /// mutably at its next step.
    pub fn registry(&self) -> Ref<'_, SceneRegistry> {
        Ref::map(self.inner.scene.borrow(), Scene::registry)
    }

    /// Borrows the render surface. Do not hold the guard across an await.
    pub fn surface(&self) -> Ref<'_, S> {
        Ref::map(self.inner.scene.borrow(), Scene::surface)
    }

    /// Synchronous half of [`Engine::start`]: cancel, reset, generate.
    fn prepare(&self, max_cycles: u32) -> Result<u64> {
        if max_cycles == 0 {
            return Err(EngineError::config("max_cycles must be at least 1"));
        }
        let run_epoch = self.inner.epoch.advance();
        self.inner.max_cycles.set(max_cycles);
        self.inner.completed.set(0);
        self.set_state(CycleState::Idle);

        {
            let mut scene = self.inner.scene.borrow_mut();
            scene.cancel_progress()?;
            scene.reset_all()?;
        }
        self.regenerate_placements()?;

        info!(max_cycles, leaves = self.inner.config.leaf_count, "choreography armed");
        Ok(run_epoch)
    }

    async fn run_cycles(&self, run_epoch: u64) -> Result<RunOutcome> {
        let outcome = self.drive(run_epoch).await;
        if self.inner.epoch.is_current(run_epoch) {
            match &outcome {
                Ok(RunOutcome::Completed) => {}
                Ok(RunOutcome::Cancelled) => self.set_state(CycleState::Idle),
                Err(err) => {
                    warn!(error = %err, "choreography aborted");
                    self.set_state(CycleState::Idle);
                }
            }
        }
        outcome
    }

    async fn drive(&self, run_epoch: u64) -> Result<RunOutcome> {
        let inner = &self.inner;
        let timings = &inner.config.timings;

        if !timeline::suspend(timings.startup_delay(), &inner.epoch, run_epoch).await {
            return Ok(RunOutcome::Cancelled);
        }

        let max_cycles = inner.max_cycles.get();
        while inner.completed.get() < max_cycles {
            let cycle_index = inner.completed.get();
            if cycle_index > 0 {
                inner.scene.borrow_mut().reset_visuals()?;
            }
            self.set_state(CycleState::Running { cycle_index });
            info!(cycle = cycle_index + 1, max_cycles, "cycle started");

            let plan = self.plan_cycle();
            if timeline::run(&plan, &inner.scene, &inner.epoch, run_epoch).await?
                == RunOutcome::Cancelled
            {
                warn!(cycle = cycle_index + 1, "cycle cancelled by a newer run");
                return Ok(RunOutcome::Cancelled);
            }
            inner.completed.set(cycle_index + 1);

            if cycle_index + 1 < max_cycles {
                // The tree stays up during the pause.
                inner.scene.borrow_mut().clear_fruit_visuals()?;
                if !timeline::suspend(timings.inter_cycle_pause(), &inner.epoch, run_epoch).await
                {
                    return Ok(RunOutcome::Cancelled);
                }
            } else {
                inner.scene.borrow_mut().commit_terminal()?;
                self.set_state(CycleState::Terminal);
                info!(cycles = max_cycles, "choreography finished");
            }
        }
        Ok(RunOutcome::Completed)
    }

    fn plan_cycle(&self) -> StagePlan {
        let order: Vec<ElementId> = placement::reveal_order(&self.inner.placements.borrow())
            .into_iter()
            .map(ElementId::Leaf)
            .collect();
        StagePlan::canonical(
            &self.inner.config.timings,
            &order,
            &mut *self.inner.rng.borrow_mut(),
        )
    }

    fn regenerate_placements(&self) -> Result<()> {
        let placements = placement::generate(
            self.inner.config.leaf_count,
            &self.inner.bounds.get(),
            &self.inner.config.placement,
            &mut *self.inner.rng.borrow_mut(),
        )?;
        self.inner
            .scene
            .borrow_mut()
            .attach_placements(&placements)?;
        *self.inner.placements.borrow_mut() = placements;
        Ok(())
    }

    fn set_state(&self, state: CycleState) {
        self.inner.state.set(state);
        self.inner
            .scene
            .borrow_mut()
            .surface_mut()
            .observe_cycle(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::{Instant, sleep};

    use crate::{
        config::Timings,
        surface::{RecordingSurface, SurfaceCall},
        types::{StateTag, VisualState},
    };

    /// 700, 1200, 700, 5×150, 700, 1500, 1200, 400, 700 ms; no lead-ins.
    fn example_config() -> EngineConfig {
        EngineConfig {
            max_cycles: 2,
            leaf_count: 5,
            timings: Timings {
                startup_delay_ms: 0,
                cycle_lead_in_ms: 0,
                seed_open_ms: 700,
                stem_growth_ms: 1200,
                branch_extend_ms: 700,
                leaf_interval_ms: 150,
                leaf_jitter_ms: 0,
                leaf_settle_ms: 0,
                bud_hold_ms: 700,
                fruit_hold_ms: 1500,
                fall_ms: 1200,
                ground_marker_ms: 400,
                seed_restore_ms: 700,
                inter_cycle_pause_ms: 600,
            },
            ..EngineConfig::default()
        }
    }

    const CYCLE: Duration = Duration::from_millis(7850);

    fn engine(config: EngineConfig) -> Engine<RecordingSurface> {
        Engine::new(config, RecordingSurface::new(), StdRng::seed_from_u64(17)).expect("engine")
    }

    fn state_of(engine: &Engine<RecordingSurface>, id: ElementId) -> VisualState {
        engine.registry().get(id).expect("element").state
    }

    fn falls(engine: &Engine<RecordingSurface>) -> usize {
        engine
            .surface()
            .count_state(ElementId::Fruit, StateTag::Falling)
    }

    #[tokio::test(start_paused = true)]
    async fn runs_exactly_max_cycles_then_terminates() {
        for max_cycles in 1..=3 {
            let engine = engine(example_config());
            let outcome = engine.start(max_cycles).await.expect("run");

            assert_eq!(outcome, RunOutcome::Completed);
            assert_eq!(engine.completed_cycles(), max_cycles);
            assert_eq!(engine.state(), CycleState::Terminal);
            assert_eq!(falls(&engine), max_cycles as usize);

            let running = engine
                .surface()
                .cycle_states()
                .iter()
                .filter(|s| matches!(s, CycleState::Running { .. }))
                .count();
            assert_eq!(running, max_cycles as usize);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_scene_keeps_the_tree_and_ground_marker() {
        let engine = engine(example_config());
        engine.start(2).await.expect("run");

        assert_eq!(state_of(&engine, ElementId::Seed), VisualState::Hidden);
        assert_eq!(state_of(&engine, ElementId::Bud), VisualState::Hidden);
        assert_eq!(state_of(&engine, ElementId::Fruit), VisualState::Removed);
        assert_eq!(state_of(&engine, ElementId::GroundMarker), VisualState::Visible);
        for id in [ElementId::Stem, ElementId::BranchLeft, ElementId::BranchRight] {
            assert_eq!(state_of(&engine, id), VisualState::Visible);
        }
        let leaves: Vec<ElementId> = engine.registry().leaf_ids().collect();
        for id in leaves {
            assert_eq!(state_of(&engine, id), VisualState::Visible);
            assert!(engine.surface().is_visible(id));
        }
        assert!(!engine.surface().is_visible(ElementId::Seed));
    }

    #[tokio::test(start_paused = true)]
    async fn single_cycle_lasts_the_sum_of_its_holds() {
        let engine = engine(example_config());
        let started = Instant::now();
        engine.start(1).await.expect("run");

        let elapsed = started.elapsed();
        assert!(
            elapsed >= CYCLE && elapsed <= CYCLE + Duration::from_millis(2),
            "first cycle took {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn inter_cycle_pause_keeps_the_tree_until_the_next_cycle() {
        let engine = engine(example_config());
        let run = engine.start(2);
        let initial = engine.placements();
        let leaves: Vec<ElementId> = engine.registry().leaf_ids().collect();

        let observer = async {
            // Inside the pause between the two cycles.
            sleep(CYCLE + Duration::from_millis(300)).await;
            assert_eq!(engine.completed_cycles(), 1);
            assert_eq!(state_of(&engine, ElementId::Fruit), VisualState::Hidden);
            assert_eq!(state_of(&engine, ElementId::Bud), VisualState::Hidden);
            assert_eq!(state_of(&engine, ElementId::GroundMarker), VisualState::Hidden);
            assert!(!engine.surface().is_visible(ElementId::GroundMarker));
            assert_eq!(state_of(&engine, ElementId::Seed), VisualState::Visible);
            assert!(!engine.registry().get(ElementId::Seed).unwrap().open);
            for &id in leaves.iter().chain(&[ElementId::Stem, ElementId::BranchLeft]) {
                assert_eq!(state_of(&engine, id), VisualState::Visible, "{id} during pause");
                assert!(engine.surface().is_visible(id));
            }
            assert_eq!(engine.placements(), initial);

            // Second cycle is opening its seed; the old tree is gone.
            sleep(Duration::from_millis(600)).await;
            assert_eq!(engine.state(), CycleState::Running { cycle_index: 1 });
            for &id in leaves.iter().chain(&[ElementId::Stem, ElementId::BranchRight]) {
                assert_eq!(state_of(&engine, id), VisualState::Hidden, "{id} in cycle 2");
            }
        };
        let (outcome, ()) = tokio::join!(run, observer);

        assert_eq!(outcome.expect("run"), RunOutcome::Completed);
        assert_eq!(engine.placements(), initial);
        let applied = engine
            .surface()
            .calls()
            .iter()
            .filter(|c| matches!(c, SurfaceCall::ApplyPlacement(..)))
            .count();
        assert_eq!(applied, engine.config().leaf_count);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_silences_the_suspended_run() {
        let engine = engine(example_config());
        let stale = engine.start(2);

        let restarter = async {
            // During the stem growth hold of the first cycle.
            sleep(Duration::from_millis(1500)).await;
            let fresh = engine.restart();
            let calls_at_restart = engine.surface().call_count();

            // The stale run wakes at 1900 ms; the fresh one is not polled yet.
            sleep(Duration::from_millis(1000)).await;
            assert_eq!(engine.surface().call_count(), calls_at_restart);
            (fresh, calls_at_restart)
        };

        let (stale_outcome, (fresh, calls_at_restart)) = tokio::join!(stale, restarter);
        assert_eq!(stale_outcome.expect("stale run"), RunOutcome::Cancelled);
        assert_eq!(engine.surface().call_count(), calls_at_restart);
        assert_eq!(state_of(&engine, ElementId::Stem), VisualState::Hidden);

        assert_eq!(fresh.await.expect("fresh run"), RunOutcome::Completed);
        assert_eq!(engine.completed_cycles(), 2);
        assert_eq!(engine.state(), CycleState::Terminal);
        assert_eq!(falls(&engine), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_cancels_the_stem_growth_progress() {
        let engine = engine(example_config());
        let stale = engine.start(1);

        let restarter = async {
            sleep(Duration::from_millis(1000)).await;
            let handles: Vec<_> = engine.surface().active_progress().collect();
            assert_eq!(handles.len(), 1);
            let fresh = engine.restart();
            assert!(
                engine
                    .surface()
                    .calls()
                    .contains(&SurfaceCall::CancelProgress(handles[0]))
            );
            fresh
        };
        let (stale_outcome, fresh) = tokio::join!(stale, restarter);

        assert_eq!(stale_outcome.expect("stale"), RunOutcome::Cancelled);
        assert_eq!(fresh.await.expect("fresh"), RunOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_terminal_runs_again() {
        let engine = engine(example_config());
        engine.start(2).await.expect("first");
        assert_eq!(engine.state(), CycleState::Terminal);

        engine.restart().await.expect("second");
        assert_eq!(engine.completed_cycles(), 2);
        assert_eq!(engine.state(), CycleState::Terminal);
        assert_eq!(falls(&engine), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn surface_failure_aborts_to_idle() {
        let surface = RecordingSurface::new().fail_on(ElementId::Bud, StateTag::Revealing);
        let engine =
            Engine::new(example_config(), surface, StdRng::seed_from_u64(1)).expect("engine");

        let err = engine.start(2).await.unwrap_err();

        assert!(matches!(err, EngineError::Surface(_)));
        assert_eq!(engine.state(), CycleState::Idle);
        assert_eq!(engine.completed_cycles(), 0);
        // Partial scene is left as is.
        assert_eq!(state_of(&engine, ElementId::Stem), VisualState::Visible);
        assert_eq!(falls(&engine), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_cycles_is_rejected_before_touching_the_scene() {
        let engine = engine(example_config());
        let err = engine.start(0).await.unwrap_err();

        assert!(matches!(err, EngineError::Configuration(_)));
        assert_eq!(engine.surface().call_count(), 0);
        assert_eq!(engine.state(), CycleState::Idle);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            leaf_count: 1,
            ..EngineConfig::default()
        };
        let result = Engine::new(config, RecordingSurface::new(), StdRng::seed_from_u64(0));
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn resize_regenerates_placements() {
        let engine = engine(example_config());
        engine.start(1).await.expect("run");
        let before = engine.placements();

        let bounds = Bounds {
            width: 600.0,
            height: 300.0,
            ..engine.bounds()
        };
        engine.resize(bounds).expect("resize");

        let after = engine.placements();
        assert_eq!(after.len(), before.len());
        assert_ne!(after, before);
        let leaf0 = engine.registry().get(ElementId::Leaf(0)).unwrap().placement;
        assert_eq!(leaf0, Some(after[0]));
        assert!(engine.resize(Bounds { width: 0.0, ..bounds }).is_err());
    }
}
