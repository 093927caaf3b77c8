//! Stage plans and the cooperative scheduler that runs them.
//!
//! A cycle of the animation is an explicit [`StagePlan`]: named stages, each
//! made of steps that perform one synchronous [`Action`] on the scene and then
//! hold for a fixed duration. [`run`] executes the steps strictly in order on
//! the calling task:
//!
//! 1. check that the run's epoch is still current,
//! 2. apply the action,
//! 3. suspend for the step's hold ([`suspend`]),
//! 4. check the epoch again and settle the reveals the step started.
//!
//! The holds are the only suspension points. When [`Epoch::advance`] is called
//! while a run is suspended, that run wakes up, notices the stale epoch and
//! returns [`RunOutcome::Cancelled`] without touching the scene again.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

use rand::Rng;
use tracing::debug;

use crate::{
    config::Timings, error::Result, scene::Scene, surface::RenderSurface, types::ElementId,
};

/// One synchronous scene mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// No mutation; the step only holds.
    Pause,
    OpenSeed,
    /// Reveals the stem and grows it continuously over the step's hold.
    GrowStem,
    ExtendBranches,
    RevealLeaf(ElementId),
    RevealBud,
    /// Hides the bud and shows the fruit in one action.
    SwapBudForFruit,
    HoldFruit,
    DropFruit,
    /// Removes the fallen fruit and shows the ground marker.
    SettleFruit,
    /// Returns the seed to its closed, visible baseline.
    CloseSeed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    pub hold: Duration,
}

impl Step {
    pub fn new(action: Action, hold: Duration) -> Self {
        Self { action, hold }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    pub name: &'static str,
    pub steps: Vec<Step>,
}

impl Stage {
    /// Sum of the step holds, saturating at `Duration::MAX`.
    pub fn duration(&self) -> Duration {
        self.steps
            .iter()
            .fold(Duration::ZERO, |total, s| total.saturating_add(s.hold))
    }
}

/// Ordered list of stages making up one cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage (builder pattern).
    #[must_use]
    pub fn stage(mut self, name: &'static str, steps: Vec<Step>) -> Self {
        self.stages.push(Stage { name, steps });
        self
    }

    /// Appends a single-step stage (builder pattern).
    #[must_use]
    pub fn single(self, name: &'static str, action: Action, hold: Duration) -> Self {
        self.stage(name, vec![Step::new(action, hold)])
    }

    /// The growth choreography for one cycle.
    ///
    /// `leaf_order` is the reveal order of the leaves, nearest to the crown
    /// center first. Each leaf holds `leaf_interval` plus a uniform jitter of
    /// up to `leaf_jitter`; the last one additionally holds `leaf_settle`.
    /// A zero `cycle_lead_in` omits the lead-in stage.
    pub fn canonical(timings: &Timings, leaf_order: &[ElementId], rng: &mut impl Rng) -> Self {
        let jitter_ms = timings.leaf_jitter_ms;
        let leaves = leaf_order
            .iter()
            .enumerate()
            .map(|(i, &id)| {
                let mut hold = timings.leaf_interval();
                if jitter_ms > 0 {
                    let jitter = Duration::from_millis(rng.random_range(0..=jitter_ms));
                    hold = hold.saturating_add(jitter);
                }
                if i + 1 == leaf_order.len() {
                    hold = hold.saturating_add(timings.leaf_settle());
                }
                Step::new(Action::RevealLeaf(id), hold)
            })
            .collect();

        let plan = if timings.cycle_lead_in_ms > 0 {
            StagePlan::new().single("lead_in", Action::Pause, timings.cycle_lead_in())
        } else {
            StagePlan::new()
        };

        plan.single("open_seed", Action::OpenSeed, timings.seed_open())
            .single("grow_stem", Action::GrowStem, timings.stem_growth())
            .single("extend_branches", Action::ExtendBranches, timings.branch_extend())
            .stage("reveal_leaves", leaves)
            .stage(
                "bud_to_fruit",
                vec![
                    Step::new(Action::RevealBud, timings.bud_hold()),
                    Step::new(Action::SwapBudForFruit, Duration::ZERO),
                ],
            )
            .single("hold_fruit", Action::HoldFruit, timings.fruit_hold())
            .stage(
                "fruit_fall",
                vec![
                    Step::new(Action::DropFruit, timings.fall()),
                    Step::new(Action::SettleFruit, timings.ground_marker()),
                ],
            )
            .single("restore_seed", Action::CloseSeed, timings.seed_restore())
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.stages.iter().flat_map(|s| s.steps.iter())
    }

    /// Sum of every hold; the length of one uncancelled run.
    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |total, stage| total.saturating_add(stage.duration()))
    }
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// A newer run took over; nothing was mutated after the takeover.
    Cancelled,
}

/// Generation counter shared by an engine and its runs.
///
/// A run captures the epoch it started in and stops as soon as the counter
/// has moved on.
#[derive(Clone, Debug, Default)]
pub struct Epoch(Rc<Cell<u64>>);

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.0.get()
    }

    /// Invalidates every run started so far and returns the new epoch.
    pub fn advance(&self) -> u64 {
        let next = self.0.get().wrapping_add(1);
        self.0.set(next);
        next
    }

    #[inline]
    pub fn is_current(&self, epoch: u64) -> bool {
        self.0.get() == epoch
    }
}

/// Suspends the calling task for `hold` and reports whether `run_epoch` is
/// still current afterwards.
///
/// A zero hold does not yield.
pub async fn suspend(hold: Duration, epoch: &Epoch, run_epoch: u64) -> bool {
    if !hold.is_zero() {
        tokio::time::sleep(hold).await;
    }
    epoch.is_current(run_epoch)
}

/// Executes `plan` against `scene` on the current task.
///
/// ### Parameters
/// - `plan` - The stages to run, in order.
/// - `scene` - Registry and surface; borrowed only for the duration of a
///   single action, never across a hold.
/// - `epoch` - Shared generation counter.
/// - `run_epoch` - The epoch this run belongs to.
///
/// ### Returns
/// - `Ok(RunOutcome::Completed)` once every step has held and settled.
/// - `Ok(RunOutcome::Cancelled)` if the epoch moved on; the scene is left
///   exactly as the last completed action of this run left it.
/// - `Err` if an action failed (unknown element or surface rejection).
pub async fn run<S: RenderSurface>(
    plan: &StagePlan,
    scene: &RefCell<Scene<S>>,
    epoch: &Epoch,
    run_epoch: u64,
) -> Result<RunOutcome> {
    for stage in plan.stages() {
        debug!(stage = stage.name, duration_ms = stage.duration().as_millis() as u64, "stage");
        for step in &stage.steps {
            if !epoch.is_current(run_epoch) {
                return Ok(RunOutcome::Cancelled);
            }
            scene.borrow_mut().apply(&step.action, step.hold, run_epoch)?;

            if !suspend(step.hold, epoch, run_epoch).await {
                debug!(stage = stage.name, "stale run woke up, aborting");
                return Ok(RunOutcome::Cancelled);
            }
            scene.borrow_mut().settle()?;
        }
    }
    Ok(RunOutcome::Completed)
}
