//! The registry bound to a render surface.
//!
//! Every registry transition goes through [`Scene`], which forwards it to the
//! surface in the same synchronous call. A single [`Scene::apply`] is therefore
//! atomic with respect to any other action.

use std::time::Duration;

use tracing::trace;

use crate::{
    error::Result,
    placement::Placement,
    registry::SceneRegistry,
    surface::RenderSurface,
    timeline::Action,
    types::{
        ElementId, ProgressAttribute, ProgressHandle, StateTag, TransitionToken, VisualState,
    },
};

#[derive(Debug)]
pub struct Scene<S> {
    registry: SceneRegistry,
    surface: S,
    /// Progress interpolations started by the current step.
    progress: Vec<ProgressHandle>,
    serial: u64,
}

impl<S: RenderSurface> Scene<S> {
    /// Wraps `registry` and `surface`. Nothing is sent to the surface until
    /// the first reset or action.
    pub fn new(registry: SceneRegistry, surface: S) -> Self {
        Self {
            registry,
            surface,
            progress: Vec::new(),
            serial: 0,
        }
    }

    pub fn registry(&self) -> &SceneRegistry {
        &self.registry
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Runs one step action.
    ///
    /// `hold` is how long the step suspends afterwards; continuous progress
    /// started by the action spans exactly that hold.
    pub fn apply(&mut self, action: &Action, hold: Duration, epoch: u64) -> Result<()> {
        trace!(?action, ?hold, "apply");
        match action {
            Action::Pause | Action::HoldFruit => {}
            Action::OpenSeed => {
                self.show(ElementId::Seed, VisualState::Visible)?;
                if self.reveal(ElementId::Seed, epoch)? {
                    self.registry.set_open(ElementId::Seed, true)?;
                    self.surface.set_state(ElementId::Seed, StateTag::Opened)?;
                }
            }
            Action::GrowStem => {
                if self.reveal(ElementId::Stem, epoch)? {
                    let handle = self.surface.begin_progress(
                        ElementId::Stem,
                        ProgressAttribute::Height,
                        0.0,
                        1.0,
                        hold,
                    )?;
                    self.progress.push(handle);
                }
            }
            Action::ExtendBranches => {
                self.reveal(ElementId::BranchLeft, epoch)?;
                self.reveal(ElementId::BranchRight, epoch)?;
            }
            Action::RevealLeaf(id) => {
                self.reveal(*id, epoch)?;
            }
            Action::RevealBud => {
                self.reveal(ElementId::Bud, epoch)?;
            }
            Action::SwapBudForFruit => {
                // Bud goes first so no frame shows both.
                self.show(ElementId::Bud, VisualState::Hidden)?;
                self.show(ElementId::Fruit, VisualState::Visible)?;
            }
            Action::DropFruit => {
                let token = self.next_token(epoch);
                if self
                    .registry
                    .begin_transition(ElementId::Fruit, VisualState::Falling, token)?
                {
                    self.surface
                        .set_state(ElementId::Fruit, StateTag::Falling)?;
                }
            }
            Action::SettleFruit => {
                self.show(ElementId::Fruit, VisualState::Removed)?;
                self.show(ElementId::GroundMarker, VisualState::Visible)?;
            }
            Action::CloseSeed => {
                self.show(ElementId::Seed, VisualState::Visible)?;
                if self.registry.set_open(ElementId::Seed, false)? {
                    self.surface.set_state(ElementId::Seed, StateTag::Closed)?;
                }
            }
        }
        Ok(())
    }

    /// Completes the step that just finished its hold: reveals settle to
    /// `Visible` and progress interpolations are considered done.
    pub fn settle(&mut self) -> Result<()> {
        self.progress.clear();
        for id in self.registry.settle_transitions() {
            self.surface.set_state(id, StateTag::Visible)?;
        }
        Ok(())
    }

    /// Cancels progress interpolations that are still running.
    pub fn cancel_progress(&mut self) -> Result<()> {
        for handle in self.progress.drain(..) {
            self.surface.cancel_progress(handle)?;
        }
        Ok(())
    }

    pub fn has_progress(&self) -> bool {
        !self.progress.is_empty()
    }

    /// Full reset: baseline states, leaf placements dropped.
    pub fn reset_all(&mut self) -> Result<()> {
        self.registry.reset_all();
        self.sync_all()
    }

    /// Start-of-cycle reset: baseline states, leaf placements kept.
    pub fn reset_visuals(&mut self) -> Result<()> {
        self.registry.reset_visuals();
        self.sync_all()
    }

    /// Between-cycle cleanup: bud, fruit and ground marker go back to
    /// `Hidden` and the seed to its closed baseline. The grown tree stays.
    pub fn clear_fruit_visuals(&mut self) -> Result<()> {
        for id in [
            ElementId::Bud,
            ElementId::Fruit,
            ElementId::GroundMarker,
            ElementId::Seed,
        ] {
            if self.registry.reset_element(id)? {
                let el = self.registry.get(id)?;
                let (state, open) = (el.state, el.open);
                self.sync(id, state, open)?;
            }
        }
        Ok(())
    }

    /// Attaches generated placements and pushes them to the surface.
    pub fn attach_placements(&mut self, placements: &[Placement]) -> Result<()> {
        self.registry.attach_placements(placements)?;
        for (id, placement) in self.registry.leaf_ids().zip(placements) {
            self.surface.apply_placement(id, placement)?;
        }
        Ok(())
    }

    /// Resting scene after the last cycle: the tree stays, the seed and bud
    /// are hidden, the fruit is gone and the ground marker remains.
    pub fn commit_terminal(&mut self) -> Result<()> {
        self.settle()?;
        self.registry.set_open(ElementId::Seed, false)?;
        self.show(ElementId::Seed, VisualState::Hidden)?;
        self.show(ElementId::Bud, VisualState::Hidden)?;
        self.show(ElementId::Fruit, VisualState::Removed)?;

        let grown = [ElementId::Stem, ElementId::BranchLeft, ElementId::BranchRight]
            .into_iter()
            .chain(self.registry.leaf_ids());
        for id in grown {
            self.show(id, VisualState::Visible)?;
        }
        Ok(())
    }

    fn next_token(&mut self, epoch: u64) -> TransitionToken {
        self.serial += 1;
        TransitionToken {
            epoch,
            serial: self.serial,
        }
    }

    /// Starts a reveal; `false` if it was already in flight.
    fn reveal(&mut self, id: ElementId, epoch: u64) -> Result<bool> {
        let token = self.next_token(epoch);
        if !self
            .registry
            .begin_transition(id, VisualState::Revealing, token)?
        {
            return Ok(false);
        }
        self.surface.set_state(id, StateTag::Revealing)?;
        self.surface.set_visible(id, true)?;
        Ok(true)
    }

    /// Moves `id` straight to `state`, hiding before and showing after the
    /// state change.
    fn show(&mut self, id: ElementId, state: VisualState) -> Result<()> {
        if !self.registry.set_state(id, state)? {
            return Ok(());
        }
        if state.is_shown() {
            self.surface.set_state(id, state.into())?;
            self.surface.set_visible(id, true)?;
        } else {
            self.surface.set_visible(id, false)?;
            self.surface.set_state(id, state.into())?;
        }
        Ok(())
    }

    fn sync_all(&mut self) -> Result<()> {
        let snapshot: Vec<(ElementId, VisualState, bool)> = self
            .registry
            .iter()
            .map(|e| (e.id, e.state, e.open))
            .collect();
        for (id, state, open) in snapshot {
            self.sync(id, state, open)?;
        }
        Ok(())
    }

    fn sync(&mut self, id: ElementId, state: VisualState, open: bool) -> Result<()> {
        self.surface.set_visible(id, state.is_shown())?;
        self.surface.set_state(id, state.into())?;
        if id == ElementId::Seed {
            let tag = if open { StateTag::Opened } else { StateTag::Closed };
            self.surface.set_state(id, tag)?;
        }
        Ok(())
    }
}
