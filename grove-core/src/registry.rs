use tracing::warn;

use crate::{
    error::{EngineError, Result},
    placement::Placement,
    types::{ElementId, TransitionToken, VisualState},
};

/// One named entity of the growth scene.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneElement {
    pub id: ElementId,
    pub state: VisualState,
    /// Open/closed flag of the seed; always `false` for other elements.
    pub open: bool,
    /// Only generated leaves carry a placement.
    pub placement: Option<Placement>,
    /// Present while a transition of this element is in flight.
    pub token: Option<TransitionToken>,
}

impl SceneElement {
    /// The cycle-start state of `id`: the seed is visible and closed,
    /// everything else is hidden.
    pub fn baseline(id: ElementId) -> Self {
        let state = match id {
            ElementId::Seed => VisualState::Visible,
            _ => VisualState::Hidden,
        };
        Self {
            id,
            state,
            open: false,
            placement: None,
            token: None,
        }
    }

    #[inline]
    pub fn is_shown(&self) -> bool {
        self.state.is_shown()
    }
}

/// Fixed set of scene elements, indexed like an arena.
///
/// Singletons occupy the first slots in [`ElementId::SINGLETONS`] order and
/// the `leaf_count` leaves follow.
#[derive(Clone, Debug)]
pub struct SceneRegistry {
    elements: Vec<SceneElement>,
    leaf_count: usize,
}

impl SceneRegistry {
    /// Builds the singletons plus `leaf_count` leaf slots, every element at
    /// its cycle-start state and without placement.
    ///
    /// ### Parameters
    /// - `leaf_count` - Number of `ElementId::Leaf` slots.
    ///
    /// ### Returns
    /// A registry whose slots never change for its whole life; only the
    /// element states, flags and placements do.
    pub fn new(leaf_count: usize) -> Self {
        let elements = ElementId::SINGLETONS
            .into_iter()
            .chain((0..leaf_count).map(ElementId::Leaf))
            .map(SceneElement::baseline)
            .collect();
        Self {
            elements,
            leaf_count,
        }
    }

    #[inline]
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// `Leaf(0)` to `Leaf(leaf_count - 1)`, detached from the registry borrow.
    pub fn leaf_ids(&self) -> impl Iterator<Item = ElementId> + use<> {
        (0..self.leaf_count).map(ElementId::Leaf)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SceneElement> {
        self.elements.iter()
    }

    /// Number of elements currently in `state`.
    pub fn count_in(&self, state: VisualState) -> usize {
        self.elements.iter().filter(|e| e.state == state).count()
    }

    fn slot(&self, id: ElementId) -> Option<usize> {
        match id {
            ElementId::Leaf(n) if n < self.leaf_count => Some(ElementId::SINGLETONS.len() + n),
            ElementId::Leaf(_) => None,
            singleton => ElementId::SINGLETONS.iter().position(|&s| s == singleton),
        }
    }

    pub fn get(&self, id: ElementId) -> Result<&SceneElement> {
        self.slot(id)
            .map(|slot| &self.elements[slot])
            .ok_or(EngineError::UnknownElement(id))
    }

    fn get_mut(&mut self, id: ElementId) -> Result<&mut SceneElement> {
        match self.slot(id) {
            Some(slot) => Ok(&mut self.elements[slot]),
            None => Err(EngineError::UnknownElement(id)),
        }
    }

    /// Moves `id` to `state` and clears its transition token.
    ///
    /// Returns whether anything changed. A `Removed` element stays removed
    /// until the next reset.
    pub fn set_state(&mut self, id: ElementId, state: VisualState) -> Result<bool> {
        let el = self.get_mut(id)?;
        if el.state == VisualState::Removed && state != VisualState::Removed {
            warn!(element = %id, ?state, "refusing to revive a removed element");
            return Ok(false);
        }
        if el.state == state && el.token.is_none() {
            return Ok(false);
        }
        el.state = state;
        el.token = None;
        Ok(true)
    }

    /// Starts a transition of `id` towards `target`.
    ///
    /// Returns `false` without touching the element when the same transition
    /// is already in flight or the element was removed.
    pub fn begin_transition(
        &mut self,
        id: ElementId,
        target: VisualState,
        token: TransitionToken,
    ) -> Result<bool> {
        let el = self.get_mut(id)?;
        if el.state == VisualState::Removed {
            warn!(element = %id, ?target, "refusing to animate a removed element");
            return Ok(false);
        }
        if el.state == target && el.token.is_some() {
            return Ok(false);
        }
        el.state = target;
        el.token = Some(token);
        Ok(true)
    }

    /// Sets the open/closed flag; returns whether it flipped.
    pub fn set_open(&mut self, id: ElementId, open: bool) -> Result<bool> {
        let el = self.get_mut(id)?;
        let changed = el.open != open;
        el.open = open;
        Ok(changed)
    }

    /// Completes every reveal in flight: `Revealing` elements become
    /// `Visible` and drop their token. Returns the settled ids.
    pub fn settle_transitions(&mut self) -> Vec<ElementId> {
        self.elements
            .iter_mut()
            .filter(|e| e.state == VisualState::Revealing)
            .map(|e| {
                e.state = VisualState::Visible;
                e.token = None;
                e.id
            })
            .collect()
    }

    /// Attaches one placement per leaf, in generation order.
    pub fn attach_placements(&mut self, placements: &[Placement]) -> Result<()> {
        if placements.len() != self.leaf_count {
            return Err(EngineError::config(format!(
                "expected {} leaf placements, got {}",
                self.leaf_count,
                placements.len()
            )));
        }
        let offset = ElementId::SINGLETONS.len();
        for (el, placement) in self.elements[offset..].iter_mut().zip(placements) {
            el.placement = Some(*placement);
        }
        Ok(())
    }

    /// Restores every element to its cycle-start state and drops leaf
    /// placements.
    pub fn reset_all(&mut self) {
        for el in &mut self.elements {
            *el = SceneElement::baseline(el.id);
        }
    }

    /// Like [`SceneRegistry::reset_all`] but keeps leaf placements.
    pub fn reset_visuals(&mut self) {
        for el in &mut self.elements {
            let placement = el.placement.take();
            *el = SceneElement::baseline(el.id);
            el.placement = placement;
        }
    }

    /// Puts a single element back to its cycle-start state, placement kept.
    ///
    /// Unlike [`SceneRegistry::set_state`] this also clears `Removed`.
    /// Returns whether anything changed.
    pub fn reset_element(&mut self, id: ElementId) -> Result<bool> {
        let el = self.get_mut(id)?;
        let mut baseline = SceneElement::baseline(id);
        baseline.placement = el.placement;
        if *el == baseline {
            return Ok(false);
        }
        *el = baseline;
        Ok(true)
    }
}
