use std::fmt;

/// Identifier for an element of the growth scene.
///
/// The singleton elements exist in every scene; `Leaf(n)` is only meaningful
/// for `n < leaf_count` of the owning [`crate::registry::SceneRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementId {
    Seed,
    Stem,
    BranchLeft,
    BranchRight,
    Bud,
    Fruit,
    GroundMarker,
    Leaf(usize),
}

impl ElementId {
    /// Every element that is not procedurally generated, in registry order.
    pub const SINGLETONS: [ElementId; 7] = [
        ElementId::Seed,
        ElementId::Stem,
        ElementId::BranchLeft,
        ElementId::BranchRight,
        ElementId::Bud,
        ElementId::Fruit,
        ElementId::GroundMarker,
    ];
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Seed => f.write_str("seed"),
            ElementId::Stem => f.write_str("stem"),
            ElementId::BranchLeft => f.write_str("branchLeft"),
            ElementId::BranchRight => f.write_str("branchRight"),
            ElementId::Bud => f.write_str("bud"),
            ElementId::Fruit => f.write_str("fruit"),
            ElementId::GroundMarker => f.write_str("groundMarker"),
            ElementId::Leaf(n) => write!(f, "leaf-{n}"),
        }
    }
}

/// Lifecycle of a scene element within one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VisualState {
    #[default]
    Hidden,
    Revealing,
    Visible,
    Falling,
    Removed,
}

impl VisualState {
    /// `true` for every state in which the element is drawn.
    #[inline]
    pub fn is_shown(self) -> bool {
        matches!(
            self,
            VisualState::Revealing | VisualState::Visible | VisualState::Falling
        )
    }
}

/// State tag forwarded to a render surface.
///
/// This is [`VisualState`] plus the open/closed flag of the seed, which the
/// surface needs to draw the seed halves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StateTag {
    #[default]
    Hidden,
    Revealing,
    Visible,
    Falling,
    Removed,
    Opened,
    Closed,
}

impl From<VisualState> for StateTag {
    fn from(state: VisualState) -> Self {
        match state {
            VisualState::Hidden => StateTag::Hidden,
            VisualState::Revealing => StateTag::Revealing,
            VisualState::Visible => StateTag::Visible,
            VisualState::Falling => StateTag::Falling,
            VisualState::Removed => StateTag::Removed,
        }
    }
}

/// Attribute driven by a continuous progress interpolation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgressAttribute {
    /// Grown fraction of the stem, `0.0` (seed level) to `1.0` (full height).
    Height,
}

/// Handle returned by a render surface for an in-flight progress interpolation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgressHandle(pub u64);

/// Marker held by an element while one of its transitions is in flight.
///
/// `epoch` is the run that started the transition, `serial` orders
/// transitions within that run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransitionToken {
    pub epoch: u64,
    pub serial: u64,
}

/// Side of the crown a generated leaf is placed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// `-1.0` for the left side, `+1.0` for the right side.
    #[inline]
    pub fn sign(self) -> f32 {
        match self {
            Side::Left => -1.0,
            Side::Right => 1.0,
        }
    }

    /// Even generation indices go left, odd ones go right.
    #[inline]
    pub fn for_index(index: usize) -> Self {
        if index % 2 == 0 { Side::Left } else { Side::Right }
    }
}

/// Cycle controller state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CycleState {
    #[default]
    Idle,
    Running {
        cycle_index: u32,
    },
    Terminal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_ids_display_as_stable_strings() {
        assert_eq!(ElementId::Seed.to_string(), "seed");
        assert_eq!(ElementId::BranchLeft.to_string(), "branchLeft");
        assert_eq!(ElementId::GroundMarker.to_string(), "groundMarker");
        assert_eq!(ElementId::Leaf(3).to_string(), "leaf-3");
    }

    #[test]
    fn sides_alternate_starting_left() {
        assert_eq!(Side::for_index(0), Side::Left);
        assert_eq!(Side::for_index(1), Side::Right);
        assert_eq!(Side::for_index(2).sign(), -1.0);
    }

    #[test]
    fn only_drawn_states_are_shown() {
        assert!(!VisualState::Hidden.is_shown());
        assert!(VisualState::Revealing.is_shown());
        assert!(VisualState::Falling.is_shown());
        assert!(!VisualState::Removed.is_shown());
    }
}
