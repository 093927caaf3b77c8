//! The rendering surface the engine drives, and an in-memory recorder.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::{
    error::SurfaceError,
    placement::Placement,
    types::{CycleState, ElementId, ProgressAttribute, ProgressHandle, StateTag},
};

/// Element-control interface implemented by whatever draws the scene.
///
/// Every call may be rejected; a rejection aborts the current run.
pub trait RenderSurface {
    fn set_visible(&mut self, id: ElementId, visible: bool) -> Result<(), SurfaceError>;

    fn set_state(&mut self, id: ElementId, tag: StateTag) -> Result<(), SurfaceError>;

    fn apply_placement(&mut self, id: ElementId, placement: &Placement)
    -> Result<(), SurfaceError>;

    /// Starts interpolating `attribute` of `id` from `from` to `to` over
    /// `duration`. The surface owns the interpolation.
    fn begin_progress(
        &mut self,
        id: ElementId,
        attribute: ProgressAttribute,
        from: f32,
        to: f32,
        duration: Duration,
    ) -> Result<ProgressHandle, SurfaceError>;

    fn cancel_progress(&mut self, handle: ProgressHandle) -> Result<(), SurfaceError>;

    /// Notification of cycle controller transitions.
    fn observe_cycle(&mut self, _state: CycleState) {}
}

/// A call received by a [`RecordingSurface`].
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceCall {
    SetVisible(ElementId, bool),
    SetState(ElementId, StateTag),
    ApplyPlacement(ElementId, Placement),
    BeginProgress {
        id: ElementId,
        attribute: ProgressAttribute,
        from: f32,
        to: f32,
        duration: Duration,
        handle: ProgressHandle,
    },
    CancelProgress(ProgressHandle),
}

/// Render surface that only records what it was asked to do.
///
/// Used for headless runs and tests. [`RecordingSurface::fail_on`] makes it
/// reject a specific state change.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    calls: Vec<SurfaceCall>,
    visible: BTreeMap<ElementId, bool>,
    tags: BTreeMap<ElementId, StateTag>,
    active: BTreeSet<ProgressHandle>,
    cycles: Vec<CycleState>,
    next_handle: u64,
    fail_on: Option<(ElementId, StateTag)>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects `set_state(id, tag)` from now on.
    pub fn fail_on(mut self, id: ElementId, tag: StateTag) -> Self {
        self.fail_on = Some((id, tag));
        self
    }

    pub fn calls(&self) -> &[SurfaceCall] {
        &self.calls
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn is_visible(&self, id: ElementId) -> bool {
        self.visible.get(&id).copied().unwrap_or(false)
    }

    pub fn tag(&self, id: ElementId) -> Option<StateTag> {
        self.tags.get(&id).copied()
    }

    pub fn active_progress(&self) -> impl Iterator<Item = ProgressHandle> + '_ {
        self.active.iter().copied()
    }

    /// Cycle states observed so far, in order.
    pub fn cycle_states(&self) -> &[CycleState] {
        &self.cycles
    }

    /// Number of recorded `set_state(id, tag)` calls.
    pub fn count_state(&self, id: ElementId, tag: StateTag) -> usize {
        self.calls
            .iter()
            .filter(|c| **c == SurfaceCall::SetState(id, tag))
            .count()
    }
}

impl RenderSurface for RecordingSurface {
    fn set_visible(&mut self, id: ElementId, visible: bool) -> Result<(), SurfaceError> {
        self.calls.push(SurfaceCall::SetVisible(id, visible));
        self.visible.insert(id, visible);
        Ok(())
    }

    fn set_state(&mut self, id: ElementId, tag: StateTag) -> Result<(), SurfaceError> {
        if self.fail_on == Some((id, tag)) {
            return Err(SurfaceError::new(
                "set_state",
                format!("{id} cannot enter {tag:?}"),
            ));
        }
        self.calls.push(SurfaceCall::SetState(id, tag));
        self.tags.insert(id, tag);
        Ok(())
    }

    fn apply_placement(
        &mut self,
        id: ElementId,
        placement: &Placement,
    ) -> Result<(), SurfaceError> {
        self.calls.push(SurfaceCall::ApplyPlacement(id, *placement));
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
        let handle = ProgressHandle(self.next_handle);
        self.next_handle += 1;
        self.active.insert(handle);
        self.calls.push(SurfaceCall::BeginProgress {
            id,
            attribute,
            from,
            to,
            duration,
            handle,
        });
        Ok(handle)
    }

    fn cancel_progress(&mut self, handle: ProgressHandle) -> Result<(), SurfaceError> {
        if !self.active.remove(&handle) {
            return Err(SurfaceError::new(
                "cancel_progress",
                format!("unknown progress handle {}", handle.0),
            ));
        }
        self.calls.push(SurfaceCall::CancelProgress(handle));
        Ok(())
    }

    fn observe_cycle(&mut self, state: CycleState) {
        self.cycles.push(state);
    }
}
