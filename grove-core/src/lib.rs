//! Growth choreography engine: a seed opens, a stem grows, branches extend,
//! a symmetric crown of leaves appears, a bud turns into a fruit which falls
//! and leaves a ground marker, and the whole cycle repeats a fixed number of
//! times.
//!
//! Main components:
//! - [`controller`] — the [`Engine`]: cycle loop, restart, resize.
//! - [`timeline`] — stage plans and the cooperative scheduler running them.
//! - [`scene`] — registry transitions forwarded to a render surface.
//! - [`registry`] — the fixed set of scene elements and their states.
//! - [`placement`] — symmetric crown layout and reveal order of the leaves.
//! - [`surface`] — the [`RenderSurface`] trait and a recording surface.
//! - [`config`] — bounds, timings, placement parameters, JSON loading.
//! - [`error`] — engine and surface errors.
//! - [`types`] — element ids, visual states and other shared types.

pub mod config;
pub mod controller;
pub mod error;
pub mod placement;
pub mod registry;
pub mod scene;
pub mod surface;
pub mod timeline;
pub mod types;

pub use config::{Bounds, EngineConfig, PlacementConfig, Timings};
pub use controller::Engine;
pub use error::{EngineError, Result, SurfaceError};
pub use surface::RenderSurface;
pub use timeline::RunOutcome;
