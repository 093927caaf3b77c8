//! Procedural placement of crown leaves.
//!
//! Leaves alternate sides around the crown focal point. Their horizontal
//! offset follows `sin(t·π)` over the normalized generation index `t`, so the
//! first and last generated leaves hug the center and the middle ones are
//! pushed outward. The vertical lift shrinks towards the edges of the bounds,
//! which gives the crown its rounded silhouette.

use std::f32::consts::PI;

use glam::Vec2;
use rand::Rng;

use crate::{
    config::{Bounds, PlacementConfig},
    error::{EngineError, Result},
    types::Side,
};

/// Position, orientation and size of one generated leaf.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub position: Vec2,
    /// Rotation in degrees.
    pub rotation: f32,
    /// Negative on the left side, so left leaves are mirrored.
    pub scale_x: f32,
    pub scale_y: f32,
    pub side: Side,
    /// Absolute horizontal distance from the bounds center.
    pub center_distance: f32,
}

/// Generates `count` leaf placements inside `bounds`, in generation order.
///
/// Generation index `i` is normalized to `t = i / (count - 1)`, even indices
/// go left and odd ones right, and the horizontal offset is
/// `side · (base + sin(t·π) · spread) + jitter`.
///
/// ### Errors
/// [`EngineError::Configuration`] if `count <= 1` (the progress cannot be
/// normalized) or if the bounds or shape parameters are invalid.
pub fn generate(
    count: usize,
    bounds: &Bounds,
    cfg: &PlacementConfig,
    rng: &mut impl Rng,
) -> Result<Vec<Placement>> {
    if count <= 1 {
        return Err(EngineError::config(format!(
            "leaf placement needs at least 2 leaves, got {count}"
        )));
    }
    bounds.validate()?;
    cfg.validate()?;

    let half_width = bounds.half_width();
    let half_height = bounds.half_height();
    let base = cfg.base_offset(half_width);
    let spread = cfg.spread(half_width);
    let max_jitter = cfg.max_jitter(half_width);
    let last = (count - 1) as f32;

    let placements = (0..count)
        .map(|i| {
            let t = i as f32 / last;
            let side = Side::for_index(i);
            let bias = (t * PI).sin();

            let jitter = symmetric(rng, max_jitter);
            let dx = side.sign() * (base + bias * spread) + jitter;

            let reach = (dx.abs() / half_width).min(1.0);
            let dy = cfg.crown_height_fraction * half_height * (1.0 - reach * reach);

            let rotation = symmetric(rng, cfg.rotation_range_deg);
            let scale = rng.random_range(cfg.min_scale..=cfg.max_scale);

            Placement {
                position: bounds.center + Vec2::new(dx, dy),
                rotation,
                scale_x: side.sign() * scale,
                scale_y: scale,
                side,
                center_distance: dx.abs(),
            }
        })
        .collect();

    Ok(placements)
}

/// Generation indices sorted by ascending distance from the center.
///
/// The sort is stable, so leaves at equal distance keep generation order.
pub fn reveal_order(placements: &[Placement]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..placements.len()).collect();
    order.sort_by(|&a, &b| {
        placements[a]
            .center_distance
            .total_cmp(&placements[b].center_distance)
    });
    order
}

fn symmetric(rng: &mut impl Rng, half_range: f32) -> f32 {
    if half_range > 0.0 {
        rng.random_range(-half_range..=half_range)
    } else {
        0.0
    }
}
