use std::{fs, path::Path, time::Duration};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Region the leaf crown is generated in, in world units (y grows upwards).
///
/// `center` is the focal point where the branches fork; generated leaves
/// spread `width / 2` to either side of it and up to `height / 2` above it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bounds {
    pub width: f32,
    pub height: f32,
    pub center: Vec2,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            width: 260.0,
            height: 160.0,
            center: Vec2::new(0.0, 170.0),
        }
    }
}

impl Bounds {
    /// Horizontal reach of the crown on either side of `center`.
    #[inline]
    pub fn half_width(&self) -> f32 {
        self.width * 0.5
    }

    /// Maximum lift of a leaf above `center`.
    #[inline]
    pub fn half_height(&self) -> f32 {
        self.height * 0.5
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(EngineError::config(format!(
                "bounds width must be positive, got {}",
                self.width
            )));
        }
        if !(self.height.is_finite() && self.height > 0.0) {
            return Err(EngineError::config(format!(
                "bounds height must be positive, got {}",
                self.height
            )));
        }
        if !self.center.is_finite() {
            return Err(EngineError::config("bounds center must be finite"));
        }
        Ok(())
    }
}

/// Hold durations of the stage plan, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Pause before the first cycle of a run.
    pub startup_delay_ms: u64,
    /// Pause at the beginning of every cycle, before the seed opens.
    pub cycle_lead_in_ms: u64,
    pub seed_open_ms: u64,
    pub stem_growth_ms: u64,
    pub branch_extend_ms: u64,
    pub leaf_interval_ms: u64,
    /// Upper bound of the random extra delay added to each leaf.
    pub leaf_jitter_ms: u64,
    /// Extra hold after the last leaf.
    pub leaf_settle_ms: u64,
    pub bud_hold_ms: u64,
    pub fruit_hold_ms: u64,
    pub fall_ms: u64,
    pub ground_marker_ms: u64,
    pub seed_restore_ms: u64,
    pub inter_cycle_pause_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            startup_delay_ms: 300,
            cycle_lead_in_ms: 200,
            seed_open_ms: 900,
            stem_growth_ms: 1300,
            branch_extend_ms: 800,
            leaf_interval_ms: 380,
            leaf_jitter_ms: 0,
            leaf_settle_ms: 40,
            bud_hold_ms: 700,
            fruit_hold_ms: 1800,
            fall_ms: 1250,
            ground_marker_ms: 420,
            seed_restore_ms: 700,
            inter_cycle_pause_ms: 600,
        }
    }
}

impl Timings {
    /// Longest hold any single timing may ask for.
    pub const MAX_HOLD_MS: u64 = 60 * 60 * 1000;

    /// Rejects any hold above [`Timings::MAX_HOLD_MS`].
    ///
    /// ### Returns
    /// `Ok(())`, or a configuration error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let holds = [
            ("startup_delay_ms", self.startup_delay_ms),
            ("cycle_lead_in_ms", self.cycle_lead_in_ms),
            ("seed_open_ms", self.seed_open_ms),
            ("stem_growth_ms", self.stem_growth_ms),
            ("branch_extend_ms", self.branch_extend_ms),
            ("leaf_interval_ms", self.leaf_interval_ms),
            ("leaf_jitter_ms", self.leaf_jitter_ms),
            ("leaf_settle_ms", self.leaf_settle_ms),
            ("bud_hold_ms", self.bud_hold_ms),
            ("fruit_hold_ms", self.fruit_hold_ms),
            ("fall_ms", self.fall_ms),
            ("ground_marker_ms", self.ground_marker_ms),
            ("seed_restore_ms", self.seed_restore_ms),
            ("inter_cycle_pause_ms", self.inter_cycle_pause_ms),
        ];
        for (name, ms) in holds {
            if ms > Self::MAX_HOLD_MS {
                return Err(EngineError::config(format!(
                    "{name} must be at most {} ms, got {ms}",
                    Self::MAX_HOLD_MS
                )));
            }
        }
        Ok(())
    }

    /// Hold before the first cycle.
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Hold at the start of every cycle; zero drops the stage.
    pub fn cycle_lead_in(&self) -> Duration {
        Duration::from_millis(self.cycle_lead_in_ms)
    }

    pub fn seed_open(&self) -> Duration {
        Duration::from_millis(self.seed_open_ms)
    }

    /// Length of the stem progress interpolation.
    pub fn stem_growth(&self) -> Duration {
        Duration::from_millis(self.stem_growth_ms)
    }

    pub fn branch_extend(&self) -> Duration {
        Duration::from_millis(self.branch_extend_ms)
    }

    /// Base hold of every leaf reveal.
    pub fn leaf_interval(&self) -> Duration {
        Duration::from_millis(self.leaf_interval_ms)
    }

    pub fn leaf_jitter(&self) -> Duration {
        Duration::from_millis(self.leaf_jitter_ms)
    }

    pub fn leaf_settle(&self) -> Duration {
        Duration::from_millis(self.leaf_settle_ms)
    }

    pub fn bud_hold(&self) -> Duration {
        Duration::from_millis(self.bud_hold_ms)
    }

    pub fn fruit_hold(&self) -> Duration {
        Duration::from_millis(self.fruit_hold_ms)
    }

    /// How long the fruit stays `Falling`. The viewer also uses it for the
    /// drop animation.
    pub fn fall(&self) -> Duration {
        Duration::from_millis(self.fall_ms)
    }

    pub fn ground_marker(&self) -> Duration {
        Duration::from_millis(self.ground_marker_ms)
    }

    pub fn seed_restore(&self) -> Duration {
        Duration::from_millis(self.seed_restore_ms)
    }

    /// Pause between two cycles, with the grown tree still showing.
    pub fn inter_cycle_pause(&self) -> Duration {
        Duration::from_millis(self.inter_cycle_pause_ms)
    }
}

/// Shape parameters of the leaf placement generator.
///
/// Offsets are fractions of the bounds half width; the jitter is a fraction
/// of the spread.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub base_offset_fraction: f32,
    pub spread_fraction: f32,
    pub jitter_fraction: f32,
    pub crown_height_fraction: f32,
    /// Rotation is drawn from `±rotation_range_deg`.
    pub rotation_range_deg: f32,
    pub min_scale: f32,
    pub max_scale: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            base_offset_fraction: 0.12,
            spread_fraction: 0.7,
            jitter_fraction: 0.12,
            crown_height_fraction: 0.9,
            rotation_range_deg: 35.0,
            min_scale: 0.75,
            max_scale: 1.15,
        }
    }
}

impl PlacementConfig {
    pub fn base_offset(&self, half_width: f32) -> f32 {
        self.base_offset_fraction * half_width
    }

    pub fn spread(&self, half_width: f32) -> f32 {
        self.spread_fraction * half_width
    }

    pub fn max_jitter(&self, half_width: f32) -> f32 {
        self.jitter_fraction * self.spread(half_width)
    }

    /// Inclusive range every generated `center_distance` falls in.
    pub fn distance_bounds(&self, half_width: f32) -> (f32, f32) {
        let base = self.base_offset(half_width);
        let jitter = self.max_jitter(half_width);
        (
            (base - jitter).max(0.0),
            base + self.spread(half_width) + jitter,
        )
    }

    pub fn validate(&self) -> Result<()> {
        let fractions = [
            ("base_offset_fraction", self.base_offset_fraction),
            ("spread_fraction", self.spread_fraction),
            ("jitter_fraction", self.jitter_fraction),
            ("crown_height_fraction", self.crown_height_fraction),
        ];
        for (name, value) in fractions {
            if !(value.is_finite() && value >= 0.0) {
                return Err(EngineError::config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        // A leaf must never be pushed across the center onto the other side.
        if self.jitter_fraction * self.spread_fraction >= self.base_offset_fraction {
            return Err(EngineError::config(
                "jitter_fraction * spread_fraction must stay below base_offset_fraction",
            ));
        }
        if !(self.rotation_range_deg.is_finite() && self.rotation_range_deg >= 0.0) {
            return Err(EngineError::config(
                "rotation_range_deg must be a non-negative number",
            ));
        }
        if !(self.min_scale > 0.0 && self.min_scale <= self.max_scale && self.max_scale.is_finite())
        {
            return Err(EngineError::config(format!(
                "scale range {}..={} is invalid",
                self.min_scale, self.max_scale
            )));
        }
        Ok(())
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_cycles: u32,
    pub leaf_count: usize,
    pub bounds: Bounds,
    pub timings: Timings,
    pub placement: PlacementConfig,
    /// Seed for the placement and jitter RNG; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cycles: 2,
            leaf_count: 5,
            bounds: Bounds::default(),
            timings: Timings::default(),
            placement: PlacementConfig::default(),
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_cycles == 0 {
            return Err(EngineError::config("max_cycles must be at least 1"));
        }
        if self.leaf_count <= 1 {
            return Err(EngineError::config(format!(
                "leaf_count must be at least 2, got {}",
                self.leaf_count
            )));
        }
        self.bounds.validate()?;
        self.timings.validate()?;
        self.placement.validate()
    }

    /// Parses and validates a JSON document. Missing fields take defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}
