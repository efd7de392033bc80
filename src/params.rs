use serde::{Deserialize, Serialize};

/// Shape used when burning a tile into the trail layer
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum TileShape {
    #[default]
    Rect,
    Circle,
}

impl TileShape {
    pub fn name(&self) -> &str {
        match self {
            TileShape::Rect => "Rect",
            TileShape::Circle => "Circle",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            TileShape::Rect => TileShape::Circle,
            TileShape::Circle => TileShape::Rect,
        }
    }

    pub fn prev(&self) -> Self {
        self.next()
    }
}

/// Live, editable parameters. Edits never reach an active run: `snapshot()`
/// freezes them into a `RunConfig` once per PLAY.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileParams {
    /// Source image path
    pub image_path: String,

    // === Grid / tiles ===
    /// Grid cell size in pixels (1-50)
    pub cell_size: u32,
    /// Tile shape when painting
    pub tile_shape: TileShape,
    /// Total lifetime of the animation in frames (>= 1)
    pub move_frames: u32,
    /// Speed limit before per-instance scaling (1.0-10.0)
    pub max_speed: f32,
    /// Snap painted tiles back onto the cell grid
    pub snap_to_grid: bool,
    /// Seed tiles on foreground cells (false = background cells)
    pub select_foreground: bool,

    // === Flow field ===
    /// Noise frequency per grid cell (0.001-0.1)
    pub flow_freq: f32,
    /// Steering angle multiplier (0.1-10.0)
    pub flow_twist: f32,
    /// Time-axis advance per frame (0.001-1.0)
    pub flow_z_speed: f32,
    /// Acceleration impulse magnitude (0.01-5.0)
    pub force: f32,

    // === Fade / scale over lifetime ===
    /// Tile alpha at end of life (0.0-1.0), interpolated from 1.0
    pub tile_alpha: f32,
    /// Tile size scale at end of life (0.1-3.0), interpolated from 1.0
    pub tile_scale: f32,

    /// Noise and per-particle randomness seed (1-100000)
    pub noise_seed: u32,
    /// Wrap at canvas edges (false = particles die off-canvas)
    pub wrap_edges: bool,
}

impl Default for TileParams {
    fn default() -> Self {
        Self {
            image_path: String::new(),
            cell_size: 10,
            tile_shape: TileShape::Rect,
            move_frames: 180,
            max_speed: 2.8,
            snap_to_grid: true,
            select_foreground: true,
            flow_freq: 0.08,
            flow_twist: 2.0,
            flow_z_speed: 0.1,
            force: 0.2,
            tile_alpha: 1.0,
            tile_scale: 1.0,
            noise_seed: 37452,
            wrap_edges: true,
        }
    }
}

/// Clamp a float, substituting a default for non-finite input
fn clamp_finite(v: f32, lo: f32, hi: f32, default: f32) -> f32 {
    if v.is_finite() {
        v.clamp(lo, hi)
    } else {
        default
    }
}

impl TileParams {
    /// Validating snapshot taken once per PLAY. Every field is clamped to
    /// its range; non-finite input falls back to the default rather than
    /// failing.
    pub fn snapshot(&self) -> RunConfig {
        RunConfig {
            image_path: self.image_path.clone(),
            cell_size: self.cell_size.clamp(1, 50),
            tile_shape: self.tile_shape,
            move_frames: self.move_frames.max(1),
            max_speed: clamp_finite(self.max_speed, 1.0, 10.0, 2.8),
            snap_to_grid: self.snap_to_grid,
            select_foreground: self.select_foreground,
            flow_freq: clamp_finite(self.flow_freq, 0.001, 0.1, 0.08),
            flow_twist: clamp_finite(self.flow_twist, 0.1, 10.0, 2.0),
            flow_z_speed: clamp_finite(self.flow_z_speed, 0.001, 1.0, 0.1),
            force: clamp_finite(self.force, 0.01, 5.0, 0.2),
            tile_alpha: clamp_finite(self.tile_alpha, 0.0, 1.0, 1.0),
            tile_scale: clamp_finite(self.tile_scale, 0.1, 3.0, 1.0),
            noise_seed: self.noise_seed.clamp(1, 100_000),
            wrap_edges: self.wrap_edges,
        }
    }

    // === Keyboard adjusters (all clamped) ===

    pub fn adjust_cell_size(&mut self, delta: i32) {
        self.cell_size = (self.cell_size as i32 + delta).clamp(1, 50) as u32;
    }

    pub fn adjust_move_frames(&mut self, delta: i32) {
        self.move_frames = (self.move_frames as i32 + delta).max(1) as u32;
    }

    pub fn adjust_max_speed(&mut self, delta: f32) {
        self.max_speed = (self.max_speed + delta).clamp(1.0, 10.0);
    }

    pub fn adjust_flow_freq(&mut self, delta: f32) {
        self.flow_freq = (self.flow_freq + delta).clamp(0.001, 0.1);
    }

    pub fn adjust_flow_twist(&mut self, delta: f32) {
        self.flow_twist = (self.flow_twist + delta).clamp(0.1, 10.0);
    }

    pub fn adjust_flow_z_speed(&mut self, delta: f32) {
        self.flow_z_speed = (self.flow_z_speed + delta).clamp(0.001, 1.0);
    }

    pub fn adjust_force(&mut self, delta: f32) {
        self.force = (self.force + delta).clamp(0.01, 5.0);
    }

    pub fn adjust_tile_alpha(&mut self, delta: f32) {
        self.tile_alpha = (self.tile_alpha + delta).clamp(0.0, 1.0);
    }

    pub fn adjust_tile_scale(&mut self, delta: f32) {
        self.tile_scale = (self.tile_scale + delta).clamp(0.1, 3.0);
    }

    pub fn adjust_noise_seed(&mut self, delta: i32) {
        self.noise_seed = (self.noise_seed as i32 + delta).clamp(1, 100_000) as u32;
    }
}

/// Immutable per-run configuration. Once a run starts this is never mutated;
/// UI edits during a run must not affect it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub image_path: String,
    pub cell_size: u32,
    pub tile_shape: TileShape,
    pub move_frames: u32,
    pub max_speed: f32,
    pub snap_to_grid: bool,
    pub select_foreground: bool,
    pub flow_freq: f32,
    pub flow_twist: f32,
    pub flow_z_speed: f32,
    pub force: f32,
    pub tile_alpha: f32,
    pub tile_scale: f32,
    pub noise_seed: u32,
    pub wrap_edges: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_clamps_out_of_range_values() {
        let params = TileParams {
            cell_size: 500,
            move_frames: 0,
            max_speed: 99.0,
            flow_freq: -1.0,
            flow_twist: 100.0,
            force: 0.0,
            tile_alpha: 2.0,
            noise_seed: 9_999_999,
            ..Default::default()
        };
        let cfg = params.snapshot();
        assert_eq!(cfg.cell_size, 50);
        assert_eq!(cfg.move_frames, 1);
        assert_eq!(cfg.max_speed, 10.0);
        assert_eq!(cfg.flow_freq, 0.001);
        assert_eq!(cfg.flow_twist, 10.0);
        assert_eq!(cfg.force, 0.01);
        assert_eq!(cfg.tile_alpha, 1.0);
        assert_eq!(cfg.noise_seed, 100_000);
    }

    #[test]
    fn snapshot_substitutes_defaults_for_non_finite_input() {
        let params = TileParams {
            max_speed: f32::NAN,
            flow_freq: f32::INFINITY,
            flow_z_speed: f32::NEG_INFINITY,
            tile_scale: f32::NAN,
            ..Default::default()
        };
        let cfg = params.snapshot();
        assert_eq!(cfg.max_speed, 2.8);
        assert_eq!(cfg.flow_freq, 0.08);
        assert_eq!(cfg.flow_z_speed, 0.1);
        assert_eq!(cfg.tile_scale, 1.0);
    }

    #[test]
    fn adjusters_stay_in_range() {
        let mut params = TileParams::default();
        for _ in 0..100 {
            params.adjust_cell_size(10);
            params.adjust_max_speed(1.0);
            params.adjust_flow_freq(0.05);
        }
        assert_eq!(params.cell_size, 50);
        assert_eq!(params.max_speed, 10.0);
        assert_eq!(params.flow_freq, 0.1);

        for _ in 0..100 {
            params.adjust_cell_size(-10);
            params.adjust_max_speed(-1.0);
            params.adjust_noise_seed(-1_000_000);
        }
        assert_eq!(params.cell_size, 1);
        assert_eq!(params.max_speed, 1.0);
        assert_eq!(params.noise_seed, 1);
    }

    #[test]
    fn config_serialization_roundtrip() {
        let cfg = TileParams::default().snapshot();
        let json = serde_json::to_string(&cfg).unwrap();
        let parsed: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cfg);
    }
}
