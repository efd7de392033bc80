use crate::flow::FlowField;
use crate::params::{RunConfig, TileShape};
use crate::surface::TrailSurface;
use image::Rgba;
use rand::Rng;
use std::f32::consts::TAU;
use std::sync::Arc;

/// One simulated tile following the flow field.
///
/// Velocity is not reset each tick; the flow-field acceleration is the only
/// impulse, so motion is a smoothed random walk rather than a direct
/// angle-follow.
pub struct Particle {
    pub x: f32,
    pub y: f32,
    vx: f32,
    vy: f32,
    ax: f32,
    ay: f32,

    size: f32,
    r: u8,
    g: u8,
    b: u8,

    age: u32,
    life: u32,

    // Per-instance spread, drawn once at construction
    force_scale: f32,
    max_speed_scale: f32,

    fade: f32,
    scale: f32,

    /// Only reachable when wrap-at-edge is disabled
    pub dead: bool,

    cfg: Arc<RunConfig>,
}

impl Particle {
    pub fn new(
        x: f32,
        y: f32,
        size: f32,
        color: [u8; 3],
        cfg: Arc<RunConfig>,
        rng: &mut impl Rng,
    ) -> Self {
        let a = rng.gen_range(0.0..TAU);
        Self {
            x,
            y,
            vx: a.cos(),
            vy: a.sin(),
            ax: 0.0,
            ay: 0.0,
            size,
            r: color[0],
            g: color[1],
            b: color[2],
            age: 0,
            life: cfg.move_frames,
            force_scale: rng.gen_range(0.6..1.4),
            max_speed_scale: rng.gen_range(0.7..1.3),
            fade: 255.0,
            scale: 1.0,
            dead: false,
            cfg,
        }
    }

    /// Advance one frame along the flow field. No-op once the lifetime is
    /// spent.
    pub fn advance(&mut self, field: &FlowField, zoff: f64, width: u32, height: u32) {
        if self.age >= self.life {
            return;
        }
        self.age += 1;

        // Steer from the flow field at this particle's grid cell
        let c = self.cfg.cell_size as f32;
        let cell_x = (self.x / c).floor() as i32;
        let cell_y = (self.y / c).floor() as i32;
        let angle = field.angle(cell_x, cell_y, zoff);

        self.ax += angle.cos() * self.cfg.force * self.force_scale;
        self.ay += angle.sin() * self.cfg.force * self.force_scale;

        self.vx += self.ax;
        self.vy += self.ay;

        let t = self.age as f32 / self.life as f32;
        self.fade = 255.0 + (255.0 * self.cfg.tile_alpha - 255.0) * t;
        self.scale = 1.0 + (self.cfg.tile_scale - 1.0) * t;

        // Clamp speed by rescaling the velocity vector
        let speed = (self.vx * self.vx + self.vy * self.vy).sqrt();
        let limit = self.cfg.max_speed * self.max_speed_scale;
        if speed > limit {
            let k = limit / speed;
            self.vx *= k;
            self.vy *= k;
        }

        self.x += self.vx;
        self.y += self.vy;

        self.ax = 0.0;
        self.ay = 0.0;

        let (w, h) = (width as f32, height as f32);
        if self.cfg.wrap_edges {
            self.x = self.x.rem_euclid(w);
            self.y = self.y.rem_euclid(h);
        } else if self.x < 0.0 || self.x >= w || self.y < 0.0 || self.y >= h {
            self.dead = true;
        }
    }

    /// Burn this tile into the trail layer
    pub fn paint(&self, surface: &mut TrailSurface) {
        if self.dead {
            return;
        }

        let (px, py) = if self.cfg.snap_to_grid {
            (
                (self.x / self.size).floor() * self.size + self.size * 0.5,
                (self.y / self.size).floor() * self.size + self.size * 0.5,
            )
        } else {
            (self.x, self.y)
        };

        let alpha = self.fade.round().clamp(0.0, 255.0) as u8;
        let color = Rgba([self.r, self.g, self.b, alpha]);
        let draw_size = self.size * self.scale;

        match self.cfg.tile_shape {
            TileShape::Circle => surface.fill_circle(px, py, draw_size, color),
            TileShape::Rect => surface.fill_rect(px, py, draw_size, color),
        }
    }

    pub fn speed(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }

    pub fn expired(&self) -> bool {
        self.age >= self.life
    }
}
