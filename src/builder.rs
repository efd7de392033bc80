use crate::mask::{self, MaskClassification};
use crate::params::RunConfig;
use crate::particle::Particle;
use image::RgbaImage;
use rand::Rng;
use std::sync::Arc;

/// Resumable cursor over the cell grid. The scan is row-major in steps of
/// `cell_size`; `advance_chunk` moves it forward by at most one budget's worth
/// of cells per call so a tick never stalls on a large image.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildState {
    bx: u32,
    by: u32,
    cell: u32,
    done: u32,
    total: u32,
}

impl BuildState {
    pub fn start(cfg: &RunConfig, width: u32, height: u32) -> Self {
        let cell = cfg.cell_size.max(1);
        let cols = width.div_ceil(cell);
        let rows = height.div_ceil(cell);
        Self {
            bx: 0,
            by: 0,
            cell,
            done: 0,
            total: cols * rows,
        }
    }

    pub fn complete(&self) -> bool {
        self.done >= self.total
    }

    /// Fraction of cells examined so far, in [0, 1]
    pub fn progress(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        self.done as f32 / self.total as f32
    }

    /// Examine up to `budget` cells, appending a particle for each cell that
    /// matches the configured layer (foreground or background). Returns true
    /// when the scan has covered the whole grid.
    pub fn advance_chunk(
        &mut self,
        budget: u32,
        base: &RgbaImage,
        mask: &RgbaImage,
        info: &MaskClassification,
        cfg: &Arc<RunConfig>,
        particles: &mut Vec<Particle>,
        rng: &mut impl Rng,
    ) -> bool {
        let (width, height) = base.dimensions();
        let c = self.cell;
        let mut steps = 0u32;

        while steps < budget && self.by < height {
            let bw = c.min(width - self.bx);
            let bh = c.min(height - self.by);

            let is_fg = mask::block_is_foreground(
                mask,
                info,
                self.bx as f32,
                self.by as f32,
                bw as f32,
                bh as f32,
            );
            let take = if cfg.select_foreground { is_fg } else { !is_fg };

            if take {
                let cx = self.bx as f32 + bw as f32 * 0.5;
                let cy = self.by as f32 + bh as f32 * 0.5;
                let color = sample_rgb(base, cx, cy);
                particles.push(Particle::new(cx, cy, c as f32, color, Arc::clone(cfg), rng));
            }

            self.done += 1;
            steps += 1;

            self.bx += c;
            if self.bx >= width {
                self.bx = 0;
                self.by += c;
            }
        }

        self.by >= height
    }
}

/// Pixel color at (x, y), clamped into bounds, alpha dropped
fn sample_rgb(img: &RgbaImage, x: f32, y: f32) -> [u8; 3] {
    let (w, h) = img.dimensions();
    let ix = (x.floor() as i64).clamp(0, w as i64 - 1) as u32;
    let iy = (y.floor() as i64).clamp(0, h as i64 - 1) as u32;
    let [r, g, b, _] = img.get_pixel(ix, iy).0;
    [r, g, b]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::classify;
    use crate::params::TileParams;
    use image::Rgba;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cfg_with(mutate: impl FnOnce(&mut TileParams)) -> Arc<RunConfig> {
        let mut params = TileParams::default();
        mutate(&mut params);
        Arc::new(params.snapshot())
    }

    /// Mask with a fully transparent left quarter. The transparent region is
    /// the minority, so classification marks it as the foreground.
    fn split_mask(w: u32, h: u32) -> RgbaImage {
        let mut mask = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
        for y in 0..h {
            for x in 0..w / 4 {
                mask.put_pixel(x, y, Rgba([0, 0, 0, 0]));
            }
        }
        mask
    }

    fn run_build(
        budget: u32,
        base: &RgbaImage,
        mask: &RgbaImage,
        cfg: &Arc<RunConfig>,
    ) -> (Vec<Particle>, u32) {
        let info = classify(mask);
        let mut state = BuildState::start(cfg, base.width(), base.height());
        let mut particles = Vec::new();
        let mut rng = StdRng::seed_from_u64(7);
        let mut chunks = 0;
        while !state.advance_chunk(budget, base, mask, &info, cfg, &mut particles, &mut rng) {
            chunks += 1;
            assert!(chunks < 100_000, "build did not terminate");
        }
        assert!(state.complete());
        assert!((state.progress() - 1.0).abs() < f32::EPSILON);
        (particles, chunks + 1)
    }

    #[test]
    fn all_foreground_image_fills_every_cell() {
        let base = RgbaImage::from_pixel(100, 100, Rgba([50, 60, 70, 255]));
        let mask = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255])); // dark = fg
        let cfg = cfg_with(|p| p.cell_size = 10);
        let (particles, _) = run_build(u32::MAX, &base, &mask, &cfg);
        assert_eq!(particles.len(), 100);
    }

    #[test]
    fn chunk_budget_does_not_change_the_result() {
        let base = RgbaImage::from_pixel(64, 48, Rgba([10, 10, 10, 255]));
        let mask = split_mask(64, 48);
        let cfg = cfg_with(|p| p.cell_size = 8);

        let (all_at_once, chunks_a) = run_build(u32::MAX, &base, &mask, &cfg);
        let (one_by_one, chunks_b) = run_build(1, &base, &mask, &cfg);

        assert_eq!(chunks_a, 1);
        assert_eq!(chunks_b, 48); // 8x6 grid, one cell per chunk
        assert_eq!(all_at_once.len(), one_by_one.len());
        for (a, b) in all_at_once.iter().zip(one_by_one.iter()) {
            assert_eq!((a.x, a.y), (b.x, b.y));
        }
    }

    #[test]
    fn background_selection_inverts_the_layer() {
        let base = RgbaImage::from_pixel(64, 48, Rgba([10, 10, 10, 255]));
        let mask = split_mask(64, 48);

        let fg_cfg = cfg_with(|p| {
            p.cell_size = 8;
            p.select_foreground = true;
        });
        let bg_cfg = cfg_with(|p| {
            p.cell_size = 8;
            p.select_foreground = false;
        });

        let (fg, _) = run_build(u32::MAX, &base, &mask, &fg_cfg);
        let (bg, _) = run_build(u32::MAX, &base, &mask, &bg_cfg);

        // left quarter = 2 cols x 6 rows foreground, rest background
        assert_eq!(fg.len(), 12);
        assert_eq!(bg.len(), 36);
        assert!(fg.iter().all(|p| p.x < 16.0));
        assert!(bg.iter().all(|p| p.x >= 16.0));
    }

    #[test]
    fn particles_take_the_base_image_color() {
        let base = RgbaImage::from_pixel(20, 20, Rgba([201, 102, 53, 255]));
        let mask = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        let cfg = cfg_with(|p| p.cell_size = 10);
        let info = classify(&mask);

        let mut state = BuildState::start(&cfg, 20, 20);
        let mut particles = Vec::new();
        let mut rng = StdRng::seed_from_u64(1);
        state.advance_chunk(u32::MAX, &base, &mask, &info, &cfg, &mut particles, &mut rng);

        let mut trail = crate::surface::TrailSurface::new(20, 20);
        particles[0].paint(&mut trail);
        let (sx, sy) = (particles[0].x as u32, particles[0].y as u32);
        assert_eq!(trail.image().get_pixel(sx, sy).0[..3], [201, 102, 53]);
    }

    #[test]
    fn partial_edge_cells_are_still_scanned() {
        // 25x25 with cell 10: 3x3 grid including 5px-wide edge cells
        let base = RgbaImage::from_pixel(25, 25, Rgba([0, 0, 0, 255]));
        let mask = RgbaImage::from_pixel(25, 25, Rgba([0, 0, 0, 255]));
        let cfg = cfg_with(|p| p.cell_size = 10);
        let (particles, _) = run_build(u32::MAX, &base, &mask, &cfg);
        assert_eq!(particles.len(), 9);
        // edge-cell centers stay inside the canvas
        assert!(particles.iter().all(|p| p.x < 25.0 && p.y < 25.0));
    }

    #[test]
    fn progress_advances_monotonically() {
        let base = RgbaImage::from_pixel(40, 40, Rgba([0, 0, 0, 255]));
        let mask = RgbaImage::from_pixel(40, 40, Rgba([0, 0, 0, 255]));
        let cfg = cfg_with(|p| p.cell_size = 10);
        let info = classify(&mask);

        let mut state = BuildState::start(&cfg, 40, 40);
        let mut particles = Vec::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut last = 0.0;
        loop {
            let done = state.advance_chunk(3, &base, &mask, &info, &cfg, &mut particles, &mut rng);
            assert!(state.progress() >= last);
            last = state.progress();
            if done {
                break;
            }
        }
        assert_eq!(last, 1.0);
    }
}
