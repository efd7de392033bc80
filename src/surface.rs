use image::{imageops, imageops::FilterType, Rgba, RgbaImage};

/// Persistent trail layer particles are burned into.
///
/// Mutated only by the tick loop's paint calls, never by worker threads, and
/// cleared exactly once at run creation.
pub struct TrailSurface {
    img: RgbaImage,
}

impl TrailSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            img: RgbaImage::new(width.max(1), height.max(1)),
        }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    pub fn clear(&mut self) {
        for px in self.img.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.img
    }

    /// Fill a square of side `size` centered at (cx, cy), source-over blended
    pub fn fill_rect(&mut self, cx: f32, cy: f32, size: f32, color: Rgba<u8>) {
        let half = size * 0.5;
        let x0 = (cx - half).floor().max(0.0) as u32;
        let y0 = (cy - half).floor().max(0.0) as u32;
        let x1 = ((cx + half).ceil() as i64).clamp(0, self.img.width() as i64) as u32;
        let y1 = ((cy + half).ceil() as i64).clamp(0, self.img.height() as i64) as u32;
        for y in y0..y1 {
            for x in x0..x1 {
                blend_over(self.img.get_pixel_mut(x, y), color);
            }
        }
    }

    /// Fill a circle of diameter `size` centered at (cx, cy)
    pub fn fill_circle(&mut self, cx: f32, cy: f32, size: f32, color: Rgba<u8>) {
        let radius = size * 0.5;
        let r2 = radius * radius;
        let x0 = (cx - radius).floor().max(0.0) as u32;
        let y0 = (cy - radius).floor().max(0.0) as u32;
        let x1 = ((cx + radius).ceil() as i64).clamp(0, self.img.width() as i64) as u32;
        let y1 = ((cy + radius).ceil() as i64).clamp(0, self.img.height() as i64) as u32;
        for y in y0..y1 {
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= r2 {
                    blend_over(self.img.get_pixel_mut(x, y), color);
                }
            }
        }
    }

    /// Sample the trail composited over `base` at one pixel
    pub fn sample_over(&self, base: &RgbaImage, x: u32, y: u32) -> Rgba<u8> {
        let mut out = *base.get_pixel(
            x.min(base.width() - 1),
            y.min(base.height() - 1),
        );
        if x < self.img.width() && y < self.img.height() {
            blend_over(&mut out, *self.img.get_pixel(x, y));
        }
        out
    }

    /// Full composite of the trail over `base` (used by tests)
    #[cfg(test)]
    pub fn composite_over(&self, base: &RgbaImage) -> RgbaImage {
        let mut out = base.clone();
        for (x, y, px) in self.img.enumerate_pixels() {
            if x < out.width() && y < out.height() {
                blend_over(out.get_pixel_mut(x, y), *px);
            }
        }
        out
    }
}

/// Standard source-over alpha compositing
fn blend_over(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let sa = src.0[3] as f32 / 255.0;
    if sa <= 0.0 {
        return;
    }
    let da = dst.0[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        *dst = Rgba([0, 0, 0, 0]);
        return;
    }
    for i in 0..3 {
        let sc = src.0[i] as f32;
        let dc = dst.0[i] as f32;
        dst.0[i] = ((sc * sa + dc * da * (1.0 - sa)) / out_a).round() as u8;
    }
    dst.0[3] = (out_a * 255.0).round() as u8;
}

/// Scale a decoded image into the given bounds, preserving aspect ratio.
/// Small images are scaled up to fill the bounds, matching the canvas-fit
/// behavior of the stage.
pub fn fit_to_bounds(img: &RgbaImage, max_w: u32, max_h: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    let max_w = max_w.max(1);
    let max_h = max_h.max(1);
    let scale = (max_w as f32 / w as f32).min(max_h as f32 / h as f32);
    let fw = ((w as f32 * scale).floor() as u32).max(1);
    let fh = ((h as f32 * scale).floor() as u32).max(1);
    if fw == w && fh == h {
        return img.clone();
    }
    imageops::resize(img, fw, fh, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_fill_blends_over_base() {
        let mut trail = TrailSurface::new(20, 20);
        trail.fill_rect(10.0, 10.0, 4.0, Rgba([255, 0, 0, 255]));

        let base = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 255, 255]));
        let out = trail.composite_over(&base);
        assert_eq!(out.get_pixel(10, 10), &Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn half_alpha_fill_mixes_colors() {
        let mut trail = TrailSurface::new(8, 8);
        trail.fill_rect(4.0, 4.0, 8.0, Rgba([255, 255, 255, 128]));

        let base = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        let out = trail.composite_over(&base);
        let px = out.get_pixel(4, 4);
        assert!(px.0[0] > 100 && px.0[0] < 150, "got {:?}", px);
    }

    #[test]
    fn fills_clip_at_surface_edges() {
        let mut trail = TrailSurface::new(10, 10);
        trail.fill_rect(0.0, 0.0, 6.0, Rgba([10, 20, 30, 255]));
        trail.fill_circle(9.5, 9.5, 8.0, Rgba([10, 20, 30, 255]));
        assert_eq!(trail.image().get_pixel(0, 0).0[3], 255);
    }

    #[test]
    fn circle_fill_leaves_corners_empty() {
        let mut trail = TrailSurface::new(10, 10);
        trail.fill_circle(5.0, 5.0, 10.0, Rgba([255, 255, 255, 255]));
        assert_eq!(trail.image().get_pixel(0, 0).0[3], 0);
        assert_eq!(trail.image().get_pixel(5, 5).0[3], 255);
    }

    #[test]
    fn fit_preserves_aspect_ratio() {
        let img = RgbaImage::new(200, 100);
        let fitted = fit_to_bounds(&img, 100, 100);
        assert_eq!(fitted.dimensions(), (100, 50));
    }

    #[test]
    fn fit_scales_small_images_up() {
        let img = RgbaImage::new(50, 50);
        let fitted = fit_to_bounds(&img, 200, 100);
        assert_eq!(fitted.dimensions(), (100, 100));
    }

    #[test]
    fn fit_is_identity_when_already_fitting() {
        let img = RgbaImage::new(100, 50);
        let fitted = fit_to_bounds(&img, 100, 50);
        assert_eq!(fitted.dimensions(), (100, 50));
    }
}
