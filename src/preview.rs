use crate::surface::TrailSurface;
use image::{Rgba, RgbaImage};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

/// Half-block rendering for the image preview. Each terminal cell shows two
/// stacked pixels: the upper one as the foreground color of '▀', the lower
/// one as the background color, doubling the vertical resolution.
const HALF_BLOCK: char = '▀';

/// Render the trail composited over the base image into terminal lines.
///
/// The image is mapped onto a virtual grid of `cols` x `rows * 2` pixels,
/// aspect-fit with black letterboxing. Cell (terminal) coordinates follow
/// ratatui's one-Line-per-row convention.
pub fn render_preview(
    base: &RgbaImage,
    trail: &TrailSurface,
    cols: u16,
    rows: u16,
) -> Vec<Line<'static>> {
    let grid_w = cols as u32;
    let grid_h = rows as u32 * 2;
    if grid_w == 0 || grid_h == 0 {
        return Vec::new();
    }

    let (img_w, img_h) = base.dimensions();
    let scale = (grid_w as f32 / img_w as f32).min(grid_h as f32 / img_h as f32);
    let fit_w = ((img_w as f32 * scale) as u32).max(1).min(grid_w);
    let fit_h = ((img_h as f32 * scale) as u32).max(1).min(grid_h);
    let off_x = (grid_w - fit_w) / 2;
    let off_y = (grid_h - fit_h) / 2;

    // virtual pixel -> source pixel, or None in the letterbox margin
    let sample = |gx: u32, gy: u32| -> Option<Rgba<u8>> {
        if gx < off_x || gy < off_y || gx >= off_x + fit_w || gy >= off_y + fit_h {
            return None;
        }
        let sx = ((gx - off_x) as f32 / fit_w as f32 * img_w as f32) as u32;
        let sy = ((gy - off_y) as f32 / fit_h as f32 * img_h as f32) as u32;
        Some(trail.sample_over(base, sx.min(img_w - 1), sy.min(img_h - 1)))
    };

    let mut lines = Vec::with_capacity(rows as usize);
    for row in 0..rows as u32 {
        let mut spans = Vec::with_capacity(cols as usize);
        for col in 0..grid_w {
            let top = sample(col, row * 2);
            let bottom = sample(col, row * 2 + 1);
            spans.push(Span::styled(
                HALF_BLOCK.to_string(),
                Style::default()
                    .fg(to_terminal_color(top))
                    .bg(to_terminal_color(bottom)),
            ));
        }
        lines.push(Line::from(spans));
    }
    lines
}

/// Opaque composite over black, since the terminal has no alpha
fn to_terminal_color(px: Option<Rgba<u8>>) -> Color {
    match px {
        None => Color::Black,
        Some(Rgba([r, g, b, a])) => {
            let k = a as u16;
            Color::Rgb(
                ((r as u16 * k) / 255) as u8,
                ((g as u16 * k) / 255) as u8,
                ((b as u16 * k) / 255) as u8,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fg_of(line: &Line<'_>, col: usize) -> Color {
        line.spans[col].style.fg.unwrap()
    }

    #[test]
    fn preview_has_one_line_per_row() {
        let base = RgbaImage::from_pixel(40, 40, Rgba([255, 0, 0, 255]));
        let trail = TrailSurface::new(40, 40);
        let lines = render_preview(&base, &trail, 20, 10);
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0].spans.len(), 20);
    }

    #[test]
    fn square_image_in_wide_grid_is_letterboxed() {
        let base = RgbaImage::from_pixel(10, 10, Rgba([0, 255, 0, 255]));
        let trail = TrailSurface::new(10, 10);
        // grid 40x(5*2=10): image fits 10x10, centered with 15-col margins
        let lines = render_preview(&base, &trail, 40, 5);
        assert_eq!(fg_of(&lines[2], 0), Color::Black);
        assert_eq!(fg_of(&lines[2], 20), Color::Rgb(0, 255, 0));
        assert_eq!(fg_of(&lines[2], 39), Color::Black);
    }

    #[test]
    fn trail_pixels_show_over_the_base() {
        let base = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255]));
        let mut trail = TrailSurface::new(8, 8);
        trail.fill_rect(4.0, 4.0, 8.0, Rgba([255, 255, 0, 255]));
        // grid matches the image exactly
        let lines = render_preview(&base, &trail, 8, 4);
        assert_eq!(fg_of(&lines[2], 4), Color::Rgb(255, 255, 0));
    }

    #[test]
    fn empty_grid_renders_nothing() {
        let base = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let trail = TrailSurface::new(4, 4);
        assert!(render_preview(&base, &trail, 0, 0).is_empty());
    }
}
