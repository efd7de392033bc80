use image::RgbaImage;

/// Alpha below this counts as a transparent-like sample
const ALPHA_LOW: u8 = 16;
/// Alpha above this counts as an opaque-like sample
const ALPHA_HIGH: u8 = 239;
/// Classification sampling stride (every 4th row and column)
const SAMPLE_STRIDE: usize = 4;

/// How a mask encodes the foreground/background split, derived once per mask
/// and reused for every per-cell query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskClassification {
    /// The mask carries meaningful transparency
    pub has_transparency: bool,
    /// The foreground (typically the smaller region) is the transparent side.
    /// Only meaningful when `has_transparency` is true.
    pub foreground_is_transparent: bool,
    /// Luminance midpoint for the no-transparency fallback. The polarity
    /// (foreground below the midpoint) is a tunable assumption, not an
    /// invariant; it matches the segmentation engines shipped here.
    pub luma_midpoint: u8,
}

/// Classify a mask by a strided sample of its alpha channel.
///
/// `has_transparency` is true iff any transparent-like pixel was observed.
/// When true, the foreground side is picked by minority vote: fewer
/// transparent-like samples than opaque-like implies the foreground is the
/// transparent side.
pub fn classify(mask: &RgbaImage) -> MaskClassification {
    let (w, h) = mask.dimensions();
    let mut transparent = 0u32;
    let mut opaque = 0u32;

    for y in (0..h as usize).step_by(SAMPLE_STRIDE) {
        for x in (0..w as usize).step_by(SAMPLE_STRIDE) {
            let a = mask.get_pixel(x as u32, y as u32).0[3];
            if a < ALPHA_LOW {
                transparent += 1;
            } else if a > ALPHA_HIGH {
                opaque += 1;
            }
        }
    }

    let has_transparency = transparent > 0;
    MaskClassification {
        has_transparency,
        foreground_is_transparent: has_transparency && transparent < opaque,
        luma_midpoint: 128,
    }
}

/// Is the pixel at (x, y) foreground? Coordinates are clamped into bounds.
pub fn is_foreground_at(mask: &RgbaImage, info: &MaskClassification, x: f32, y: f32) -> bool {
    let (w, h) = mask.dimensions();
    let ix = (x.floor() as i64).clamp(0, w as i64 - 1) as u32;
    let iy = (y.floor() as i64).clamp(0, h as i64 - 1) as u32;
    let px = mask.get_pixel(ix, iy);
    let [r, g, b, a] = px.0;

    if info.has_transparency {
        if info.foreground_is_transparent {
            a < 128
        } else {
            a >= 128
        }
    } else {
        let luma = (r as u16 + g as u16 + b as u16) / 3;
        (luma as u8) < info.luma_midpoint
    }
}

/// Cell-level foreground verdict: center plus the four corners inset by
/// 1-2 px, majority vote (>= 3 of 5). Smooths mask-edge noise compared to
/// single-point sampling.
pub fn block_is_foreground(
    mask: &RgbaImage,
    info: &MaskClassification,
    bx: f32,
    by: f32,
    bw: f32,
    bh: f32,
) -> bool {
    let votes = is_foreground_at(mask, info, bx + bw * 0.5, by + bh * 0.5) as u8
        + is_foreground_at(mask, info, bx + 1.0, by + 1.0) as u8
        + is_foreground_at(mask, info, bx + bw - 2.0, by + 1.0) as u8
        + is_foreground_at(mask, info, bx + 1.0, by + bh - 2.0) as u8
        + is_foreground_at(mask, info, bx + bw - 2.0, by + bh - 2.0) as u8;
    votes >= 3
}
