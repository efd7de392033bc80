use crate::error::RunError;
use crate::segment::{DetectCapability, Detection, OneShotDetect};
use image::{Rgba, RgbaImage};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Default timeout for bringing an engine up before the first run
pub const MODEL_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Which segmentation engine to construct
#[derive(Debug, Clone)]
pub enum EngineChoice {
    /// Read a pre-made mask image from disk
    MaskFile(PathBuf),
    /// Synthesize a mask from the source image's own luminance
    LumaThreshold(u8),
}

/// One-shot engine backed by a mask image on disk. The file is re-read on
/// every detect so an updated mask is picked up by the next run.
pub struct MaskFileDetector {
    path: PathBuf,
}

impl MaskFileDetector {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl OneShotDetect for MaskFileDetector {
    fn detect(&self, _source: &RgbaImage) -> Result<Detection, RunError> {
        let mask = image::open(&self.path)
            .map_err(|e| RunError::DetectionFailed(format!("{}: {e}", self.path.display())))?
            .to_rgba8();
        Ok(Detection::from_mask(mask))
    }
}

/// One-shot engine that thresholds the source image's luminance. Produces a
/// fully opaque grayscale mask (dark below the threshold), so downstream
/// classification takes the luminance path and marks dark regions as the
/// foreground.
pub struct LumaThresholdDetector {
    threshold: u8,
}

impl LumaThresholdDetector {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }
}

impl OneShotDetect for LumaThresholdDetector {
    fn detect(&self, source: &RgbaImage) -> Result<Detection, RunError> {
        let mut mask = RgbaImage::new(source.width(), source.height());
        for (x, y, px) in source.enumerate_pixels() {
            let [r, g, b, _] = px.0;
            let luma = ((r as u16 + g as u16 + b as u16) / 3) as u8;
            let v = if luma < self.threshold { 0 } else { 255 };
            mask.put_pixel(x, y, Rgba([v, v, v, 255]));
        }
        Ok(Detection::from_mask(mask))
    }
}

/// Run an engine constructor with a deadline. Construction happens on its
/// own thread; if it does not finish in time the caller gets
/// `ModelLoadTimeout` and the straggler is abandoned.
pub fn load_with_timeout<F>(build: F, timeout: Duration) -> Result<DetectCapability, RunError>
where
    F: FnOnce() -> Result<DetectCapability, RunError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(build());
    });
    rx.recv_timeout(timeout)
        .map_err(|_| RunError::ModelLoadTimeout)?
}

/// Construct and validate the chosen engine
pub fn load_capability(
    choice: EngineChoice,
    timeout: Duration,
) -> Result<DetectCapability, RunError> {
    load_with_timeout(
        move || match choice {
            EngineChoice::MaskFile(path) => {
                // fail at startup rather than on the first PLAY
                image::open(&path).map_err(|e| {
                    RunError::InferenceUnavailable(format!("{}: {e}", path.display()))
                })?;
                Ok(DetectCapability::OneShot(std::sync::Arc::new(
                    MaskFileDetector::new(path),
                )))
            }
            EngineChoice::LumaThreshold(threshold) => Ok(DetectCapability::OneShot(
                std::sync::Arc::new(LumaThresholdDetector::new(threshold)),
            )),
        },
        timeout,
    )
}
