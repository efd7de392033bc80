use crate::error::RunError;
use crate::mask;
use crate::run::{RunEvent, RunToken};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Default per-attempt detection timeout
pub const DETECT_TIMEOUT: Duration = Duration::from_secs(20);
/// Default number of detection attempts before giving up
pub const DETECT_RETRY_MAX: u32 = 3;
/// Default pause between failed attempts
pub const DETECT_BACKOFF: Duration = Duration::from_millis(400);

/// Raw result of one detection, before mask normalization. Engines populate
/// whichever field their API produces; `into_mask` resolves them in priority
/// order.
pub struct Detection {
    pub mask: Option<RgbaImage>,
    pub segmentation_mask: Option<RgbaImage>,
    pub mask_image: Option<RgbaImage>,
}

impl Detection {
    pub fn from_mask(mask: RgbaImage) -> Self {
        Self {
            mask: Some(mask),
            segmentation_mask: None,
            mask_image: None,
        }
    }

    /// First populated mask field wins; a detection with none is an error
    pub fn into_mask(self) -> Result<RgbaImage, RunError> {
        self.mask
            .or(self.segmentation_mask)
            .or(self.mask_image)
            .ok_or(RunError::MaskNotFound)
    }
}

/// Engine that answers a single detect call synchronously
pub trait OneShotDetect: Send + Sync {
    fn detect(&self, source: &RgbaImage) -> Result<Detection, RunError>;
}

/// Engine that must be started and later stopped, delivering results through
/// a sink. May deliver more than one result; callers take the first.
pub trait StreamingDetect: Send + Sync {
    fn detect_start(&self, source: &RgbaImage, sink: Sender<Result<Detection, RunError>>);
    fn detect_stop(&self);
}

/// The two engine shapes supported. A closed enum rather than probing the
/// engine object for methods: an engine is one or the other by construction.
#[derive(Clone)]
pub enum DetectCapability {
    OneShot(Arc<dyn OneShotDetect>),
    Streaming(Arc<dyn StreamingDetect>),
}

impl DetectCapability {
    /// Tell a streaming engine to stop. No-op for one-shot engines.
    pub fn detect_stop(&self) {
        if let DetectCapability::Streaming(engine) = self {
            engine.detect_stop();
        }
    }
}

/// One detection attempt with exactly-once semantics.
///
/// The engine call runs on its own thread; the first result (or the timeout)
/// wins and later deliveries are dropped with the channel. Streaming engines
/// are always stopped afterwards, including on timeout.
pub fn detect_once(
    cap: &DetectCapability,
    source: Arc<RgbaImage>,
    timeout: Duration,
) -> Result<Detection, RunError> {
    let (tx, rx) = mpsc::channel();

    match cap {
        DetectCapability::OneShot(engine) => {
            let engine = Arc::clone(engine);
            thread::spawn(move || {
                let _ = tx.send(engine.detect(&source));
            });
        }
        DetectCapability::Streaming(engine) => {
            let engine = Arc::clone(engine);
            thread::spawn(move || {
                engine.detect_start(&source, tx);
            });
        }
    }

    let outcome = rx
        .recv_timeout(timeout)
        .map_err(|_| RunError::DetectionTimeout);
    // rx drops here: any late or extra deliveries fail to send and vanish
    drop(rx);
    cap.detect_stop();
    outcome?
}

/// Detection front door: owns the engine plus the retry policy, and runs
/// whole detect-and-classify jobs on worker threads.
pub struct SegmentationGateway {
    cap: DetectCapability,
    timeout: Duration,
    retry_max: u32,
    backoff: Duration,
}

impl SegmentationGateway {
    pub fn new(cap: DetectCapability) -> Self {
        Self {
            cap,
            timeout: DETECT_TIMEOUT,
            retry_max: DETECT_RETRY_MAX,
            backoff: DETECT_BACKOFF,
        }
    }

    pub fn with_policy(cap: DetectCapability, timeout: Duration, retry_max: u32, backoff: Duration) -> Self {
        Self {
            cap,
            timeout,
            retry_max: retry_max.max(1),
            backoff,
        }
    }

    pub fn capability(&self) -> &DetectCapability {
        &self.cap
    }

    /// Spawn a worker that attempts detection up to `retry_max` times and
    /// posts the outcome as run events. Mask normalization (resize to the
    /// canvas, classification) happens inside the attempt loop, so a mask
    /// the run cannot use is retried like a failed detect.
    pub fn spawn_detect(
        &self,
        token: RunToken,
        source: Arc<RgbaImage>,
        canvas_width: u32,
        canvas_height: u32,
        cancel: Arc<AtomicBool>,
        events: Sender<RunEvent>,
    ) {
        let cap = self.cap.clone();
        let timeout = self.timeout;
        let retry_max = self.retry_max;
        let backoff = self.backoff;

        thread::spawn(move || {
            let mut last_error = RunError::DetectionFailed("no attempts made".into());

            for attempt in 0..retry_max {
                if cancel.load(Ordering::Relaxed) {
                    return;
                }
                if attempt > 0 {
                    let _ = events.send(RunEvent::SegmentRetry { token, attempt });
                    thread::sleep(backoff);
                    if cancel.load(Ordering::Relaxed) {
                        return;
                    }
                }

                match detect_once(&cap, Arc::clone(&source), timeout)
                    .and_then(Detection::into_mask)
                {
                    Ok(raw) => {
                        // stretched to exactly canvas size, aspect ratio not
                        // preserved: mask and canvas pixels must line up 1:1
                        let mask = if raw.dimensions() == (canvas_width, canvas_height) {
                            raw
                        } else {
                            imageops::resize(&raw, canvas_width, canvas_height, FilterType::Triangle)
                        };
                        let info = mask::classify(&mask);
                        let _ = events.send(RunEvent::MaskReady { token, mask, info });
                        return;
                    }
                    Err(err) => last_error = err,
                }
            }

            let _ = events.send(RunEvent::SegmentFailed {
                token,
                error: last_error,
            });
        });
    }
}
