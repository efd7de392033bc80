use crate::builder::BuildState;
use crate::error::RunError;
use crate::flow::FlowField;
use crate::mask::MaskClassification;
use crate::params::RunConfig;
use crate::particle::Particle;
use image::RgbaImage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lifecycle phase of an active run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    LoadingImage,
    Segmenting,
    BuildingLayer,
    Rendering,
    Done,
}

impl RunPhase {
    pub fn name(&self) -> &'static str {
        match self {
            RunPhase::LoadingImage => "LOADING_IMAGE",
            RunPhase::Segmenting => "SEGMENTING",
            RunPhase::BuildingLayer => "BUILDING_LAYER",
            RunPhase::Rendering => "RENDERING",
            RunPhase::Done => "DONE",
        }
    }
}

/// Monotonic identity of one PLAY press. Worker results carry the token of
/// the run that spawned them; results whose token no longer matches the
/// current run are discarded.
pub type RunToken = u64;

/// Messages posted by worker threads back to the tick loop.
///
/// Image payloads travel by value: a worker never holds a reference into run
/// state, so a stale worker can at worst produce a message that gets dropped.
pub enum RunEvent {
    ImageLoaded {
        token: RunToken,
        image: RgbaImage,
    },
    ImageLoadFailed {
        token: RunToken,
        error: RunError,
    },
    MaskReady {
        token: RunToken,
        mask: RgbaImage,
        info: MaskClassification,
    },
    SegmentRetry {
        token: RunToken,
        attempt: u32,
    },
    SegmentFailed {
        token: RunToken,
        error: RunError,
    },
}

impl RunEvent {
    pub fn token(&self) -> RunToken {
        match self {
            RunEvent::ImageLoaded { token, .. }
            | RunEvent::ImageLoadFailed { token, .. }
            | RunEvent::MaskReady { token, .. }
            | RunEvent::SegmentRetry { token, .. }
            | RunEvent::SegmentFailed { token, .. } => *token,
        }
    }
}

/// All state owned by one PLAY-to-completion cycle. Dropped wholesale on
/// STOP, error, or a new PLAY; nothing in here outlives its token.
pub struct Run {
    pub token: RunToken,
    pub cancel: Arc<AtomicBool>,
    pub phase: RunPhase,
    pub cfg: Arc<RunConfig>,
    pub field: FlowField,
    pub rng: StdRng,

    pub mask: Option<RgbaImage>,
    pub mask_info: Option<MaskClassification>,
    pub particles: Vec<Particle>,
    pub build: Option<BuildState>,

    /// Time axis of the flow field, advanced once per rendered frame
    pub zoff: f64,
    pub render_frame: u32,
    /// A detect is in flight; STOP must also signal the engine
    pub detecting: bool,
}

impl Run {
    pub fn new(token: RunToken, cfg: RunConfig) -> Self {
        let field = FlowField::new(cfg.noise_seed, cfg.flow_freq, cfg.flow_twist);
        let rng = StdRng::seed_from_u64(cfg.noise_seed as u64);
        Self {
            token,
            cancel: Arc::new(AtomicBool::new(false)),
            phase: RunPhase::LoadingImage,
            cfg: Arc::new(cfg),
            field,
            rng,
            mask: None,
            mask_info: None,
            particles: Vec::new(),
            build: None,
            zoff: 0.0,
            render_frame: 0,
            detecting: false,
        }
    }

    pub fn canceled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// A worker result is only valid if it was produced for this run and the
    /// run has not been canceled since.
    pub fn is_alive(&self, token: RunToken) -> bool {
        self.token == token && !self.canceled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::TileParams;

    #[test]
    fn fresh_run_starts_loading() {
        let run = Run::new(1, TileParams::default().snapshot());
        assert_eq!(run.phase, RunPhase::LoadingImage);
        assert!(!run.canceled());
        assert!(run.is_alive(1));
        assert!(run.particles.is_empty());
    }

    #[test]
    fn stale_token_is_not_alive() {
        let run = Run::new(5, TileParams::default().snapshot());
        assert!(!run.is_alive(4));
        assert!(!run.is_alive(6));
    }

    #[test]
    fn cancel_kills_even_a_matching_token() {
        let run = Run::new(2, TileParams::default().snapshot());
        run.cancel.store(true, Ordering::Relaxed);
        assert!(!run.is_alive(2));
    }

    #[test]
    fn phase_names_match_status_vocabulary() {
        assert_eq!(RunPhase::LoadingImage.name(), "LOADING_IMAGE");
        assert_eq!(RunPhase::Segmenting.name(), "SEGMENTING");
        assert_eq!(RunPhase::BuildingLayer.name(), "BUILDING_LAYER");
        assert_eq!(RunPhase::Rendering.name(), "RENDERING");
        assert_eq!(RunPhase::Done.name(), "DONE");
    }
}
