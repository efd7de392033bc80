use crate::builder::BuildState;
use crate::error::RunError;
use crate::params::TileParams;
use crate::run::{Run, RunEvent, RunPhase, RunToken};
use crate::segment::SegmentationGateway;
use crate::surface::{fit_to_bounds, TrailSurface};
use image::RgbaImage;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

/// Cells examined per tick during the build phase
pub const BUILD_CELLS_PER_TICK: u32 = 4000;
/// Ticks between progress-line refreshes (build and render phases)
const STATUS_THROTTLE: u64 = 6;

/// One line of run status for the sidebar
#[derive(Debug, Clone, Default)]
pub struct StatusLine {
    pub status: String,
    pub detail: String,
    /// 0.0-1.0 when a progress bar applies
    pub progress: Option<f32>,
}

/// Focus state for parameter editing in the sidebar
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Focus {
    #[default]
    Controls,
    CellSize,
    TileShape,
    MoveFrames,
    MaxSpeed,
    SnapToGrid,
    SelectForeground,
    FlowFreq,
    FlowTwist,
    FlowZSpeed,
    Force,
    TileAlpha,
    TileScale,
    NoiseSeed,
    WrapEdges,
}

impl Focus {
    /// Tab cycles through parameters in display order
    pub fn next(&self) -> Focus {
        match self {
            Focus::Controls => Focus::CellSize,
            Focus::CellSize => Focus::TileShape,
            Focus::TileShape => Focus::MoveFrames,
            Focus::MoveFrames => Focus::MaxSpeed,
            Focus::MaxSpeed => Focus::SnapToGrid,
            Focus::SnapToGrid => Focus::SelectForeground,
            Focus::SelectForeground => Focus::FlowFreq,
            Focus::FlowFreq => Focus::FlowTwist,
            Focus::FlowTwist => Focus::FlowZSpeed,
            Focus::FlowZSpeed => Focus::Force,
            Focus::Force => Focus::TileAlpha,
            Focus::TileAlpha => Focus::TileScale,
            Focus::TileScale => Focus::NoiseSeed,
            Focus::NoiseSeed => Focus::WrapEdges,
            Focus::WrapEdges => Focus::CellSize, // Loop back
        }
    }

    /// Shift+Tab cycles in reverse
    pub fn prev(&self) -> Focus {
        match self {
            Focus::Controls => Focus::WrapEdges,
            Focus::CellSize => Focus::WrapEdges, // Loop back
            Focus::TileShape => Focus::CellSize,
            Focus::MoveFrames => Focus::TileShape,
            Focus::MaxSpeed => Focus::MoveFrames,
            Focus::SnapToGrid => Focus::MaxSpeed,
            Focus::SelectForeground => Focus::SnapToGrid,
            Focus::FlowFreq => Focus::SelectForeground,
            Focus::FlowTwist => Focus::FlowFreq,
            Focus::FlowZSpeed => Focus::FlowTwist,
            Focus::Force => Focus::FlowZSpeed,
            Focus::TileAlpha => Focus::Force,
            Focus::TileScale => Focus::TileAlpha,
            Focus::NoiseSeed => Focus::TileScale,
            Focus::WrapEdges => Focus::NoiseSeed,
        }
    }

    /// Line index of this focus in the parameters box
    pub fn line_index(&self) -> u16 {
        match self {
            Focus::Controls => 0,
            Focus::CellSize => 0,
            Focus::TileShape => 1,
            Focus::MoveFrames => 2,
            Focus::MaxSpeed => 3,
            Focus::SnapToGrid => 4,
            Focus::SelectForeground => 5,
            Focus::FlowFreq => 6,
            Focus::FlowTwist => 7,
            Focus::FlowZSpeed => 8,
            Focus::Force => 9,
            Focus::TileAlpha => 10,
            Focus::TileScale => 11,
            Focus::NoiseSeed => 12,
            Focus::WrapEdges => 13,
        }
    }

    /// Check if focus is on a parameter (not Controls)
    pub fn is_param(&self) -> bool {
        !matches!(self, Focus::Controls)
    }
}

/// Main application state: editable parameters, the active run (if any), and
/// the channel worker threads report back on.
pub struct App {
    pub params: TileParams,
    pub focus: Focus,
    /// Parameter edits are refused while a run is active
    pub params_locked: bool,
    pub status: StatusLine,
    pub show_help: bool,
    pub help_scroll: u16,

    gateway: Option<SegmentationGateway>,
    run: Option<Run>,
    /// Token of the most recent PLAY; only events carrying it are honored
    run_token: RunToken,

    events_tx: Sender<RunEvent>,
    events_rx: Receiver<RunEvent>,

    /// Decoded and canvas-fitted source image for the active run
    base: RgbaImage,
    /// Shared with detection workers
    source: Arc<RgbaImage>,
    pub trail: TrailSurface,
    max_canvas: (u32, u32),
    pub build_budget: u32,

    tick_count: u64,
}

impl App {
    pub fn new(params: TileParams, max_canvas_width: u32, max_canvas_height: u32) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            params,
            focus: Focus::Controls,
            params_locked: false,
            status: StatusLine {
                status: "LOADING_MODEL".into(),
                detail: String::new(),
                progress: None,
            },
            show_help: false,
            help_scroll: 0,
            gateway: None,
            run: None,
            run_token: 0,
            events_tx,
            events_rx,
            base: RgbaImage::new(1, 1),
            source: Arc::new(RgbaImage::new(1, 1)),
            trail: TrailSurface::new(1, 1),
            max_canvas: (max_canvas_width.max(1), max_canvas_height.max(1)),
            build_budget: BUILD_CELLS_PER_TICK,
            tick_count: 0,
        }
    }

    /// Install the segmentation engine once it has loaded
    pub fn set_gateway(&mut self, gateway: SegmentationGateway) {
        self.gateway = Some(gateway);
        self.set_status("IDLE", "press Space to play", None);
    }

    /// Engine failed to come up; PLAY stays unavailable
    pub fn model_failed(&mut self, error: &RunError) {
        self.set_status("ERROR", &error.to_string(), None);
    }

    pub fn base_image(&self) -> &RgbaImage {
        &self.base
    }

    pub fn run_active(&self) -> bool {
        self.run.is_some()
    }

    pub fn phase(&self) -> Option<RunPhase> {
        self.run.as_ref().map(|r| r.phase)
    }

    fn set_status(&mut self, status: &str, detail: &str, progress: Option<f32>) {
        self.status = StatusLine {
            status: status.to_string(),
            detail: detail.to_string(),
            progress,
        };
    }

    /// Start a new run. Any active run is stopped first; its in-flight
    /// worker results die by token mismatch.
    pub fn play(&mut self) {
        if self.gateway.is_none() {
            self.set_status("ERROR", "no segmentation engine loaded", None);
            return;
        }
        if self.run.is_some() {
            self.stop();
        }

        let cfg = self.params.snapshot();
        let image_path = cfg.image_path.clone();
        self.run_token += 1;
        let token = self.run_token;

        self.trail.clear();
        self.params_locked = true;
        self.run = Some(Run::new(token, cfg));
        self.set_status(RunPhase::LoadingImage.name(), &image_path, None);

        let tx = self.events_tx.clone();
        let (max_w, max_h) = self.max_canvas;
        thread::spawn(move || {
            let result = image::open(&image_path)
                .map(|img| fit_to_bounds(&img.to_rgba8(), max_w, max_h))
                .map_err(|e| RunError::ImageLoad(format!("{image_path}: {e}")));
            let event = match result {
                Ok(image) => RunEvent::ImageLoaded { token, image },
                Err(error) => RunEvent::ImageLoadFailed { token, error },
            };
            let _ = tx.send(event);
        });
    }

    /// Request cancellation of the active run. Cooperative: the flag is
    /// observed and the run finalized on the next tick, not torn down here.
    /// Idle STOP only refreshes the status line.
    pub fn stop(&mut self) {
        let Some(run) = self.run.as_ref() else {
            if self.gateway.is_some() {
                self.set_status("IDLE", "press Space to play", None);
            } else {
                self.set_status("LOADING_MODEL", "", None);
            }
            return;
        };

        run.cancel.store(true, Ordering::Relaxed);
        if run.detecting {
            if let Some(gw) = &self.gateway {
                gw.capability().detect_stop();
            }
        }
    }

    /// One frame of work: drain worker events, then advance the active phase
    pub fn tick(&mut self) {
        self.tick_count += 1;
        self.drain_events();

        let Some(run) = self.run.as_mut() else {
            return;
        };
        if run.canceled() {
            self.run = None;
            self.params_locked = false;
            self.set_status("IDLE", "canceled", None);
            return;
        }

        match run.phase {
            // waiting on worker events
            RunPhase::LoadingImage | RunPhase::Segmenting => {}
            RunPhase::BuildingLayer => self.tick_build(),
            RunPhase::Rendering => self.tick_render(),
            RunPhase::Done => self.finish_run(),
        }
    }

    /// Tear down a completed run. The final render tick calls this directly,
    /// so a STOP arriving afterwards sees an idle app, not a cancelable run.
    fn finish_run(&mut self) {
        self.run = None;
        self.params_locked = false;
        self.set_status(RunPhase::Done.name(), "", Some(1.0));
    }

    fn tick_build(&mut self) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let (Some(build), Some(mask), Some(info)) =
            (run.build.as_mut(), run.mask.as_ref(), run.mask_info.as_ref())
        else {
            return;
        };

        let finished = build.advance_chunk(
            self.build_budget,
            &self.base,
            mask,
            info,
            &run.cfg,
            &mut run.particles,
            &mut run.rng,
        );
        let progress = build.progress();
        let count = run.particles.len();

        if finished {
            run.phase = RunPhase::Rendering;
            run.zoff = 0.0;
            run.render_frame = 0;
            self.set_status(RunPhase::Rendering.name(), &format!("{count} tiles"), Some(0.0));
        } else if self.tick_count % STATUS_THROTTLE == 0 {
            self.set_status(
                RunPhase::BuildingLayer.name(),
                &format!("{count} tiles"),
                Some(progress),
            );
        }
    }

    fn tick_render(&mut self) {
        let Some(run) = self.run.as_mut() else {
            return;
        };

        run.zoff += run.cfg.flow_z_speed as f64;
        let (w, h) = (self.trail.width(), self.trail.height());

        // reverse iteration so removal by index stays valid
        for i in (0..run.particles.len()).rev() {
            let (field, particles) = (&run.field, &mut run.particles);
            let p = &mut particles[i];
            p.advance(field, run.zoff, w, h);
            if p.dead {
                particles.swap_remove(i);
            } else {
                p.paint(&mut self.trail);
            }
        }

        run.render_frame += 1;
        let frame = run.render_frame;
        let total = run.cfg.move_frames;
        if frame >= total {
            run.phase = RunPhase::Done;
            self.finish_run();
        } else if self.tick_count % STATUS_THROTTLE == 0 {
            self.set_status(
                RunPhase::Rendering.name(),
                &format!("frame {frame}/{total}"),
                Some(frame as f32 / total as f32),
            );
        }
    }

    fn drain_events(&mut self) {
        loop {
            match self.events_rx.try_recv() {
                Ok(event) => self.handle_event(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    /// Apply one worker event. Events from a superseded or canceled run are
    /// discarded without touching any state.
    fn handle_event(&mut self, event: RunEvent) {
        let alive = self
            .run
            .as_ref()
            .is_some_and(|r| r.is_alive(event.token()));
        if !alive {
            return;
        }

        match event {
            RunEvent::ImageLoaded { image, .. } => self.on_image_loaded(image),
            RunEvent::ImageLoadFailed { error, .. } => self.fail_run(error),
            RunEvent::MaskReady { mask, info, .. } => {
                let Some(run) = self.run.as_mut() else {
                    return;
                };
                run.detecting = false;
                run.mask = Some(mask);
                run.mask_info = Some(info);
                run.build = Some(BuildState::start(
                    &run.cfg,
                    self.base.width(),
                    self.base.height(),
                ));
                run.phase = RunPhase::BuildingLayer;
                self.set_status(RunPhase::BuildingLayer.name(), "", Some(0.0));
            }
            RunEvent::SegmentRetry { attempt, .. } => {
                self.set_status(RunPhase::Segmenting.name(), &format!("retry {attempt}"), None);
            }
            RunEvent::SegmentFailed { error, .. } => {
                if let Some(run) = self.run.as_mut() {
                    run.detecting = false;
                }
                self.fail_run(error);
            }
        }
    }

    fn on_image_loaded(&mut self, image: RgbaImage) {
        let (w, h) = image.dimensions();
        self.base = image;
        self.source = Arc::new(self.base.clone());
        self.trail = TrailSurface::new(w, h);

        let Some(run) = self.run.as_mut() else {
            return;
        };
        run.phase = RunPhase::Segmenting;
        run.detecting = true;
        let token = run.token;
        let cancel = Arc::clone(&run.cancel);

        let Some(gw) = self.gateway.as_ref() else {
            self.fail_run(RunError::InferenceUnavailable("engine went away".into()));
            return;
        };
        gw.spawn_detect(token, Arc::clone(&self.source), w, h, cancel, self.events_tx.clone());
        self.set_status(RunPhase::Segmenting.name(), "", None);
    }

    fn fail_run(&mut self, error: RunError) {
        if let Some(run) = self.run.take() {
            run.cancel.store(true, Ordering::Relaxed);
        }
        self.params_locked = false;
        self.set_status("ERROR", &error.to_string(), None);
    }

    /// Cycle to next focus
    pub fn next_focus(&mut self) {
        self.focus = self.focus.next();
    }

    /// Navigate to previous parameter (Shift+Tab)
    pub fn prev_focus(&mut self) {
        self.focus = self.focus.prev();
    }

    /// Adjust the focused parameter up or down. Refused while a run holds
    /// the parameter lock.
    pub fn adjust_focused(&mut self, up: bool) {
        if self.params_locked {
            return;
        }
        let sign = if up { 1.0 } else { -1.0 };
        let isign = if up { 1 } else { -1 };
        match self.focus {
            Focus::Controls => {}
            Focus::CellSize => self.params.adjust_cell_size(isign),
            Focus::TileShape => {
                self.params.tile_shape = if up {
                    self.params.tile_shape.next()
                } else {
                    self.params.tile_shape.prev()
                };
            }
            Focus::MoveFrames => self.params.adjust_move_frames(isign * 10),
            Focus::MaxSpeed => self.params.adjust_max_speed(sign * 0.2),
            Focus::SnapToGrid => self.params.snap_to_grid = !self.params.snap_to_grid,
            Focus::SelectForeground => {
                self.params.select_foreground = !self.params.select_foreground
            }
            Focus::FlowFreq => self.params.adjust_flow_freq(sign * 0.005),
            Focus::FlowTwist => self.params.adjust_flow_twist(sign * 0.1),
            Focus::FlowZSpeed => self.params.adjust_flow_z_speed(sign * 0.01),
            Focus::Force => self.params.adjust_force(sign * 0.05),
            Focus::TileAlpha => self.params.adjust_tile_alpha(sign * 0.05),
            Focus::TileScale => self.params.adjust_tile_scale(sign * 0.1),
            Focus::NoiseSeed => self.params.adjust_noise_seed(isign * 100),
            Focus::WrapEdges => self.params.wrap_edges = !self.params.wrap_edges,
        }
    }

    /// Toggle help overlay
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
        if self.show_help {
            self.help_scroll = 0;
        }
    }

    pub fn scroll_help_up(&mut self) {
        self.help_scroll = self.help_scroll.saturating_sub(1);
    }

    pub fn scroll_help_down(&mut self, max_scroll: u16) {
        self.help_scroll = (self.help_scroll + 1).min(max_scroll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunError;
    use crate::segment::{DetectCapability, Detection, DetectCapability::OneShot, OneShotDetect, SegmentationGateway};
    use image::Rgba;
    use std::time::Duration;

    /// One-shot engine returning an all-foreground (dark opaque) mask
    struct DarkMask;
    impl OneShotDetect for DarkMask {
        fn detect(&self, source: &RgbaImage) -> Result<Detection, RunError> {
            Ok(Detection::from_mask(RgbaImage::from_pixel(
                source.width(),
                source.height(),
                Rgba([0, 0, 0, 255]),
            )))
        }
    }

    struct BrokenEngine;
    impl OneShotDetect for BrokenEngine {
        fn detect(&self, _source: &RgbaImage) -> Result<Detection, RunError> {
            Err(RunError::DetectionFailed("offline".into()))
        }
    }

    fn fast_gateway(cap: DetectCapability) -> SegmentationGateway {
        SegmentationGateway::with_policy(
            cap,
            Duration::from_millis(500),
            3,
            Duration::from_millis(2),
        )
    }

    fn test_image(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("source.png");
        RgbaImage::from_pixel(100, 100, Rgba([240, 240, 240, 255]))
            .save(&path)
            .unwrap();
        path.to_string_lossy().into_owned()
    }

    fn app_with_engine(dir: &tempfile::TempDir, cap: DetectCapability) -> App {
        let params = TileParams {
            image_path: test_image(dir),
            move_frames: 5,
            ..Default::default()
        };
        let mut app = App::new(params, 100, 100);
        app.set_gateway(fast_gateway(cap));
        app
    }

    /// Tick until the run reaches its end or the tick budget runs out
    fn tick_until_idle(app: &mut App) {
        for _ in 0..2000 {
            app.tick();
            if !app.run_active() {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("run never finished, status: {}", app.status.status);
    }

    #[test]
    fn full_run_reaches_done() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_engine(&dir, OneShot(Arc::new(DarkMask)));

        app.play();
        assert!(app.run_active());
        assert!(app.params_locked);
        assert_eq!(app.status.status, "LOADING_IMAGE");

        tick_until_idle(&mut app);
        assert_eq!(app.status.status, "DONE");
        assert!(!app.params_locked);

        // the trail has been painted
        assert!(app.trail.image().pixels().any(|p| p.0[3] > 0));

        // STOP after DONE is a plain status refresh
        app.stop();
        assert_eq!(app.status.status, "IDLE");
    }

    #[test]
    fn build_phase_seeds_one_particle_per_cell() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_engine(&dir, OneShot(Arc::new(DarkMask)));
        app.play();

        // run until the build completes, then inspect before DONE
        for _ in 0..2000 {
            app.tick();
            if app.phase() == Some(RunPhase::Rendering) {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        // 100x100 image, cell 10, all-foreground mask
        let run = app.run.as_ref().expect("run still active");
        assert_eq!(run.particles.len(), 100);
    }

    #[test]
    fn last_frame_finalizes_in_the_same_tick() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_engine(&dir, OneShot(Arc::new(DarkMask)));
        app.params.move_frames = 1;
        app.play();

        for _ in 0..2000 {
            app.tick();
            if app.phase() == Some(RunPhase::Rendering) {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(app.phase(), Some(RunPhase::Rendering));

        // the tick that renders frame 1 of 1 also tears the run down
        app.tick();
        assert!(!app.run_active());
        assert_eq!(app.status.status, "DONE");
        assert!(!app.params_locked);

        // no window in which a STOP could report a cancel
        app.stop();
        assert_eq!(app.status.status, "IDLE");
    }

    #[test]
    fn failed_image_load_reports_error_and_unlocks() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_engine(&dir, OneShot(Arc::new(DarkMask)));
        app.params.image_path = "/nonexistent/image.png".into();

        app.play();
        tick_until_idle(&mut app);
        assert_eq!(app.status.status, "ERROR");
        assert!(!app.params_locked);
    }

    #[test]
    fn failed_detection_reports_error_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_engine(&dir, OneShot(Arc::new(BrokenEngine)));

        app.play();
        tick_until_idle(&mut app);
        assert_eq!(app.status.status, "ERROR");
        assert!(app.status.detail.contains("offline"));
    }

    #[test]
    fn stop_discards_late_worker_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_engine(&dir, OneShot(Arc::new(DarkMask)));

        app.play();
        app.stop();
        assert!(app.run_active()); // still pending finalization

        // cancellation finalizes on the next tick
        app.tick();
        assert!(!app.run_active());
        assert!(!app.params_locked);

        // let the loader thread finish, then drain: nothing may revive the run
        std::thread::sleep(Duration::from_millis(100));
        for _ in 0..10 {
            app.tick();
        }
        assert!(!app.run_active());
        assert_eq!(app.status.status, "IDLE");
    }

    #[test]
    fn replay_supersedes_the_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_engine(&dir, OneShot(Arc::new(DarkMask)));

        app.play();
        let first_token = app.run.as_ref().unwrap().token;
        app.play();
        let second_token = app.run.as_ref().unwrap().token;
        assert!(second_token > first_token);

        tick_until_idle(&mut app);
        assert_eq!(app.status.status, "DONE");
    }

    #[test]
    fn parameter_edits_never_reach_an_active_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_engine(&dir, OneShot(Arc::new(DarkMask)));

        app.play();
        let cfg_before = app.run.as_ref().unwrap().cfg.clone();

        // locked: adjusters refuse
        app.focus = Focus::MaxSpeed;
        app.adjust_focused(true);
        assert_eq!(app.params.max_speed, cfg_before.max_speed);

        // even a direct edit cannot reach the snapshot
        app.params.max_speed = 9.9;
        let cfg_after = app.run.as_ref().unwrap().cfg.clone();
        assert_eq!(*cfg_before, *cfg_after);
    }

    #[test]
    fn stop_while_idle_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_engine(&dir, OneShot(Arc::new(DarkMask)));
        app.stop();
        assert_eq!(app.status.status, "IDLE");
        assert!(!app.run_active());
    }

    #[test]
    fn play_without_engine_is_refused() {
        let params = TileParams::default();
        let mut app = App::new(params, 100, 100);
        app.play();
        assert!(!app.run_active());
        assert_eq!(app.status.status, "ERROR");
    }

    #[test]
    fn focus_cycle_visits_every_parameter_and_returns() {
        let mut focus = Focus::CellSize;
        let mut seen = 0;
        loop {
            focus = focus.next();
            seen += 1;
            if focus == Focus::CellSize {
                break;
            }
            assert!(seen < 100);
        }
        assert_eq!(seen, 14);

        // prev undoes next for every param
        let mut focus = Focus::CellSize;
        for _ in 0..14 {
            let next = focus.next();
            assert_eq!(next.prev(), focus);
            focus = next;
        }
    }
}
