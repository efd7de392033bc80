mod app;
mod builder;
mod config;
mod engine;
mod error;
mod flow;
mod mask;
mod params;
mod particle;
mod preview;
mod run;
mod segment;
mod surface;
mod ui;

use app::App;
use clap::Parser;
use config::AppConfig;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use engine::{load_capability, EngineChoice, MODEL_LOAD_TIMEOUT};
use params::{TileParams, TileShape};
use ratatui::{backend::CrosstermBackend, Terminal};
use segment::SegmentationGateway;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "tiledrift")]
#[command(about = "Animate a still image as drifting tiles along a Perlin flow field")]
struct Args {
    /// Source image to animate
    image: PathBuf,

    /// Foreground mask image; omit to threshold the source's own luminance
    #[arg(short = 'm', long)]
    mask: Option<PathBuf>,

    /// Luminance threshold for the built-in mask (0-255, dark = foreground)
    #[arg(long = "luma-threshold", default_value = "128")]
    luma_threshold: u8,

    // === Grid / tiles ===
    /// Grid cell size in pixels (1-50)
    #[arg(short = 'c', long = "cell-size", default_value = "10")]
    cell_size: u32,

    /// Tile shape (rect, circle)
    #[arg(long = "tile-shape", default_value = "rect")]
    tile_shape: String,

    /// Animation length in frames
    #[arg(long = "move-frames", default_value = "180")]
    move_frames: u32,

    /// Particle speed limit (1.0-10.0)
    #[arg(long = "max-speed", default_value = "2.8")]
    max_speed: f32,

    /// Paint tiles free-floating instead of snapped to the grid
    #[arg(long = "no-snap", default_value = "false")]
    no_snap: bool,

    /// Animate the background layer instead of the foreground
    #[arg(long, default_value = "false")]
    background: bool,

    // === Flow field ===
    /// Noise frequency per grid cell (0.001-0.1)
    #[arg(long = "flow-freq", default_value = "0.08")]
    flow_freq: f32,

    /// Steering angle multiplier (0.1-10.0)
    #[arg(long = "flow-twist", default_value = "2.0")]
    flow_twist: f32,

    /// Flow field churn per frame (0.001-1.0)
    #[arg(long = "flow-z-speed", default_value = "0.1")]
    flow_z_speed: f32,

    /// Steering force (0.01-5.0)
    #[arg(long, default_value = "0.2")]
    force: f32,

    // === Fade / scale ===
    /// Tile alpha at end of life (0.0-1.0)
    #[arg(long = "tile-alpha", default_value = "1.0")]
    tile_alpha: f32,

    /// Tile size scale at end of life (0.1-3.0)
    #[arg(long = "tile-scale", default_value = "1.0")]
    tile_scale: f32,

    /// Noise seed (1-100000)
    #[arg(long, default_value = "37452")]
    seed: u32,

    /// Let particles die at the canvas edge instead of wrapping
    #[arg(long = "no-wrap", default_value = "false")]
    no_wrap: bool,

    // === App ===
    /// Target frames per second (10-120)
    #[arg(long, default_value = "30")]
    fps: u64,

    /// Cells examined per tick while building the layer (100-100000)
    #[arg(long = "build-budget", default_value = "4000")]
    build_budget: u32,

    /// Maximum canvas width in pixels
    #[arg(long = "max-width", default_value = "960")]
    max_width: u32,

    /// Maximum canvas height in pixels
    #[arg(long = "max-height", default_value = "640")]
    max_height: u32,

    /// Load parameters from a JSON config file (overrides the flags above)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the resolved parameters to a JSON config file and exit
    #[arg(long = "save-config", value_name = "PATH")]
    save_config: Option<PathBuf>,
}

fn parse_tile_shape(s: &str) -> TileShape {
    match s.to_lowercase().as_str() {
        "circle" | "round" | "dot" => TileShape::Circle,
        _ => TileShape::Rect,
    }
}

fn params_from_args(args: &Args) -> TileParams {
    TileParams {
        image_path: args.image.to_string_lossy().into_owned(),
        cell_size: args.cell_size.clamp(1, 50),
        tile_shape: parse_tile_shape(&args.tile_shape),
        move_frames: args.move_frames.max(1),
        max_speed: args.max_speed.clamp(1.0, 10.0),
        snap_to_grid: !args.no_snap,
        select_foreground: !args.background,
        flow_freq: args.flow_freq.clamp(0.001, 0.1),
        flow_twist: args.flow_twist.clamp(0.1, 10.0),
        flow_z_speed: args.flow_z_speed.clamp(0.001, 1.0),
        force: args.force.clamp(0.01, 5.0),
        tile_alpha: args.tile_alpha.clamp(0.0, 1.0),
        tile_scale: args.tile_scale.clamp(0.1, 3.0),
        noise_seed: args.seed.clamp(1, 100_000),
        wrap_edges: !args.no_wrap,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // explicit --config wins, then the per-user config file, then the flags
    let config_path = args
        .config
        .clone()
        .or_else(|| AppConfig::default_path().filter(|p| p.exists()));
    let (params, fps, build_budget) = match &config_path {
        Some(path) => {
            let cfg = AppConfig::load_from_file(path)?;
            let mut params = cfg.params;
            // the image on the command line always wins
            params.image_path = args.image.to_string_lossy().into_owned();
            (params, cfg.fps, cfg.build_cells_per_tick)
        }
        None => (params_from_args(&args), args.fps, args.build_budget),
    };

    if let Some(path) = &args.save_config {
        let cfg = AppConfig {
            version: 1,
            params: params.clone(),
            fps,
            build_cells_per_tick: build_budget,
        };
        cfg.save_to_file(path)?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let choice = match &args.mask {
        Some(path) => EngineChoice::MaskFile(path.clone()),
        None => EngineChoice::LumaThreshold(args.luma_threshold),
    };
    let engine_result = load_capability(choice, MODEL_LOAD_TIMEOUT);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(params, args.max_width.max(1), args.max_height.max(1));
    app.build_budget = build_budget.clamp(100, 100_000);
    match engine_result {
        Ok(cap) => app.set_gateway(SegmentationGateway::new(cap)),
        Err(ref err) => app.model_failed(err),
    }

    let fps = fps.clamp(10, 120);
    let res = run_app(&mut terminal, &mut app, fps);

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    fps: u64,
) -> io::Result<()> {
    let frame_duration = Duration::from_millis(1000 / fps.max(1));

    loop {
        // Render current state
        terminal.draw(|frame| ui::render(frame, app))?;

        // Poll for events with timeout
        if event::poll(frame_duration)? {
            if let Event::Key(key) = event::read()? {
                // Only process Press events
                if key.kind != KeyEventKind::Press {
                    continue;
                }

                // Handle Ctrl+C
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
                {
                    return Ok(());
                }

                match key.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                    KeyCode::Char(' ') => app.play(),
                    KeyCode::Char('s') | KeyCode::Char('S') => app.stop(),
                    KeyCode::Char('h') | KeyCode::Char('H') => app.toggle_help(),

                    // Navigation
                    KeyCode::Tab => app.next_focus(),
                    KeyCode::BackTab => app.prev_focus(),
                    KeyCode::Up => {
                        if !app.show_help && app.focus.is_param() {
                            app.adjust_focused(true);
                        }
                    }
                    KeyCode::Down => {
                        if !app.show_help && app.focus.is_param() {
                            app.adjust_focused(false);
                        }
                    }
                    KeyCode::Esc => {
                        if app.show_help {
                            app.toggle_help();
                        } else if app.focus.is_param() {
                            app.focus = app::Focus::Controls;
                        }
                    }
                    KeyCode::Char('j') | KeyCode::Char('J') => {
                        if app.show_help {
                            app.scroll_help_down(ui::HELP_CONTENT_LINES);
                        }
                    }
                    KeyCode::Char('k') | KeyCode::Char('K') => {
                        if app.show_help {
                            app.scroll_help_up();
                        }
                    }
                    _ => {}
                }
            }
        }

        // Advance the run one frame
        app.tick();
    }
}
