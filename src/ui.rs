use crate::app::{App, Focus};
use crate::preview;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Wrap},
    Frame,
};

const SIDEBAR_WIDTH: u16 = 26;

/// Max scroll for help content (generous to account for text wrapping on small screens)
pub const HELP_CONTENT_LINES: u16 = 40;

// UI color scheme
const BORDER_COLOR: Color = Color::Cyan;
const HIGHLIGHT_COLOR: Color = Color::Yellow;
const TEXT_COLOR: Color = Color::White;
const DIM_TEXT_COLOR: Color = Color::Gray;
const ERROR_COLOR: Color = Color::Red;

/// Creates a standard styled block with rounded borders
fn styled_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_COLOR))
        .title(title)
}

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(0)])
        .split(area);

    render_sidebar(frame, layout[0], app);
    render_canvas(frame, layout[1], app);

    if app.show_help {
        render_help_overlay(frame, area, app);
    }
}

fn render_sidebar(frame: &mut Frame, area: Rect, app: &App) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6),  // Run status
            Constraint::Length(16), // Parameters
            Constraint::Min(6),     // Controls
        ])
        .split(area);

    render_run_box(frame, sections[0], app);
    render_params_box(frame, sections[1], app);
    render_controls_box(frame, sections[2], app);
}

fn render_run_box(frame: &mut Frame, area: Rect, app: &App) {
    let block = styled_block(" Run ");

    let status_color = match app.status.status.as_str() {
        "ERROR" => ERROR_COLOR,
        "DONE" => Color::Green,
        "IDLE" => DIM_TEXT_COLOR,
        _ => BORDER_COLOR,
    };

    let mut content = vec![
        Line::from(Span::styled(
            app.status.status.clone(),
            Style::default().fg(status_color),
        )),
        Line::from(Span::styled(
            app.status.detail.clone(),
            Style::default().fg(TEXT_COLOR),
        )),
    ];

    if let Some(progress) = app.status.progress {
        let progress_width = (area.width.saturating_sub(4)) as usize;
        let filled = (progress.clamp(0.0, 1.0) * progress_width as f32) as usize;
        let empty = progress_width.saturating_sub(filled);
        content.push(Line::from(vec![
            Span::styled("█".repeat(filled), Style::default().fg(Color::Green)),
            Span::styled("░".repeat(empty), Style::default().fg(Color::DarkGray)),
        ]));
    }

    let paragraph = Paragraph::new(content).block(block);
    frame.render_widget(paragraph, area);
}

fn render_params_box(frame: &mut Frame, area: Rect, app: &App) {
    let title = if app.params_locked {
        " Parameters (locked) "
    } else {
        " Parameters "
    };
    let block = styled_block(title);

    let make_line = |label: &str, value: String, focused: bool| {
        let prefix = if focused { "> " } else { "  " };
        let style = if focused {
            Style::default().fg(HIGHLIGHT_COLOR)
        } else if app.params_locked {
            Style::default().fg(DIM_TEXT_COLOR)
        } else {
            Style::default().fg(TEXT_COLOR)
        };
        Line::from(Span::styled(format!("{}{}: {}", prefix, label, value), style))
    };

    let p = &app.params;
    let onoff = |b: bool| if b { "on" } else { "off" }.to_string();

    let content = vec![
        make_line("Cell", format!("{}", p.cell_size), app.focus == Focus::CellSize),
        make_line("Shape", p.tile_shape.name().to_string(), app.focus == Focus::TileShape),
        make_line("Frames", format!("{}", p.move_frames), app.focus == Focus::MoveFrames),
        make_line("Speed", format!("{:.1}", p.max_speed), app.focus == Focus::MaxSpeed),
        make_line("Snap", onoff(p.snap_to_grid), app.focus == Focus::SnapToGrid),
        make_line(
            "Layer",
            if p.select_foreground { "fg" } else { "bg" }.to_string(),
            app.focus == Focus::SelectForeground,
        ),
        make_line("Freq", format!("{:.3}", p.flow_freq), app.focus == Focus::FlowFreq),
        make_line("Twist", format!("{:.1}", p.flow_twist), app.focus == Focus::FlowTwist),
        make_line("Drift", format!("{:.2}", p.flow_z_speed), app.focus == Focus::FlowZSpeed),
        make_line("Force", format!("{:.2}", p.force), app.focus == Focus::Force),
        make_line("Alpha", format!("{:.2}", p.tile_alpha), app.focus == Focus::TileAlpha),
        make_line("Scale", format!("{:.1}", p.tile_scale), app.focus == Focus::TileScale),
        make_line("Seed", format!("{}", p.noise_seed), app.focus == Focus::NoiseSeed),
        make_line("Wrap", onoff(p.wrap_edges), app.focus == Focus::WrapEdges),
    ];

    // Keep the focused item visible based on the actual area
    let focus_line = app.focus.line_index();
    let visible_height = area.height.saturating_sub(2); // minus borders
    let content_height = content.len() as u16;

    let scroll = if visible_height == 0 || visible_height >= content_height {
        0
    } else if focus_line >= visible_height {
        focus_line.saturating_sub(visible_height - 1)
    } else {
        0
    };

    let paragraph = Paragraph::new(content).block(block).scroll((scroll, 0));
    frame.render_widget(paragraph, area);
}

fn render_controls_box(frame: &mut Frame, area: Rect, app: &App) {
    let key_style = Style::default().fg(HIGHLIGHT_COLOR);
    let desc_style = Style::default().fg(DIM_TEXT_COLOR);

    let make_control = |key: &str, desc: &str| -> Line<'static> {
        Line::from(vec![
            Span::styled(format!("{:>5}", key), key_style),
            Span::styled(format!(" {}", desc), desc_style),
        ])
    };

    let play_desc = if app.run_active() { "restart" } else { "play" };
    let content = vec![
        make_control("Space", play_desc),
        make_control("S", "stop"),
        make_control("Tab", "next param"),
        make_control("↑/↓", "adjust param"),
        make_control("H", "help"),
        make_control("Q", "quit"),
    ];

    let block = styled_block(" Controls ");
    let paragraph = Paragraph::new(content).block(block);
    frame.render_widget(paragraph, area);
}

fn render_canvas(frame: &mut Frame, area: Rect, app: &App) {
    let block = styled_block("");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let lines = preview::render_preview(app.base_image(), &app.trail, inner.width, inner.height);
    let paragraph = Paragraph::new(lines);
    frame.render_widget(paragraph, inner);
}

fn render_help_overlay(frame: &mut Frame, area: Rect, app: &App) {
    let canvas_width = area.width.saturating_sub(SIDEBAR_WIDTH);

    // Center the help dialog within the canvas
    let help_width = 56.min(canvas_width.saturating_sub(4));
    let help_height = area.height.saturating_sub(4).min(30);
    let x = SIDEBAR_WIDTH + (canvas_width.saturating_sub(help_width)) / 2;
    let y = (area.height.saturating_sub(help_height)) / 2;

    let help_area = Rect {
        x: area.x + x,
        y: area.y + y,
        width: help_width,
        height: help_height,
    };

    frame.render_widget(Clear, help_area);

    let content = vec![
        Line::from(""),
        Line::from(Span::styled("FLOW-FIELD TILE DRIFT", Style::default().fg(BORDER_COLOR))),
        Line::from(""),
        Line::from("A still image is split into grid tiles. Foreground tiles (or background, per Layer) drift along a Perlin flow field, smearing their colors across the frame."),
        Line::from(""),
        Line::from(Span::styled("RUN:", Style::default().fg(HIGHLIGHT_COLOR))),
        Line::from("Space starts a run: the image is loaded, the subject is segmented, tiles are seeded on the chosen layer, then animated for Frames frames. S cancels at any point."),
        Line::from(""),
        Line::from(Span::styled("PARAMETERS:", Style::default().fg(HIGHLIGHT_COLOR))),
        Line::from("Tab/Shift+Tab selects, Up/Down adjusts. Edits are locked during a run and apply from the next Space."),
        Line::from(""),
        Line::from(Span::styled("Cell - grid tile size in pixels", Style::default().fg(TEXT_COLOR))),
        Line::from(Span::styled("Freq/Twist/Drift - flow field shape and churn", Style::default().fg(TEXT_COLOR))),
        Line::from(Span::styled("Force/Speed - steering strength and speed cap", Style::default().fg(TEXT_COLOR))),
        Line::from(Span::styled("Alpha/Scale - tile fade and shrink over life", Style::default().fg(TEXT_COLOR))),
        Line::from(Span::styled("Wrap - wrap at edges instead of dying", Style::default().fg(TEXT_COLOR))),
        Line::from(""),
        Line::from(Span::styled("BASIC CONTROLS:", Style::default().fg(HIGHLIGHT_COLOR))),
        Line::from("Space=Play, S=Stop, Tab/Arrows=Adjust, H=Help, Q=Quit"),
        Line::from(""),
    ];

    let content_height = content.len() as u16;
    let visible_height = help_height.saturating_sub(2); // minus borders
    let is_scrollable = content_height.saturating_sub(visible_height) > 0;

    let title = if is_scrollable {
        " Help (J/K scroll, H to close) "
    } else {
        " Help (H to close) "
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Double)
        .border_style(Style::default().fg(HIGHLIGHT_COLOR))
        .title(title);

    let paragraph = Paragraph::new(content)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.help_scroll, 0));

    frame.render_widget(paragraph, help_area);
}
