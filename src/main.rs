use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;
use tui_textarea::TextArea;

use intelnet::config::Config;
use intelnet::engine::output::{Sink, Tone, Transcript};
use intelnet::engine::session::{fmt_clock, Link};
use intelnet::engine::Engine;
use intelnet::scenario::{self, ScenarioDir, ScenarioMeta};

// Upper bound on how long the loop sleeps, so the session clock keeps moving.
const IDLE_POLL: Duration = Duration::from_millis(250);

enum Screen {
    TitleScreen,
    Terminal,
}

struct Args {
    scenario: Option<PathBuf>,
    scenarios_dir: PathBuf,
    config: PathBuf,
    log_file: PathBuf,
}

struct App<'a> {
    engine: Engine,
    transcript: Transcript,
    input: TextArea<'a>,
    screen: Screen,
    catalogue: Vec<ScenarioMeta>,
    selected: usize,
    history: Vec<String>,
    history_pos: Option<usize>,
    log_scroll: u16,
}

fn command_input<'a>() -> TextArea<'a> {
    let mut input = TextArea::default();
    input.set_cursor_line_style(Style::default());
    input.set_placeholder_text("type `help` and press Enter");
    input
}

impl<'a> App<'a> {
    fn new(engine: Engine) -> Self {
        let catalogue = engine.source().catalogue();
        let mut transcript = Transcript::new();
        engine.boot(&mut transcript);
        App {
            engine,
            transcript,
            input: command_input(),
            screen: Screen::TitleScreen,
            catalogue,
            selected: 0,
            history: Vec::new(),
            history_pos: None,
            log_scroll: 0,
        }
    }

    // Scenarios, then "free terminal", then "quit".
    fn menu_len(&self) -> usize {
        self.catalogue.len() + 2
    }

    /// Returns false when the player chose to quit.
    fn choose(&mut self) -> bool {
        if self.selected == self.menu_len() - 1 {
            return false;
        }
        if let Some(meta) = self.catalogue.get(self.selected) {
            let file = meta.file.clone();
            self.engine.run(Some(&file), &mut self.transcript);
        }
        self.screen = Screen::Terminal;
        true
    }

    fn submit_line(&mut self) {
        let line = self.input.lines().join(" ");
        self.input = command_input();
        self.history_pos = None;
        self.log_scroll = 0;
        if !line.trim().is_empty() {
            self.history.push(line.clone());
        }
        let echo = format!("{}$ {}", self.engine.prompt(), line);
        self.transcript.write(&echo, Tone::Muted);
        self.engine
            .handle_line(&line, Instant::now(), &mut self.transcript);
    }

    fn recall(&mut self, older: bool) {
        if self.history.is_empty() {
            return;
        }
        let last = self.history.len() - 1;
        let pos = match (self.history_pos, older) {
            (None, true) => Some(last),
            (None, false) => None,
            (Some(p), true) => Some(p.saturating_sub(1)),
            (Some(p), false) if p < last => Some(p + 1),
            (Some(_), false) => None,
        };
        self.history_pos = pos;
        self.input = command_input();
        if let Some(p) = pos {
            self.input.insert_str(&self.history[p]);
        }
    }
}

fn usage_and_exit() -> ! {
    eprintln!(
        "intelnet (training terminal)\n\n\
USAGE:\n  intelnet [SCENARIO_FILE] [--scenarios DIR] [--config FILE] [--log FILE]\n\n\
ENV:\n  INTELNET_SCENARIOS   default scenarios\n  INTELNET_CONFIG      default intelnet.toml (optional)\n  INTELNET_LOG         default intelnet.log\n  RUST_LOG             default info\n"
    );
    std::process::exit(2);
}

fn parse_args() -> Args {
    let mut args = Args {
        scenario: None,
        scenarios_dir: std::env::var("INTELNET_SCENARIOS")
            .unwrap_or_else(|_| "scenarios".to_string())
            .into(),
        config: std::env::var("INTELNET_CONFIG")
            .unwrap_or_else(|_| "intelnet.toml".to_string())
            .into(),
        log_file: std::env::var("INTELNET_LOG")
            .unwrap_or_else(|_| "intelnet.log".to_string())
            .into(),
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--scenarios" => {
                args.scenarios_dir = it.next().unwrap_or_else(|| usage_and_exit()).into();
            }
            "--config" => {
                args.config = it.next().unwrap_or_else(|| usage_and_exit()).into();
            }
            "--log" => {
                args.log_file = it.next().unwrap_or_else(|| usage_and_exit()).into();
            }
            "-h" | "--help" => usage_and_exit(),
            other if other.starts_with('-') => usage_and_exit(),
            other if args.scenario.is_none() => args.scenario = Some(other.into()),
            _ => usage_and_exit(),
        }
    }
    args
}

// The terminal owns stdout, so logs go to a file.
fn init_logging(args: &Args) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.log_file)
        .with_context(|| format!("opening log file {}", args.log_file.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let args = parse_args();
    init_logging(&args)?;

    let config = Config::load_or_default(&args.config)?;
    let source = ScenarioDir::new(&args.scenarios_dir);
    info!(dir = %source.root().display(), "starting terminal");

    let mut app = App::new(Engine::new(config.timings, Box::new(source)));
    if let Some(path) = &args.scenario {
        let scenario = scenario::load_scenario(path)
            .with_context(|| format!("loading {}", path.display()))?;
        app.engine.load_scenario(scenario, &mut app.transcript);
        app.screen = Screen::Terminal;
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result?;
    if app.engine.session().progress.is_complete(&app.engine.scenario().codes) {
        println!("\nMission complete. Stay sharp, operator.\n");
    }
    Ok(())
}

fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| draw_ui(f, app))?;

        let timeout = app
            .engine
            .next_due()
            .map(|due| due.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_POLL)
            .min(IDLE_POLL);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
                if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
                    return Ok(());
                }

                match app.screen {
                    Screen::TitleScreen => match key.code {
                        KeyCode::Up | KeyCode::Char('k') => {
                            app.selected = app.selected.checked_sub(1).unwrap_or(app.menu_len() - 1);
                        }
                        KeyCode::Down | KeyCode::Char('j') => {
                            app.selected = (app.selected + 1) % app.menu_len();
                        }
                        KeyCode::Enter => {
                            if !app.choose() {
                                return Ok(());
                            }
                        }
                        KeyCode::Char('q') => return Ok(()),
                        _ => {}
                    },
                    Screen::Terminal => match key.code {
                        KeyCode::Esc if app.transcript.image().is_some() => {
                            app.transcript.hide_image();
                        }
                        KeyCode::Enter => app.submit_line(),
                        KeyCode::Up => app.recall(true),
                        KeyCode::Down => app.recall(false),
                        KeyCode::PageUp => {
                            app.log_scroll = app.log_scroll.saturating_add(5);
                        }
                        KeyCode::PageDown => {
                            app.log_scroll = app.log_scroll.saturating_sub(5);
                        }
                        _ => {
                            app.input.input(key);
                        }
                    },
                }
            }
        }

        app.engine.advance(Instant::now(), &mut app.transcript);
    }
}

fn tone_style(tone: Tone) -> Style {
    match tone {
        Tone::Out => Style::default().fg(Color::White),
        Tone::Muted => Style::default().fg(Color::DarkGray),
        Tone::Warn => Style::default().fg(Color::Yellow),
        Tone::Err => Style::default().fg(Color::Red),
        Tone::Success => Style::default()
            .fg(Color::Green)
            .add_modifier(Modifier::BOLD),
        Tone::Host => Style::default().fg(Color::Cyan),
    }
}

fn draw_ui(f: &mut Frame, app: &App) {
    if matches!(app.screen, Screen::TitleScreen) {
        draw_title_screen(f, app);
        return;
    }

    let now = Instant::now();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(3),
        ])
        .split(f.area());

    // Status bar
    let session = app.engine.session();
    let (link_text, link_style) = match &session.link {
        Link::Idle => (" IDLE ".to_string(), Style::default().fg(Color::DarkGray)),
        Link::Connecting { .. } => (
            " LINKING ".to_string(),
            Style::default().fg(Color::Black).bg(Color::Yellow),
        ),
        Link::Connected { .. } => {
            let left = session.time_remaining(now);
            let color = if left > Duration::from_secs(30) {
                Color::Green
            } else if left > Duration::from_secs(10) {
                Color::Yellow
            } else {
                Color::Red
            };
            (
                format!(" LINK {} ", fmt_clock(left)),
                Style::default().fg(Color::Black).bg(color),
            )
        }
    };
    let title = app.engine.scenario().heading();
    let status = Line::from(vec![
        Span::styled(
            " ECHO-INTELNET ",
            Style::default().fg(Color::Black).bg(Color::Green),
        ),
        Span::raw("  "),
        Span::styled(
            format!(" {} ", if title.is_empty() { "no scenario" } else { title }),
            Style::default().fg(Color::White).bg(Color::DarkGray),
        ),
        Span::raw("  "),
        Span::styled(
            format!(" {} ", app.engine.progress_line(now)),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("  "),
        Span::styled(link_text, link_style),
    ]);
    let status_block = Paragraph::new(status).block(Block::default().borders(Borders::BOTTOM));
    f.render_widget(status_block, chunks[0]);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(chunks[1]);

    draw_briefing(f, app, main_chunks[0]);
    draw_log(f, app, main_chunks[1]);

    let mut input = app.input.clone();
    input.set_block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} $ ", app.engine.prompt())),
    );
    f.render_widget(&input, chunks[2]);

    if let Some(image) = app.transcript.image() {
        draw_image_popup(f, &image.src, image.caption.as_deref());
    }
}

fn draw_briefing(f: &mut Frame, app: &App, area: Rect) {
    let scenario = app.engine.scenario();
    let session = app.engine.session();

    let mut lines = vec![
        Line::from(Span::styled(
            scenario.objective.clone(),
            Style::default().fg(Color::White),
        )),
        Line::raw(""),
    ];
    for key in scenario.nodes.keys() {
        let grid = scenario.grid_suffix(key);
        let state = if session.progress.is_found(key) {
            let code = scenario.codes.get(key).map(String::as_str).unwrap_or("?");
            Span::styled(
                format!("Code {} found{}", code, grid),
                Style::default().fg(Color::Green),
            )
        } else if session.current_host() == Some(key.as_str()) {
            Span::styled(format!("Connected{}", grid), Style::default().fg(Color::Cyan))
        } else {
            Span::styled("Unknown", Style::default().fg(Color::DarkGray))
        };
        lines.push(Line::from(vec![
            Span::styled(
                format!("{}: ", scenario.display_label(key)),
                Style::default().fg(Color::White),
            ),
            state,
        ]));
    }

    let briefing = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Briefing "))
        .wrap(Wrap { trim: false });
    f.render_widget(briefing, area);
}

fn draw_log(f: &mut Frame, app: &App, area: Rect) {
    let width = area.width.saturating_sub(2).max(1) as usize;
    let height = area.height.saturating_sub(2) as usize;

    let lines: Vec<Line> = app
        .transcript
        .lines()
        .iter()
        .map(|(text, tone)| Line::from(Span::styled(text.clone(), tone_style(*tone))))
        .collect();
    // Wrapped row count, so the newest line stays in view.
    let rows: usize = app
        .transcript
        .lines()
        .iter()
        .map(|(text, _)| text.chars().count().div_ceil(width).max(1))
        .sum();
    let bottom = rows.saturating_sub(height) as u16;
    let scroll = bottom.saturating_sub(app.log_scroll);

    let title = if app.log_scroll > 0 {
        " Terminal [PgUp/PgDn to scroll] "
    } else {
        " Terminal "
    };
    let log = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    f.render_widget(log, area);
}

fn draw_image_popup(f: &mut Frame, src: &str, caption: Option<&str>) {
    let area = f.area();
    let popup = Rect {
        x: area.width / 4,
        y: area.height / 3,
        width: area.width / 2,
        height: 7.min(area.height),
    };
    let mut text = vec![Line::from(Span::styled(
        format!("[image] {}", src),
        Style::default().fg(Color::Cyan),
    ))];
    if let Some(caption) = caption {
        text.push(Line::raw(caption.to_string()));
    }
    text.push(Line::raw(""));
    text.push(Line::from(Span::styled(
        "Esc to close",
        Style::default().fg(Color::DarkGray),
    )));
    f.render_widget(Clear, popup);
    f.render_widget(
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(" Recovered image ")),
        popup,
    );
}

fn draw_title_screen(f: &mut Frame, app: &App) {
    let area = f.area();

    let title_art = r#"
    ╔═══════════════════════════════════════════════════════╗
    ║                                                       ║
    ║      ███████╗ ██████╗██╗  ██╗ ██████╗                 ║
    ║      ██╔════╝██╔════╝██║  ██║██╔═══██╗                ║
    ║      █████╗  ██║     ███████║██║   ██║                ║
    ║      ██╔══╝  ██║     ██╔══██║██║   ██║                ║
    ║      ███████╗╚██████╗██║  ██║╚██████╔╝                ║
    ║      ╚══════╝ ╚═════╝╚═╝  ╚═╝ ╚═════╝                 ║
    ║                                                       ║
    ║            I N T E L N E T   ·   training build       ║
    ║                                                       ║
    ╚═══════════════════════════════════════════════════════╝
"#;

    let menu_height = app.menu_len() as u16 + 2;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(15),
            Constraint::Length(menu_height),
            Constraint::Min(1),
        ])
        .split(area);

    let title = Paragraph::new(title_art)
        .style(Style::default().fg(Color::Green))
        .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    let highlight = Style::default()
        .fg(Color::Black)
        .bg(Color::Green)
        .add_modifier(Modifier::BOLD);
    let mut entries: Vec<Line> = app
        .catalogue
        .iter()
        .map(|meta| {
            let name = if meta.title.is_empty() { &meta.id } else { &meta.title };
            format!("  {}  ", name)
        })
        .chain([
            "  FREE TERMINAL  ".to_string(),
            "  QUIT  ".to_string(),
        ])
        .enumerate()
        .map(|(i, text)| {
            let style = if i == app.selected {
                highlight
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(Span::styled(text, style))
        })
        .collect();
    if app.catalogue.is_empty() {
        entries.insert(
            0,
            Line::from(Span::styled(
                "(no scenarios found)",
                Style::default().fg(Color::DarkGray),
            )),
        );
    }
    let menu = Paragraph::new(entries).alignment(Alignment::Center);
    f.render_widget(menu, chunks[1]);

    let objective = app
        .catalogue
        .get(app.selected)
        .map(|m| m.objective.as_str())
        .unwrap_or_default();
    let help = Paragraph::new(vec![
        Line::from(Span::styled(objective.to_string(), Style::default().fg(Color::Cyan))),
        Line::raw(""),
        Line::from(Span::styled(
            "↑/↓ to select  •  ENTER to confirm  •  q to quit",
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .alignment(Alignment::Center);
    f.render_widget(help, chunks[2]);
}
