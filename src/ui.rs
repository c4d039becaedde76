use crate::{
    app::{App, InstallStatus, ListingStatus, LogLevel, ToastLevel},
    notice::NoticeLevel,
};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Padding, Paragraph, Wrap},
};
use std::{
    io,
    time::{Duration, Instant},
};

const SIDE_PANEL_WIDTH: u16 = 36;

/// Colours for the checklist window.
struct Palette {
    title: Color,
    highlight: Color,
    frame: Color,
    text: Color,
    dim: Color,
    ok: Color,
    warn: Color,
    bad: Color,
    bar_bg: Color,
    log_bg: Color,
}

const PALETTE: Palette = Palette {
    title: Color::Rgb(120, 190, 255),
    highlight: Color::Rgb(70, 110, 160),
    frame: Color::Rgb(65, 75, 90),
    text: Color::Rgb(220, 230, 240),
    dim: Color::Rgb(135, 145, 155),
    ok: Color::Rgb(120, 220, 140),
    warn: Color::Rgb(230, 200, 120),
    bad: Color::Rgb(235, 100, 95),
    bar_bg: Color::Rgb(22, 28, 36),
    log_bg: Color::Rgb(16, 20, 26),
};

fn framed(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(PALETTE.frame))
        .title(Span::styled(
            title,
            Style::default().fg(PALETTE.title).add_modifier(Modifier::BOLD),
        ))
}

pub fn run(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_loop(terminal: &mut Terminal<impl Backend>, app: &mut App) -> Result<()> {
    loop {
        app.tick();
        app.clamp_cursor();
        terminal.draw(|frame| draw(frame, app))?;

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, key);
                }
            }
        }
    }

    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if app.dialog.is_some() {
        handle_dialog_mode(app, key);
        return;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => app.cancel(),
        KeyCode::Char('k') | KeyCode::Char('K') | KeyCode::Up => app.cursor_up(),
        KeyCode::Char('j') | KeyCode::Char('J') | KeyCode::Down => app.cursor_down(),
        KeyCode::PageUp => app.page_up(),
        KeyCode::PageDown => app.page_down(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        KeyCode::Char(' ') => app.toggle_current(),
        KeyCode::Char('a') | KeyCode::Char('A') => app.select_all(true),
        KeyCode::Char('n') | KeyCode::Char('N') => app.select_all(false),
        KeyCode::Enter | KeyCode::Char('i') | KeyCode::Char('I') => app.install(),
        KeyCode::Char('c') | KeyCode::Char('C') => app.copy_log(),
        KeyCode::Char('[') => app.scroll_log_up(3),
        KeyCode::Char(']') => app.scroll_log_down(3),
        _ => {}
    }
}

fn handle_dialog_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Esc => app.dialog_confirm(),
        KeyCode::Char('c') | KeyCode::Char('C') => app.copy_log(),
        _ => {}
    }
}

fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(9),
            Constraint::Length(1),
        ])
        .split(area);

    let header = Paragraph::new(vec![
        Line::from(vec![
            Span::styled(
                "Install Mods",
                Style::default()
                    .fg(PALETTE.title)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(app.config.repo_label(), Style::default().fg(PALETTE.text)),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("Local: ", Style::default().fg(PALETTE.dim)),
            Span::styled(app.local.len().to_string(), Style::default().fg(PALETTE.text)),
            Span::raw("   "),
            Span::styled("Remote: ", Style::default().fg(PALETTE.dim)),
            Span::styled(remote_count_label(app), Style::default().fg(PALETTE.text)),
            Span::raw("   "),
            Span::styled("Missing: ", Style::default().fg(PALETTE.dim)),
            Span::styled(
                app.missing.len().to_string(),
                Style::default().fg(PALETTE.warn),
            ),
            Span::raw("   "),
            Span::styled("Selected: ", Style::default().fg(PALETTE.dim)),
            Span::styled(
                app.selection.selected_count().to_string(),
                Style::default().fg(PALETTE.ok).add_modifier(Modifier::BOLD),
            ),
        ]),
    ])
    .style(Style::default().bg(PALETTE.bar_bg))
    .alignment(Alignment::Center);
    frame.render_widget(header, chunks[0]);

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(SIDE_PANEL_WIDTH)])
        .split(chunks[1]);

    draw_checklist(frame, app, body_chunks[0]);

    let details = Paragraph::new(build_details(app))
        .block(framed("Details").padding(Padding::horizontal(1)))
        .wrap(Wrap { trim: false });
    frame.render_widget(details, body_chunks[1]);

    let log_height = chunks[2].height.saturating_sub(2) as usize;
    let log = Paragraph::new(build_log_lines(app, log_height))
        .block(framed("Log"))
        .style(Style::default().bg(PALETTE.log_bg));
    frame.render_widget(log, chunks[2]);

    let status = Paragraph::new(status_bar_line(app, chunks[3].width))
        .style(Style::default().fg(PALETTE.dim).bg(PALETTE.bar_bg));
    frame.render_widget(status, chunks[3]);

    draw_toast(frame, app, chunks[1]);
    draw_dialog(frame, app);
}

fn remote_count_label(app: &App) -> String {
    match app.listing_status {
        ListingStatus::Loading => "...".to_string(),
        ListingStatus::Failed => "-".to_string(),
        ListingStatus::Ready { truncated } => {
            if truncated {
                format!("{}+", app.remote.len())
            } else {
                app.remote.len().to_string()
            }
        }
    }
}

fn draw_checklist(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let block = framed("Missing Mods");
    let placeholder = |text: &str, color: Color| {
        Paragraph::new(Line::from(Span::styled(
            text.to_string(),
            Style::default().fg(color),
        )))
        .block(framed("Missing Mods").padding(Padding::top(1)))
        .alignment(Alignment::Center)
    };

    match app.listing_status {
        ListingStatus::Loading => {
            frame.render_widget(placeholder("Fetching remote listing...", PALETTE.dim), area);
            return;
        }
        ListingStatus::Failed if app.missing.is_empty() => {
            frame.render_widget(placeholder("Remote listing unavailable.", PALETTE.bad), area);
            return;
        }
        _ => {}
    }

    if app.selection.is_empty() {
        frame.render_widget(
            placeholder("Your mods directory is up to date!", PALETTE.ok),
            area,
        );
        return;
    }

    let locked = app.selection_locked();
    let items: Vec<ListItem> = app
        .selection
        .entries()
        .iter()
        .map(|entry| {
            let (mark, mark_style) = if entry.include {
                ("[x]", Style::default().fg(PALETTE.ok))
            } else {
                ("[ ]", Style::default().fg(PALETTE.dim))
            };
            let name_style = if locked {
                Style::default().fg(PALETTE.dim)
            } else {
                Style::default().fg(PALETTE.text)
            };
            ListItem::new(Line::from(vec![
                Span::styled(mark, mark_style),
                Span::raw(" "),
                Span::styled(entry.name.clone(), name_style),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(PALETTE.highlight)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    let mut state = ListState::default();
    state.select(Some(app.cursor));
    frame.render_stateful_widget(list, area, &mut state);
}

fn build_details(app: &App) -> Vec<Line<'static>> {
    let label = |text: &'static str| Span::styled(text, Style::default().fg(PALETTE.dim));
    let value = |text: String| Span::styled(text, Style::default().fg(PALETTE.text));

    let mut lines = vec![
        Line::from(label("Mods dir")),
        Line::from(value(app.mods_dir().display().to_string())),
        Line::from(""),
        Line::from(label("Checkout from")),
        Line::from(value(app.config.remote_ref())),
        Line::from(""),
        Line::from(label("Extension")),
        Line::from(value(app.config.extension.clone())),
        Line::from(""),
    ];

    let (install_text, install_style) = if app.is_installing() {
        ("Running".to_string(), Style::default().fg(PALETTE.warn))
    } else if app.install_enabled {
        (
            format!("Ready ({})", app.selection.selected_count()),
            Style::default().fg(PALETTE.ok).add_modifier(Modifier::BOLD),
        )
    } else {
        ("Disabled".to_string(), Style::default().fg(PALETTE.dim))
    };
    lines.push(Line::from(label("Install")));
    lines.push(Line::from(Span::styled(install_text, install_style)));

    if let InstallStatus::Running { step } = &app.install_status {
        lines.push(Line::from(Span::styled(
            step.clone(),
            Style::default().fg(PALETTE.text),
        )));
    }

    if matches!(app.listing_status, ListingStatus::Ready { truncated: true }) {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Listing truncated by the API",
            Style::default().fg(PALETTE.warn),
        )));
    }

    lines
}

/// Status on the left, key hint flush right. The hint is cut first when the
/// bar is too narrow.
fn status_bar_line(app: &App, width: u16) -> String {
    let width = width as usize;
    let status: String = format!("Status: {}", app.status).chars().take(width).collect();
    let room = width - status.chars().count();
    let hint: String = app.hint().chars().take(room.saturating_sub(1)).collect();
    let gap = room - hint.chars().count();
    format!("{status}{}{hint}", " ".repeat(gap))
}

/// The newest entries that fit, shifted back by the scroll offset.
fn build_log_lines(app: &App, height: usize) -> Vec<Line<'static>> {
    if app.logs.is_empty() {
        return vec![Line::from(Span::styled(
            "No recent events.",
            Style::default().fg(PALETTE.dim),
        ))];
    }
    let scroll = app.log_scroll.min(app.logs.len().saturating_sub(height));
    let mut lines: Vec<Line<'static>> = app
        .logs
        .iter()
        .rev()
        .skip(scroll)
        .take(height)
        .map(|entry| {
            let (mark, color) = match entry.level {
                LogLevel::Info => ("[i]", PALETTE.title),
                LogLevel::Warn => ("[!]", PALETTE.warn),
                LogLevel::Error => ("[x]", PALETTE.bad),
            };
            Line::from(vec![
                Span::styled(mark, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(" "),
                Span::styled(entry.message.clone(), Style::default().fg(PALETTE.text)),
            ])
        })
        .collect();
    lines.reverse();
    lines
}

fn draw_dialog(frame: &mut Frame<'_>, app: &App) {
    let Some(dialog) = &app.dialog else {
        return;
    };

    let area = frame.size();
    let message_lines: Vec<Line> = dialog
        .message
        .lines()
        .map(|line| Line::from(line.to_string()))
        .collect();
    // Title, blank, message, blank, button, plus the border.
    let height = (message_lines.len() as u16 + 6).max(7);
    let width = (area.width / 3 * 2).max(34);
    let dialog_area = centered(area, width, height);

    let accent = match dialog.level {
        NoticeLevel::Info => PALETTE.ok,
        NoticeLevel::Error => PALETTE.bad,
    };
    let ok_style = Style::default()
        .fg(Color::Black)
        .bg(accent)
        .add_modifier(Modifier::BOLD);

    let mut lines = Vec::new();
    lines.push(Line::from(Span::styled(
        dialog.title.clone(),
        Style::default().fg(accent).add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(""));
    lines.extend(message_lines);
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!(" {} ", dialog.ok_label),
        ok_style,
    )));

    frame.render_widget(Clear, dialog_area);
    let dialog_block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(PALETTE.highlight))
        .style(Style::default().bg(PALETTE.bar_bg));
    let dialog_widget = Paragraph::new(lines)
        .block(dialog_block)
        .style(Style::default().fg(PALETTE.text))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false });
    frame.render_widget(dialog_widget, dialog_area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(2));
    let height = height.min(area.height.saturating_sub(2));
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

/// One-line toast along the top of the checklist; hidden behind dialogs.
fn draw_toast(frame: &mut Frame<'_>, app: &App, body_area: Rect) {
    let Some(toast) = app.toast.as_ref().filter(|toast| toast.expires_at > Instant::now()) else {
        return;
    };
    if app.dialog.is_some() || body_area.width < 8 {
        return;
    }

    let max_width = body_area.width.saturating_sub(4).max(8);
    let mut message = toast.message.clone();
    if message.chars().count() + 4 > max_width as usize {
        message = message.chars().take(max_width as usize - 7).collect();
        message.push_str("...");
    }
    let width = (message.chars().count() as u16 + 4).clamp(24.min(max_width), max_width);
    let area = Rect::new(
        body_area.x + body_area.width.saturating_sub(width) / 2,
        body_area.y + 1,
        width,
        3,
    )
    .intersection(frame.size());

    let color = match toast.level {
        ToastLevel::Info => PALETTE.title,
        ToastLevel::Warn => PALETTE.warn,
        ToastLevel::Error => PALETTE.bad,
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(color))
        .style(Style::default().bg(PALETTE.bar_bg));
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(message)
            .block(block)
            .style(Style::default().fg(PALETTE.text))
            .alignment(Alignment::Center),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        app::App,
        config::SyncConfig,
        fetch::{FetchError, Vcs},
        remote::{ContentEntry, ListingSource, RemoteListingError},
    };
    use ratatui::backend::TestBackend;
    use std::{path::Path, thread};
    use tempfile::TempDir;

    struct Listing(Vec<&'static str>);

    impl ListingSource for Listing {
        fn list(&self) -> Result<Vec<ContentEntry>, RemoteListingError> {
            Ok(self
                .0
                .iter()
                .map(|name| ContentEntry {
                    name: name.to_string(),
                    kind: None,
                })
                .collect())
        }
    }

    struct NoGit;

    impl Vcs for NoGit {
        fn check_working_copy(&self, dir: &Path, _remote: &str) -> Result<(), FetchError> {
            Err(FetchError::NotAWorkingCopy {
                dir: dir.to_path_buf(),
                detail: "fatal: not a git repository".to_string(),
            })
        }

        fn fetch(&self, _dir: &Path, _remote: &str) -> Result<(), FetchError> {
            Ok(())
        }

        fn verify_ref(&self, _dir: &Path, _reference: &str) -> Result<(), FetchError> {
            Ok(())
        }

        fn checkout_file(&self, _dir: &Path, _reference: &str, _path: &str) -> Result<(), FetchError> {
            Ok(())
        }
    }

    fn loaded_app(dir: &Path, names: Vec<&'static str>) -> App {
        let config = SyncConfig {
            mods_dir: Some(dir.to_path_buf()),
            ..SyncConfig::default()
        };
        let mut app = App::with_backends(config, Box::new(Listing(names)), Box::new(NoGit)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while app.is_loading() {
            assert!(Instant::now() < deadline, "listing never arrived");
            app.tick();
            thread::sleep(Duration::from_millis(5));
        }
        app
    }

    fn render(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| draw(frame, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer.get(x, y).symbol());
            }
            text.push('\n');
        }
        text
    }

    fn press(app: &mut App, code: KeyCode) {
        handle_key(app, KeyEvent::from(code));
    }

    #[test]
    fn checklist_shows_missing_entries() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("alpha.jar"), b"a").unwrap();
        let app = loaded_app(tmp.path(), vec!["alpha.jar", "beta.jar", "notes.txt"]);
        let screen = render(&app);
        assert!(screen.contains("[x] beta.jar"));
        assert!(!screen.contains("alpha.jar "));
        assert!(screen.contains("Install Mods"));
    }

    #[test]
    fn up_to_date_message_when_nothing_missing() {
        let tmp = TempDir::new().unwrap();
        let app = loaded_app(tmp.path(), vec!["notes.txt"]);
        assert!(render(&app).contains("Your mods directory is up to date!"));
    }

    #[test]
    fn keys_toggle_and_cancel() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(tmp.path(), vec!["a.jar", "b.jar"]);

        press(&mut app, KeyCode::Char('n'));
        assert!(!app.install_enabled);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char(' '));
        assert_eq!(app.selection.selected(), vec!["b.jar".to_string()]);
        assert!(app.install_enabled);

        press(&mut app, KeyCode::Esc);
        assert!(app.should_quit);
    }

    #[test]
    fn failed_install_dialog_renders_and_closes_window() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(tmp.path(), vec!["a.jar"]);

        press(&mut app, KeyCode::Enter);
        let deadline = Instant::now() + Duration::from_secs(5);
        while app.dialog.is_none() {
            assert!(Instant::now() < deadline, "install never finished");
            app.tick();
            thread::sleep(Duration::from_millis(5));
        }

        let screen = render(&app);
        assert!(screen.contains("Git Error"));
        assert!(screen.contains("Error installing mods:"));

        press(&mut app, KeyCode::Char('q'));
        assert!(app.dialog.is_some());
        press(&mut app, KeyCode::Enter);
        assert!(app.should_quit);
    }

    #[test]
    fn log_panel_shows_newest_entries_and_scrolls_back() {
        let tmp = TempDir::new().unwrap();
        let mut app = loaded_app(tmp.path(), vec![]);
        for index in 0..20 {
            app.log_info(format!("entry {index}"));
        }
        let text = |app: &App| -> Vec<String> {
            build_log_lines(app, 3)
                .iter()
                .map(|line| line.spans.iter().map(|span| span.content.as_ref()).collect())
                .collect()
        };

        assert_eq!(text(&app), vec!["[i] entry 17", "[i] entry 18", "[i] entry 19"]);
        app.scroll_log_up(2);
        assert_eq!(text(&app), vec!["[i] entry 15", "[i] entry 16", "[i] entry 17"]);
        app.log_info("entry 20".to_string());
        assert_eq!(text(&app), vec!["[i] entry 15", "[i] entry 16", "[i] entry 17"]);
    }

    #[test]
    fn status_bar_fits_width() {
        let tmp = TempDir::new().unwrap();
        let app = loaded_app(tmp.path(), vec![]);
        let line = status_bar_line(&app, 120);
        assert_eq!(line.len(), 120);
        assert!(line.starts_with("Status: "));
        assert!(line.ends_with(app.hint()));

        let narrow = status_bar_line(&app, 12);
        assert_eq!(narrow.chars().count(), 12);
        assert!(narrow.starts_with("Status: "));
        assert_eq!(status_bar_line(&app, 0), "");
    }
}
