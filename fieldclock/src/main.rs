use anyhow::{Context, Result};
use chrono::{Local, Utc};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

mod app;
mod config;
mod ipc;
mod logging;
mod persistence;
mod ui;

use app::{App, AppMode, WorkDay};
use ipc::server::SharedApp;
use persistence::{JsonFileRepository, MemoryRepository, PersistenceError, Repository};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let config = config::load_config()?;

    let repo: Box<dyn Repository<WorkDay>> = match JsonFileRepository::open_default() {
        Ok(repo) => {
            info!(path = ?repo.path(), "using record store");
            Box::new(repo)
        }
        Err(PersistenceError::NoDataDir) => {
            warn!("no data directory available, work days will not outlive this process");
            Box::new(MemoryRepository::new())
        }
        Err(e) => return Err(e).context("Failed to open the work day store"),
    };

    let app = App::open(config, repo, Local::now().date_naive(), Utc::now())?;
    let socket_path = app.config.ipc.socket_path.clone();
    let app: SharedApp = Arc::new(Mutex::new(app));

    let server = tokio::spawn({
        let app = app.clone();
        let socket_path = socket_path.clone();
        async move {
            if let Err(e) = ipc::server::serve(&socket_path, app).await {
                error!("IPC server stopped: {:#}", e);
            }
        }
    });

    let ui_app = app.clone();
    let res = tokio::task::spawn_blocking(move || run_terminal(ui_app)).await?;

    server.abort();
    let _ = std::fs::remove_file(&socket_path);
    let mut app = lock(&app);
    app.sync();
    if app.is_dirty() {
        warn!(version = app.day.version, "exiting with unsaved changes");
    }
    res
}

fn lock(app: &SharedApp) -> MutexGuard<'_, App> {
    app.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_terminal(app: SharedApp) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = &res {
        error!("UI loop failed: {:#}", err);
    }
    res
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, shared: &SharedApp) -> Result<()> {
    let mut last_save = Instant::now();
    let mut last_draw: Option<(Instant, u64)> = None;
    let mut needs_redraw = true;

    loop {
        let notification = {
            let mut app = lock(shared);
            app.roll_over(Local::now().date_naive());

            // Live values tick every second; an idle screen only shows
            // minute-resolution values and can refresh less often.
            let now = Utc::now();
            let interval = if app.day.is_anything_running() {
                app.config.timing.live_refresh()
            } else {
                app.config.timing.list_refresh()
            };
            let stale = match last_draw {
                None => true,
                Some((at, version)) => at.elapsed() >= interval || version != app.day.version,
            };
            if needs_redraw || stale {
                terminal.draw(|f| ui::draw(f, &app, now))?;
                last_draw = Some((Instant::now(), app.day.version));
                needs_redraw = false;
            }

            if last_save.elapsed() >= app.config.timing.autosave() {
                app.sync();
                last_save = Instant::now();
            }

            if app.should_quit {
                app.sync();
                return Ok(());
            }
            app.due_notification(now)
        };
        if let Some((title, body)) = notification {
            app::send_notification(&title, &body);
        }

        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    handle_key(&mut lock(shared), key.code);
                    needs_redraw = true;
                }
                Event::Resize(_, _) => needs_redraw = true,
                _ => {}
            }
        }
    }
}

fn handle_key(app: &mut App, code: KeyCode) {
    let now = Utc::now();
    match app.mode {
        AppMode::Normal => {
            app.status_message = None;
            match code {
                KeyCode::Char('q') => app.should_quit = true,
                KeyCode::Char('a') => {
                    app.mode = AppMode::AddingTask;
                    app.input_buffer.clear();
                }
                KeyCode::Char(' ') => app.toggle_selected_task(now),
                KeyCode::Char('x') => app.finish_selected_task(now),
                KeyCode::Char('d') => app.delete_selected_task(),
                KeyCode::Char('g') => app.toggle_day(now),
                KeyCode::Char('G') => app.finish_day(now),
                KeyCode::Char('l') => app.mode = AppMode::ShowSessions,
                KeyCode::Char('?') => app.mode = AppMode::ShowHelp,
                KeyCode::Up | KeyCode::Char('k') => app.move_selection_up(),
                KeyCode::Down | KeyCode::Char('j') => app.move_selection_down(),
                _ => {}
            }
        }
        AppMode::AddingTask => match code {
            KeyCode::Esc => {
                app.mode = AppMode::Normal;
                app.input_buffer.clear();
            }
            KeyCode::Enter => app.handle_char('\n', now),
            KeyCode::Backspace => app.handle_backspace(),
            KeyCode::Char(c) => app.handle_char(c, now),
            _ => {}
        },
        AppMode::ShowSessions | AppMode::ShowHelp => {
            if matches!(
                code,
                KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('l') | KeyCode::Char('?')
            ) {
                app.mode = AppMode::Normal;
            }
        }
    }
}
