use crate::app::{App, AppMode};
use crate::config::Icons;
use chrono::{DateTime, Local, Utc};
use fieldclock_core::{format_hm, format_hms, SessionRecord, TimerEvent, TimerStatus};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Gauge, List, ListItem, Paragraph},
    Frame,
};

/// Draws one frame. Every duration on screen is computed from the same `now`.
pub fn draw(f: &mut Frame, app: &App, now: DateTime<Utc>) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(area);

    draw_header(f, chunks[0], app);
    draw_work_day(f, chunks[1], app, now);
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[2]);
    draw_tasks(f, body[0], app, now);
    draw_task_detail(f, body[1], app, now);
    draw_status_bar(f, chunks[3], app);

    match &app.mode {
        AppMode::AddingTask => draw_input_overlay(f, "New Task", &app.input_buffer, app),
        AppMode::ShowSessions => draw_sessions_overlay(f, app),
        AppMode::ShowHelp => draw_help_overlay(f, app),
        AppMode::Normal => {}
    }
}

fn status_icon(icons: &Icons, status: TimerStatus) -> &str {
    match status {
        TimerStatus::NotStarted => &icons.not_started,
        TimerStatus::InProgress => &icons.play,
        TimerStatus::Paused => &icons.pause,
        TimerStatus::Completed => &icons.done,
    }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let text = Line::from(vec![
        Span::raw(icons.header_left.clone()),
        Span::styled(
            "FIELDCLOCK",
            Style::default().fg(theme.blue).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" {} {}", icons.separator, app.day.date.format("%a %d %b %Y"))),
        Span::raw(icons.header_right.clone()),
    ]);
    f.render_widget(
        Paragraph::new(text).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(theme.black)),
        ),
        area,
    );
}

fn draw_work_day(f: &mut Frame, area: Rect, app: &App, now: DateTime<Utc>) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let tracker = &app.day.tracker;
    let own = tracker.display_duration(now);
    let total = app.day.total_display(now);
    let target = app.config.day.target_secs();
    let block = Block::default()
        .title(Span::styled(
            format!(" {} Work day ", icons.work_day),
            Style::default().fg(theme.gray),
        ))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.green));
    let inner_area = block.inner(area);
    f.render_widget(block, area);
    let v_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner_area);

    let started = tracker
        .actual_start_time()
        .map_or_else(|| "--:--:--".to_string(), local_time);
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(
                format!("{} {}", status_icon(icons, tracker.status()), format_hms(own)),
                Style::default()
                    .fg(theme.foreground)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(
                    "  {} total {} {} started {}",
                    icons.separator,
                    format_hms(total),
                    icons.separator,
                    started
                ),
                Style::default().fg(theme.gray),
            ),
        ]))
        .alignment(Alignment::Center),
        v_chunks[0],
    );
    let ratio = if target > 0 {
        (total as f64 / target as f64).min(1.0)
    } else {
        0.0
    };
    f.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(theme.blue).bg(theme.black))
            .label(format!("{} / {}", format_hm(total), format_hm(target)))
            .ratio(ratio),
        v_chunks[1],
    );
}

fn draw_tasks(f: &mut Frame, area: Rect, app: &App, now: DateTime<Utc>) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let block = Block::default()
        .title(Span::styled(
            format!(" {} Tasks ", icons.task_list),
            Style::default().fg(theme.gray),
        ))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.green));
    let inner_area = block.inner(area);
    f.render_widget(block, area);
    if app.day.tasks.is_empty() {
        f.render_widget(
            Paragraph::new("No tasks. Press 'a' to add one.")
                .style(Style::default().fg(theme.gray))
                .alignment(Alignment::Center),
            inner_area,
        );
        return;
    }
    let constraints: Vec<Constraint> = app
        .day
        .tasks
        .iter()
        .map(|_| Constraint::Length(1))
        .collect();
    let task_chunks = Layout::default().constraints(constraints).split(inner_area);
    for (i, task) in app.day.tasks.iter().enumerate() {
        let Some(item_area) = task_chunks.get(i) else {
            break;
        };
        let status = task.tracker.status();
        let left = vec![
            if i == app.selected_task {
                Span::styled(icons.select.clone(), Style::default().fg(theme.selection))
            } else {
                Span::raw(" ")
            },
            Span::raw(format!(" {} ", status_icon(icons, status))),
            Span::styled(
                task.description.clone(),
                if status == TimerStatus::Completed {
                    Style::default()
                        .fg(theme.gray)
                        .add_modifier(Modifier::CROSSED_OUT)
                } else {
                    Style::default().fg(theme.foreground)
                },
            ),
        ];
        let right = Span::styled(
            format!(" {} ", format_hm(task.tracker.display_duration(now))),
            Style::default().fg(if status == TimerStatus::InProgress {
                theme.cyan
            } else {
                theme.gray
            }),
        );
        if i == app.selected_task {
            f.render_widget(
                Block::default().style(Style::default().bg(theme.black)),
                *item_area,
            );
        }
        f.render_widget(Paragraph::new(Line::from(left)), *item_area);
        f.render_widget(
            Paragraph::new(Line::from(right)).alignment(Alignment::Right),
            *item_area,
        );
    }
}

fn draw_task_detail(f: &mut Frame, area: Rect, app: &App, now: DateTime<Utc>) {
    let theme = &app.config.theme;
    let block = Block::default()
        .title(Span::styled(" Selected ", Style::default().fg(theme.gray)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.green));
    let inner_area = block.inner(area);
    f.render_widget(block, area);
    let Some(task) = app.selected() else {
        return;
    };

    let mut lines = vec![
        Line::from(Span::styled(
            task.description.clone(),
            Style::default().fg(theme.foreground).add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled(
                format_hms(task.tracker.display_duration(now)),
                Style::default().fg(theme.cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  {}", task.tracker.status()),
                Style::default().fg(theme.gray),
            ),
        ]),
        Line::raw(""),
    ];
    lines.extend(session_lines(task.tracker.sessions(), app));
    f.render_widget(Paragraph::new(lines), inner_area);
}

fn session_lines<'a>(sessions: &[SessionRecord], app: &App) -> Vec<Line<'a>> {
    let theme = &app.config.theme;
    if sessions.is_empty() {
        return vec![Line::from(Span::styled(
            "No sessions yet",
            Style::default().fg(theme.gray),
        ))];
    }
    sessions
        .iter()
        .enumerate()
        .map(|(i, s)| {
            Line::from(vec![
                Span::styled(format!("{:>2}. ", i + 1), Style::default().fg(theme.blue)),
                Span::raw(format!(
                    "{} - {}  ",
                    local_time(s.start_time),
                    local_time(s.end_time)
                )),
                Span::styled(format_hms(s.duration), Style::default().fg(theme.gray)),
            ])
        })
        .collect()
}

fn event_hint(event: TimerEvent, task: bool) -> &'static str {
    match (event, task) {
        (TimerEvent::Start, true) => "space:start",
        (TimerEvent::Resume, true) => "space:resume",
        (TimerEvent::Pause, true) => "space:pause",
        (TimerEvent::Finish, true) => "x:finish",
        (TimerEvent::Start, false) => "g:start day",
        (TimerEvent::Resume, false) => "g:resume day",
        (TimerEvent::Pause, false) => "g:pause day",
        (TimerEvent::Finish, false) => "G:finish day",
    }
}

/// Keys for the actions that are legal right now.
fn available_hints(app: &App) -> Vec<&'static str> {
    let mut hints = vec!["a:add"];
    if let Some(task) = app.selected() {
        let toggle = task.tracker.toggle_event();
        hints.extend(
            task.tracker
                .available_events()
                .into_iter()
                .filter(|e| *e == TimerEvent::Finish || Some(*e) == toggle)
                .map(|e| event_hint(e, true)),
        );
        hints.push("d:del");
    }
    let toggle = app.day.tracker.toggle_event();
    hints.extend(
        app.day
            .tracker
            .available_events()
            .into_iter()
            .filter(|e| *e == TimerEvent::Finish || Some(*e) == toggle)
            .map(|e| event_hint(e, false)),
    );
    hints.extend(["l:log", "?:help", "q:quit"]);
    hints
}

fn status_help(app: &App) -> String {
    let separator = format!(" {} ", app.config.icons.separator);
    match (&app.mode, &app.status_message) {
        (AppMode::Normal, Some(message)) => message.clone(),
        (AppMode::Normal, None) => available_hints(app).join(separator.as_str()),
        (AppMode::AddingTask, _) => ["enter:confirm", "esc:cancel"].join(separator.as_str()),
        _ => "esc:close".to_string(),
    }
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let (mode_text, mode_color) = match app.mode {
        AppMode::Normal => ("NORMAL", theme.green),
        AppMode::AddingTask => ("INSERT", theme.yellow),
        AppMode::ShowSessions => ("LOG", theme.blue),
        AppMode::ShowHelp => ("HELP", theme.magenta),
    };
    let help = status_help(app);
    let help_style = if app.status_message.is_some() && app.mode == AppMode::Normal {
        Style::default().fg(theme.red)
    } else {
        Style::default()
    };
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(
                format!(" {} ", mode_text),
                Style::default()
                    .bg(mode_color)
                    .fg(theme.background)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::styled(help, help_style),
        ]))
        .block(Block::default().style(Style::default().bg(theme.black).fg(theme.gray))),
        area,
    );
}

fn draw_input_overlay(f: &mut Frame, title: &str, input: &str, app: &App) {
    let area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, area);
    let block = Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.config.theme.yellow))
        .border_type(BorderType::Double)
        .style(Style::default().bg(app.config.theme.background));
    let inner_area = block.inner(area);
    f.render_widget(block, area);
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("▸ ", Style::default().fg(app.config.theme.foreground)),
            Span::styled(input, Style::default().fg(app.config.theme.foreground)),
            Span::styled(
                &app.config.icons.input_cursor,
                Style::default()
                    .fg(app.config.theme.foreground)
                    .add_modifier(Modifier::SLOW_BLINK),
            ),
        ])),
        inner_area,
    );
}

fn draw_sessions_overlay(f: &mut Frame, app: &App) {
    let area = centered_rect(50, 60, f.area());
    f.render_widget(Clear, area);
    let block = Block::default()
        .title(" Work day sessions ")
        .borders(Borders::ALL)
        .border_type(BorderType::Double)
        .border_style(Style::default().fg(app.config.theme.blue))
        .style(Style::default().bg(app.config.theme.background));
    let inner_area = block.inner(area);
    f.render_widget(block, area);
    f.render_widget(
        Paragraph::new(session_lines(app.day.tracker.sessions(), app)),
        inner_area,
    );
}

fn draw_help_overlay(f: &mut Frame, app: &App) {
    let theme = &app.config.theme;
    let area = centered_rect(60, 70, f.area());
    f.render_widget(Clear, area);

    let shortcuts = [
        ("General", vec![("q", "Quit"), ("?", "Toggle help"), ("l", "Work day log")]),
        (
            "Tasks",
            vec![
                ("a", "Add task"),
                ("d", "Delete task"),
                ("Space", "Start/pause/resume task"),
                ("x", "Finish task"),
            ],
        ),
        ("Work day", vec![("g", "Start/pause/resume day"), ("G", "Finish day")]),
        ("Navigation", vec![("j/↓", "Move down"), ("k/↑", "Move up")]),
    ];
    let items: Vec<ListItem> = shortcuts
        .iter()
        .flat_map(|(section, keys)| {
            let header = ListItem::new(Line::from(Span::styled(
                *section,
                Style::default().fg(theme.blue).add_modifier(Modifier::BOLD),
            )));
            std::iter::once(header).chain(keys.iter().map(move |(key, action)| {
                ListItem::new(Line::from(vec![
                    Span::styled(format!("  {:<6}", key), Style::default().fg(theme.selection)),
                    Span::raw(*action),
                ]))
            }))
        })
        .collect();
    f.render_widget(
        List::new(items).block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_type(BorderType::Double)
                .border_style(Style::default().fg(theme.magenta))
                .style(Style::default().bg(theme.background)),
        ),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
