use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;

use crate::db::Database;
use crate::models::{ApplicantStatus, JobPosting};
use crate::pages::jobs::JobsPage;
use crate::render::truncate;
use crate::session::CurrentUser;

struct AppState<'u> {
    page: JobsPage,
    user: Option<&'u CurrentUser>,
    selected: usize,
    scroll_offset: u16,
    /// Search term being typed; `None` outside search mode.
    input: Option<String>,
    status: Option<String>,
}

impl<'u> AppState<'u> {
    fn new(page: JobsPage, user: Option<&'u CurrentUser>) -> Self {
        Self {
            page,
            user,
            selected: 0,
            scroll_offset: 0,
            input: None,
            status: None,
        }
    }

    fn visible_len(&self) -> usize {
        self.page.visible().len()
    }

    fn current_job(&self) -> Option<&JobPosting> {
        self.page.visible().get(self.selected).copied()
    }

    fn clamp(&mut self) {
        let len = self.visible_len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    fn next(&mut self) {
        if self.selected + 1 < self.visible_len() {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    /// Runs a job action against the selected posting and reports the outcome
    /// in the status line.
    fn act(&mut self, db: &Database, key: char) {
        let Some(job_id) = self.current_job().map(|j| j.id) else {
            return;
        };
        let Some(user) = self.user else {
            self.status = Some("Sign in first: hire login <email> <password> --remember".to_string());
            return;
        };
        let outcome = match key {
            'a' => self
                .page
                .apply(db, user, job_id)
                .map(|_| format!("Applied to job #{}.", job_id)),
            'w' => self.page.withdraw(db, user, job_id).map(|removed| {
                if removed {
                    format!("Withdrew from job #{}.", job_id)
                } else {
                    "Nothing withdrawn; the listing was out of date.".to_string()
                }
            }),
            'd' => self
                .page
                .delete(db, user, job_id)
                .map(|_| format!("Deleted job #{}.", job_id)),
            _ => return,
        };
        self.status = Some(match outcome {
            Ok(message) => message,
            Err(e) => format!("Error: {}", e),
        });
        self.clamp();
    }

    /// Returns false when the browser should close.
    fn handle_key(&mut self, db: &Database, code: KeyCode) -> bool {
        if let Some(input) = self.input.as_mut() {
            match code {
                KeyCode::Enter => {
                    let term = input.trim().to_string();
                    self.page.set_search(&term);
                    self.input = None;
                    self.selected = 0;
                    self.scroll_offset = 0;
                    self.status = Some(self.page.route().path());
                }
                KeyCode::Esc => self.input = None,
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Char(c) => input.push(c),
                _ => {}
            }
            return true;
        }
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.prev(),
            KeyCode::Char('J') | KeyCode::PageDown => self.scroll_down(),
            KeyCode::Char('K') | KeyCode::PageUp => self.scroll_up(),
            KeyCode::Char('/') => self.input = Some(self.page.search().to_string()),
            KeyCode::Char(c @ ('a' | 'w' | 'd')) => self.act(db, c),
            _ => {}
        }
        true
    }
}

pub fn run_browse(db: &Database, user: Option<&CurrentUser>, search: Option<&str>) -> Result<()> {
    let page = JobsPage::load(db, search)?;
    if page.jobs().is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    let mut state = AppState::new(page, user);

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, db);

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState<'_>,
    db: &Database,
) -> Result<()> {
    let mut list_state = ListState::default();

    loop {
        list_state.select(Some(state.selected).filter(|_| state.visible_len() > 0));
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if !state.handle_key(db, key.code) {
                break;
            }
        }
    }
    Ok(())
}

fn status_style(status: ApplicantStatus) -> Style {
    match status {
        ApplicantStatus::Pending => Style::default().fg(Color::Yellow),
        ApplicantStatus::Accepted => Style::default().fg(Color::Green),
        ApplicantStatus::Rejected => Style::default().fg(Color::Red),
    }
}

fn draw(frame: &mut Frame, state: &AppState<'_>, list_state: &mut ListState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(rows[0]);

    let visible = state.page.visible();
    let items: Vec<ListItem> = visible
        .iter()
        .map(|job| {
            let mark = match state.user.and_then(|u| job.application_for(&u.uid)) {
                Some(r) => match r.status {
                    ApplicantStatus::Pending => "*",
                    ApplicantStatus::Accepted => "+",
                    ApplicantStatus::Rejected => "x",
                },
                None => " ",
            };
            ListItem::new(format!("{} #{:<4} {}", mark, job.id, truncate(&job.title, 35)))
        })
        .collect();

    let title = if state.page.search().is_empty() {
        format!(" Jobs ({}) ", visible.len())
    } else {
        format!(" Jobs ({}/{}) search: {} ", visible.len(), state.page.jobs().len(), state.page.search())
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, chunks[0], list_state);

    let detail = Paragraph::new(build_detail(state))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));
    frame.render_widget(detail, chunks[1]);

    let footer = match (&state.input, &state.status) {
        (Some(input), _) => Paragraph::new(format!(" /{}", input)),
        (None, Some(status)) => Paragraph::new(format!(" {}", status)).style(Style::default().fg(Color::Yellow)),
        (None, None) => Paragraph::new(" j/k:navigate  J/K:scroll  /:search  a:apply w:withdraw d:delete  q:quit")
            .style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(footer, rows[1]);
}

fn build_detail<'a>(state: &'a AppState<'_>) -> Text<'a> {
    let Some(job) = state.current_job() else {
        return Text::raw("No matching jobs");
    };

    let mut lines: Vec<Line> = Vec::new();
    lines.push(Line::from(Span::styled(
        job.title.clone(),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("{} | {}", job.job_type, job.salary)));
    if !job.keywords.is_empty() {
        lines.push(Line::from(Span::styled(
            job.keywords.join(", "),
            Style::default().fg(Color::Cyan),
        )));
    }
    match state.user {
        Some(u) if u.is_admin() => {
            lines.push(Line::from(format!("Applicants: {}", job.applicants.len())));
        }
        Some(u) => {
            if let Some(record) = job.application_for(&u.uid) {
                lines.push(Line::from(Span::styled(
                    format!("Your application: {}", record.status),
                    status_style(record.status),
                )));
            }
        }
        None => {}
    }
    lines.push(Line::from(""));
    for line in textwrap::fill(&job.description, 70).lines() {
        lines.push(Line::from(line.to_string()));
    }

    Text::from(lines)
}
