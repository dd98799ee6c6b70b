use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;

use crate::coordinator::{Coordinator, Stage};
use crate::editor::{self, TextBuffer};
use crate::gateway::{self, BackendGateway, Outcome, Request};
use crate::intake;
use crate::models::{ContactRecord, DraftEntry, RecordKey};

const TICK: Duration = Duration::from_millis(150);

const STAGES: [Stage; 3] = [Stage::Draft, Stage::Review, Stage::Completed];

#[derive(Debug)]
enum Mode {
    Normal,
    EditDraft { id: String, buffer: TextBuffer },
    EditBody { key: RecordKey, buffer: TextBuffer },
    EditEmails { key: RecordKey, buffer: TextBuffer },
    Company { url: TextBuffer, domain: TextBuffer, on_domain: bool },
}

#[derive(Debug, Clone, PartialEq)]
enum EditTarget {
    Draft(String),
    Body(RecordKey),
}

#[derive(Debug)]
enum Action {
    None,
    Quit,
    Dispatch(Request),
    ExternalEdit(EditTarget),
}

struct AppState {
    coordinator: Coordinator,
    focus: Stage,
    selected: [usize; 3],
    scroll_offset: u16,
    mode: Mode,
    api_url: String,
}

fn column(stage: Stage) -> usize {
    match stage {
        Stage::Draft => 0,
        Stage::Review => 1,
        Stage::Completed => 2,
    }
}

impl AppState {
    fn new(api_url: &str) -> Self {
        Self {
            coordinator: Coordinator::new(),
            focus: Stage::Draft,
            selected: [0; 3],
            scroll_offset: 0,
            mode: Mode::Normal,
            api_url: api_url.to_string(),
        }
    }

    fn len(&self, stage: Stage) -> usize {
        match stage {
            Stage::Draft => self.coordinator.drafts().len(),
            Stage::Review => self.coordinator.review().len(),
            Stage::Completed => self.coordinator.completed().len(),
        }
    }

    fn selected(&self) -> usize {
        self.selected[column(self.focus)]
    }

    fn select(&mut self, stage: Stage, index: usize) {
        self.selected[column(stage)] = index;
        self.scroll_offset = 0;
    }

    /// Keeps every selection inside its column after the stages change.
    fn clamp_selection(&mut self) {
        for stage in STAGES {
            let len = self.len(stage);
            let sel = &mut self.selected[column(stage)];
            if *sel >= len {
                *sel = len.saturating_sub(1);
            }
        }
    }

    fn current_draft(&self) -> Option<&DraftEntry> {
        match self.focus {
            Stage::Draft => self.coordinator.drafts().get(self.selected()),
            _ => None,
        }
    }

    fn current_record(&self) -> Option<&ContactRecord> {
        match self.focus {
            Stage::Review => self.coordinator.review().get(self.selected()),
            Stage::Completed => self.coordinator.completed().get(self.selected()),
            Stage::Draft => None,
        }
    }

    fn next(&mut self) {
        let len = self.len(self.focus);
        let sel = self.selected();
        if len > 0 && sel < len - 1 {
            self.select(self.focus, sel + 1);
        }
    }

    fn prev(&mut self) {
        let sel = self.selected();
        if sel > 0 {
            self.select(self.focus, sel - 1);
        }
    }

    fn focus_next(&mut self) {
        self.focus = STAGES[(column(self.focus) + 1) % 3];
        self.scroll_offset = 0;
    }

    fn focus_prev(&mut self) {
        self.focus = STAGES[(column(self.focus) + 2) % 3];
        self.scroll_offset = 0;
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    fn apply(&mut self, outcome: Outcome) {
        self.coordinator.apply(outcome);
        self.clamp_selection();
        self.drop_stale_edit();
    }

    /// A refresh may reconcile away the record being edited; the edit goes with it.
    fn drop_stale_edit(&mut self) {
        let stale = match &self.mode {
            Mode::EditDraft { id, .. } => self.coordinator.draft(id).is_none(),
            Mode::EditBody { key, .. } | Mode::EditEmails { key, .. } => {
                self.coordinator.review_record(key).is_none()
            }
            _ => false,
        };
        if stale {
            tracing::info!("record left review while being edited; discarding edit");
            self.mode = Mode::Normal;
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Action {
        match self.mode {
            Mode::Normal => self.handle_normal(key),
            Mode::Company { .. } => self.handle_company(key),
            _ => self.handle_edit(key),
        }
    }

    fn handle_normal(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Action::Quit,
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => self.focus_next(),
            KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => self.focus_prev(),
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.prev(),
            KeyCode::Char('J') | KeyCode::PageDown => self.scroll_down(),
            KeyCode::Char('K') | KeyCode::PageUp => self.scroll_up(),
            KeyCode::Char('a') => {
                let id = self.coordinator.create_draft_input_entry();
                self.focus = Stage::Draft;
                self.select(Stage::Draft, self.len(Stage::Draft) - 1);
                self.mode = Mode::EditDraft {
                    id,
                    buffer: TextBuffer::default(),
                };
            }
            KeyCode::Enter | KeyCode::Char('e') => self.start_inline_edit(),
            KeyCode::Char('E') => {
                if let Some(target) = self.edit_target() {
                    return Action::ExternalEdit(target);
                }
            }
            KeyCode::Char('m') => {
                if let (Stage::Review, Some(record)) = (self.focus, self.current_record()) {
                    self.mode = Mode::EditEmails {
                        key: record.key(),
                        buffer: TextBuffer::new(&record.possible_emails.join(", ")),
                    };
                }
            }
            KeyCode::Char('s') => return self.submit_selected(),
            KeyCode::Char('d') => {
                if let Some(id) = self.current_draft().map(|d| d.id.clone()) {
                    self.coordinator.discard_draft_input_entry(&id);
                    self.clamp_selection();
                }
            }
            KeyCode::Char('r') => {
                if let (Stage::Completed, Some(key)) =
                    (self.focus, self.current_record().map(ContactRecord::key))
                {
                    if self.coordinator.redraft(&key) {
                        self.clamp_selection();
                        self.focus = Stage::Review;
                        self.select(Stage::Review, self.len(Stage::Review) - 1);
                    }
                }
            }
            KeyCode::Char('c') => {
                self.mode = Mode::Company {
                    url: TextBuffer::default(),
                    domain: TextBuffer::default(),
                    on_domain: false,
                };
            }
            KeyCode::Char('R') => return Action::Dispatch(self.coordinator.begin_refresh()),
            KeyCode::Char('x') => {
                self.coordinator.dismiss_error();
                self.coordinator.dismiss_notice();
            }
            _ => {}
        }
        Action::None
    }

    fn edit_target(&self) -> Option<EditTarget> {
        match self.focus {
            Stage::Draft => self.current_draft().map(|d| EditTarget::Draft(d.id.clone())),
            Stage::Review => self.current_record().map(|r| EditTarget::Body(r.key())),
            Stage::Completed => None,
        }
    }

    fn edit_text(&self, target: &EditTarget) -> Option<String> {
        match target {
            EditTarget::Draft(id) => self.coordinator.draft(id).map(|d| d.text.clone()),
            EditTarget::Body(key) => self
                .coordinator
                .review_record(key)
                .map(|r| r.body().unwrap_or_default().to_string()),
        }
    }

    fn start_inline_edit(&mut self) {
        let Some(target) = self.edit_target() else { return };
        let Some(text) = self.edit_text(&target) else { return };
        let buffer = TextBuffer::new(&text);
        self.mode = match target {
            EditTarget::Draft(id) => Mode::EditDraft { id, buffer },
            EditTarget::Body(key) => Mode::EditBody { key, buffer },
        };
    }

    fn commit_edit(&mut self, target: &EditTarget, text: &str) {
        match target {
            EditTarget::Draft(id) => {
                self.coordinator.set_draft_text(id, text);
            }
            EditTarget::Body(key) => {
                self.coordinator.edit_body(key, text);
            }
        }
    }

    fn submit_selected(&mut self) -> Action {
        let request = match self.focus {
            Stage::Draft => {
                let Some(draft) = self.current_draft() else { return Action::None };
                let (id, text) = (draft.id.clone(), draft.text.clone());
                self.coordinator.begin_submit(&id, &text)
            }
            Stage::Review => {
                let Some(record) = self.current_record() else { return Action::None };
                let (key, body) = (record.key(), record.body().unwrap_or_default().to_string());
                self.coordinator.begin_send(&key, &body)
            }
            Stage::Completed => None,
        };
        request.map_or(Action::None, Action::Dispatch)
    }

    fn handle_edit(&mut self, key: KeyEvent) -> Action {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::EditDraft { id, buffer } => {
                if ctrl && key.code == KeyCode::Char('s') {
                    // Save and submit in one go
                    self.coordinator.set_draft_text(&id, buffer.text());
                    return self
                        .coordinator
                        .begin_submit(&id, buffer.text())
                        .map_or(Action::None, Action::Dispatch);
                }
                match edit_keystroke(buffer, key, false) {
                    Edit::Continue(buffer) => self.mode = Mode::EditDraft { id, buffer },
                    Edit::Commit(buffer) => {
                        self.coordinator.set_draft_text(&id, buffer.text());
                    }
                    Edit::Cancel => {}
                }
            }
            Mode::EditBody { key: record_key, buffer } => match edit_keystroke(buffer, key, false) {
                Edit::Continue(buffer) => self.mode = Mode::EditBody { key: record_key, buffer },
                Edit::Commit(buffer) => {
                    self.coordinator.edit_body(&record_key, buffer.text());
                }
                Edit::Cancel => {}
            },
            Mode::EditEmails { key: record_key, buffer } => match edit_keystroke(buffer, key, true) {
                Edit::Continue(buffer) => self.mode = Mode::EditEmails { key: record_key, buffer },
                Edit::Commit(buffer) => {
                    let emails = intake::parse_email_list(buffer.text());
                    self.coordinator.set_possible_emails(&record_key, emails);
                }
                Edit::Cancel => {}
            },
            other => self.mode = other,
        }
        Action::None
    }

    fn handle_company(&mut self, key: KeyEvent) -> Action {
        let Mode::Company { url, domain, on_domain } = &mut self.mode else {
            return Action::None;
        };
        match key.code {
            KeyCode::Esc => self.mode = Mode::Normal,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => *on_domain = !*on_domain,
            KeyCode::Enter if !*on_domain && domain.text().trim().is_empty() => *on_domain = true,
            KeyCode::Enter => {
                let (url, domain) = (url.text().to_string(), domain.text().to_string());
                self.mode = Mode::Normal;
                if let Some(request) = self.coordinator.begin_company(&url, &domain) {
                    self.focus = Stage::Draft;
                    return Action::Dispatch(request);
                }
            }
            _ => {
                let field = if *on_domain { domain } else { url };
                match key.code {
                    KeyCode::Backspace => field.backspace(),
                    KeyCode::Delete => field.delete(),
                    KeyCode::Left => field.left(),
                    KeyCode::Right => field.right(),
                    KeyCode::Home => field.home(),
                    KeyCode::End => field.end(),
                    KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                        field.insert(c)
                    }
                    _ => {}
                }
            }
        }
        Action::None
    }
}

enum Edit {
    Continue(TextBuffer),
    Commit(TextBuffer),
    Cancel,
}

/// Esc saves, Ctrl-X throws the edit away. `single_line` makes Enter save too.
fn edit_keystroke(mut buffer: TextBuffer, key: KeyEvent, single_line: bool) -> Edit {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => return Edit::Commit(buffer),
        KeyCode::Char('x') if ctrl => return Edit::Cancel,
        KeyCode::Enter if single_line => return Edit::Commit(buffer),
        KeyCode::Enter => buffer.newline(),
        KeyCode::Backspace => buffer.backspace(),
        KeyCode::Delete => buffer.delete(),
        KeyCode::Left => buffer.left(),
        KeyCode::Right => buffer.right(),
        KeyCode::Up => buffer.up(),
        KeyCode::Down => buffer.down(),
        KeyCode::Home => buffer.home(),
        KeyCode::End => buffer.end(),
        KeyCode::Tab => {
            for _ in 0..4 {
                buffer.insert(' ');
            }
        }
        KeyCode::Char(c) if !ctrl => buffer.insert(c),
        _ => {}
    }
    Edit::Continue(buffer)
}

// --- Backend plumbing ---

/// Runs gateway requests on the tokio runtime and posts outcomes back to the UI thread.
struct Dispatcher {
    runtime: Handle,
    gateway: Arc<dyn BackendGateway>,
    outcomes: mpsc::Sender<Outcome>,
}

impl Dispatcher {
    fn spawn(&self, request: Request) {
        let gateway = Arc::clone(&self.gateway);
        let tx = self.outcomes.clone();
        self.runtime.spawn(async move {
            let outcome = gateway::dispatch(gateway.as_ref(), request).await;
            let _ = tx.send(outcome);
        });
    }

    /// Fetches completed records now and then every `period` until aborted.
    fn start_refresh_timer(&self, period: Duration) -> tokio::task::JoinHandle<()> {
        let gateway = Arc::clone(&self.gateway);
        let tx = self.outcomes.clone();
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let outcome = gateway::dispatch(gateway.as_ref(), Request::FetchCompleted).await;
                if tx.send(outcome).is_err() {
                    break;
                }
            }
        })
    }
}

pub fn run_board(
    runtime: Handle,
    gateway: Arc<dyn BackendGateway>,
    api_url: &str,
    refresh_interval: Duration,
) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let dispatcher = Dispatcher {
        runtime,
        gateway,
        outcomes: tx,
    };
    let mut state = AppState::new(api_url);

    let timer = dispatcher.start_refresh_timer(refresh_interval);
    tracing::info!(api_url, ?refresh_interval, "board started");

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, &dispatcher, &rx);

    // Restore terminal
    timer.abort();
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    dispatcher: &Dispatcher,
    outcomes: &mpsc::Receiver<Outcome>,
) -> Result<()> {
    loop {
        while let Ok(outcome) = outcomes.try_recv() {
            state.apply(outcome);
        }

        terminal.draw(|frame| draw(frame, state))?;

        if !event::poll(TICK)? {
            continue;
        }
        let Event::Key(key) = event::read()? else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match state.handle_key(key) {
            Action::None => {}
            Action::Quit => break,
            Action::Dispatch(request) => dispatcher.spawn(request),
            Action::ExternalEdit(target) => {
                let Some(initial) = state.edit_text(&target) else { continue };

                disable_raw_mode()?;
                stdout().execute(LeaveAlternateScreen)?;
                let edited = editor::edit_externally(&initial);
                stdout().execute(EnterAlternateScreen)?;
                enable_raw_mode()?;
                terminal.clear()?;

                match edited {
                    Ok(text) => state.commit_edit(&target, &text),
                    Err(e) => state.coordinator.report_error(format!("Editor failed: {:#}", e)),
                }
            }
        }
    }
    Ok(())
}

// --- Rendering ---

fn draw(frame: &mut Frame, state: &AppState) {
    let banners = state.coordinator.error().is_some() as u16
        + state.coordinator.notice().is_some() as u16;

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(banners),
            Constraint::Percentage(40),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(header(state), rows[0]);
    draw_banners(frame, state, rows[1]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 3); 3])
        .split(rows[2]);
    for (stage, area) in STAGES.into_iter().zip(columns.iter()) {
        draw_column(frame, state, stage, *area);
    }

    draw_detail(frame, state, rows[3]);

    let help = Paragraph::new(help_text(&state.mode)).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, rows[4]);

    if let Mode::Company { url, domain, on_domain } = &state.mode {
        draw_company_dialog(frame, url, domain, *on_domain);
    }
}

fn header(state: &AppState) -> Paragraph<'static> {
    let mut spans = vec![
        Span::styled(" Outreach ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("| {} ", state.api_url)),
    ];
    if let Some(at) = state.coordinator.last_refresh() {
        let local = at.with_timezone(&chrono::Local);
        spans.push(Span::styled(
            format!("| refreshed {} ", local.format("%H:%M:%S")),
            Style::default().fg(Color::DarkGray),
        ));
    }
    if state.coordinator.is_busy() {
        spans.push(Span::styled(
            "| Processing...",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
    }
    Paragraph::new(Line::from(spans))
}

fn draw_banners(frame: &mut Frame, state: &AppState, area: Rect) {
    let mut lines = Vec::new();
    if let Some(error) = state.coordinator.error() {
        lines.push(Line::from(Span::styled(
            format!(" ! {}  (x to dismiss)", error),
            Style::default().fg(Color::White).bg(Color::Red),
        )));
    }
    if let Some(notice) = state.coordinator.notice() {
        lines.push(Line::from(Span::styled(
            format!(" {}  (x to dismiss)", notice),
            Style::default().fg(Color::Black).bg(Color::Green),
        )));
    }
    frame.render_widget(Paragraph::new(lines), area);
}

fn draw_column(frame: &mut Frame, state: &AppState, stage: Stage, area: Rect) {
    let c = &state.coordinator;
    let (title, items): (&str, Vec<ListItem>) = match stage {
        Stage::Draft => (
            "Drafts",
            c.drafts()
                .iter()
                .map(|draft| {
                    let marker = if c.is_generating(&draft.id) { "~" } else { " " };
                    ListItem::new(format!("{} {}", marker, draft_label(draft)))
                })
                .collect(),
        ),
        Stage::Review => (
            "Review",
            c.review()
                .iter()
                .map(|record| {
                    let marker = if c.is_sending(&record.key()) {
                        ">"
                    } else if record.email2.is_some() {
                        "*"
                    } else {
                        " "
                    };
                    ListItem::new(format!("{} {}", marker, record_label(record)))
                })
                .collect(),
        ),
        Stage::Completed => (
            "Completed",
            c.completed()
                .iter()
                .map(|record| ListItem::new(format!("+ {}", record_label(record))))
                .collect(),
        ),
    };

    let focused = state.focus == stage;
    let border_style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let count = items.len();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(format!(" {} ({}) ", title, count)),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    let mut list_state = ListState::default();
    if count > 0 && focused {
        list_state.select(Some(state.selected[column(stage)]));
    }
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn draft_label(draft: &DraftEntry) -> String {
    let preview = intake::preview(&draft.text);
    match (preview.name, preview.profile_link) {
        (Some(name), _) => name,
        (None, Some(link)) => link,
        (None, None) => format!("(empty) {}", draft.created_at.with_timezone(&chrono::Local).format("%H:%M:%S")),
    }
}

fn record_label(record: &ContactRecord) -> String {
    let name = intake::truncate_chars(record.display_name(), 28);
    match record.effective_domain() {
        Some(domain) => format!("{} | {}", name, domain),
        None => name,
    }
}

fn draw_detail(frame: &mut Frame, state: &AppState, area: Rect) {
    let editing = match &state.mode {
        Mode::EditDraft { buffer, .. } => Some(("Editing draft (Esc save, Ctrl-S save+submit, Ctrl-X cancel)", buffer)),
        Mode::EditBody { buffer, .. } => Some(("Editing email (Esc save, Ctrl-X cancel)", buffer)),
        Mode::EditEmails { buffer, .. } => Some(("Possible emails, comma separated (Enter save)", buffer)),
        _ => None,
    };

    if let Some((title, buffer)) = editing {
        let (line, col) = buffer.position();
        let inner_height = area.height.saturating_sub(2) as usize;
        let scroll = line.saturating_sub(inner_height.saturating_sub(1)) as u16;
        let widget = Paragraph::new(buffer.text().to_string())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan))
                    .title(format!(" {} ", title)),
            )
            .scroll((scroll, 0));
        frame.render_widget(widget, area);
        frame.set_cursor_position(Position::new(
            area.x + 1 + col as u16,
            area.y + 1 + line as u16 - scroll,
        ));
        return;
    }

    let detail = build_detail(state);
    let widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));
    frame.render_widget(widget, area);
}

fn build_detail(state: &AppState) -> Text<'static> {
    if let Some(draft) = state.current_draft() {
        return build_draft_detail(state, draft);
    }
    match state.current_record() {
        Some(record) => build_record_detail(state, record),
        None => Text::from(Span::styled(
            match state.focus {
                Stage::Draft => "No drafts. Press 'a' to paste a person or 'c' to load a company.",
                Stage::Review => "Nothing awaiting review.",
                Stage::Completed => "No completed outreach yet.",
            },
            Style::default().fg(Color::DarkGray),
        )),
    }
}

fn heading(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    ))
}

fn build_draft_detail(state: &AppState, draft: &DraftEntry) -> Text<'static> {
    let mut lines: Vec<Line> = Vec::new();
    let preview = intake::preview(&draft.text);

    lines.push(heading(preview.name.as_deref().unwrap_or("New person")));
    if let Some(link) = preview.profile_link {
        lines.push(Line::from(format!("LinkedIn: {}", link)));
    }
    if let Some(handle) = preview.twitter_handle {
        lines.push(Line::from(format!("Twitter: @{}", handle)));
    }
    if state.coordinator.is_generating(&draft.id) {
        lines.push(Line::from(Span::styled(
            "Processing... gathering information",
            Style::default().fg(Color::Yellow),
        )));
    }
    lines.push(Line::from(""));

    if draft.text.trim().is_empty() {
        lines.push(Line::from(Span::styled(
            "Paste person info here, e.g.",
            Style::default().fg(Color::DarkGray),
        )));
        for example in [
            "Jesse Zhang",
            "https://linkedin.com/in/jesse",
            "@jesseontwitter",
            "Works at decagon.ai",
            "Met at hackathon, interested in LLMs",
        ] {
            lines.push(Line::from(Span::styled(
                format!("  {}", example),
                Style::default().fg(Color::DarkGray),
            )));
        }
    } else {
        for line in draft.text.lines() {
            lines.push(Line::from(line.to_string()));
        }
    }
    Text::from(lines)
}

fn build_record_detail(state: &AppState, record: &ContactRecord) -> Text<'static> {
    let mut lines: Vec<Line> = Vec::new();

    lines.push(heading(record.display_name()));
    if let Some(domain) = record.effective_domain() {
        lines.push(Line::from(Span::styled(domain, Style::default().fg(Color::DarkGray))));
    }
    if let Some(link) = &record.profile_link {
        lines.push(Line::from(format!("LinkedIn: {}", link)));
    }
    if let Some(handle) = &record.twitter_handle {
        lines.push(Line::from(format!(
            "Twitter: https://twitter.com/{}",
            handle.trim_start_matches('@')
        )));
    }

    let (status, style) = if state.coordinator.is_sending(&record.key()) {
        ("sending", Style::default().fg(Color::Yellow))
    } else if state.focus == Stage::Completed {
        ("completed", Style::default().fg(Color::Green))
    } else {
        ("awaiting review", Style::default().fg(Color::Cyan))
    };
    lines.push(Line::from(Span::styled(format!("Status: {}", status), style)));

    if record.email_sent.is_some() || record.twitter_message_sent.is_some() {
        lines.push(Line::from(format!(
            "Delivery: {}",
            crate::coordinator::delivery_summary(record)
        )));
    }
    lines.push(Line::from(""));

    if !record.possible_emails.is_empty() {
        lines.push(heading("Possible Email Addresses"));
        for email in &record.possible_emails {
            lines.push(Line::from(format!("  {}", email)));
        }
        lines.push(Line::from(""));
    }

    let title = if record.email2.is_some() { "Email (edited)" } else { "Email Draft" };
    lines.push(heading(title));
    match record.body() {
        Some(body) => {
            for line in body.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        None => lines.push(Line::from(Span::styled(
            "(no draft)",
            Style::default().fg(Color::DarkGray),
        ))),
    }
    lines.push(Line::from(""));

    for (label, text) in [
        ("Insights", &record.insights),
        ("Notes", &record.notes),
        ("LinkedIn Summary", &record.linkedin_summary),
        ("Twitter Summary", &record.twitter_summary),
    ] {
        let Some(text) = text else { continue };
        lines.push(heading(label));
        for line in textwrap::fill(text, 70).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
        lines.push(Line::from(""));
    }

    Text::from(lines)
}

fn draw_company_dialog(frame: &mut Frame, url: &TextBuffer, domain: &TextBuffer, on_domain: bool) {
    let area = centered_rect(70, 6, frame.area());
    frame.render_widget(Clear, area);

    let field = |label: &str, buffer: &TextBuffer, active: bool| {
        let style = if active {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        Line::from(vec![
            Span::styled(format!("{:<8}", label), style.add_modifier(Modifier::BOLD)),
            Span::styled(buffer.text().to_string(), style),
        ])
    };

    let lines = vec![
        field("URL:", url, !on_domain),
        field("Domain:", domain, on_domain),
        Line::from(""),
        Line::from(Span::styled(
            "Enter: load people (replaces drafts)  Tab: switch field  Esc: cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let dialog = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Add Company "),
    );
    frame.render_widget(dialog, area);

    let (row, buffer) = if on_domain { (1, domain) } else { (0, url) };
    let (_, col) = buffer.position();
    frame.set_cursor_position(Position::new(
        (area.x + 1 + 8 + col as u16).min(area.right().saturating_sub(2)),
        area.y + 1 + row,
    ));
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn help_text(mode: &Mode) -> &'static str {
    match mode {
        Mode::Normal => {
            " tab:column j/k:select a:add e:edit E:$EDITOR m:emails s:submit/send d:discard r:redraft c:company R:refresh x:dismiss q:quit"
        }
        Mode::Company { .. } => " enter:load  tab:switch field  esc:cancel",
        _ => " esc:save  ctrl-x:cancel  arrows:move",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use crate::models::CompanyPerson;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts completed-record fetches; every other call fails.
    #[derive(Default)]
    struct CountingGateway {
        fetches: AtomicUsize,
    }

    fn unused() -> GatewayError {
        GatewayError::Status {
            status: 500,
            detail: "not expected".to_string(),
        }
    }

    #[async_trait]
    impl BackendGateway for CountingGateway {
        async fn generate_person_content(&self, _text: &str) -> Result<ContactRecord, GatewayError> {
            Err(unused())
        }

        async fn send_person(&self, _person: &ContactRecord) -> Result<ContactRecord, GatewayError> {
            Err(unused())
        }

        async fn get_company_people(
            &self,
            _url: &str,
            _domain: &str,
        ) -> Result<Vec<CompanyPerson>, GatewayError> {
            Err(unused())
        }

        async fn get_completed_records(&self) -> Result<Vec<ContactRecord>, GatewayError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_text(state: &mut AppState, text: &str) {
        for c in text.chars() {
            let key = if c == '\n' { press(KeyCode::Enter) } else { press(KeyCode::Char(c)) };
            assert!(matches!(state.handle_key(key), Action::None));
        }
    }

    fn jesse() -> ContactRecord {
        ContactRecord {
            name: "Jesse Zhang".to_string(),
            profile_link: Some("https://linkedin.com/in/jesse".to_string()),
            email: Some("Hi Jesse".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_type_and_save_draft() {
        let mut state = AppState::new("http://localhost:8000");
        state.handle_key(press(KeyCode::Char('a')));
        assert!(matches!(state.mode, Mode::EditDraft { .. }));

        type_text(&mut state, "Jesse Zhang\nhttps://linkedin.com/in/jesse");
        state.handle_key(press(KeyCode::Esc));

        assert!(matches!(state.mode, Mode::Normal));
        assert_eq!(
            state.coordinator.drafts()[0].text,
            "Jesse Zhang\nhttps://linkedin.com/in/jesse"
        );
        assert_eq!(draft_label(&state.coordinator.drafts()[0]), "Jesse Zhang");
    }

    #[test]
    fn test_ctrl_s_submits_draft() {
        let mut state = AppState::new("http://localhost:8000");
        state.handle_key(press(KeyCode::Char('a')));
        type_text(&mut state, "Jesse Zhang");

        let action = state.handle_key(ctrl('s'));
        let Action::Dispatch(Request::Generate { draft_id, text }) = action else {
            panic!("expected a generate request, got {action:?}");
        };
        assert_eq!(text, "Jesse Zhang");
        assert!(state.coordinator.is_generating(&draft_id));
        assert!(matches!(state.mode, Mode::Normal));

        state.apply(Outcome::Generated {
            draft_id,
            result: Ok(jesse()),
        });
        assert!(state.coordinator.drafts().is_empty());
        assert_eq!(state.coordinator.review().len(), 1);
    }

    #[test]
    fn test_ctrl_x_cancels_edit() {
        let mut state = AppState::new("http://localhost:8000");
        state.handle_key(press(KeyCode::Char('a')));
        type_text(&mut state, "scratch");
        state.handle_key(ctrl('x'));

        assert!(matches!(state.mode, Mode::Normal));
        assert_eq!(state.coordinator.drafts()[0].text, "");
    }

    #[test]
    fn test_send_from_review_column() {
        let mut state = AppState::new("http://localhost:8000");
        let id = state.coordinator.create_draft_input_entry();
        state.coordinator.begin_submit(&id, "Jesse");
        state.apply(Outcome::Generated {
            draft_id: id,
            result: Ok(jesse()),
        });

        state.handle_key(press(KeyCode::Tab));
        assert_eq!(state.focus, Stage::Review);

        state.handle_key(press(KeyCode::Char('e')));
        state.handle_key(press(KeyCode::Char('!')));
        state.handle_key(press(KeyCode::Esc));

        let action = state.handle_key(press(KeyCode::Char('s')));
        let Action::Dispatch(Request::Send { person, .. }) = action else {
            panic!("expected a send request, got {action:?}");
        };
        assert_eq!(person.email2.as_deref(), Some("Hi Jesse!"));
    }

    #[test]
    fn test_company_dialog_dispatches_lookup() {
        let mut state = AppState::new("http://localhost:8000");
        state.handle_key(press(KeyCode::Char('c')));
        type_text(&mut state, "https://linkedin.com/company/decagon");
        assert!(matches!(state.handle_key(press(KeyCode::Enter)), Action::None));
        type_text(&mut state, "decagon.ai");

        let action = state.handle_key(press(KeyCode::Enter));
        let Action::Dispatch(Request::CompanyPeople { url, domain }) = action else {
            panic!("expected a company request, got {action:?}");
        };
        assert_eq!(url, "https://linkedin.com/company/decagon");
        assert_eq!(domain, "decagon.ai");
        assert!(matches!(state.mode, Mode::Normal));
    }

    #[test]
    fn test_refresh_drops_edit_of_reconciled_record() {
        let mut state = AppState::new("http://localhost:8000");
        let id = state.coordinator.create_draft_input_entry();
        state.coordinator.begin_submit(&id, "Jesse");
        state.apply(Outcome::Generated {
            draft_id: id,
            result: Ok(jesse()),
        });
        state.handle_key(press(KeyCode::Tab));
        state.handle_key(press(KeyCode::Enter));
        assert!(matches!(state.mode, Mode::EditBody { .. }));

        state.apply(Outcome::Completed {
            result: Ok(vec![jesse()]),
        });

        assert!(matches!(state.mode, Mode::Normal));
        assert!(state.coordinator.review().is_empty());
        assert_eq!(state.coordinator.completed().len(), 1);
    }

    #[test]
    fn test_redraft_key_moves_focus_to_review() {
        let mut state = AppState::new("http://localhost:8000");
        state.apply(Outcome::Completed {
            result: Ok(vec![jesse()]),
        });
        state.handle_key(press(KeyCode::BackTab));
        assert_eq!(state.focus, Stage::Completed);

        state.handle_key(press(KeyCode::Char('r')));
        assert_eq!(state.focus, Stage::Review);
        assert_eq!(state.coordinator.review().len(), 1);
        assert!(state.coordinator.completed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_timer_fires_at_start_then_every_period_until_aborted() {
        let gateway = Arc::new(CountingGateway::default());
        let (tx, rx) = mpsc::channel();
        let dispatcher = Dispatcher {
            runtime: Handle::current(),
            gateway: gateway.clone(),
            outcomes: tx,
        };
        let period = Duration::from_secs(60);
        let fetches = || gateway.fetches.load(Ordering::SeqCst);

        let timer = dispatcher.start_refresh_timer(period);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fetches(), 1);

        tokio::time::sleep(period - Duration::from_millis(2)).await;
        assert_eq!(fetches(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fetches(), 2);

        timer.abort();
        tokio::time::sleep(period * 3).await;
        assert_eq!(fetches(), 2);

        let outcomes: Vec<Outcome> = rx.try_iter().collect();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, Outcome::Completed { result: Ok(records) } if records.is_empty())));
    }

    #[test]
    fn test_centered_rect_clamps_to_area() {
        let area = Rect::new(0, 0, 40, 4);
        let rect = centered_rect(70, 6, area);
        assert_eq!(rect, Rect::new(0, 0, 40, 4));

        let rect = centered_rect(20, 2, Rect::new(0, 0, 40, 10));
        assert_eq!(rect, Rect::new(10, 4, 20, 2));
    }
}
