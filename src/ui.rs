use std::cell::RefCell;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::UnicodeWidthStr;

use crate::app::{self, Loaded, Target};
use crate::collapse::{ScrollBehavior, TapTarget, TitleAnchor};
use crate::comments::VisibleComment;
use crate::config::{self, Config};
use crate::data::Services;
use crate::debug;
use crate::detail::{relative_time, DetailOptions, Header, PostDetail};
use crate::lemmy::{parse_comment_path, CommentId, CommentSortType, CommentView, PostView};
use crate::markdown::Renderer;
use crate::media::Hero;
use crate::player;
use crate::read::{Action, ReadState};
use crate::reply::{Composer, ReplyOutcome, ReplyStart};
use crate::session::{self, Account};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);
const COMMENT_DEPTH_COLORS: [Color; 6] = [
    Color::Rgb(250, 179, 135),
    Color::Rgb(166, 227, 161),
    Color::Rgb(203, 166, 247),
    Color::Rgb(245, 194, 231),
    Color::Rgb(137, 220, 235),
    Color::Rgb(249, 226, 175),
];
const SPINNER_FRAMES: [&str; 8] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧"];
const OVERLAY_TEXT: [&str; 2] = [
    "You are viewing a single thread.",
    "Press v to view all comments.",
];

fn comment_depth_color(depth: usize) -> Color {
    COMMENT_DEPTH_COLORS[depth % COMMENT_DEPTH_COLORS.len()]
}

/// Rendered header rows plus the row the title sits on.
#[derive(Debug, Clone, Default)]
pub struct HeaderBlock {
    pub lines: Vec<Line<'static>>,
    pub title_row: usize,
    pub links: Vec<String>,
}

fn hero_line(hero: &Hero) -> Line<'static> {
    let accent = Style::default().fg(COLOR_ACCENT);
    let (label, url) = match hero {
        Hero::Image { url, alt } => {
            let label = match alt.as_deref().map(str::trim) {
                Some(alt) if !alt.is_empty() => format!("[image: {alt}] "),
                _ => "[image] ".to_string(),
            };
            (label, url)
        }
        Hero::Video { url } => ("[video] ".to_string(), url),
    };
    Line::from(vec![
        Span::styled(label, accent.add_modifier(Modifier::BOLD)),
        Span::styled(url.clone(), accent.add_modifier(Modifier::UNDERLINED)),
        Span::styled("  (m to open)", Style::default().fg(COLOR_TEXT_SECONDARY)),
    ])
}

/// Lays out the post header: hero, title with badges, the inline embed and
/// body when expanded, then byline and stats.
pub fn header_lines(
    header: &Header<'_>,
    collapsed: bool,
    width: u16,
    now: DateTime<Utc>,
) -> HeaderBlock {
    let renderer = Renderer::new();
    let secondary = Style::default().fg(COLOR_TEXT_SECONDARY);
    let accent = Style::default().fg(COLOR_ACCENT);
    let mut block = HeaderBlock::default();

    if let Some(hero) = &header.hero {
        block.lines.push(hero_line(hero));
        block.lines.push(Line::default());
    }

    block.title_row = block.lines.len();
    let title_style = Style::default()
        .fg(COLOR_TEXT_PRIMARY)
        .add_modifier(Modifier::BOLD);
    let title = renderer.render_inline(header.title, title_style);
    let mut spans = Vec::new();
    if header.announcement {
        spans.push(Span::styled(
            "[pinned] ",
            Style::default().fg(COLOR_SUCCESS).add_modifier(Modifier::BOLD),
        ));
    }
    if header.nsfw {
        spans.push(Span::styled(
            "NSFW ",
            Style::default().fg(COLOR_ERROR).add_modifier(Modifier::BOLD),
        ));
    }
    spans.extend(title.spans);
    block.lines.push(Line::from(spans));

    match &header.inline {
        Some(inline) => {
            block.lines.push(Line::default());
            if let Some(embed) = inline.embed {
                block.lines.push(Line::from(vec![
                    Span::styled("↗ ", accent),
                    Span::styled(embed.to_string(), accent.add_modifier(Modifier::UNDERLINED)),
                ]));
                block.links.push(embed.to_string());
            }
            if let Some(body) = inline.body {
                if inline.embed.is_some() {
                    block.lines.push(Line::default());
                }
                let rendered = renderer.render(body);
                block.lines.extend(rendered.text.lines);
                for link in rendered.links {
                    if !block.links.contains(&link) {
                        block.links.push(link);
                    }
                }
            }
        }
        None if collapsed => block.lines.push(Line::from(Span::styled(
            "▸ Enter expands the post",
            secondary.add_modifier(Modifier::ITALIC),
        ))),
        None => {}
    }

    block.lines.push(Line::default());
    block.lines.push(Line::from(vec![
        Span::styled(header.community.clone(), accent),
        Span::styled(format!(" · by {}", header.creator), secondary),
    ]));
    block
        .lines
        .push(Line::from(Span::styled(header.stats.label(now), secondary)));

    block.lines.push(Line::from(Span::styled(
        "─".repeat(usize::from(width.max(1))),
        Style::default().fg(COLOR_BORDER_IDLE),
    )));
    block
}

/// The text content of each line, spans concatenated.
pub fn plain_lines(lines: &[Line<'_>]) -> Vec<String> {
    lines
        .iter()
        .map(|line| line.spans.iter().map(|span| span.content.as_ref()).collect())
        .collect()
}

fn comment_lines(comment: &VisibleComment<'_>, width: usize, now: DateTime<Utc>) -> Vec<Line<'static>> {
    let view = comment.view;
    let indent_units = "  ".repeat(comment.depth);
    let indicator = if comment.local { "+" } else { "•" };
    let indicator_prefix = format!("{indent_units}{indicator} ");
    let rest_prefix = format!("{indent_units}  ");
    let body_prefix = format!("{indent_units}  ");

    let meta_style = Style::default()
        .fg(comment_depth_color(comment.depth))
        .add_modifier(Modifier::BOLD);
    let body_style = Style::default().fg(COLOR_TEXT_PRIMARY);

    let author = if view.creator.name.trim().is_empty() {
        "[deleted]"
    } else {
        view.creator.name.as_str()
    };
    let mut header = format!("{author} · {} points", view.counts.score);
    if let Some(published) = view.comment.published {
        header.push_str(&format!(" · {}", relative_time(published, now)));
    }
    if comment.local {
        header.push_str(" · just posted");
    }

    let mut lines = wrap_with_prefixes(
        &header,
        width,
        indicator_prefix.as_str(),
        rest_prefix.as_str(),
        meta_style,
    );

    let body = if view.comment.deleted {
        "[deleted]"
    } else if view.comment.removed {
        "[removed]"
    } else {
        view.comment.content.as_str()
    };
    if body.trim().is_empty() {
        lines.extend(wrap_with_prefix(
            "(no comment body)",
            width,
            body_prefix.as_str(),
            body_style,
        ));
        return lines;
    }

    for raw_line in body.lines() {
        if raw_line.trim().is_empty() {
            lines.push(Line::from(Span::styled(String::new(), body_style)));
            continue;
        }
        lines.extend(wrap_with_prefix(
            raw_line.trim(),
            width,
            body_prefix.as_str(),
            body_style,
        ));
    }

    lines
}

fn wrap_with_prefixes(
    text: &str,
    width: usize,
    first_prefix: &str,
    rest_prefix: &str,
    style: Style,
) -> Vec<Line<'static>> {
    if text.trim().is_empty() {
        return vec![Line::from(Span::styled(String::new(), style))];
    }

    if width == 0 {
        let mut line = String::with_capacity(first_prefix.len() + text.len());
        line.push_str(first_prefix);
        line.push_str(text);
        return vec![Line::from(Span::styled(line, style))];
    }

    let min_width = first_prefix
        .chars()
        .count()
        .max(rest_prefix.chars().count())
        .saturating_add(1);
    let options = WrapOptions::new(width.max(min_width))
        .break_words(false)
        .initial_indent(first_prefix)
        .subsequent_indent(rest_prefix);

    wrap(text, options)
        .into_iter()
        .map(|cow| Line::from(Span::styled(cow.into_owned(), style)))
        .collect()
}

fn wrap_with_prefix(text: &str, width: usize, prefix: &str, style: Style) -> Vec<Line<'static>> {
    wrap_with_prefixes(text, width, prefix, prefix, style)
}

fn line_visual_height(line: &Line<'_>, width: u16) -> usize {
    if width == 0 {
        return 0;
    }
    let content_width: usize = line
        .spans
        .iter()
        .map(|span| UnicodeWidthStr::width(span.content.as_ref()))
        .sum();
    if content_width == 0 {
        1
    } else {
        content_width.div_ceil(usize::from(width))
    }
}

fn visual_height(lines: &[Line<'_>], width: u16) -> usize {
    lines
        .iter()
        .map(|line| line_visual_height(line, width))
        .sum()
}

/// Rows the "view all comments" overlay takes at `width`, borders included.
fn overlay_height(width: u16) -> u16 {
    let inner = width.saturating_sub(2);
    let lines: Vec<Line<'_>> = OVERLAY_TEXT.iter().map(|text| Line::from(*text)).collect();
    let rows = visual_height(&lines, inner).max(OVERLAY_TEXT.len());
    u16::try_from(rows).unwrap_or(u16::MAX).saturating_add(2)
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let percent_y = percent_y.min(100);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage(100 - percent_x - (100 - percent_x) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage(100 - percent_y - (100 - percent_y) / 2),
        ])
        .split(horizontal[1]);
    vertical[1]
}

/// Vertical scroll of the post pane. Smooth scrolls move a third of the
/// remaining distance per tick.
#[derive(Debug, Default)]
struct ScrollState {
    offset: u16,
    target: Option<u16>,
    title_row: u16,
    max: u16,
}

impl ScrollState {
    fn step(&mut self) -> bool {
        let Some(target) = self.target else {
            return false;
        };
        if self.offset == target {
            self.target = None;
            return false;
        }
        let step = target.abs_diff(self.offset).div_ceil(3).max(1);
        self.offset = if target > self.offset {
            self.offset.saturating_add(step)
        } else {
            self.offset.saturating_sub(step)
        };
        if self.offset == target {
            self.target = None;
        }
        true
    }

    fn scroll_by(&mut self, delta: i32) {
        self.target = None;
        let next = (i32::from(self.offset) + delta).clamp(0, i32::from(self.max));
        self.offset = u16::try_from(next).unwrap_or(self.max);
    }

    fn set_bounds(&mut self, title_row: u16, max: u16) {
        self.title_row = title_row;
        self.max = max;
        self.offset = self.offset.min(max);
        if let Some(target) = self.target {
            self.target = Some(target.min(max));
        }
    }
}

impl TitleAnchor for ScrollState {
    fn scroll_into_view(&mut self, behavior: ScrollBehavior) {
        let row = self.title_row.min(self.max);
        match behavior {
            ScrollBehavior::Smooth => self.target = Some(row),
            ScrollBehavior::Instant => {
                self.offset = row;
                self.target = None;
            }
        }
    }
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }
}

/// Hands reply requests to the composer modal. The modal owns the sender
/// and reports the posted comment, or `None` when dismissed.
#[derive(Default)]
struct ModalComposer {
    request: RefCell<Option<Sender<Option<CommentView>>>>,
}

impl ModalComposer {
    fn take(&self) -> Option<Sender<Option<CommentView>>> {
        self.request.borrow_mut().take()
    }
}

impl Composer for ModalComposer {
    fn present_comment_reply(&self, post: &PostView) -> Receiver<Option<CommentView>> {
        let (tx, rx) = bounded(1);
        debug::log(format!("ui: composer opened for post {}", post.id()));
        *self.request.borrow_mut() = Some(tx);
        rx
    }
}

struct ComposeForm {
    text: String,
    outcome: Sender<Option<CommentView>>,
    submitting: bool,
    error: Option<String>,
}

impl ComposeForm {
    fn dismiss(self) {
        let _ = self.outcome.send(None);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginField {
    Username,
    Password,
}

struct LoginForm {
    username: String,
    password: String,
    active: LoginField,
    submitting: bool,
    error: Option<String>,
}

impl LoginForm {
    fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            password: String::new(),
            active: if username.is_empty() {
                LoginField::Username
            } else {
                LoginField::Password
            },
            submitting: false,
            error: None,
        }
    }

    fn active_value_mut(&mut self) -> &mut String {
        match self.active {
            LoginField::Username => &mut self.username,
            LoginField::Password => &mut self.password,
        }
    }

    fn toggle_field(&mut self) {
        self.active = match self.active {
            LoginField::Username => LoginField::Password,
            LoginField::Password => LoginField::Username,
        };
    }
}

enum AsyncResponse {
    Post {
        result: Result<Loaded>,
    },
    Comments {
        request_id: u64,
        result: Result<Vec<CommentView>>,
    },
    Login {
        username: String,
        result: Result<String>,
    },
    Reply {
        result: Result<CommentView>,
    },
}

pub struct Options {
    pub services: Services,
    pub session: Arc<session::Manager>,
    pub target: Target,
    pub sort: CommentSortType,
    /// Write the account back to the config file after logging in.
    pub persist_login: bool,
    pub config: Config,
    pub config_path: Option<PathBuf>,
}

pub struct Model {
    services: Services,
    session: Arc<session::Manager>,
    config: Config,
    config_path: Option<PathBuf>,
    persist_login: bool,
    target: Target,
    detail: PostDetail,
    post_loading: bool,
    load_error: Option<String>,
    entered_at: Option<Instant>,
    transition_drawn: bool,
    scroll: ScrollState,
    links: Vec<String>,
    composer: ModalComposer,
    compose: Option<ComposeForm>,
    login: Option<LoginForm>,
    read_tx: Sender<Action>,
    read_rx: Receiver<Action>,
    read_state: ReadState,
    status_message: String,
    spinner: Spinner,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    next_request_id: u64,
    pending_comments: Option<u64>,
    needs_redraw: bool,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let (read_tx, read_rx) = unbounded();
        let detail_opts = DetailOptions {
            comment_path: None,
            sort: options.sort,
            overlay_gap: options.config.layout.overlay_gap,
            initial_overlay_height: options.config.layout.initial_overlay_height,
        };
        let mut model = Self {
            services: options.services,
            session: options.session,
            config: options.config,
            config_path: options.config_path,
            persist_login: options.persist_login,
            target: options.target,
            detail: PostDetail::new(None, detail_opts),
            post_loading: false,
            load_error: None,
            entered_at: None,
            transition_drawn: false,
            scroll: ScrollState::default(),
            links: Vec::new(),
            composer: ModalComposer::default(),
            compose: None,
            login: None,
            read_tx,
            read_rx,
            read_state: ReadState::new(),
            status_message: "Loading post…".to_string(),
            spinner: Spinner::new(),
            response_tx,
            response_rx,
            next_request_id: 0,
            pending_comments: None,
            needs_redraw: true,
        };
        model.load_post();
        model
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn is_loading(&self) -> bool {
        self.post_loading || self.pending_comments.is_some() || self.form_submitting()
    }

    fn form_submitting(&self) -> bool {
        self.login.as_ref().is_some_and(|form| form.submitting)
            || self.compose.as_ref().is_some_and(|form| form.submitting)
    }

    fn detail_options(&self, comment_path: Option<String>) -> DetailOptions {
        DetailOptions {
            comment_path,
            sort: self.detail.sort(),
            overlay_gap: self.config.layout.overlay_gap,
            initial_overlay_height: self.config.layout.initial_overlay_height,
        }
    }

    fn load_post(&mut self) {
        self.post_loading = true;
        let tx = self.response_tx.clone();
        let services = self.services.clone();
        let target = self.target;
        thread::spawn(move || {
            let result = app::load_target(&services, target);
            let _ = tx.send(AsyncResponse::Post { result });
        });
    }

    fn reload_comments(&mut self) {
        let Some(post) = self.detail.post().map(PostView::id) else {
            return;
        };
        self.next_request_id += 1;
        let request_id = self.next_request_id;
        self.pending_comments = Some(request_id);
        let sort = self.detail.sort();
        let parent = self
            .detail
            .comment_path()
            .and_then(|path| parse_comment_path(path).last().copied())
            .map(CommentId);
        let tx = self.response_tx.clone();
        let service = self.services.comments.clone();
        thread::spawn(move || {
            let result = service.load_comments(post, sort, parent);
            let _ = tx.send(AsyncResponse::Comments { request_id, result });
        });
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        if let Some(form) = self.compose.take() {
            form.dismiss();
        }
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = self.config.ui.tick_rate;

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => self.status_message = format!("Error: {err}"),
                        }
                        self.mark_dirty();
                    }
                } else {
                    self.mark_dirty();
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.on_tick() {
                    self.mark_dirty();
                }
            }
        }

        Ok(())
    }

    /// Advances animations and timers. Returns whether anything visible
    /// changed.
    fn on_tick(&mut self) -> bool {
        let mut changed = self.scroll.step();

        let settled = self.is_settled();
        self.detail.observe_settled(settled, &self.read_tx);
        if self.read_state.drain(&self.read_rx) > 0 {
            self.status_message = "Marked as read.".to_string();
            changed = true;
        }
        if settled && !self.transition_drawn {
            self.transition_drawn = true;
            changed = true;
        }

        if self.poll_reply() {
            changed = true;
        }
        if self.is_loading() && self.spinner.advance() {
            changed = true;
        }
        changed
    }

    /// The entry transition ends `settle_delay` after the post arrived.
    fn is_settled(&self) -> bool {
        self.entered_at
            .is_some_and(|entered| entered.elapsed() >= self.config.ui.settle_delay)
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        if self.poll_reply() {
            changed = true;
        }
        changed
    }

    fn poll_reply(&mut self) -> bool {
        match self.detail.poll_reply() {
            Some(ReplyOutcome::Inserted(id)) => {
                self.status_message = format!("Reply {id} posted.");
                true
            }
            Some(ReplyOutcome::Dismissed) => {
                self.status_message = "Reply discarded.".to_string();
                true
            }
            None => false,
        }
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Post { result } => {
                self.post_loading = false;
                match result {
                    Ok(loaded) => {
                        let opts = self.detail_options(loaded.comment_path);
                        let deep_link = opts.comment_path.is_some();
                        self.detail = PostDetail::new(Some(loaded.post), opts);
                        self.entered_at = Some(Instant::now());
                        self.transition_drawn = false;
                        self.scroll = ScrollState::default();
                        self.load_error = None;
                        self.status_message = if deep_link {
                            "Showing a single thread. v shows all comments.".to_string()
                        } else {
                            "Enter collapses the post · r replies · q quits.".to_string()
                        };
                        self.reload_comments();
                    }
                    Err(err) => {
                        debug::log(format!("ui: post load failed: {err:#}"));
                        self.status_message = "Failed to load post.".to_string();
                        self.load_error = Some(format!("{err:#}"));
                    }
                }
            }
            AsyncResponse::Comments { request_id, result } => {
                if self.pending_comments != Some(request_id) {
                    return;
                }
                self.pending_comments = None;
                match result {
                    Ok(comments) => {
                        let count = comments.len();
                        self.detail.comments_mut().replace_all(comments);
                        self.status_message = format!(
                            "{count} comments sorted by {}.",
                            self.detail.sort().as_str()
                        );
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to load comments: {err:#}");
                    }
                }
            }
            AsyncResponse::Login { username, result } => self.finish_login(username, result),
            AsyncResponse::Reply { result } => match result {
                Ok(comment) => {
                    if let Some(form) = self.compose.take() {
                        let _ = form.outcome.send(Some(comment));
                    }
                }
                Err(err) => {
                    if let Some(form) = self.compose.as_mut() {
                        form.submitting = false;
                        form.error = Some(format!("{err:#}"));
                    }
                }
            },
        }
    }

    fn finish_login(&mut self, username: String, result: Result<String>) {
        let Some(form) = self.login.as_mut() else {
            return;
        };
        form.submitting = false;
        let account = match result
            .and_then(|jwt| Account::new(&username, &jwt).map_err(anyhow::Error::from))
        {
            Ok(account) => account,
            Err(err) => {
                form.error = Some(format!("{err:#}"));
                return;
            }
        };
        self.login = None;
        if self.persist_login {
            if let Err(err) =
                config::save_session(self.config_path.clone(), &account.username, &account.jwt)
            {
                debug::log(format!("ui: failed to save session: {err:#}"));
            }
        }
        self.status_message = format!("Logged in as {}. Press r to reply.", account.username);
        self.session.complete_login(account);
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        if self.login.is_some() {
            self.handle_login_key(code);
            return Ok(false);
        }
        if self.compose.is_some() {
            self.handle_compose_key(code);
            return Ok(false);
        }

        let page = i32::from(self.scroll.max.clamp(1, 20));
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Char('j') | KeyCode::Down => self.scroll.scroll_by(1),
            KeyCode::Char('k') | KeyCode::Up => self.scroll.scroll_by(-1),
            KeyCode::PageDown => self.scroll.scroll_by(page),
            KeyCode::PageUp => self.scroll.scroll_by(-page),
            KeyCode::Char('g') | KeyCode::Home => self.scroll.scroll_by(i32::MIN / 2),
            KeyCode::Char('G') | KeyCode::End => self.scroll.scroll_by(i32::MAX / 2),
            KeyCode::Enter | KeyCode::Char(' ') => {
                if self.detail.tap(&TapTarget::Header, &mut self.scroll) {
                    self.status_message = if self.detail.is_collapsed() {
                        "Post collapsed.".to_string()
                    } else {
                        "Post expanded.".to_string()
                    };
                }
            }
            KeyCode::Char('o') => self.follow_link(0)?,
            KeyCode::Char(ch @ '1'..='9') => {
                let index = ch.to_digit(10).map(|d| d as usize - 1).unwrap_or(0);
                self.follow_link(index)?;
            }
            KeyCode::Char('m') => self.open_media()?,
            KeyCode::Char('r') => self.start_reply(),
            KeyCode::Char('v') => self.view_all_comments(),
            KeyCode::Char('s') => {
                let next = match self.detail.sort() {
                    CommentSortType::Hot => CommentSortType::Top,
                    CommentSortType::Top => CommentSortType::New,
                    CommentSortType::New => CommentSortType::Old,
                    CommentSortType::Old => CommentSortType::Controversial,
                    CommentSortType::Controversial => CommentSortType::Hot,
                };
                self.detail.set_sort(next);
                self.status_message = format!("Sorting comments by {}…", next.as_str());
                self.reload_comments();
            }
            KeyCode::Char('R') => {
                self.status_message = "Refreshing comments…".to_string();
                self.reload_comments();
            }
            _ => {}
        }
        Ok(false)
    }

    fn follow_link(&mut self, index: usize) -> Result<()> {
        let Some(url) = self.links.get(index).cloned() else {
            self.status_message = "No link to open.".to_string();
            return Ok(());
        };
        // Links never toggle the header.
        self.detail.tap(&TapTarget::Anchor(url.clone()), &mut self.scroll);
        player::open_link(&url)?;
        self.status_message = format!("Opened {url}");
        Ok(())
    }

    fn open_media(&mut self) -> Result<()> {
        let hero = self.detail.header().and_then(|header| header.hero);
        let Some(hero) = hero else {
            self.status_message = "This post has no media.".to_string();
            return Ok(());
        };
        player::open_hero(&hero, &self.config.player)?;
        self.status_message = format!("Opened {}", hero.url());
        Ok(())
    }

    fn start_reply(&mut self) {
        match self.detail.reply(self.session.as_ref(), &self.composer) {
            None => self.status_message = "The post has not loaded yet.".to_string(),
            Some(ReplyStart::LoginRequired) => {
                if self.session.take_prompt_request() {
                    self.login = Some(LoginForm::new(&self.config.lemmy.username));
                }
                self.status_message = "Log in to reply.".to_string();
            }
            Some(ReplyStart::Busy) => {
                self.status_message = "Finish the open reply first.".to_string();
            }
            Some(ReplyStart::Composing) => {
                if let Some(outcome) = self.composer.take() {
                    self.compose = Some(ComposeForm {
                        text: String::new(),
                        outcome,
                        submitting: false,
                        error: None,
                    });
                }
            }
        }
    }

    fn view_all_comments(&mut self) {
        if self.detail.comment_path().is_none() {
            return;
        }
        self.detail.view_all_comments();
        self.scroll.scroll_into_view(ScrollBehavior::Instant);
        self.status_message = "Loading all comments…".to_string();
        self.reload_comments();
    }

    fn handle_login_key(&mut self, code: KeyCode) {
        let Some(form) = self.login.as_mut() else {
            return;
        };
        if form.submitting {
            return;
        }
        match code {
            KeyCode::Esc => {
                self.login = None;
                self.status_message = "Login cancelled.".to_string();
            }
            KeyCode::Tab | KeyCode::Down | KeyCode::Up | KeyCode::BackTab => form.toggle_field(),
            KeyCode::Backspace => {
                form.active_value_mut().pop();
            }
            KeyCode::Char(ch) => {
                form.active_value_mut().push(ch);
                form.error = None;
            }
            KeyCode::Enter if form.active == LoginField::Username => form.toggle_field(),
            KeyCode::Enter => {
                let username = form.username.trim().to_string();
                if username.is_empty() || form.password.is_empty() {
                    form.error = Some("Username and password are required.".to_string());
                    return;
                }
                form.submitting = true;
                form.error = None;
                let password = form.password.clone();
                let tx = self.response_tx.clone();
                let service = self.services.interactions.clone();
                thread::spawn(move || {
                    let result = service.login(&username, &password);
                    let _ = tx.send(AsyncResponse::Login { username, result });
                });
            }
            _ => {}
        }
    }

    fn handle_compose_key(&mut self, code: KeyCode) {
        let Some(form) = self.compose.as_mut() else {
            return;
        };
        if form.submitting {
            return;
        }
        match code {
            KeyCode::Esc => {
                if let Some(form) = self.compose.take() {
                    form.dismiss();
                }
            }
            KeyCode::Backspace => {
                form.text.pop();
            }
            KeyCode::Char(ch) => {
                form.text.push(ch);
                form.error = None;
            }
            KeyCode::Enter => {
                let text = form.text.trim().to_string();
                if text.is_empty() {
                    form.error = Some("Write something first.".to_string());
                    return;
                }
                let jwt = match self.session.active_jwt() {
                    Ok(jwt) => jwt,
                    Err(err) => {
                        form.error = Some(err.to_string());
                        return;
                    }
                };
                let Some(post) = self.detail.post().map(PostView::id) else {
                    return;
                };
                form.submitting = true;
                form.error = None;
                let tx = self.response_tx.clone();
                let service = self.services.interactions.clone();
                thread::spawn(move || {
                    let result = service.reply(&jwt, post, None, &text);
                    let _ = tx.send(AsyncResponse::Reply { result });
                });
            }
            _ => {}
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let status_text = if self.is_loading() {
            format!("{} {}", self.spinner.frame(), self.status_message)
        } else {
            self.status_message.clone()
        };
        let status_line = Paragraph::new(status_text).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        self.draw_post(frame, layout[1]);

        let footer = Paragraph::new(
            "j/k scroll · Enter collapse · o/1-9 links · m media · r reply · s sort · q quit",
        )
        .style(
            Style::default()
                .fg(COLOR_TEXT_SECONDARY)
                .bg(COLOR_PANEL_BG)
                .add_modifier(Modifier::ITALIC),
        )
        .alignment(Alignment::Center);
        frame.render_widget(footer, layout[2]);

        if self.login.is_some() {
            self.draw_login(frame, layout[1]);
        } else if self.compose.is_some() {
            self.draw_compose(frame, layout[1]);
        }
    }

    fn draw_post(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let title = match self.detail.post() {
            Some(post) if self.read_state.is_read(post.id()) => " Post · read ",
            _ => " Post ",
        };
        let block = Block::default()
            .title(Span::styled(
                title,
                Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_BORDER_IDLE))
            .style(Style::default().bg(COLOR_PANEL_BG));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        // Measure the overlay first so the padding below reflects it.
        let overlay = self.detail.overlay_reporter().map(|reporter| {
            let height = overlay_height(inner.width).min(inner.height);
            reporter.on_height(f64::from(height));
            Rect {
                x: inner.x,
                y: inner.y + inner.height - height,
                width: inner.width,
                height,
            }
        });

        let (mut lines, title_row) = self.content_lines(inner.width);
        let padding = self.detail.bottom_padding_rows();
        lines.extend((0..padding).map(|_| Line::default()));

        let total = visual_height(&lines, inner.width);
        let max = total.saturating_sub(usize::from(inner.height));
        self.scroll.set_bounds(
            u16::try_from(title_row).unwrap_or(u16::MAX),
            u16::try_from(max).unwrap_or(u16::MAX),
        );

        let mut base = Style::default().fg(COLOR_TEXT_PRIMARY);
        if !self.transition_drawn {
            base = base.add_modifier(Modifier::DIM);
        }
        let paragraph = Paragraph::new(Text::from(lines))
            .style(base)
            .wrap(Wrap { trim: false })
            .scroll((self.scroll.offset, 0));
        frame.render_widget(paragraph, inner);

        if let Some(area) = overlay {
            frame.render_widget(Clear, area);
            let text: Vec<Line<'_>> = OVERLAY_TEXT.iter().map(|text| Line::from(*text)).collect();
            let overlay = Paragraph::new(text)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(COLOR_ACCENT))
                        .style(Style::default().bg(COLOR_PANEL_FOCUSED_BG)),
                )
                .style(Style::default().fg(COLOR_TEXT_PRIMARY))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true });
            frame.render_widget(overlay, area);
        }
    }

    /// Header and comment rows for the post pane, and the visual row of the
    /// title.
    fn content_lines(&mut self, width: u16) -> (Vec<Line<'static>>, usize) {
        let secondary = Style::default().fg(COLOR_TEXT_SECONDARY);
        let now = Utc::now();

        let Some(header) = self.detail.header() else {
            self.links.clear();
            let message = match &self.load_error {
                Some(err) => format!("Could not load the post: {err}"),
                None => "Loading…".to_string(),
            };
            return (vec![Line::from(Span::styled(message, secondary))], 0);
        };
        let block = header_lines(&header, self.detail.is_collapsed(), width, now);
        let title_row = visual_height(&block.lines[..block.title_row], width);
        let mut lines = block.lines;

        let visible = self.detail.comments().visible();
        if visible.is_empty() {
            let message = if self.pending_comments.is_some() {
                "Loading comments…"
            } else {
                "No comments yet. Press r to reply."
            };
            lines.push(Line::from(Span::styled(message, secondary)));
        }
        for comment in &visible {
            lines.extend(comment_lines(comment, usize::from(width), now));
            lines.push(Line::default());
        }

        self.links = block.links;
        (lines, title_row)
    }

    fn draw_login(&self, frame: &mut Frame<'_>, area: Rect) {
        let Some(form) = self.login.as_ref() else {
            return;
        };
        let popup_area = centered_rect(60, 40, area);
        frame.render_widget(Clear, popup_area);

        let field = |label: &str, value: String, active: bool| {
            let style = if active {
                Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(COLOR_TEXT_PRIMARY)
            };
            let cursor = if active { "▏" } else { "" };
            Line::from(vec![
                Span::styled(format!("{label:<10}"), Style::default().fg(COLOR_TEXT_SECONDARY)),
                Span::styled(format!("{value}{cursor}"), style),
            ])
        };

        let mut lines = vec![
            Line::from(Span::styled(
                format!("Log in to {}", self.config.lemmy.instance),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
            Line::default(),
            field(
                "Username",
                form.username.clone(),
                form.active == LoginField::Username,
            ),
            field(
                "Password",
                "•".repeat(form.password.chars().count()),
                form.active == LoginField::Password,
            ),
            Line::default(),
        ];
        if form.submitting {
            lines.push(Line::from(Span::styled(
                format!("{} Logging in…", self.spinner.frame()),
                Style::default().fg(COLOR_ACCENT),
            )));
        } else if let Some(err) = &form.error {
            lines.push(Line::from(Span::styled(
                err.clone(),
                Style::default().fg(COLOR_ERROR),
            )));
        }
        lines.push(Line::from(Span::styled(
            "Enter submit · Tab switch field · Esc cancel",
            Style::default()
                .fg(COLOR_TEXT_SECONDARY)
                .add_modifier(Modifier::ITALIC),
        )));

        let popup = Paragraph::new(lines)
            .block(modal_block("Login"))
            .wrap(Wrap { trim: false });
        frame.render_widget(popup, popup_area);
    }

    fn draw_compose(&self, frame: &mut Frame<'_>, area: Rect) {
        let Some(form) = self.compose.as_ref() else {
            return;
        };
        let popup_area = centered_rect(70, 50, area);
        frame.render_widget(Clear, popup_area);

        let post_title = self
            .detail
            .post()
            .map(|post| post.post.name.clone())
            .unwrap_or_default();
        let mut lines = vec![
            Line::from(Span::styled(
                format!("Reply to: {post_title}"),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
            Line::default(),
            Line::from(Span::styled(
                format!("{}▏", form.text),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            )),
            Line::default(),
        ];
        if form.submitting {
            lines.push(Line::from(Span::styled(
                format!("{} Posting…", self.spinner.frame()),
                Style::default().fg(COLOR_ACCENT),
            )));
        } else if let Some(err) = &form.error {
            lines.push(Line::from(Span::styled(
                err.clone(),
                Style::default().fg(COLOR_ERROR),
            )));
        }
        lines.push(Line::from(Span::styled(
            "Enter post · Esc discard",
            Style::default()
                .fg(COLOR_TEXT_SECONDARY)
                .add_modifier(Modifier::ITALIC),
        )));

        let popup = Paragraph::new(lines)
            .block(modal_block("Reply"))
            .wrap(Wrap { trim: false });
        frame.render_widget(popup, popup_area);
    }
}

fn modal_block(title: &str) -> Block<'_> {
    Block::default()
        .title(Span::styled(
            title,
            Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(COLOR_ACCENT))
        .style(Style::default().bg(COLOR_PANEL_BG))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detail::Stats;
    use crate::lemmy::{fixtures, PostId};
    use crate::media::{Inline, RenderMode};
    use std::io::Write;

    fn header<'a>(hero: Option<Hero>, inline: Option<Inline<'a>>) -> Header<'a> {
        Header {
            mode: RenderMode::Text,
            hero,
            title: "A *title*",
            nsfw: true,
            inline,
            announcement: false,
            community: "rust".into(),
            creator: "alice".into(),
            stats: Stats {
                score: 3,
                comments: 0,
                published: None,
            },
        }
    }

    #[test]
    fn title_row_follows_hero() {
        let hero = Hero::Image {
            url: "https://i.example/a.png".into(),
            alt: None,
        };
        let block = header_lines(&header(Some(hero), None), false, 40, Utc::now());
        assert_eq!(block.title_row, 2);
        let plain = plain_lines(&block.lines);
        assert!(plain[0].starts_with("[image] https://i.example/a.png"));
        assert_eq!(plain[2], "NSFW A title");

        let block = header_lines(&header(None, None), false, 40, Utc::now());
        assert_eq!(block.title_row, 0);
    }

    #[test]
    fn inline_content_collects_links() {
        let inline = Inline {
            embed: Some("https://example.com/article"),
            body: Some("see [docs](https://docs.rs)"),
        };
        let block = header_lines(&header(None, Some(inline)), false, 40, Utc::now());
        assert_eq!(
            block.links,
            vec!["https://example.com/article", "https://docs.rs"]
        );
    }

    #[test]
    fn header_rows_put_body_before_byline() {
        let hero = Hero::Video {
            url: "https://v.example/a.mp4".into(),
        };
        let inline = Inline {
            embed: Some("https://e.example/a"),
            body: Some("BODYTEXT"),
        };
        let block = header_lines(&header(Some(hero), Some(inline)), false, 40, Utc::now());
        let plain = plain_lines(&block.lines);
        let row = |needle: &str| {
            plain
                .iter()
                .position(|line| line.contains(needle))
                .unwrap_or_else(|| panic!("no row containing {needle}: {plain:?}"))
        };

        let rows = [
            row("[video]"),
            row("A title"),
            row("https://e.example/a"),
            row("BODYTEXT"),
            row("rust · by alice"),
            row("↑ 3 · 0 comments"),
        ];
        assert!(rows.windows(2).all(|pair| pair[0] < pair[1]), "{plain:?}");
        assert_eq!(rows[1], block.title_row);
    }

    #[test]
    fn collapsed_header_shows_hint() {
        let block = header_lines(&header(None, None), true, 20, Utc::now());
        let plain = plain_lines(&block.lines);
        assert!(plain.iter().any(|line| line.contains("Enter expands")));
        assert_eq!(plain.last().map(|l| l.chars().count()), Some(20));
    }

    #[test]
    fn comment_lines_indent_by_depth() {
        let view = fixtures::comment(7, "0.1.7");
        let visible = VisibleComment {
            view: &view,
            depth: 1,
            local: true,
        };
        let plain = plain_lines(&comment_lines(&visible, 60, Utc::now()));
        assert!(plain[0].starts_with("  + bob · "));
        assert!(plain[0].contains("just posted"));
        assert_eq!(plain[1], "    comment 7");
    }

    #[test]
    fn wrap_with_prefixes_indents_continuations() {
        let lines = wrap_with_prefixes("one two three four", 10, "> ", "  ", Style::default());
        let plain = plain_lines(&lines);
        assert_eq!(plain[0], "> one two");
        assert!(plain[1].starts_with("  "));
    }

    #[test]
    fn visual_height_counts_wrapped_rows() {
        let lines = vec![Line::from("abcdef"), Line::default()];
        assert_eq!(visual_height(&lines, 4), 3);
        assert_eq!(visual_height(&lines, 0), 0);
    }

    #[test]
    fn overlay_height_includes_borders() {
        assert_eq!(overlay_height(80), 4);
        assert!(overlay_height(12) > 4);
    }

    #[test]
    fn smooth_scroll_eases_toward_title() {
        let mut scroll = ScrollState {
            offset: 30,
            ..ScrollState::default()
        };
        scroll.set_bounds(3, 100);
        scroll.scroll_into_view(ScrollBehavior::Smooth);
        let mut steps = 0;
        while scroll.step() {
            steps += 1;
            assert!(steps < 50);
        }
        assert_eq!(scroll.offset, 3);
        assert!(steps > 1);

        scroll.offset = 40;
        scroll.scroll_into_view(ScrollBehavior::Instant);
        assert_eq!(scroll.offset, 3);
        assert!(!scroll.step());
    }

    #[test]
    fn manual_scroll_is_clamped() {
        let mut scroll = ScrollState::default();
        scroll.set_bounds(0, 5);
        scroll.scroll_by(10);
        assert_eq!(scroll.offset, 5);
        scroll.scroll_by(-100);
        assert_eq!(scroll.offset, 0);
    }

    const FIXTURE: &str = r#"{
        "post_view": {
            "post": {"id": 5, "name": "Saved post", "body": "hello"},
            "creator": {"id": 1, "name": "alice"},
            "community": {"id": 2, "name": "rust"}
        },
        "comments": [
            {"comment": {"id": 11, "post_id": 5, "content": "first", "path": "0.11"},
             "creator": {"id": 3, "name": "bob"}}
        ]
    }"#;

    fn model(file: &tempfile::NamedTempFile, session: Arc<session::Manager>) -> Model {
        let mut config = Config::default();
        config.ui.settle_delay = Duration::ZERO;
        Model::new(Options {
            services: Services::fixture(file.path()).unwrap(),
            session,
            target: Target::Post(PostId(5)),
            sort: CommentSortType::Hot,
            persist_login: false,
            config,
            config_path: None,
        })
    }

    fn pump(model: &mut Model) {
        let message = model
            .response_rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        model.handle_async_response(message);
    }

    #[test]
    fn model_loads_marks_read_and_replies() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();
        let session = Arc::new(session::Manager::new(None));
        let mut model = model(&file, session.clone());

        pump(&mut model);
        pump(&mut model);
        assert_eq!(model.detail.comments().len(), 1);

        model.on_tick();
        assert!(model.read_state.is_read(PostId(5)));

        model.handle_key(KeyCode::Enter).unwrap();
        assert!(model.detail.is_collapsed());

        model.handle_key(KeyCode::Char('r')).unwrap();
        assert!(model.login.is_some());
        assert!(!model.detail.is_composing());

        for ch in "carol".chars() {
            model.handle_key(KeyCode::Char(ch)).unwrap();
        }
        model.handle_key(KeyCode::Enter).unwrap();
        model.handle_key(KeyCode::Char('x')).unwrap();
        model.handle_key(KeyCode::Enter).unwrap();
        pump(&mut model);
        assert!(session.is_logged_in());
        assert!(model.login.is_none());

        model.handle_key(KeyCode::Char('r')).unwrap();
        assert!(model.compose.is_some());
        for ch in "hi".chars() {
            model.handle_key(KeyCode::Char(ch)).unwrap();
        }
        model.handle_key(KeyCode::Enter).unwrap();
        pump(&mut model);
        assert!(model.poll_reply());
        let visible = model.detail.comments().visible();
        assert_eq!(visible[0].view.comment.content, "hi");
        assert!(visible[0].local);
    }

    #[test]
    fn composer_escape_discards() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();
        let session = Arc::new(session::Manager::new(Some(
            Account::new("dana", "offline-dana").unwrap(),
        )));
        let mut model = model(&file, session);
        pump(&mut model);

        model.handle_key(KeyCode::Char('r')).unwrap();
        assert!(model.detail.is_composing());
        model.handle_key(KeyCode::Esc).unwrap();
        assert!(model.compose.is_none());
        assert!(model.poll_reply());
        assert!(!model.detail.is_composing());
        assert_eq!(model.status_message, "Reply discarded.");
    }
}
