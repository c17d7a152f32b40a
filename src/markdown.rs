use pulldown_cmark::{CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};

/// The single image of a body whose only meaningful content is that image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoneImage {
    pub url: String,
    pub alt: String,
}

fn parser_options() -> Options {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_TASKLISTS);
    opts.insert(Options::ENABLE_FOOTNOTES);
    opts
}

/// Returns the image when `input` is one paragraph holding exactly one image
/// and nothing else but whitespace. Alt text does not count as content.
pub fn find_lone_image(input: &str) -> Option<LoneImage> {
    let mut paragraphs = 0usize;
    let mut image: Option<LoneImage> = None;
    let mut in_image = false;

    for event in Parser::new_ext(input, parser_options()) {
        match event {
            Event::Start(Tag::Paragraph) => {
                paragraphs += 1;
                if paragraphs > 1 {
                    return None;
                }
            }
            Event::End(TagEnd::Paragraph) => {}
            Event::Start(Tag::Image { dest_url, .. }) => {
                if image.is_some() {
                    return None;
                }
                image = Some(LoneImage {
                    url: dest_url.into_string(),
                    alt: String::new(),
                });
                in_image = true;
            }
            Event::End(TagEnd::Image) => in_image = false,
            Event::Start(Tag::Emphasis | Tag::Strong | Tag::Strikethrough)
            | Event::End(TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough)
                if in_image => {}
            Event::Code(code) if in_image => {
                if let Some(image) = image.as_mut() {
                    image.alt.push_str(&code);
                }
            }
            Event::Text(text) if in_image => {
                if let Some(image) = image.as_mut() {
                    image.alt.push_str(&text);
                }
            }
            Event::Text(text) if text.trim().is_empty() => {}
            Event::SoftBreak | Event::HardBreak => {}
            _ => return None,
        }
    }

    image.filter(|image| !image.url.trim().is_empty())
}

/// Rendered markdown plus the link targets found in it, in document order.
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub text: Text<'static>,
    pub links: Vec<String>,
}

#[derive(Default)]
pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, input: &str) -> Rendered {
        let parser = Parser::new_ext(input, parser_options());
        let mut writer = MarkdownWriter::default();
        writer.render(parser);
        writer.finish()
    }

    /// Renders a single line (titles), flattening block structure into spans.
    pub fn render_inline(&self, input: &str, base: Style) -> Line<'static> {
        let rendered = self.render(input);
        let mut spans: Vec<Span<'static>> = Vec::new();
        for line in rendered.text.lines {
            if line.spans.iter().all(|span| span.content.trim().is_empty()) {
                continue;
            }
            if !spans.is_empty() {
                spans.push(Span::styled(" ", base));
            }
            spans.extend(
                line.spans
                    .into_iter()
                    .map(|span| Span::styled(span.content, base.patch(span.style))),
            );
        }
        Line::from(spans)
    }
}

#[derive(Clone, Copy)]
struct ListState {
    ordered: bool,
    index: u64,
}

#[derive(Default)]
struct MarkdownWriter {
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    links: Vec<String>,
    list_stack: Vec<ListState>,
    quote_depth: usize,
    heading: Option<u8>,
    code_block: Option<String>,
    emphasis: usize,
    strong: usize,
    strike: usize,
    link_depth: usize,
}

impl MarkdownWriter {
    fn render<'a, I>(&mut self, parser: I)
    where
        I: Iterator<Item = Event<'a>>,
    {
        for event in parser {
            match event {
                Event::Start(tag) => self.start_tag(tag),
                Event::End(tag) => self.end_tag(tag),
                Event::Text(text) => self.text(text),
                Event::Code(code) => {
                    let style = self.inline_style().fg(Color::Cyan);
                    self.current.push(Span::styled(format!("`{code}`"), style));
                }
                Event::Html(_) | Event::InlineHtml(_) => {}
                Event::FootnoteReference(name) => self.push_text(format!("[{name}]")),
                Event::HardBreak => self.flush_line(),
                Event::SoftBreak => self.push_text(" "),
                Event::Rule => {
                    self.flush_line();
                    self.lines.push(Line::from(Span::styled(
                        "―".repeat(20),
                        Style::default().fg(Color::DarkGray),
                    )));
                    self.blank();
                }
                Event::TaskListMarker(done) => {
                    self.push_text(if done { "[x] " } else { "[ ] " });
                }
            }
        }
        self.flush_line();
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.flush_line(),
            Tag::Heading { level, .. } => {
                self.flush_line();
                self.heading = Some(level_to_u8(level));
            }
            Tag::BlockQuote => {
                self.flush_line();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush_line();
                let fence = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => format!("```{lang}"),
                    _ => "```".to_string(),
                };
                self.lines.push(Line::from(Span::styled(
                    fence,
                    Style::default().fg(Color::DarkGray),
                )));
                self.code_block = Some(String::new());
            }
            Tag::List(start) => {
                self.flush_line();
                self.list_stack.push(ListState {
                    ordered: start.is_some(),
                    index: start.unwrap_or(1),
                });
            }
            Tag::Item => {
                self.flush_line();
                let indent = "  ".repeat(self.list_stack.len().saturating_sub(1));
                if let Some(state) = self.list_stack.last_mut() {
                    let marker = if state.ordered {
                        let marker = format!("{}. ", state.index);
                        state.index += 1;
                        marker
                    } else {
                        "• ".to_string()
                    };
                    self.current.push(Span::raw(indent));
                    self.current
                        .push(Span::styled(marker, Style::default().fg(Color::Yellow)));
                }
            }
            Tag::Emphasis => self.emphasis += 1,
            Tag::Strong => self.strong += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link { dest_url, .. } => {
                self.links.push(dest_url.into_string());
                self.link_depth += 1;
            }
            Tag::Image { dest_url, .. } => {
                self.links.push(dest_url.into_string());
                let style = Style::default().fg(Color::Magenta);
                self.current.push(Span::styled("[image: ", style));
                self.link_depth += 1;
            }
            Tag::Table(_) | Tag::TableHead | Tag::TableRow => self.flush_line(),
            Tag::TableCell => self.push_text("| "),
            Tag::FootnoteDefinition(_) | Tag::HtmlBlock | Tag::MetadataBlock(_) => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush_line();
                self.blank();
            }
            TagEnd::Heading(_) => {
                self.flush_line();
                self.heading = None;
                self.blank();
            }
            TagEnd::BlockQuote => {
                self.flush_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.blank();
            }
            TagEnd::CodeBlock => {
                if let Some(buffer) = self.code_block.take() {
                    let style = Style::default().fg(Color::Cyan);
                    for line in buffer.trim_end_matches('\n').split('\n') {
                        self.lines
                            .push(Line::from(Span::styled(line.to_string(), style)));
                    }
                    self.lines.push(Line::from(Span::styled(
                        "```",
                        Style::default().fg(Color::DarkGray),
                    )));
                    self.blank();
                }
            }
            TagEnd::List(_) => {
                self.flush_line();
                self.list_stack.pop();
                if self.list_stack.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item => self.flush_line(),
            TagEnd::Emphasis => self.emphasis = self.emphasis.saturating_sub(1),
            TagEnd::Strong => self.strong = self.strong.saturating_sub(1),
            TagEnd::Strikethrough => self.strike = self.strike.saturating_sub(1),
            TagEnd::Link => self.link_depth = self.link_depth.saturating_sub(1),
            TagEnd::Image => {
                self.link_depth = self.link_depth.saturating_sub(1);
                self.current
                    .push(Span::styled("]", Style::default().fg(Color::Magenta)));
            }
            TagEnd::TableRow | TagEnd::TableHead => self.flush_line(),
            TagEnd::Table => self.blank(),
            _ => {}
        }
    }

    fn text(&mut self, text: CowStr<'_>) {
        if let Some(code) = self.code_block.as_mut() {
            code.push_str(&text);
        } else {
            self.push_text(text);
        }
    }

    fn push_text<T: AsRef<str>>(&mut self, text: T) {
        let style = self.inline_style();
        self.current
            .push(Span::styled(text.as_ref().to_string(), style));
    }

    fn inline_style(&self) -> Style {
        let mut style = match self.heading {
            Some(level) => heading_style(level),
            None if self.quote_depth > 0 => Style::default().fg(Color::Green),
            None => Style::default(),
        };
        if self.emphasis > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if self.strong > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.strike > 0 {
            style = style.add_modifier(Modifier::CROSSED_OUT);
        }
        if self.link_depth > 0 {
            style = style.fg(Color::Blue).add_modifier(Modifier::UNDERLINED);
        }
        style
    }

    fn flush_line(&mut self) {
        if self
            .current
            .iter()
            .all(|span| span.content.trim().is_empty())
        {
            self.current.clear();
            return;
        }
        let mut spans = Vec::new();
        if self.quote_depth > 0 {
            spans.push(Span::styled(
                format!("{} ", ">".repeat(self.quote_depth)),
                Style::default().fg(Color::Green),
            ));
        }
        spans.append(&mut self.current);
        self.lines.push(Line::from(spans));
    }

    fn blank(&mut self) {
        if !matches!(self.lines.last(), Some(line) if line.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }

    fn finish(mut self) -> Rendered {
        while matches!(self.lines.last(), Some(line) if line.spans.is_empty()) {
            self.lines.pop();
        }
        if self.lines.is_empty() {
            self.lines.push(Line::default());
        }
        Rendered {
            text: Text::from(self.lines),
            links: self.links,
        }
    }
}

fn heading_style(level: u8) -> Style {
    match level {
        1 => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        2 => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        3 => Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
        _ => Style::default().fg(Color::Magenta),
    }
}

fn level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
