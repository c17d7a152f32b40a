use chrono::{DateTime, Utc};

use crate::collapse::{CollapseController, TapTarget, TitleAnchor};
use crate::comments::CommentList;
use crate::layout::{LayoutHeightBridge, OverlayHeightReporter, DEFAULT_OVERLAY_GAP, DEFAULT_OVERLAY_HEIGHT};
use crate::lemmy::{qualified_name, CommentSortType, PostView};
use crate::media::{self, Hero, Inline, RenderMode};
use crate::read::{Dispatch, ReadTracker};
use crate::reply::{Composer, LoginGate, ReplyCoordinator, ReplyOutcome, ReplyStart};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub score: i64,
    pub comments: i64,
    pub published: Option<DateTime<Utc>>,
}

impl Stats {
    pub fn label(&self, now: DateTime<Utc>) -> String {
        let noun = if self.comments == 1 { "comment" } else { "comments" };
        let mut label = format!("↑ {} · {} {noun}", self.score, self.comments);
        if let Some(published) = self.published {
            label.push_str(" · ");
            label.push_str(&relative_time(published, now));
        }
        label
    }
}

pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => "now".to_string(),
        60..=3_599 => format!("{}m", secs / 60),
        3_600..=86_399 => format!("{}h", secs / 3_600),
        86_400..=2_591_999 => format!("{}d", secs / 86_400),
        2_592_000..=31_535_999 => format!("{}mo", secs / 2_592_000),
        _ => format!("{}y", secs / 31_536_000),
    }
}

/// Everything the comment list shows above the first comment.
#[derive(Debug, Clone, PartialEq)]
pub struct Header<'a> {
    pub mode: RenderMode,
    pub hero: Option<Hero>,
    pub title: &'a str,
    pub nsfw: bool,
    /// Absent while collapsed or when there is nothing to show inline.
    pub inline: Option<Inline<'a>>,
    pub announcement: bool,
    pub community: String,
    pub creator: String,
    pub stats: Stats,
}

#[derive(Debug, Clone)]
pub struct DetailOptions {
    pub comment_path: Option<String>,
    pub sort: CommentSortType,
    pub overlay_gap: f64,
    pub initial_overlay_height: f64,
}

impl Default for DetailOptions {
    fn default() -> Self {
        Self {
            comment_path: None,
            sort: CommentSortType::default(),
            overlay_gap: DEFAULT_OVERLAY_GAP,
            initial_overlay_height: DEFAULT_OVERLAY_HEIGHT,
        }
    }
}

/// State of one post detail screen.
pub struct PostDetail {
    post: Option<PostView>,
    comment_path: Option<String>,
    sort: CommentSortType,
    overlay_gap: f64,
    initial_overlay_height: f64,
    collapse: CollapseController,
    read: ReadTracker,
    layout: LayoutHeightBridge,
    reply: ReplyCoordinator,
    comments: CommentList,
}

impl PostDetail {
    pub fn new(post: Option<PostView>, opts: DetailOptions) -> Self {
        let path = opts.comment_path.as_deref();
        Self {
            collapse: CollapseController::new(path),
            layout: LayoutHeightBridge::with_metrics(
                path.is_some(),
                opts.overlay_gap,
                opts.initial_overlay_height,
            ),
            comments: CommentList::new(path),
            read: ReadTracker::new(),
            reply: ReplyCoordinator::new(),
            post,
            comment_path: opts.comment_path,
            sort: opts.sort,
            overlay_gap: opts.overlay_gap,
            initial_overlay_height: opts.initial_overlay_height,
        }
    }

    pub fn post(&self) -> Option<&PostView> {
        self.post.as_ref()
    }

    /// Swaps the post shown by this screen. Collapse state is kept.
    pub fn set_post(&mut self, post: Option<PostView>) {
        self.post = post;
    }

    pub fn comment_path(&self) -> Option<&str> {
        self.comment_path.as_deref()
    }

    pub fn sort(&self) -> CommentSortType {
        self.sort
    }

    pub fn set_sort(&mut self, sort: CommentSortType) {
        self.sort = sort;
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapse.is_collapsed()
    }

    pub fn header(&self) -> Option<Header<'_>> {
        let view = self.post.as_ref()?;
        let resolution = media::resolve_post(Some(view))?;
        let inline = (!self.collapse.is_collapsed() && !resolution.inline.is_empty())
            .then_some(resolution.inline);
        Some(Header {
            mode: resolution.mode,
            hero: resolution.hero,
            title: &view.post.name,
            nsfw: view.is_nsfw(),
            inline,
            announcement: view.is_featured(),
            community: qualified_name(
                &view.community.name,
                &view.community.actor_id,
                view.community.local,
            ),
            creator: qualified_name(&view.creator.name, &view.creator.actor_id, view.creator.local),
            stats: Stats {
                score: view.counts.score,
                comments: view.counts.comments,
                published: view.post.published,
            },
        })
    }

    pub fn tap(&mut self, target: &TapTarget, title: &mut dyn TitleAnchor) -> bool {
        if self.post.is_none() {
            return false;
        }
        self.collapse.toggle(target, title)
    }

    /// Feeds the host's settle flag to the read tracker.
    pub fn observe_settled(&mut self, settled: bool, sink: &dyn Dispatch) -> bool {
        let id = self.post.as_ref().map(PostView::id);
        self.read.observe(id, settled, sink)
    }

    pub fn overlay_reporter(&self) -> Option<OverlayHeightReporter> {
        self.layout.reporter()
    }

    pub fn bottom_padding(&self) -> f64 {
        self.layout.bottom_padding()
    }

    pub fn bottom_padding_rows(&self) -> u16 {
        self.layout.bottom_padding_rows()
    }

    /// Drops the deep link and shows the full discussion. The overlay goes
    /// away with it, and so does its padding.
    pub fn view_all_comments(&mut self) {
        self.comment_path = None;
        self.comments.clear_comment_path();
        self.layout = LayoutHeightBridge::with_metrics(
            false,
            self.overlay_gap,
            self.initial_overlay_height,
        );
    }

    pub fn comments(&self) -> &CommentList {
        &self.comments
    }

    pub fn comments_mut(&mut self) -> &mut CommentList {
        &mut self.comments
    }

    pub fn reply(&mut self, gate: &dyn LoginGate, composer: &dyn Composer) -> Option<ReplyStart> {
        let post = self.post.as_ref()?;
        Some(self.reply.reply(post, gate, composer))
    }

    pub fn is_composing(&self) -> bool {
        self.reply.is_composing()
    }

    pub fn poll_reply(&mut self) -> Option<ReplyOutcome> {
        self.reply.poll(&mut self.comments)
    }

    pub fn wait_reply(&mut self) -> Option<ReplyOutcome> {
        self.reply.wait(&mut self.comments)
    }
}
