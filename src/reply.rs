use crossbeam_channel::{Receiver, TryRecvError};

use crate::debug;
use crate::lemmy::{CommentId, CommentView, PostView};

/// Returns true when the user must log in first. May open a login prompt as
/// a side effect.
pub trait LoginGate {
    fn present_login_if_needed(&self) -> bool;
}

/// Opens a reply composer for `post`. The receiver yields the posted comment,
/// or `None` (or disconnects) when the user dismissed the composer.
pub trait Composer {
    fn present_comment_reply(&self, post: &PostView) -> Receiver<Option<CommentView>>;
}

/// The single mutation entry point of the comment list owner.
pub trait CommentSink {
    fn prepend_comments(&mut self, comments: Vec<CommentView>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStart {
    LoginRequired,
    Composing,
    /// A composer is already open; its outcome must land first.
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    Inserted(CommentId),
    Dismissed,
}

#[derive(Debug, Default)]
pub struct ReplyCoordinator {
    pending: Option<Receiver<Option<CommentView>>>,
}

impl ReplyCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_composing(&self) -> bool {
        self.pending.is_some()
    }

    pub fn reply(
        &mut self,
        post: &PostView,
        gate: &dyn LoginGate,
        composer: &dyn Composer,
    ) -> ReplyStart {
        if self.pending.is_some() {
            return ReplyStart::Busy;
        }
        if gate.present_login_if_needed() {
            debug::log(format!("reply: login required for post {}", post.id()));
            return ReplyStart::LoginRequired;
        }
        self.pending = Some(composer.present_comment_reply(post));
        ReplyStart::Composing
    }

    /// Non-blocking check of the open composer, for the event loop.
    pub fn poll(&mut self, sink: &mut dyn CommentSink) -> Option<ReplyOutcome> {
        let rx = self.pending.as_ref()?;
        let outcome = match rx.try_recv() {
            Ok(reply) => reply,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => None,
        };
        Some(self.settle(outcome, sink))
    }

    /// Blocks until the open composer resolves.
    pub fn wait(&mut self, sink: &mut dyn CommentSink) -> Option<ReplyOutcome> {
        let rx = self.pending.as_ref()?;
        let outcome = rx.recv().ok().flatten();
        Some(self.settle(outcome, sink))
    }

    fn settle(&mut self, outcome: Option<CommentView>, sink: &mut dyn CommentSink) -> ReplyOutcome {
        self.pending = None;
        match outcome {
            Some(comment) => {
                let id = comment.id();
                debug::log(format!("reply: inserting comment {id}"));
                sink.prepend_comments(vec![comment]);
                ReplyOutcome::Inserted(id)
            }
            None => {
                debug::log("reply: composer dismissed");
                ReplyOutcome::Dismissed
            }
        }
    }
}
