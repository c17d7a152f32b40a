use std::collections::HashSet;

use crossbeam_channel::{Receiver, Sender};

use crate::debug;
use crate::lemmy::PostId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SetPostRead(PostId),
}

/// Fire-and-forget sink for actions owned by some other part of the app.
pub trait Dispatch {
    fn dispatch(&self, action: Action);
}

impl Dispatch for Sender<Action> {
    fn dispatch(&self, action: Action) {
        let _ = self.send(action);
    }
}

/// Defers "mark read" until the view has settled.
///
/// Reacts to changes of `(post, settled)`. A signal goes out when the pair
/// changes and `settled` is true, so a post switch on a settled view fires
/// again. Flapping `settled` for the same post does not: the tracker
/// remembers which post it last emitted for.
#[derive(Debug, Default)]
pub struct ReadTracker {
    last_key: Option<(Option<PostId>, bool)>,
    emitted_for: Option<PostId>,
}

impl ReadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a signal was dispatched.
    pub fn observe(&mut self, post: Option<PostId>, settled: bool, sink: &dyn Dispatch) -> bool {
        let key = (post, settled);
        if self.last_key == Some(key) {
            return false;
        }
        self.last_key = Some(key);

        let Some(id) = post else {
            return false;
        };
        if !settled || self.emitted_for == Some(id) {
            return false;
        }

        self.emitted_for = Some(id);
        debug::log(format!("read: dispatch SetPostRead({id})"));
        sink.dispatch(Action::SetPostRead(id));
        true
    }
}

/// In-memory read state. Receives dispatched actions and dedupes them.
#[derive(Debug, Default)]
pub struct ReadState {
    read: HashSet<PostId>,
}

impl ReadState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the post was not already marked.
    pub fn apply(&mut self, action: Action) -> bool {
        match action {
            Action::SetPostRead(id) => self.read.insert(id),
        }
    }

    pub fn drain(&mut self, rx: &Receiver<Action>) -> usize {
        rx.try_iter().filter(|action| self.apply(*action)).count()
    }

    pub fn is_read(&self, id: PostId) -> bool {
        self.read.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        actions: RefCell<Vec<Action>>,
    }

    impl Dispatch for Recorder {
        fn dispatch(&self, action: Action) {
            self.actions.borrow_mut().push(action);
        }
    }

    #[test]
    fn fires_once_after_settle() {
        let sink = Recorder::default();
        let mut tracker = ReadTracker::new();
        let post = Some(PostId(42));

        assert!(!tracker.observe(post, false, &sink));
        assert!(sink.actions.borrow().is_empty());
        assert!(tracker.observe(post, true, &sink));
        assert!(!tracker.observe(post, true, &sink));
        assert_eq!(*sink.actions.borrow(), vec![Action::SetPostRead(PostId(42))]);
    }

    #[test]
    fn post_change_while_settled_fires_again() {
        let sink = Recorder::default();
        let mut tracker = ReadTracker::new();
        tracker.observe(Some(PostId(1)), false, &sink);
        tracker.observe(Some(PostId(1)), true, &sink);
        tracker.observe(Some(PostId(2)), true, &sink);
        assert_eq!(
            *sink.actions.borrow(),
            vec![
                Action::SetPostRead(PostId(1)),
                Action::SetPostRead(PostId(2))
            ]
        );
    }

    #[test]
    fn settle_churn_for_same_post_is_debounced() {
        let sink = Recorder::default();
        let mut tracker = ReadTracker::new();
        tracker.observe(Some(PostId(7)), true, &sink);
        tracker.observe(Some(PostId(7)), false, &sink);
        tracker.observe(Some(PostId(7)), true, &sink);
        assert_eq!(sink.actions.borrow().len(), 1);
    }

    #[test]
    fn missing_post_never_fires() {
        let sink = Recorder::default();
        let mut tracker = ReadTracker::new();
        assert!(!tracker.observe(None, true, &sink));
        assert!(sink.actions.borrow().is_empty());
    }

    #[test]
    fn store_dedupes_channel_actions() {
        let (tx, rx) = unbounded();
        tx.dispatch(Action::SetPostRead(PostId(3)));
        tx.dispatch(Action::SetPostRead(PostId(3)));
        let mut state = ReadState::new();
        assert_eq!(state.drain(&rx), 1);
        assert!(state.is_read(PostId(3)));
    }
}
