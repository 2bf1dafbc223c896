use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::error::HierarchyError;

/// Why a [`CancelToken`] fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// [`CancelToken::cancel`] was called on the token or an ancestor.
    Cancelled,
    /// The token's deadline passed.
    DeadlineExceeded,
}

impl From<CancelReason> for HierarchyError {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Cancelled => HierarchyError::Cancelled,
            CancelReason::DeadlineExceeded => HierarchyError::DeadlineExceeded,
        }
    }
}

/// Cooperative cancellation signal with an optional deadline.
///
/// Clones share state. [`CancelToken::child`] derives a token that fires with its parent
/// but can be cancelled on its own without affecting the parent.
///
/// Blocking code waits on [`CancelToken::done`] (disconnects on cancellation) and
/// [`CancelToken::deadline_signal`] inside a `crossbeam_channel::select!`.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    done: Receiver<()>,
    deadline: Option<Instant>,
}

struct State {
    reason: Option<CancelReason>,
    // Dropped on cancellation, which disconnects `Inner::done`.
    trigger: Option<Sender<()>>,
    children: Vec<Weak<Inner>>,
}

impl Inner {
    fn new(deadline: Option<Instant>) -> Self {
        let (trigger, done) = crossbeam_channel::bounded(0);
        Self {
            state: Mutex::new(State {
                reason: None,
                trigger: Some(trigger),
                children: Vec::new(),
            }),
            done,
            deadline,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_with(&self, reason: CancelReason) {
        let children = {
            let mut state = self.lock();
            if state.reason.is_some() {
                return;
            }
            state.reason = Some(reason);
            state.trigger = None;
            std::mem::take(&mut state.children)
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel_with(reason);
        }
    }
}

impl CancelToken {
    /// A token without deadline.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new(None)),
        }
    }

    /// A token that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(Inner::new(Some(deadline))),
        }
    }

    /// A token that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Derive a token that is cancelled together with `self` and shares its deadline.
    pub fn child(&self) -> Self {
        let child = Arc::new(Inner::new(self.inner.deadline));
        let inherited = {
            let mut state = self.inner.lock();
            state.children.retain(|c| c.strong_count() > 0);
            if state.reason.is_none() {
                state.children.push(Arc::downgrade(&child));
            }
            state.reason
        };
        if let Some(reason) = inherited {
            child.cancel_with(reason);
        }
        Self { inner: child }
    }

    pub fn cancel(&self) {
        self.inner.cancel_with(CancelReason::Cancelled);
    }

    /// Mark the token as expired. Used by tasks that observed [`Self::deadline_signal`].
    pub fn expire(&self) -> CancelReason {
        self.inner.cancel_with(CancelReason::DeadlineExceeded);
        self.reason().unwrap_or(CancelReason::DeadlineExceeded)
    }

    /// Why the token fired, if it has. A passed deadline counts as fired.
    pub fn reason(&self) -> Option<CancelReason> {
        if let Some(reason) = self.inner.lock().reason {
            return Some(reason);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(self.expire()),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Never yields a message; becomes ready (disconnected) once the token is cancelled.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }

    /// Fires once when the deadline passes; never fires without a deadline.
    pub fn deadline_signal(&self) -> Receiver<Instant> {
        match self.inner.deadline {
            Some(deadline) => crossbeam_channel::at(deadline),
            None => crossbeam_channel::never(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.inner.lock().reason)
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::select;

    #[test]
    fn cancel_disconnects_done_channel() {
        let token = CancelToken::new();
        assert!(token.done().try_recv().is_err());
        assert!(!token.is_cancelled());

        token.cancel();
        assert_eq!(token.reason(), Some(CancelReason::Cancelled));
        assert!(token.done().recv().is_err());
    }

    #[test]
    fn child_follows_parent_but_not_the_reverse() {
        let parent = CancelToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let second = parent.child();
        parent.cancel();
        assert_eq!(second.reason(), Some(CancelReason::Cancelled));

        let late = parent.child();
        assert_eq!(late.reason(), Some(CancelReason::Cancelled));
    }

    #[test]
    fn first_reason_wins() {
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(token.expire(), CancelReason::Cancelled);
    }

    #[test]
    fn deadline_expires_token_and_child() {
        let token = CancelToken::with_timeout(Duration::from_millis(10));
        let child = token.child();
        assert_eq!(child.deadline(), token.deadline());

        let signal = child.deadline_signal();
        select! {
            recv(signal) -> _ => {}
            recv(child.done()) -> _ => panic!("cancelled before deadline"),
        }
        assert_eq!(child.reason(), Some(CancelReason::DeadlineExceeded));
        assert_eq!(token.reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn reason_converts_to_error() {
        assert!(matches!(
            HierarchyError::from(CancelReason::Cancelled),
            HierarchyError::Cancelled
        ));
        assert!(matches!(
            HierarchyError::from(CancelReason::DeadlineExceeded),
            HierarchyError::DeadlineExceeded
        ));
    }
}
