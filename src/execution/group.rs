use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use crate::error::{HierarchyError, HierarchyResult};

use super::cancel::CancelToken;

/// A group of cooperating tasks sharing one cancellation token.
///
/// The first task to fail stores its error and cancels the group's token; errors from
/// tasks failing afterwards are dropped.
pub struct TaskGroup {
    token: CancelToken,
    first_error: Mutex<Option<HierarchyError>>,
}

impl TaskGroup {
    /// Create a group whose token is a child of `parent`.
    pub fn new(parent: &CancelToken) -> Self {
        Self {
            token: parent.child(),
            first_error: Mutex::new(None),
        }
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Run `task` to completion, recording its failure (or panic) as a group failure.
    ///
    /// Returns `true` when the task succeeded.
    pub fn run<F>(&self, task: F) -> bool
    where
        F: FnOnce() -> HierarchyResult<()>,
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|payload| {
            Err(HierarchyError::internal(format!(
                "task panicked: {}",
                panic_message(payload.as_ref())
            )))
        });
        match outcome {
            Ok(()) => true,
            Err(err) => {
                self.fail(err);
                false
            }
        }
    }

    fn fail(&self, err: HierarchyError) {
        {
            let mut slot = self.first_error.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(err);
            }
        }
        self.token.cancel();
    }

    /// The first recorded error, if any.
    pub fn into_result(self) -> HierarchyResult<()> {
        match self
            .first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
