//! Executable pipeline tasks with front-dependency barriers.

use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use derivative::Derivative;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::Error;
use crate::event::Event;

/// Shared handle to an [`InferTask`].
pub type InferTaskSptr = Arc<InferTask>;

type Thunk = Box<dyn FnOnce() -> Result<(), Error> + Send + 'static>;

/// Outcome of running a task once.
#[derive(Debug)]
pub(crate) enum TaskOutcome {
    /// The thunk returned `Ok`, or the task had already run.
    Completed,
    /// The thunk returned a stage error; the pool logs it and the
    /// pipeline continues.
    Failed(Error),
    /// The thunk panicked; the text goes to the pool's error sink.
    Panicked(String),
}

/// A unit of pipeline work.
///
/// Executes its thunk at most once. Completion is observable through a
/// one-shot event signalled on every outcome, so dependents never stall
/// behind a failed task.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct InferTask {
    #[derivative(Debug = "ignore")]
    thunk: Mutex<Option<Thunk>>,
    /// Tasks that must have completed before this one executes.
    #[derivative(Debug = "ignore")]
    front_tasks: Mutex<SmallVec<[InferTaskSptr; 2]>>,
    done: Event,
    /// Free-form description carried into failure log lines.
    task_msg: Cow<'static, str>,
}

impl InferTask {
    pub fn new(thunk: impl FnOnce() -> Result<(), Error> + Send + 'static) -> Self {
        Self {
            thunk: Mutex::new(Some(Box::new(thunk))),
            front_tasks: Mutex::new(SmallVec::new()),
            done: Event::new(),
            task_msg: Cow::Borrowed(""),
        }
    }

    /// Attaches the diagnostic message included in failure logs.
    pub fn with_msg(mut self, msg: impl Into<Cow<'static, str>>) -> Self {
        self.task_msg = msg.into();
        self
    }

    pub fn task_msg(&self) -> &str {
        &self.task_msg
    }

    /// Requires `front` to complete before this task executes.
    pub fn bind_front_task(&self, front: &InferTaskSptr) {
        self.front_tasks.lock().push(Arc::clone(front));
    }

    /// Requires every task in `fronts` to complete before this one
    /// executes.
    pub fn bind_front_tasks<'a>(&self, fronts: impl IntoIterator<Item = &'a InferTaskSptr>) {
        self.front_tasks.lock().extend(fronts.into_iter().cloned());
    }

    /// Blocks until every bound front task has completed. Single pass:
    /// the set is drained, so a second call returns immediately.
    pub(crate) fn wait_front_tasks(&self) {
        let fronts = std::mem::replace(&mut *self.front_tasks.lock(), SmallVec::new());
        for front in fronts {
            front.wait_for_complete();
        }
    }

    /// Blocks until this task has run, successfully or not.
    pub fn wait_for_complete(&self) {
        self.done.wait();
    }

    /// Runs the thunk, capturing panics, and signals completion.
    pub(crate) fn run(&self) -> TaskOutcome {
        let thunk = self.thunk.lock().take();
        let outcome = match thunk {
            Some(f) => match panic::catch_unwind(AssertUnwindSafe(move || f())) {
                Ok(Ok(())) => TaskOutcome::Completed,
                Ok(Err(err)) => TaskOutcome::Failed(err),
                Err(payload) => TaskOutcome::Panicked(panic_text(payload)),
            },
            // already executed; completion was signalled back then
            None => TaskOutcome::Completed,
        };
        self.done.call();
        outcome
    }
}

fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_owned()
    }
}
