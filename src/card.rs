//! Per-frame completion notification.

use std::sync::Arc;

use crate::event::Event;
use crate::frame::FrameInfo;

/// Consumer-side handle fulfilled when a frame clears the whole pipeline.
#[derive(Debug, Clone)]
pub struct ResultWaitingCard {
    done: Arc<Event>,
}

impl ResultWaitingCard {
    /// Blocks until the frame's last stage task has dropped its guard.
    pub fn wait_for_call(&self) {
        self.done.wait();
    }

    /// Non-blocking probe.
    pub fn ready(&self) -> bool {
        self.done.is_called()
    }
}

/// Owning guard whose destruction fulfils the frame's completion promise.
///
/// The batch accumulator and every stage task that still references the
/// frame share one guard; the last drop fires the card.
#[derive(Debug)]
pub struct AutoSetDone {
    done: Arc<Event>,
    frame: Arc<FrameInfo>,
}

impl AutoSetDone {
    pub fn frame(&self) -> &Arc<FrameInfo> {
        &self.frame
    }
}

impl Drop for AutoSetDone {
    fn drop(&mut self) {
        self.done.call();
    }
}

/// Creates the card/guard pair for one frame.
pub fn completion_pair(frame: Arc<FrameInfo>) -> (ResultWaitingCard, Arc<AutoSetDone>) {
    let done = Arc::new(Event::new());
    let card = ResultWaitingCard {
        done: Arc::clone(&done),
    };
    (card, Arc::new(AutoSetDone { done, frame }))
}
