use parking_lot::{Condvar, Mutex};

/// State of a one-shot event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventState {
    /// Not yet signalled; waiters block.
    Pending,
    /// Signalled; waiters proceed.
    Called,
    /// Abandoned during shutdown; waiters receive an error.
    Cancelled,
}

/// A one-shot event with any number of waiters.
///
/// The state moves out of `Pending` exactly once and never changes again,
/// so the first of `call`/`cancel` wins and later signals are no-ops.
#[derive(Debug)]
pub(crate) struct Event {
    state: Mutex<EventState>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EventState::Pending),
            cond: Condvar::new(),
        }
    }

    /// Signals the event, waking all waiters.
    pub fn call(&self) {
        self.transition(EventState::Called);
    }

    /// Abandons the event, waking all waiters with the cancelled state.
    pub fn cancel(&self) {
        self.transition(EventState::Cancelled);
    }

    fn transition(&self, to: EventState) {
        let mut state = self.state.lock();
        if *state == EventState::Pending {
            *state = to;
            self.cond.notify_all();
        }
    }

    /// Blocks until the event leaves `Pending` and returns the final state.
    pub fn wait(&self) -> EventState {
        let mut state = self.state.lock();
        while *state == EventState::Pending {
            self.cond.wait(&mut state);
        }
        *state
    }

    /// Non-blocking probe for the `Called` state.
    pub fn is_called(&self) -> bool {
        *self.state.lock() == EventState::Called
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn call_wakes_waiters() {
        let event = Arc::new(Event::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let event = Arc::clone(&event);
                thread::spawn(move || event.wait())
            })
            .collect();
        event.call();
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), EventState::Called);
        }
    }

    #[test]
    fn first_signal_wins() {
        let event = Event::new();
        event.call();
        event.cancel();
        assert_eq!(event.wait(), EventState::Called);
        assert!(event.is_called());
    }

    #[test]
    fn cancel_is_observable() {
        let event = Event::new();
        event.cancel();
        assert_eq!(event.wait(), EventState::Cancelled);
        assert!(!event.is_called());
    }
}
