//! Ordered draining of per-frame completion cards.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::Sender;
use derivative::Derivative;
use parking_lot::{Condvar, Mutex};

use crate::card::ResultWaitingCard;
use crate::frame::FrameInfo;

/// Queue state guarded by the helper mutex.
#[derive(Derivative)]
#[derivative(Debug)]
struct HelperState {
    queue: VecDeque<(Arc<FrameInfo>, ResultWaitingCard)>,
    running: bool,
    #[derivative(Debug = "ignore")]
    consumer: Option<Sender<Arc<FrameInfo>>>,
}

#[derive(Debug)]
struct HelperShared {
    state: Mutex<HelperState>,
    not_full: Condvar,
    not_empty: Condvar,
    /// Queue capacity, `3 *` the batch size.
    capacity: usize,
}

/// Background consumer that awaits each frame's card in submission order
/// and forwards finished frames downstream.
///
/// Frames are handed to the registered consumer channel, or logged when
/// none is set. Dropping the helper discards items still queued and joins
/// the drain thread; drop it only after the pipeline can no longer leave
/// a submitted card unfulfilled.
#[derive(Debug)]
pub struct InferTransDataHelper {
    shared: Arc<HelperShared>,
    th: Option<JoinHandle<()>>,
}

impl InferTransDataHelper {
    pub fn new(batchsize: u32) -> Self {
        let shared = Arc::new(HelperShared {
            state: Mutex::new(HelperState {
                queue: VecDeque::new(),
                running: true,
                consumer: None,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity: 3 * batchsize as usize,
        });
        let th = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || Self::drain_loop(shared))
        };
        Self {
            shared,
            th: Some(th),
        }
    }

    /// Routes finished frames into `consumer` instead of the log.
    pub fn set_consumer(&self, consumer: Sender<Arc<FrameInfo>>) {
        self.shared.state.lock().consumer = Some(consumer);
    }

    /// Enqueues one `(frame, card)` pair, blocking while the queue is
    /// full. Dropped silently when the helper is shutting down.
    pub fn submit_data(&self, data: (Arc<FrameInfo>, ResultWaitingCard)) {
        let mut state = self.shared.state.lock();
        while state.running && state.queue.len() >= self.shared.capacity {
            self.shared.not_full.wait(&mut state);
        }
        if !state.running {
            return;
        }
        state.queue.push_back(data);
        drop(state);
        self.shared.not_empty.notify_one();
    }

    fn drain_loop(shared: Arc<HelperShared>) {
        loop {
            let (finfo, card) = {
                let mut state = shared.state.lock();
                while state.running && state.queue.is_empty() {
                    shared.not_empty.wait(&mut state);
                }
                if !state.running {
                    return;
                }
                let data = state.queue.pop_front();
                drop(state);
                shared.not_full.notify_one();
                match data {
                    Some(data) => data,
                    None => continue,
                }
            };

            card.wait_for_call();

            let consumer = shared.state.lock().consumer.clone();
            match consumer {
                Some(tx) => {
                    let _ = tx.send(Arc::clone(&finfo));
                }
                None => log::debug!(
                    "infer trans data helper: {}; item: {}",
                    finfo.batch_index,
                    finfo.item_index
                ),
            }
        }
    }
}

impl Drop for InferTransDataHelper {
    fn drop(&mut self) {
        self.shared.state.lock().running = false;
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();
        if let Some(th) = self.th.take() {
            let _ = th.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::completion_pair;
    use std::time::Duration;

    #[test]
    fn check_helper_traits() {
        static_assertions::assert_impl_all!(InferTransDataHelper: Send);
    }

    #[test]
    fn frames_forwarded_in_submission_order() {
        let helper = InferTransDataHelper::new(1);
        let (tx, rx) = crossbeam::unbounded();
        helper.set_consumer(tx);

        let mut guards = Vec::new();
        for i in 0..3 {
            let frame = Arc::new(FrameInfo::new(i as i64, 0, i));
            let (card, guard) = completion_pair(Arc::clone(&frame));
            helper.submit_data((frame, card));
            guards.push(guard);
        }

        // completion lands out of order; the helper still drains FIFO
        guards.remove(2);
        guards.remove(0);
        guards.remove(0);

        for expected in 0..3 {
            let frame = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(frame.item_index, expected);
        }
    }

    #[test]
    fn shutdown_joins_cleanly_while_a_card_is_in_flight() {
        let helper = InferTransDataHelper::new(1);
        let (tx, rx) = crossbeam::unbounded();
        helper.set_consumer(tx);

        let frame = Arc::new(FrameInfo::new(0, 0, 0));
        let (card, guard) = completion_pair(Arc::clone(&frame));
        helper.submit_data((frame, card));

        // unblock a drain thread that may already be waiting on the card
        let fulfiller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(guard);
        });

        // either the pair is discarded while still queued, or the drain
        // forwards it once the guard drops; the join must not hang
        drop(helper);
        fulfiller.join().unwrap();

        let mut received = 0;
        while rx.recv_timeout(Duration::from_millis(50)).is_ok() {
            received += 1;
        }
        assert!(received <= 1);
    }
}
