//! FIFO ticket arbitration for a shared resource.
//!
//! A [`QueuingServer`] issues totally-ordered tickets; the head ticket of
//! its queue is the only one in the called state, so holders waiting on
//! their tickets touch the resource strictly in issuance order. A ticket
//! can be held in reserved mode, which lets a run of sibling holders share
//! one claim on the resource and release it with per-sibling
//! [`dealling_done`](QueuingServer::dealling_done) calls.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;
use crate::event::{Event, EventState};

/// A one-shot, FIFO-ordered permission to use a resource.
///
/// Cloning a ticket shares the same wait point; every clone is released
/// by the same head-of-queue fulfillment.
#[derive(Debug, Clone)]
pub struct QueuingTicket {
    event: Arc<Event>,
}

impl QueuingTicket {
    fn new() -> Self {
        Self {
            event: Arc::new(Event::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn called(&self) -> bool {
        self.event.is_called()
    }
}

/// Bookkeeping for one live ticket.
#[derive(Debug)]
struct TicketRoot {
    ticket: QueuingTicket,
    /// Outstanding sibling reuses of this ticket. Completion decrements
    /// the count in place instead of popping while it is nonzero.
    reserved_count: u32,
}

/// State guarded by the server mutex.
#[derive(Debug)]
struct ServerState {
    /// FIFO of live tickets. The head is the only called ticket.
    tickets: VecDeque<TicketRoot>,
    /// The most recently issued ticket while held in reserved mode.
    /// Aliases the queue tail whenever it is set.
    reserved: Option<QueuingTicket>,
}

/// Arbitrates totally-ordered access to one logical resource.
#[derive(Debug)]
pub struct QueuingServer {
    state: Mutex<ServerState>,
}

impl Default for QueuingServer {
    fn default() -> Self {
        Self::new()
    }
}

impl QueuingServer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState {
                tickets: VecDeque::new(),
                reserved: None,
            }),
        }
    }

    /// Picks up a ticket for the next use of the resource.
    ///
    /// When the previous holder reserved, the reserved ticket is returned
    /// and this pick shares its claim; otherwise a fresh ticket is issued
    /// at the queue tail. With `reserve` set, the returned ticket is kept
    /// reserved so the next `pick_up_ticket` joins it as well.
    pub fn pick_up_ticket(&self, reserve: bool) -> QueuingTicket {
        let mut state = self.state.lock();
        let ticket = match state.reserved.clone() {
            Some(reserved) => reserved,
            None => Self::push_new(&mut state),
        };
        if reserve {
            state.reserved = Some(ticket.clone());
            state
                .tickets
                .back_mut()
                .expect("a live ticket must back a reservation")
                .reserved_count += 1;
        } else {
            state.reserved = None;
        }
        ticket
    }

    /// Forces a fresh ticket, ending any live reservation.
    ///
    /// A consumed reservation gives up one of its sibling claims: the
    /// tail's count is decremented, or the tail is popped when its count
    /// is already zero.
    ///
    /// # Panics
    ///
    /// Panics if the consumed reservation has a zero count while other
    /// tickets are still live, which means a release went missing.
    pub fn pick_up_new_ticket(&self, reserve: bool) -> QueuingTicket {
        let mut state = self.state.lock();
        if state.reserved.take().is_some() {
            let tail = state
                .tickets
                .back_mut()
                .expect("a live ticket must back a reservation");
            if tail.reserved_count == 0 {
                assert_eq!(
                    state.tickets.len(),
                    1,
                    "drained reservation with other tickets live"
                );
                state.tickets.pop_back();
            } else {
                tail.reserved_count -= 1;
            }
        }
        let ticket = Self::push_new(&mut state);
        if reserve {
            state.reserved = Some(ticket.clone());
            state
                .tickets
                .back_mut()
                .expect("a live ticket must back a reservation")
                .reserved_count += 1;
        }
        ticket
    }

    /// Releases the head ticket once.
    ///
    /// Decrements the head's sibling count, or pops it and calls the next
    /// ticket in line when the count is already zero. No-op on an empty
    /// queue.
    pub fn dealling_done(&self) {
        let mut state = self.state.lock();
        let head_drained = match state.tickets.front_mut() {
            Some(head) => {
                if head.reserved_count > 0 {
                    head.reserved_count -= 1;
                    false
                } else {
                    true
                }
            }
            None => return,
        };
        if head_drained {
            state.tickets.pop_front();
            Self::call_head(&state);
        }
    }

    /// Blocks until `ticket` has been called.
    pub fn wait_by_ticket(&self, ticket: &QueuingTicket) -> Result<(), Error> {
        match ticket.event.wait() {
            EventState::Called => Ok(()),
            _ => Err(Error::TicketCancelled),
        }
    }

    /// Cancels every live ticket so blocked waiters return
    /// [`Error::TicketCancelled`]. Intended for shutdown; picks after
    /// this start from an empty queue.
    pub fn cancel_pending(&self) {
        let mut state = self.state.lock();
        state.reserved = None;
        for root in state.tickets.drain(..) {
            root.ticket.event.cancel();
        }
    }

    /// Number of live tickets, the called head included.
    pub fn pending_tickets(&self) -> usize {
        self.state.lock().tickets.len()
    }

    /// Appends a fresh ticket; a queue that just became nonempty calls it
    /// at once.
    fn push_new(state: &mut ServerState) -> QueuingTicket {
        let ticket = QueuingTicket::new();
        state.tickets.push_back(TicketRoot {
            ticket: ticket.clone(),
            reserved_count: 0,
        });
        if state.tickets.len() == 1 {
            Self::call_head(state);
        }
        ticket
    }

    fn call_head(state: &ServerState) {
        if let Some(head) = state.tickets.front() {
            head.ticket.event.call();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn check_server_traits() {
        static_assertions::assert_impl_all!(QueuingServer: Send, Sync);
        static_assertions::assert_impl_all!(QueuingTicket: Send, Sync);
    }

    #[test]
    fn tickets_called_in_issue_order() {
        let server = QueuingServer::new();
        let t1 = server.pick_up_new_ticket(false);
        let t2 = server.pick_up_new_ticket(false);
        assert!(t1.called());
        assert!(!t2.called());

        server.dealling_done();
        assert!(t2.called());
        assert_eq!(server.pending_tickets(), 1);

        server.dealling_done();
        assert_eq!(server.pending_tickets(), 0);
    }

    #[test]
    fn reservation_shares_one_ticket() {
        let server = QueuingServer::new();
        let t1 = server.pick_up_ticket(true);
        let t2 = server.pick_up_ticket(true);
        let t3 = server.pick_up_ticket(true);
        assert!(t1.called() && t2.called() && t3.called());
        assert_eq!(server.pending_tickets(), 1);

        server.dealling_done();
        server.dealling_done();
        server.dealling_done();
        // drained, but the ticket stays until a new pick consumes it
        assert_eq!(server.pending_tickets(), 1);

        let t4 = server.pick_up_new_ticket(false);
        assert!(t4.called());
        assert_eq!(server.pending_tickets(), 1);
    }

    #[test]
    fn last_sibling_release_unblocks_next_holder() {
        let server = QueuingServer::new();
        // three in-batch picks reserve, the final one lets the ticket drain
        server.pick_up_ticket(true);
        server.pick_up_ticket(true);
        server.pick_up_ticket(true);
        let last = server.pick_up_ticket(false);
        assert!(last.called());
        assert_eq!(server.pending_tickets(), 1);

        let next = server.pick_up_new_ticket(false);
        assert!(!next.called());
        for _ in 0..3 {
            server.dealling_done();
            assert!(!next.called());
        }
        server.dealling_done();
        assert!(next.called());
    }

    #[test]
    fn wait_blocks_until_head() {
        let server = Arc::new(QueuingServer::new());
        let _head = server.pick_up_new_ticket(false);
        let pending = server.pick_up_new_ticket(false);

        let waiter = {
            let server = Arc::clone(&server);
            let pending = pending.clone();
            thread::spawn(move || server.wait_by_ticket(&pending))
        };
        server.dealling_done();
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn cancelled_tickets_unblock_waiters() {
        let server = QueuingServer::new();
        let head = server.pick_up_new_ticket(false);
        let pending = server.pick_up_new_ticket(false);
        server.cancel_pending();

        // the head had already been called; the pending ticket reports
        // the cancellation
        assert!(server.wait_by_ticket(&head).is_ok());
        assert_eq!(
            server.wait_by_ticket(&pending),
            Err(Error::TicketCancelled)
        );
        assert_eq!(server.pending_tickets(), 0);
    }
}
