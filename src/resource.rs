//! Buffer resources arbitrated by ticket queues.

use std::cell::UnsafeCell;

use derivative::Derivative;
use once_cell::sync::OnceCell;

use crate::error::Error;
use crate::queuing::{QueuingServer, QueuingTicket};

/// One batch-sized run of buffer cells.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct OneData {
    #[derivative(Debug = "ignore")]
    cells: Vec<UnsafeCell<i64>>,
    batchsize: u32,
}

// Safety: cell access follows the ticket protocol. Only holders of the
// called head ticket touch the buffer, and sibling holders of a reserved
// ticket each own a distinct slot.
unsafe impl Sync for OneData {}

impl OneData {
    fn new(batchsize: u32) -> Self {
        Self {
            cells: (0..batchsize).map(|_| UnsafeCell::new(0)).collect(),
            batchsize,
        }
    }

    pub fn batchsize(&self) -> u32 {
        self.batchsize
    }

    /// Writes the slot at `idx`.
    ///
    /// The caller must hold the called head ticket of the owning
    /// resource, or a slot-distinct share of it.
    pub fn store(&self, idx: usize, value: i64) {
        unsafe {
            *self.cells[idx].get() = value;
        }
    }

    /// Reads the slot at `idx`, under the same ticket discipline as
    /// [`store`](OneData::store).
    pub fn load(&self, idx: usize) -> i64 {
        unsafe { *self.cells[idx].get() }
    }
}

/// Buffer value bound to an [`IoResource`]: exactly one batch-sized datum.
#[derive(Debug)]
pub struct IoResValue {
    datas: Vec<OneData>,
}

impl IoResValue {
    fn allocate(batchsize: u32) -> Self {
        Self {
            datas: vec![OneData::new(batchsize)],
        }
    }

    /// The single per-batch datum.
    pub fn one(&self) -> &OneData {
        &self.datas[0]
    }
}

/// A queuing server with an attached buffer sized to the batch.
///
/// The server part hands out tickets; the buffer is allocated by
/// [`init`](IoResource::init) and owned by the resource for its whole
/// lifetime. Consumers reach the buffer only through
/// [`wait_resource_by_ticket`](IoResource::wait_resource_by_ticket), so
/// buffer access inherits the ticket ordering.
#[derive(Debug)]
pub struct IoResource {
    server: QueuingServer,
    value: OnceCell<IoResValue>,
    batchsize: u32,
}

impl IoResource {
    pub fn new(batchsize: u32) -> Self {
        Self {
            server: QueuingServer::new(),
            value: OnceCell::new(),
            batchsize,
        }
    }

    /// Allocates the buffer. Must run before the first ticket is used;
    /// calling it again is a no-op.
    pub fn init(&self) {
        self.value.get_or_init(|| IoResValue::allocate(self.batchsize));
    }

    pub fn batchsize(&self) -> u32 {
        self.batchsize
    }

    /// Awaits `ticket`, then hands out the buffer.
    pub fn wait_resource_by_ticket(&self, ticket: &QueuingTicket) -> Result<&IoResValue, Error> {
        self.server.wait_by_ticket(ticket)?;
        Ok(self.data_directly())
    }

    /// Direct buffer access, bypassing the ticket queue. Callers must
    /// know the resource is quiescent.
    pub fn data_directly(&self) -> &IoResValue {
        self.value.get().expect("resource used before init()")
    }

    pub fn pick_up_ticket(&self, reserve: bool) -> QueuingTicket {
        self.server.pick_up_ticket(reserve)
    }

    pub fn pick_up_new_ticket(&self, reserve: bool) -> QueuingTicket {
        self.server.pick_up_new_ticket(reserve)
    }

    pub fn dealling_done(&self) {
        self.server.dealling_done()
    }

    /// See [`QueuingServer::cancel_pending`].
    pub fn cancel_pending(&self) {
        self.server.cancel_pending()
    }

    /// See [`QueuingServer::pending_tickets`].
    pub fn pending_tickets(&self) -> usize {
        self.server.pending_tickets()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_resource_traits() {
        static_assertions::assert_impl_all!(IoResource: Send, Sync);
    }

    #[test]
    fn init_allocates_one_batch_sized_datum() {
        let res = IoResource::new(4);
        res.init();
        let value = res.data_directly();
        assert_eq!(value.one().batchsize(), 4);
        for idx in 0..4 {
            assert_eq!(value.one().load(idx), 0);
        }
    }

    #[test]
    fn init_twice_keeps_the_buffer() {
        let res = IoResource::new(2);
        res.init();
        res.data_directly().one().store(0, 7);
        res.init();
        assert_eq!(res.data_directly().one().load(0), 7);
    }

    #[test]
    fn buffer_reachable_through_called_ticket() {
        let res = IoResource::new(2);
        res.init();
        let ticket = res.pick_up_ticket(false);
        let value = res.wait_resource_by_ticket(&ticket).unwrap();
        value.one().store(1, 42);
        res.dealling_done();
        assert_eq!(res.data_directly().one().load(1), 42);
    }
}
