use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::frame::FrameInfo;
use crate::resource::{IoResource, IoResValue};
use crate::task::{InferTask, InferTaskSptr};

/// Stand-in for the per-frame input copy a real pipeline would perform.
const INPUT_COPY_DELAY: Duration = Duration::from_millis(1);

/// Cuts the frame stream into batches on the CPU-input resource.
///
/// Every in-batch frame except the last picks its ticket with the reserve
/// flag, so all frame tasks of one batch share a single ticket and fill
/// distinct slots of the same buffer concurrently. The final frame
/// consumes the reservation, which lets the following H2D stage claim a
/// fresh ticket on the resource.
#[derive(Debug)]
pub struct IoBatchingStage {
    batchsize: u32,
    batch_idx: u32,
    output_res: Arc<IoResource>,
}

impl IoBatchingStage {
    pub fn new(batchsize: u32, output_res: Arc<IoResource>) -> Self {
        Self {
            batchsize,
            batch_idx: 0,
            output_res,
        }
    }

    /// Emits the task that lands `finfo` in its slot of the current
    /// batch and advances to the next slot.
    pub fn batching(&mut self, finfo: &Arc<FrameInfo>) -> InferTaskSptr {
        // Reserve inside the batch; the last frame lets the ticket drain.
        let reserve_ticket = self.batch_idx + 1 != self.batchsize;
        let ticket = self.output_res.pick_up_ticket(reserve_ticket);

        let bidx = self.batch_idx;
        let res = Arc::clone(&self.output_res);
        let finfo = Arc::clone(finfo);
        let task = InferTask::new(move || {
            let value = res.wait_resource_by_ticket(&ticket)?;
            process_one_frame(&finfo, bidx, value);
            res.dealling_done();
            Ok(())
        })
        .with_msg("io batching");

        self.batch_idx = (self.batch_idx + 1) % self.batchsize;
        Arc::new(task)
    }

    /// Rewinds to slot 0. Called between batches.
    pub fn reset(&mut self) {
        self.batch_idx = 0;
    }
}

fn process_one_frame(finfo: &FrameInfo, bidx: u32, value: &IoResValue) {
    thread::sleep(INPUT_COPY_DELAY);
    value.one().store(bidx as usize, finfo.timestamp);
    log::debug!(
        "io batching stage, bidx: {}; [{}, {}]",
        bidx,
        finfo.batch_index,
        finfo.item_index
    );
}
