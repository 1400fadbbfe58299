use std::sync::Arc;
use std::thread;
use std::time::Duration;

use smallvec::smallvec;

use super::{BatchedFrames, BatchingDoneStage, TaskVec};
use crate::resource::IoResource;
use crate::task::InferTask;

// Stand-ins for the blocking accelerator driver calls; the real pipeline
// spends its time here.
const H2D_DELAY: Duration = Duration::from_millis(2);
const INFER_DELAY: Duration = Duration::from_millis(16);
const D2H_DELAY: Duration = Duration::from_millis(2);
const POSTPROC_DELAY: Duration = Duration::from_millis(1);

/// Copies the assembled CPU-input batch into the device-input buffer.
pub struct HostToDeviceStage {
    batchsize: u32,
    cpu_input_res: Arc<IoResource>,
    dev_input_res: Arc<IoResource>,
}

impl HostToDeviceStage {
    pub fn new(
        batchsize: u32,
        cpu_input_res: Arc<IoResource>,
        dev_input_res: Arc<IoResource>,
    ) -> Self {
        Self {
            batchsize,
            cpu_input_res,
            dev_input_res,
        }
    }
}

impl BatchingDoneStage for HostToDeviceStage {
    fn batching_done(&self, finfos: &BatchedFrames) -> TaskVec {
        assert_eq!(finfos.len() as u32, self.batchsize, "batch size mismatch");

        let cpu_ticket = self.cpu_input_res.pick_up_new_ticket(false);
        let dev_ticket = self.dev_input_res.pick_up_new_ticket(false);
        let cpu_res = Arc::clone(&self.cpu_input_res);
        let dev_res = Arc::clone(&self.dev_input_res);
        let batchsize = self.batchsize as usize;
        let finfos = finfos.clone();

        let task = InferTask::new(move || {
            let cpu_value = cpu_res.wait_resource_by_ticket(&cpu_ticket)?;
            let dev_value = dev_res.wait_resource_by_ticket(&dev_ticket)?;

            thread::sleep(H2D_DELAY);
            for bidx in 0..batchsize {
                dev_value.one().store(bidx, cpu_value.one().load(bidx));
                log::debug!("h2d batching done: {}", finfos[bidx].0.timestamp);
            }

            cpu_res.dealling_done();
            dev_res.dealling_done();
            Ok(())
        })
        .with_msg("h2d transfer");
        smallvec![Arc::new(task)]
    }
}

/// Runs inference over the device-input buffer into the device-output
/// buffer.
pub struct InferenceStage {
    batchsize: u32,
    dev_input_res: Arc<IoResource>,
    dev_output_res: Arc<IoResource>,
}

impl InferenceStage {
    pub fn new(
        batchsize: u32,
        dev_input_res: Arc<IoResource>,
        dev_output_res: Arc<IoResource>,
    ) -> Self {
        Self {
            batchsize,
            dev_input_res,
            dev_output_res,
        }
    }
}

impl BatchingDoneStage for InferenceStage {
    fn batching_done(&self, finfos: &BatchedFrames) -> TaskVec {
        assert_eq!(finfos.len() as u32, self.batchsize, "batch size mismatch");

        let input_ticket = self.dev_input_res.pick_up_new_ticket(false);
        let output_ticket = self.dev_output_res.pick_up_new_ticket(false);
        let input_res = Arc::clone(&self.dev_input_res);
        let output_res = Arc::clone(&self.dev_output_res);
        let batchsize = self.batchsize as usize;
        let finfos = finfos.clone();

        let task = InferTask::new(move || {
            let input_value = input_res.wait_resource_by_ticket(&input_ticket)?;
            let output_value = output_res.wait_resource_by_ticket(&output_ticket)?;

            // the model itself is external; a unit increment stands in
            // for its output
            thread::sleep(INFER_DELAY);
            for bidx in 0..batchsize {
                output_value.one().store(bidx, input_value.one().load(bidx) + 1);
                log::debug!("infer batching done: {}", finfos[bidx].0.timestamp);
            }

            input_res.dealling_done();
            output_res.dealling_done();
            Ok(())
        })
        .with_msg("inference");
        smallvec![Arc::new(task)]
    }
}

/// Copies the device-output batch back into the CPU-output buffer.
pub struct DeviceToHostStage {
    batchsize: u32,
    dev_output_res: Arc<IoResource>,
    cpu_output_res: Arc<IoResource>,
}

impl DeviceToHostStage {
    pub fn new(
        batchsize: u32,
        dev_output_res: Arc<IoResource>,
        cpu_output_res: Arc<IoResource>,
    ) -> Self {
        Self {
            batchsize,
            dev_output_res,
            cpu_output_res,
        }
    }
}

impl BatchingDoneStage for DeviceToHostStage {
    fn batching_done(&self, finfos: &BatchedFrames) -> TaskVec {
        assert_eq!(finfos.len() as u32, self.batchsize, "batch size mismatch");

        let dev_ticket = self.dev_output_res.pick_up_new_ticket(false);
        let cpu_ticket = self.cpu_output_res.pick_up_new_ticket(false);
        let dev_res = Arc::clone(&self.dev_output_res);
        let cpu_res = Arc::clone(&self.cpu_output_res);
        let batchsize = self.batchsize as usize;
        let finfos = finfos.clone();

        let task = InferTask::new(move || {
            let dev_value = dev_res.wait_resource_by_ticket(&dev_ticket)?;
            let cpu_value = cpu_res.wait_resource_by_ticket(&cpu_ticket)?;

            thread::sleep(D2H_DELAY);
            for bidx in 0..batchsize {
                cpu_value.one().store(bidx, dev_value.one().load(bidx));
                log::debug!("d2h batching done: {}", finfos[bidx].0.timestamp);
            }

            dev_res.dealling_done();
            cpu_res.dealling_done();
            Ok(())
        })
        .with_msg("d2h transfer");
        smallvec![Arc::new(task)]
    }
}

/// Post-processes each batch item on the CPU-output buffer.
///
/// Item 0 claims a fresh reserved ticket on the resource, ending the D2H
/// holder's claim; items 1.. join the same reservation, so all per-item
/// tasks share one ticket and only the final release pops it.
pub struct PostprocessingStage {
    batchsize: u32,
    cpu_output_res: Arc<IoResource>,
}

impl PostprocessingStage {
    pub fn new(batchsize: u32, cpu_output_res: Arc<IoResource>) -> Self {
        Self {
            batchsize,
            cpu_output_res,
        }
    }
}

impl BatchingDoneStage for PostprocessingStage {
    fn batching_done(&self, finfos: &BatchedFrames) -> TaskVec {
        assert_eq!(finfos.len() as u32, self.batchsize, "batch size mismatch");

        let mut tasks = TaskVec::new();
        for (bidx, pair) in finfos.iter().enumerate() {
            let ticket = if bidx == 0 {
                self.cpu_output_res.pick_up_new_ticket(true)
            } else {
                self.cpu_output_res.pick_up_ticket(true)
            };
            let res = Arc::clone(&self.cpu_output_res);
            let finfo = Arc::clone(&pair.0);
            let done_guard = Arc::clone(&pair.1);

            let task = InferTask::new(move || {
                let value = res.wait_resource_by_ticket(&ticket)?;
                thread::sleep(POSTPROC_DELAY);
                log::debug!(
                    "postprocessing stage, bidx: {}, time_stamp: {}, result: {}",
                    bidx,
                    finfo.timestamp,
                    value.one().load(bidx)
                );
                res.dealling_done();
                drop(done_guard);
                Ok(())
            })
            .with_msg("postprocessing");
            tasks.push(Arc::new(task));
        }
        tasks
    }
}
