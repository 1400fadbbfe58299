use std::sync::Arc;

use super::InferPipeline;
use crate::pool::InferThreadPool;
use crate::resource::IoResource;
use crate::stage::{
    BatchingDoneStage, DeviceToHostStage, HostToDeviceStage, InferenceStage, IoBatchingStage,
    PostprocessingStage,
};

/// Assembles an [`InferPipeline`]: allocates the four buffer resources,
/// starts the pool and wires the stages.
///
/// ```
/// use inferline::{FrameInfo, InferPipeline};
///
/// let mut pipeline = InferPipeline::builder(2).build();
/// let card = pipeline.feed_data(FrameInfo::new(0, 0, 0));
/// let _ = pipeline.feed_data(FrameInfo::new(1, 0, 1));
/// card.wait_for_call();
/// pipeline.shutdown();
/// ```
pub struct InferPipelineBuilder {
    batchsize: u32,
    workers: Option<usize>,
}

impl InferPipelineBuilder {
    pub fn new(batchsize: u32) -> Self {
        assert!(batchsize > 0, "batch size must be nonzero");
        Self {
            batchsize,
            workers: None,
        }
    }

    /// Worker thread count. Defaults to `3 * batchsize + 4`, enough to
    /// keep every stage of three in-flight batches busy.
    pub fn workers(mut self, workers: usize) -> Self {
        assert!(workers > 0, "worker count must be nonzero");
        self.workers = Some(workers);
        self
    }

    pub fn build(self) -> InferPipeline {
        let batchsize = self.batchsize;
        let workers = self
            .workers
            .unwrap_or(3 * batchsize as usize + 4);

        let cpu_input_res = Arc::new(IoResource::new(batchsize));
        let cpu_output_res = Arc::new(IoResource::new(batchsize));
        let dev_input_res = Arc::new(IoResource::new(batchsize));
        let dev_output_res = Arc::new(IoResource::new(batchsize));
        cpu_input_res.init();
        cpu_output_res.init();
        dev_input_res.init();
        dev_output_res.init();

        let pool = Arc::new(InferThreadPool::new());
        pool.init(workers);

        let batching_stage = IoBatchingStage::new(batchsize, Arc::clone(&cpu_input_res));
        let batching_done_stages: Vec<Box<dyn BatchingDoneStage>> = vec![
            Box::new(HostToDeviceStage::new(
                batchsize,
                Arc::clone(&cpu_input_res),
                Arc::clone(&dev_input_res),
            )),
            Box::new(InferenceStage::new(
                batchsize,
                Arc::clone(&dev_input_res),
                Arc::clone(&dev_output_res),
            )),
            Box::new(DeviceToHostStage::new(
                batchsize,
                Arc::clone(&dev_output_res),
                Arc::clone(&cpu_output_res),
            )),
            Box::new(PostprocessingStage::new(
                batchsize,
                Arc::clone(&cpu_output_res),
            )),
        ];

        InferPipeline {
            batchsize,
            pool,
            cpu_input_res,
            cpu_output_res,
            dev_input_res,
            dev_output_res,
            batching_stage,
            batching_done_stages,
            batched_finfos: Vec::new(),
        }
    }
}
