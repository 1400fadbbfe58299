//! The assembled pipeline: resources, stages, pool and the batch
//! accumulator, threaded through one context object.

mod builder;

pub use builder::InferPipelineBuilder;

use std::sync::Arc;

use crate::card::{completion_pair, ResultWaitingCard};
use crate::frame::FrameInfo;
use crate::pool::InferThreadPool;
use crate::resource::IoResource;
use crate::stage::{BatchedFrames, BatchingDoneStage, IoBatchingStage};

/// Scheduling core of an accelerator-backed inference pipeline.
///
/// Feed frames with [`feed_data`](InferPipeline::feed_data); every
/// `batchsize`-th frame flushes the accumulated batch through the
/// host-to-device, inference, device-to-host and post-processing stages.
/// Each frame's card fires once the last stage task referencing it has
/// finished. Callers stop feeding, then call
/// [`shutdown`](InferPipeline::shutdown).
pub struct InferPipeline {
    batchsize: u32,
    pool: Arc<InferThreadPool>,
    cpu_input_res: Arc<IoResource>,
    cpu_output_res: Arc<IoResource>,
    dev_input_res: Arc<IoResource>,
    dev_output_res: Arc<IoResource>,
    batching_stage: IoBatchingStage,
    batching_done_stages: Vec<Box<dyn BatchingDoneStage>>,
    batched_finfos: BatchedFrames,
}

impl InferPipeline {
    pub fn builder(batchsize: u32) -> InferPipelineBuilder {
        InferPipelineBuilder::new(batchsize)
    }

    /// Accepts one frame and returns its completion card.
    ///
    /// Blocks only while the pool backlog is full. Frames fed after
    /// [`shutdown`](InferPipeline::shutdown) are dropped by the pool.
    pub fn feed_data(&mut self, finfo: FrameInfo) -> ResultWaitingCard {
        let finfo = Arc::new(finfo);
        let (card, auto_set_done) = completion_pair(Arc::clone(&finfo));

        let task = self.batching_stage.batching(&finfo);
        self.pool.submit(task);

        self.batched_finfos.push((finfo, auto_set_done));
        if self.batched_finfos.len() as u32 == self.batchsize {
            self.batching_done();
        }
        card
    }

    /// Flushes the accumulated batch through the four stage producers.
    fn batching_done(&mut self) {
        self.batching_stage.reset();
        if self.batched_finfos.is_empty() {
            return;
        }
        for stage in &self.batching_done_stages {
            let tasks = stage.batching_done(&self.batched_finfos);
            self.pool.submit_all(tasks);
        }
        self.batched_finfos.clear();
    }

    /// Stops the pipeline.
    ///
    /// The pool is destroyed first, letting in-flight tasks finish, then
    /// any tickets still pending on the resources are cancelled so
    /// external waiters unblock. A partial batch is dropped without
    /// emitting its batching-done stages; its guards are released, which
    /// fires the affected cards.
    pub fn shutdown(&mut self) {
        log::info!("inference pipeline shutting down");
        self.pool.destroy();
        self.batching_stage.reset();
        self.batched_finfos.clear();
        self.cpu_input_res.cancel_pending();
        self.dev_input_res.cancel_pending();
        self.dev_output_res.cancel_pending();
        self.cpu_output_res.cancel_pending();
    }

    pub fn batchsize(&self) -> u32 {
        self.batchsize
    }

    pub fn pool(&self) -> &Arc<InferThreadPool> {
        &self.pool
    }

    pub fn cpu_input_res(&self) -> &Arc<IoResource> {
        &self.cpu_input_res
    }

    pub fn cpu_output_res(&self) -> &Arc<IoResource> {
        &self.cpu_output_res
    }

    pub fn dev_input_res(&self) -> &Arc<IoResource> {
        &self.dev_input_res
    }

    pub fn dev_output_res(&self) -> &Arc<IoResource> {
        &self.dev_output_res
    }
}
