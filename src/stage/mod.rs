//! Pipeline stages: per-frame batching plus the four batch-completion
//! task producers.

mod batching;
mod batching_done;

pub use batching::IoBatchingStage;
pub use batching_done::{
    DeviceToHostStage, HostToDeviceStage, InferenceStage, PostprocessingStage,
};

use std::sync::Arc;

use smallvec::SmallVec;

use crate::card::AutoSetDone;
use crate::frame::FrameInfo;
use crate::task::InferTaskSptr;

/// One flushed batch: frames paired with their completion guards.
pub type BatchedFrames = Vec<(Arc<FrameInfo>, Arc<AutoSetDone>)>;

/// Tasks emitted by one stage for one batch.
pub type TaskVec = SmallVec<[InferTaskSptr; 4]>;

/// A producer invoked once per completed batch, emitting the stage's
/// tasks against the resources it declared at construction.
pub trait BatchingDoneStage: Send {
    /// Claims this stage's tickets and builds its tasks for `finfos`.
    ///
    /// # Panics
    ///
    /// Panics unless `finfos` holds exactly the configured batch size.
    fn batching_done(&self, finfos: &BatchedFrames) -> TaskVec;
}
