//! Ticket-ordered batching and scheduling core for accelerator inference
//! pipelines.
//!
//! Frames fed into an [`InferPipeline`] are grouped into fixed-size
//! batches and driven through four stages: host-to-device transfer,
//! inference, device-to-host transfer and per-item post-processing. Each
//! stage competes for a small set of buffer resources ([`IoResource`]);
//! a [`QueuingServer`] per resource serializes that contention with
//! FIFO-ordered tickets while ticket reservation keeps sibling tasks of
//! one batch running in parallel on the same buffer.
//!
//! Stage tasks execute on a bounded, work-stealing-free
//! [`InferThreadPool`]. Every frame gets a [`ResultWaitingCard`] that
//! fires once the frame has traversed the entire pipeline, and an
//! [`InferTransDataHelper`] can drain those cards in submission order for
//! a downstream consumer.
//!
//! The accelerator itself is external to this crate: stage bodies invoke
//! it as a blocking operation, simulated here by fixed delays.

mod card;
mod error;
mod event;
mod frame;
mod pipeline;
mod pool;
mod queuing;
mod resource;
mod stage;
mod task;
mod trans_data;

pub use crate::card::{completion_pair, AutoSetDone, ResultWaitingCard};
pub use crate::error::Error;
pub use crate::frame::FrameInfo;
pub use crate::pipeline::{InferPipeline, InferPipelineBuilder};
pub use crate::pool::InferThreadPool;
pub use crate::queuing::{QueuingServer, QueuingTicket};
pub use crate::resource::{IoResValue, IoResource, OneData};
pub use crate::stage::{
    BatchedFrames, BatchingDoneStage, DeviceToHostStage, HostToDeviceStage, InferenceStage,
    IoBatchingStage, PostprocessingStage, TaskVec,
};
pub use crate::task::{InferTask, InferTaskSptr};
pub use crate::trans_data::InferTransDataHelper;
