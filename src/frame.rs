/// Identity record for a single input frame.
///
/// Carried through the pipeline for observability only; stage log lines
/// and the trans-data helper identify frames by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Arrival timestamp in milliseconds.
    pub timestamp: i64,
    /// Index of the batch this frame was grouped into.
    pub batch_index: u32,
    /// Index of the frame within its batch.
    pub item_index: u32,
}

impl FrameInfo {
    pub fn new(timestamp: i64, batch_index: u32, item_index: u32) -> Self {
        Self {
            timestamp,
            batch_index,
            item_index,
        }
    }
}
