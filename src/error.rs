use thiserror::Error;

/// Errors surfaced by ticket waits and stage bodies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The awaited ticket was cancelled by its server during shutdown.
    #[error("ticket cancelled while waiting for its resource")]
    TicketCancelled,
    /// A stage body failed with a nonzero status code.
    #[error("stage failed with status code {code}")]
    Stage { code: i32 },
}
