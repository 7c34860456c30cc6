use std::io;

use derive_more as dm;

/// Failures of the bridge itself. Unsatisfiability is never represented
/// here; it is an expected outcome carried in the query results.
#[derive(Debug, dm::Display, dm::Error)]
pub enum BackendError {
    /// The solver process is gone or a pipe broke. Fatal to the session;
    /// the caller has to spawn a fresh one.
    #[display("solver channel closed: {_0}")]
    ChannelClosed(io::Error),
    /// The solver emitted something the protocol does not allow at this
    /// point. Fatal to the current query only.
    #[display("unexpected solver response: {_0:?}")]
    UnexpectedResponse(#[error(not(source))] String),
    /// A satisfying assignment did not collapse the target expression to a
    /// constant. Indicates a solver-integration bug.
    #[display("model substitution did not produce a constant")]
    InconsistentModel,
    /// The solver returned a value that was excluded by the query.
    /// Impossible for a correct solver, so surfaced loudly.
    #[display("solver returned the same value twice")]
    DuplicateValue,
}

impl From<io::Error> for BackendError {
    fn from(error: io::Error) -> Self {
        Self::ChannelClosed(error)
    }
}
