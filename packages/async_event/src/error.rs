use thiserror::Error;

/// Errors that can occur when handing work to an execution context.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The target execution context has been shut down or dropped, so it will never run any
    /// more work. The rejected callable has already been dropped without being invoked.
    #[error("execution context '{context}' has shut down and no longer accepts work")]
    ContextShutDown {
        /// Name of the execution context that rejected the work.
        context: String,
    },
}

/// A specialized `Result` type for execution context operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
