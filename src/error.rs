use thiserror::Error;

/// Error taxonomy for the bus. Every failure is scoped to the operation or
/// subscription that triggered it; there is no fatal class.
#[derive(Error, Debug)]
pub enum BusError {
    /// The store could not be reached for a primitive operation.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The subscription was already torn down by an earlier call.
    #[error("subscription already unsubscribed")]
    AlreadyUnsubscribed,

    /// A periodic-publish generator failed on a tick. Reported per tick;
    /// never cancels the timer.
    #[error("generator failure: {0}")]
    Generator(#[from] anyhow::Error),
}
