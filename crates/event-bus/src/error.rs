use thiserror::Error;

/// Errors raised by event channel implementations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel has shut down.
    #[error("Channel closed")]
    Closed,

    /// The message could not be handed to the transport.
    #[error("Publish to '{subject}' failed: {reason}")]
    Publish { subject: String, reason: String },

    /// The subscription could not be established.
    #[error("Subscribe to '{subject}' failed: {reason}")]
    Subscribe { subject: String, reason: String },
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
