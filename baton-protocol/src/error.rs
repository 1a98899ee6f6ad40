use thiserror::Error;

/// Errors raised while encoding or decoding notes.
///
/// A malformed note is dropped and logged by whoever received it; it never
/// aborts a test run.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed note: {0}")]
    MalformedNote(String),
}

/// Errors raised by the publish side of a [`crate::NoteChannel`].
///
/// A lost publish is absorbed by the coordinator's deadline-driven
/// collection, so callers log these and move on rather than retrying.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unable to publish on {topic}: {reason}")]
    Publish { topic: String, reason: String },
    #[error("channel disconnected: {0}")]
    Disconnected(String),
}
