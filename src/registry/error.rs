//! Router error types
//!
//! Error types for router lifecycle operations.

/// Error type for router operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// Router already has a publisher; the existing one is kept
    #[error("router already has a publisher: {0}")]
    AlreadyPublishing(String),
    /// Router has been closed
    #[error("router closed: {0}")]
    Closed(String),
    /// A plugin with this name is already installed
    #[error("plugin already installed: {0}")]
    PluginExists(String),
    /// Publisher transport's packet stream was already consumed
    #[error("publisher receiver already taken: {0}")]
    ReceiverTaken(String),
}
