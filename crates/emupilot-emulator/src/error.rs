//! Error types for the emulator link

/// Result type alias using LinkError
pub type Result<T> = std::result::Result<T, LinkError>;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Startup-time bind failure; fatal
    #[error("Cannot bind emulator link to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Emulator socket error: {0}")]
    Io(#[from] std::io::Error),

    /// A command was sent while no emulator was connected
    #[error("No emulator connected")]
    NotConnected,
}
