//! Error types surfaced by session lifecycle and conversion operations.

use thiserror::Error;

/// Errors produced while launching, driving, or tearing down a session.
#[derive(Debug, Error)]
pub enum Error {
    /// The browser process could not be started.
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// The handshake with the remote debugging endpoint failed.
    #[error("failed to connect to debugging endpoint: {0}")]
    Connection(String),

    /// A conversion was attempted before initialization or after a disconnect.
    #[error("session is not connected")]
    NotConnected,

    /// The requested page-size keyword is not in the lookup table.
    #[error("unknown paper format: {0:?}")]
    UnknownFormat(String),

    /// The remote navigate call itself was rejected.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// Closing the protocol connection during teardown failed.
    #[error("failed to dispose session: {0}")]
    Dispose(String),

    /// The remote endpoint rejected a command or the transport broke mid-call.
    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, Error>;
