//! Error types for platter
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Errors raised inside the decode thread are logged and
//! absorbed there; the thread only exits on playlist shutdown.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the playback engine
#[derive(Error, Debug)]
pub enum Error {
    /// A packet failed to decode. The engine drops the packet and continues.
    #[error("decode error: {0}")]
    Decode(String),

    /// The demuxer failed to read a packet. The engine treats this as end
    /// of file and advances to the next playlist item.
    #[error("read error: {0}")]
    Read(String),

    /// Filter graph construction or frame submission failed. The next
    /// decode iteration retries after the rebuild trigger.
    #[error("filter graph error: {0}")]
    Filter(String),

    /// A file seek failed. The seek request is still cleared and decoding
    /// resumes at the current position.
    #[error("seek to {seconds}s failed: {message}")]
    Seek { seconds: f64, message: String },

    /// The container or codec is not supported by the decoder registry.
    #[error("unsupported codec: {path}: {codec}")]
    UnsupportedCodec { path: PathBuf, codec: String },

    /// File I/O errors
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation requires the sink to be attached to a playlist
    #[error("sink is not attached to a playlist")]
    NotAttached,

    /// Playlist item id does not name a live item
    #[error("playlist item not found")]
    UnknownItem,
}

/// Convenience Result type using the platter Error
pub type Result<T> = std::result::Result<T, Error>;
