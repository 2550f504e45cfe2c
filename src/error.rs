use thiserror::Error;

/// Failure taxonomy for the read-only ext2/ext3/ext4 metadata engine.
///
/// Every fallible operation in this crate returns exactly one of these
/// variants; `NoMapping` is the one internal sentinel (consumed by
/// [`crate::read::ReadStream`], never surfaced to a caller of the public API).
#[derive(Debug, Error)]
pub enum Ext4Error {
    #[error("unsupported feature: {0}")]
    Unsupported(String),

    #[error("volume corrupted: {0}")]
    VolumeCorrupted(String),

    #[error("not found")]
    NotFound,

    /// Internal-only: a logical block has no backing extent (a hole).
    #[error("no mapping for logical block")]
    NoMapping,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("buffer too small")]
    BufferTooSmall,

    #[error("out of resources")]
    OutOfResources,

    #[error("device error: {0}")]
    DeviceError(String),
}

pub type Result<T> = std::result::Result<T, Ext4Error>;
