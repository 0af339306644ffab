//! Error types and the related `Result<T>`

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::path::Path;
use crate::read::ReaderState;

pub type ZipResult<T> = Result<T, ZipError>;

#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// The archive's signatures or layout are structurally invalid.
    #[error("Invalid Zip archive: {0}")]
    Format(&'static str),

    /// A record declared more bytes than the archive actually holds.
    #[error("Truncated Zip archive: {what} needs {needed} bytes, only {available} available")]
    Truncated {
        what: &'static str,
        needed: u64,
        available: u64,
    },

    /// The ZIP archive uses a feature we recognize but don't implement
    /// (Zip64, multiple disks, encryption, exotic compression methods).
    #[error("Unsupported Zip archive: {0}")]
    Unsupported(String),

    /// Decoding a UTF-8 name failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// The ZIP archive contained a nonsensical file hierarchy
    /// (a file used as a folder, `..` components, etc.)
    #[error("Archive contained a strange file hierarchy: {0}")]
    Hierarchy(String),

    /// Nothing in the archive matched the given path or index.
    #[error("No entry in the archive at {0}")]
    NotFound(String),

    /// Children were requested from a file entry.
    #[error("{0} is a file, not a directory")]
    NotADirectory(Path),

    /// The root entry has no parent.
    #[error("The archive root has no parent")]
    NoParent,

    /// Only files can be extracted.
    #[error("{0} is a directory and can't be extracted")]
    NotExtractable(Path),

    /// Extraction needs an open file handle.
    #[error("Archive content is unavailable while the reader is {0}")]
    Unavailable(ReaderState),

    /// A lifecycle operation was called from the wrong state.
    #[error("Can't {operation} a reader that is {state}")]
    InvalidState {
        operation: &'static str,
        state: ReaderState,
    },

    /// The payload failed decompression or its checksum/length check.
    #[error("Couldn't decode {path}: {reason}")]
    Decode { path: Path, reason: String },

    /// The archive on disk no longer matches the index we kept while suspended.
    #[error("{path} changed while suspended: {reason}")]
    StaleHandle {
        path: Utf8PathBuf,
        reason: &'static str,
    },

    /// A size didn't fit in memory, probably on a 32-bit system.
    #[error("Zip entry too large for address space")]
    InsufficientAddressSpace,
}
