//! zipp is a ZIP archive reader that presents an archive as a tree
//! of files and folders and extracts them on demand:
//!
//! ```no_run
//! # use zipp::*;
//! let mut reader = ZipReader::open("glfw-3.3.zip")?;
//!
//! // ZIP doesn't guarantee that entries are in any particular order,
//! // that there aren't duplicates, that an entry has a valid file path, etc.
//! // The reader validates all that while building its tree,
//! // so we can look things up by path...
//! let header = reader.entry("include/GLFW/glfw3.h")?;
//! println!("{} is {} bytes", header.path(), header.uncompressed_size());
//!
//! // ...walk the tree...
//! for entry in reader.recursive("lib", false)? {
//!     println!("{}", entry.path());
//! }
//!
//! // ...and pull files (or whole folders) out of the archive.
//! let bytes = reader.extract_to_memory("include/GLFW/glfw3.h")?;
//! reader.extract_subtree("include", "vendor/glfw/include")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Tools that juggle many archives can suspend a reader to hand its file
//! handle back to the OS without forgetting the tree:
//!
//! ```no_run
//! # use zipp::*;
//! # let mut reader = ZipReader::open("glfw-3.3.zip")?;
//! reader.suspend()?;
//! assert!(reader.contains("include/GLFW/glfw3.h")); // Lookups still work
//! reader.resume()?; // Fails if the archive changed on disk in the meantime
//! let bytes = reader.extract_to_memory("include/GLFW/glfw3.h")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Zip is an interesting archive format: unlike compressed tarballs often seen
//! in Linux land (`*.tar.gz`, `*.tar.zst`, ...),
//! each file in a Zip archive is compressed independently,
//! with a central directory at the back telling us where to find each file.
//! zipp reads that directory once, then seeks straight to whatever you ask for.
//!
//! Stored and DEFLATEd files are supported.
//! Zip64, multi-disk, and encrypted archives are rejected with
//! [`ZipError::Unsupported`](result/enum.ZipError.html).

pub mod entry;
pub mod path;
pub mod read;
pub mod result;

pub use entry::{CompressionMethod, DateTime, Entry, EntryId};
pub use path::Path;
pub use read::{EntrySelector, ReaderState, ZipReader};
pub use result::{ZipError, ZipResult};

mod crc_reader;
mod spec;
