//! Nodes of the archive's virtual directory tree.
//!
//! Every [`Entry`] lives in an arena owned by the [`ZipReader`].
//! Parents and children refer to each other by [`EntryId`],
//! so the tree has exactly one owner and no reference cycles.
//!
//! [`ZipReader`]: ../read/struct.ZipReader.html

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::path::Path;
use crate::result::*;

/// The compression method used to store a file
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The file is uncompressed
    None,
    /// The file is [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d.
    /// This is the most common format used by ZIP archives.
    Deflate,
    /// The file is compressed with a yet-unsupported format.
    /// (The u16 indicates the internal format code.)
    Unsupported(u16),
}

impl CompressionMethod {
    pub(crate) fn from_u16(u: u16) -> Self {
        match u {
            0 => CompressionMethod::None,
            8 => CompressionMethod::Deflate,
            v => CompressionMethod::Unsupported(v),
        }
    }

    pub(crate) fn as_u16(self) -> u16 {
        match self {
            CompressionMethod::None => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unsupported(v) => v,
        }
    }
}

/// Index of an entry in its reader, in creation order.
///
/// The root is always `EntryId(0)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) usize);

impl EntryId {
    pub const ROOT: EntryId = EntryId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A last-modified timestamp, as packed into a ZIP record by MS-DOS rules.
///
/// No time zone; DOS never had one. Directories carry the zeroed default.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DateTime {
    pub seconds: u32,
    pub minutes: u32,
    pub hour: u32,
    pub day: u32,
    pub month: u32,
    pub year: u32,
}

impl DateTime {
    pub(crate) fn from_msdos(time: u16, date: u16) -> Self {
        Self {
            seconds: (0b0000_0000_0001_1111 & time) as u32 * 2, // MSDOS uses 2-second precision
            minutes: (0b0000_0111_1110_0000 & time) as u32 >> 5,
            hour: (0b1111_1000_0000_0000 & time) as u32 >> 11,
            day: (0b0000_0000_0001_1111 & date) as u32,
            month: (0b0000_0001_1110_0000 & date) as u32 >> 5,
            // MSDOS uses years since 1980
            year: ((0b1111_1110_0000_0000 & date) >> 9) as u32 + 1980,
        }
    }

    /// Converts to a chrono timestamp, or `None` if the fields don't
    /// form a real date (zeroed directory timestamps, sloppy archivers...)
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month, self.day)?.and_hms_opt(
            self.hour,
            self.minutes,
            self.seconds,
        )
    }
}

/// Where a file's bytes live and how to decode them.
///
/// Only the reader looks inside.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Locator {
    /// Position of the record in the central directory
    pub ordinal: u64,
    /// Offset of the local file header, as stored (before adding prepended bytes)
    pub header_offset: u64,
    pub compression_method: CompressionMethod,
    pub crc32: u32,
}

/// A file or directory in the archive.
#[derive(Debug, Clone)]
pub struct Entry {
    pub(crate) id: EntryId,
    pub(crate) path: Path,
    pub(crate) parent: Option<EntryId>,
    pub(crate) kind: Kind,
}

#[derive(Debug, Clone)]
pub(crate) enum Kind {
    Directory {
        children: Vec<EntryId>,
    },
    File {
        uncompressed_size: u64,
        compressed_size: u64,
        date_time: DateTime,
        locator: Locator,
    },
}

impl Entry {
    pub(crate) fn root() -> Self {
        Self::directory(EntryId::ROOT, Path::new(), None)
    }

    pub(crate) fn directory(id: EntryId, path: Path, parent: Option<EntryId>) -> Self {
        Self {
            id,
            path,
            parent,
            kind: Kind::Directory {
                children: Vec::new(),
            },
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    /// The full path from the archive root. The root's path is empty.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last component of the path
    pub fn name(&self) -> &str {
        self.path.name()
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, Kind::File { .. })
    }

    pub fn is_dir(&self) -> bool {
        !self.is_file()
    }

    /// Always false for files.
    pub fn has_children(&self) -> bool {
        matches!(&self.kind, Kind::Directory { children } if !children.is_empty())
    }

    /// IDs of a directory's children, in the order the archive listed them.
    pub fn children(&self) -> ZipResult<&[EntryId]> {
        match &self.kind {
            Kind::Directory { children } => Ok(children),
            Kind::File { .. } => Err(ZipError::NotADirectory(self.path.clone())),
        }
    }

    pub fn num_children(&self) -> ZipResult<usize> {
        self.children().map(<[EntryId]>::len)
    }

    pub fn child(&self, index: usize) -> ZipResult<EntryId> {
        self.children()?
            .get(index)
            .copied()
            .ok_or_else(|| ZipError::NotFound(format!("child {} of {}", index, self.path)))
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    pub fn parent(&self) -> ZipResult<EntryId> {
        self.parent.ok_or(ZipError::NoParent)
    }

    /// Uncompressed size in bytes; zero for directories.
    pub fn uncompressed_size(&self) -> u64 {
        match self.kind {
            Kind::File {
                uncompressed_size, ..
            } => uncompressed_size,
            Kind::Directory { .. } => 0,
        }
    }

    /// Compressed size in bytes; zero for directories.
    pub fn compressed_size(&self) -> u64 {
        match self.kind {
            Kind::File {
                compressed_size, ..
            } => compressed_size,
            Kind::Directory { .. } => 0,
        }
    }

    pub fn date_time(&self) -> DateTime {
        match self.kind {
            Kind::File { date_time, .. } => date_time,
            Kind::Directory { .. } => DateTime::default(),
        }
    }

    /// The compression method of a file, or `None` for directories.
    pub fn compression_method(&self) -> Option<CompressionMethod> {
        self.locator().map(|l| l.compression_method)
    }

    /// The CRC-32 of a file's decompressed bytes, or `None` for directories.
    pub fn crc32(&self) -> Option<u32> {
        self.locator().map(|l| l.crc32)
    }

    pub(crate) fn locator(&self) -> Option<&Locator> {
        match &self.kind {
            Kind::File { locator, .. } => Some(locator),
            Kind::Directory { .. } => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<EntryId>> {
        match &mut self.kind {
            Kind::Directory { children } => Some(children),
            Kind::File { .. } => None,
        }
    }
}
