//! Tools for reading a ZIP archive.
//!
//! To start reading an archive, open it with a [`ZipReader`].
//! The reader parses the central directory once, builds a tree of
//! [`Entry`]s from it, and then extracts files on demand by seeking to their
//! local headers.
//!
//! Tools that visit many archives in a row can [`suspend()`] a reader to give
//! its file handle back to the OS while keeping the parsed tree,
//! then [`resume()`] it when they need its contents again.
//!
//! [`ZipReader`]: struct.ZipReader.html
//! [`Entry`]: ../entry/struct.Entry.html
//! [`suspend()`]: struct.ZipReader.html#method.suspend
//! [`resume()`]: struct.ZipReader.html#method.resume

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, prelude::*, SeekFrom};
use std::path::PathBuf;
use std::slice;
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::DeflateDecoder;
use log::*;

use crate::crc_reader::Crc32Reader;
use crate::entry::*;
use crate::path::Path;
use crate::result::*;
use crate::spec;

/// Where a [`ZipReader`] is in its lifecycle
///
/// [`ZipReader`]: struct.ZipReader.html
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReaderState {
    /// Nothing loaded, no file handle held.
    Closed,
    /// Tree loaded and file handle held; entries can be extracted.
    Open,
    /// Tree loaded, but the file handle was released.
    Suspended,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReaderState::Closed => "closed",
            ReaderState::Open => "open",
            ReaderState::Suspended => "suspended",
        })
    }
}

/// Cheap stand-in for the archive's contents,
/// used to notice it changing while we weren't holding it open.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    length: u64,
    modified: Option<SystemTime>,
}

impl Fingerprint {
    fn of(metadata: &fs::Metadata) -> Self {
        Self {
            length: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

/// What the End of central directory record told us
/// about the central directory we indexed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct DirectorySummary {
    entries: u16,
    size: u32,
    offset: u32,
    /// Bytes of unrelated data (a self-extractor stub, say) before the archive
    archive_offset: u64,
}

impl DirectorySummary {
    /// Absolute position of the central directory in the file
    fn position(&self) -> u64 {
        self.archive_offset + self.offset as u64
    }
}

/// The archive file a reader's tree came from
#[derive(Debug)]
struct Source {
    path: Utf8PathBuf,
    fingerprint: Fingerprint,
    summary: DirectorySummary,
}

/// Anything that can pick out an entry in a [`ZipReader`]:
/// a path ([`Path`], `&str`, `String`) or an [`EntryId`].
///
/// [`ZipReader`]: struct.ZipReader.html
/// [`Path`]: ../path/struct.Path.html
/// [`EntryId`]: ../entry/struct.EntryId.html
pub trait EntrySelector {
    fn select(&self, reader: &ZipReader) -> ZipResult<EntryId>;
}

impl EntrySelector for EntryId {
    fn select(&self, reader: &ZipReader) -> ZipResult<EntryId> {
        match reader.entries.get(self.0) {
            Some(_) => Ok(*self),
            None => Err(ZipError::NotFound(format!("index {}", self.0))),
        }
    }
}

impl EntrySelector for Path {
    fn select(&self, reader: &ZipReader) -> ZipResult<EntryId> {
        reader
            .index
            .get(self)
            .copied()
            .ok_or_else(|| ZipError::NotFound(self.to_string()))
    }
}

impl EntrySelector for str {
    fn select(&self, reader: &ZipReader) -> ZipResult<EntryId> {
        Path::from(self).select(reader)
    }
}

impl EntrySelector for String {
    fn select(&self, reader: &ZipReader) -> ZipResult<EntryId> {
        self.as_str().select(reader)
    }
}

impl<T: EntrySelector + ?Sized> EntrySelector for &T {
    fn select(&self, reader: &ZipReader) -> ZipResult<EntryId> {
        (**self).select(reader)
    }
}

/// A ZIP archive to be read
///
/// All of the archive's entries live in one arena, indexed by [`EntryId`].
/// The tree's child lists and the path index both point into it,
/// so suspending and resuming only has to deal with the file handle.
///
/// A reader isn't meant to be shared between threads;
/// extraction takes `&mut self` since it moves the file cursor.
/// Separate readers are completely independent.
///
/// [`EntryId`]: ../entry/struct.EntryId.html
#[derive(Debug)]
pub struct ZipReader {
    entries: Vec<Entry>,
    index: HashMap<Path, EntryId>,
    source: Option<Source>,
    file: Option<File>,
}

impl Default for ZipReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipReader {
    /// Creates a closed reader.
    pub fn new() -> Self {
        let (entries, index) = empty_tree();
        Self {
            entries,
            index,
            source: None,
            file: None,
        }
    }

    /// Creates a reader and opens the given archive with it.
    ///
    /// ```no_run
    /// # use zipp::*;
    /// let mut reader = ZipReader::open("glfw.zip")?;
    /// let header = reader.extract_to_memory("include/GLFW/glfw3.h")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open<P: AsRef<Utf8Path>>(path: P) -> ZipResult<Self> {
        let mut reader = Self::new();
        reader.open_file(path)?;
        Ok(reader)
    }

    /// Opens the archive at `path`, reading its central directory into a tree.
    ///
    /// Anything previously loaded is discarded first.
    /// On failure the reader is left closed, holding no file handle.
    pub fn open_file<P: AsRef<Utf8Path>>(&mut self, path: P) -> ZipResult<()> {
        self.close();
        let path = path.as_ref();
        info!("Opening {}", path);

        let mut file = File::open(path)?;
        let fingerprint = Fingerprint::of(&file.metadata()?);
        let summary = read_end_of_central_directory(&mut file, fingerprint.length)?;
        trace!("{:?}", summary);
        let central_directory = read_exact_at(
            &mut file,
            summary.position(),
            summary.size as usize,
            "central directory",
        )?;
        let (entries, index) = build_tree(&central_directory, summary.entries)?;

        info!(
            "{} holds {} entries ({} records)",
            path,
            entries.len() - 1,
            summary.entries
        );
        if summary.archive_offset != 0 {
            debug!(
                "{} is prepended with {} bytes",
                path, summary.archive_offset
            );
        }

        self.entries = entries;
        self.index = index;
        self.source = Some(Source {
            path: path.to_owned(),
            fingerprint,
            summary,
        });
        self.file = Some(file);
        Ok(())
    }

    /// Releases the file handle and forgets the archive. Always succeeds.
    pub fn close(&mut self) {
        if let Some(source) = self.source.take() {
            info!("Closing {}", source.path);
        }
        self.file = None;
        let (entries, index) = empty_tree();
        self.entries = entries;
        self.index = index;
    }

    /// Releases the file handle but keeps the tree, so lookups and
    /// traversal keep working. Only valid while open.
    pub fn suspend(&mut self) -> ZipResult<()> {
        match self.state() {
            ReaderState::Open => {
                self.file = None;
                if let Some(source) = &self.source {
                    info!("Suspended {}", source.path);
                }
                Ok(())
            }
            state => Err(ZipError::InvalidState {
                operation: "suspend",
                state,
            }),
        }
    }

    /// Reopens a suspended archive.
    ///
    /// Fails with `StaleHandle` (staying suspended) if the file vanished,
    /// its size or modification time changed,
    /// or its End of central directory record no longer describes
    /// the central directory we indexed.
    /// This is a cheap check, not a guarantee that every byte is unchanged.
    pub fn resume(&mut self) -> ZipResult<()> {
        let state = self.state();
        let source = match (&self.source, state) {
            (Some(source), ReaderState::Suspended) => source,
            _ => {
                return Err(ZipError::InvalidState {
                    operation: "resume",
                    state,
                })
            }
        };
        let stale = |reason| ZipError::StaleHandle {
            path: source.path.clone(),
            reason,
        };

        let mut file = match File::open(&source.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(stale("the archive no longer exists"))
            }
            Err(e) => return Err(e.into()),
        };
        if Fingerprint::of(&file.metadata()?) != source.fingerprint {
            return Err(stale("its size or modification time changed"));
        }
        let summary = read_end_of_central_directory(&mut file, source.fingerprint.length)?;
        if summary != source.summary {
            return Err(stale("its central directory moved"));
        }

        info!("Resumed {}", source.path);
        self.file = Some(file);
        Ok(())
    }

    pub fn state(&self) -> ReaderState {
        match (&self.source, &self.file) {
            (None, _) => ReaderState::Closed,
            (Some(_), Some(_)) => ReaderState::Open,
            (Some(_), None) => ReaderState::Suspended,
        }
    }

    /// True if an archive's tree is loaded, suspended or not.
    /// Use [`can_extract()`](#method.can_extract) to ask about the file handle.
    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    pub fn is_suspended(&self) -> bool {
        self.state() == ReaderState::Suspended
    }

    pub fn can_extract(&self) -> bool {
        self.state() == ReaderState::Open
    }

    /// True while the reader holds an OS file handle.
    pub fn has_handle(&self) -> bool {
        self.file.is_some()
    }

    /// The path the current archive was opened from
    pub fn archive_path(&self) -> Option<&Utf8Path> {
        self.source.as_ref().map(|s| s.path.as_path())
    }

    /// The number of bytes of unrelated data before the archive
    /// (e.g., a self-extractor stub), or 0 if closed.
    pub fn prepended_bytes(&self) -> u64 {
        self.source
            .as_ref()
            .map(|s| s.summary.archive_offset)
            .unwrap_or(0)
    }

    /// The number of entries, root included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there's nothing but the root.
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 1
    }

    /// Returns true if the archive has a file or directory at the given path.
    pub fn contains<S: EntrySelector>(&self, selector: S) -> bool {
        selector.select(self).is_ok()
    }

    /// Looks up a file or directory by its path or ID.
    pub fn entry<S: EntrySelector>(&self, selector: S) -> ZipResult<&Entry> {
        let id = selector.select(self)?;
        Ok(&self.entries[id.0])
    }

    /// Looks up an entry by its creation-order index. The root is index 0.
    pub fn by_index(&self, index: usize) -> ZipResult<&Entry> {
        self.entry(EntryId(index))
    }

    /// The directory representing the archive's top level
    pub fn root(&self) -> &Entry {
        &self.entries[EntryId::ROOT.0]
    }

    pub fn parent_of<S: EntrySelector>(&self, selector: S) -> ZipResult<&Entry> {
        let parent = self.entry(selector)?.parent()?;
        Ok(&self.entries[parent.0])
    }

    /// A directory's children, in the order the archive listed them
    pub fn children_of<S: EntrySelector>(
        &self,
        selector: S,
    ) -> ZipResult<impl Iterator<Item = &Entry> + '_> {
        let children = self.entry(selector)?.children()?;
        Ok(children.iter().map(move |id| &self.entries[id.0]))
    }

    /// Iterates over an entry's direct children
    /// (preceded by the entry itself if `include_self` is set).
    ///
    /// A file has no children, so it yields at most itself.
    pub fn level<S: EntrySelector>(&self, selector: S, include_self: bool) -> ZipResult<Level<'_>> {
        let entry = self.entry(selector)?;
        Ok(Level {
            entries: &self.entries,
            head: include_self.then(|| entry.id),
            children: child_ids(entry).iter(),
        })
    }

    /// Iterates depth-first over everything beneath an entry,
    /// each directory right before its contents,
    /// (preceded by the entry itself if `include_self` is set).
    pub fn recursive<S: EntrySelector>(
        &self,
        selector: S,
        include_self: bool,
    ) -> ZipResult<TreeIterator<'_>> {
        let entry = self.entry(selector)?;
        Ok(TreeIterator {
            entries: &self.entries,
            head: include_self.then(|| entry.id),
            stack: vec![child_ids(entry).iter()],
        })
    }

    /// Calls `callback` on each direct child of an entry;
    /// see [`level()`](#method.level).
    pub fn level_callback<S, F>(&self, selector: S, callback: F, include_self: bool) -> ZipResult<()>
    where
        S: EntrySelector,
        F: FnMut(&Entry),
    {
        self.level(selector, include_self)?.for_each(callback);
        Ok(())
    }

    /// Calls `callback` on everything beneath an entry, in pre-order;
    /// see [`recursive()`](#method.recursive).
    pub fn recursive_callback<S, F>(
        &self,
        selector: S,
        callback: F,
        include_self: bool,
    ) -> ZipResult<()>
    where
        S: EntrySelector,
        F: FnMut(&Entry),
    {
        self.recursive(selector, include_self)?.for_each(callback);
        Ok(())
    }

    /// Decompresses a file into `writer`, returning the number of bytes written.
    pub fn extract_to_stream<S, W>(&mut self, selector: S, writer: &mut W) -> ZipResult<u64>
    where
        S: EntrySelector,
        W: Write + ?Sized,
    {
        let mut payload = self.open_payload(selector)?;
        pump(&mut payload, writer)
    }

    /// Decompresses a file into a new buffer.
    pub fn extract_to_memory<S: EntrySelector>(&mut self, selector: S) -> ZipResult<Vec<u8>> {
        let mut payload = self.open_payload(selector)?;
        let mut buffer = Vec::with_capacity(initial_capacity(payload.expected_size)?);
        pump(&mut payload, &mut buffer)?;
        Ok(buffer)
    }

    /// Decompresses a file to `destination` on the host filesystem,
    /// creating its parent directories as needed.
    ///
    /// If decoding fails partway through, the partial file is removed.
    pub fn extract_to_file<S, P>(&mut self, selector: S, destination: P) -> ZipResult<u64>
    where
        S: EntrySelector,
        P: AsRef<std::path::Path>,
    {
        let destination = destination.as_ref();
        // Check that there's something to extract before touching the disk.
        let mut payload = self.open_payload(selector)?;

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut out = io::BufWriter::new(File::create(destination)?);
        let result = pump(&mut payload, &mut out).and_then(|written| {
            out.flush()?;
            Ok(written)
        });
        if result.is_err() {
            drop(out);
            if let Err(e) = fs::remove_file(destination) {
                warn!(
                    "Couldn't remove partial file {}: {}",
                    destination.display(),
                    e
                );
            }
        }
        result
    }

    /// Extracts a directory and everything under it into `destination`,
    /// recreating the archive's folder structure relative to that directory.
    /// (Given a file, extracts just it into `destination`.)
    ///
    /// Returns the number of files written.
    pub fn extract_subtree<S, P>(&mut self, selector: S, destination: P) -> ZipResult<usize>
    where
        S: EntrySelector,
        P: AsRef<std::path::Path>,
    {
        let destination = destination.as_ref();
        let base = self.entry(selector)?;
        let base_depth = if base.is_dir() {
            base.path().directory_count()
        } else {
            base.path().directory_count() - 1
        };

        // Collect first: extraction needs the reader mutably.
        let plan: Vec<(EntryId, bool, PathBuf)> = self
            .recursive(base.id(), true)?
            .map(|e| {
                let relative = e.path().sub_directory(base_depth, usize::MAX);
                let host = relative
                    .components()
                    .fold(destination.to_path_buf(), |acc, c| acc.join(c));
                (e.id(), e.is_file(), host)
            })
            .collect();

        if !self.can_extract() {
            return Err(ZipError::Unavailable(self.state()));
        }

        let mut files = 0;
        for (id, is_file, host) in plan {
            if is_file {
                debug!("Extracting {} to {}", self.entries[id.0].path(), host.display());
                self.extract_to_file(id, &host)?;
                files += 1;
            } else {
                fs::create_dir_all(&host)?;
            }
        }
        Ok(files)
    }

    /// Finds a file's data and wraps it in the right decoder.
    fn open_payload<S: EntrySelector>(&mut self, selector: S) -> ZipResult<Payload<'_>> {
        let state = self.state();
        if state != ReaderState::Open {
            return Err(ZipError::Unavailable(state));
        }
        let id = selector.select(self)?;
        let entry = &self.entries[id.0];
        let locator = match entry.locator() {
            Some(locator) => *locator,
            None => return Err(ZipError::NotExtractable(entry.path().clone())),
        };
        let path = entry.path().clone();
        let compressed_size = entry.compressed_size();
        let uncompressed_size = entry.uncompressed_size();

        let (archive_offset, file_length) = match &self.source {
            Some(source) => (source.summary.archive_offset, source.fingerprint.length),
            None => return Err(ZipError::Unavailable(state)),
        };
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Err(ZipError::Unavailable(state)),
        };

        let header_position = archive_offset + locator.header_offset;
        let fixed = read_exact_at(
            file,
            header_position,
            spec::LocalFileHeader::fixed_size_in_file(),
            "local file header",
        )?;
        let local_header = spec::LocalFileHeader::parse(&fixed)?;
        trace!("{:?}", local_header);
        let mut local_name = vec![0; local_header.path_length as usize];
        file.read_exact(&mut local_name)
            .map_err(|e| truncated_or_io(e, "local file name", local_name.len()))?;

        if cfg!(feature = "check-local-metadata") {
            let local_path = spec::decode_name(&local_name, local_header.flags)
                .ok()
                .and_then(|name| sanitize(&name).ok());
            let sizes_match = spec::has_data_descriptor(local_header.flags)
                || (local_header.crc32 == locator.crc32
                    && local_header.compressed_size as u64 == compressed_size
                    && local_header.uncompressed_size as u64 == uncompressed_size);
            let matches = sizes_match
                && local_header.compression_method == locator.compression_method.as_u16()
                && local_path.as_ref() == Some(&path);
            if !matches {
                warn!(
                    "Central directory record #{} ({}) doesn't match its local header: {:?}",
                    locator.ordinal, path, local_header
                );
                return Err(ZipError::Format(
                    "Central directory entry doesn't match local file header",
                ));
            }
        }

        let data_position = header_position
            + spec::LocalFileHeader::fixed_size_in_file() as u64
            + local_header.variable_size_in_file() as u64;
        if data_position.saturating_add(compressed_size) > file_length {
            return Err(ZipError::Truncated {
                what: "file data",
                needed: compressed_size,
                available: file_length.saturating_sub(data_position),
            });
        }
        debug!(
            "Reading {} ({:?}, {} -> {} bytes)",
            path, locator.compression_method, compressed_size, uncompressed_size
        );
        file.seek(SeekFrom::Start(data_position))?;

        let reader = make_reader(
            locator.compression_method,
            locator.crc32,
            uncompressed_size,
            file.take(compressed_size),
        )?;
        Ok(Payload {
            path,
            expected_size: uncompressed_size,
            reader,
        })
    }
}

/// A file's decoded contents, ready to be read out
struct Payload<'a> {
    path: Path,
    expected_size: u64,
    reader: Box<dyn Read + 'a>,
}

/// Most we'll reserve up front for an in-memory extraction.
/// The declared size comes from the archive, so it isn't trusted;
/// the buffer grows past this as real bytes arrive.
const MAX_PREALLOCATION: usize = 1 << 20;

fn initial_capacity(expected_size: u64) -> ZipResult<usize> {
    let size = usize::try_from(expected_size).map_err(|_| ZipError::InsufficientAddressSpace)?;
    Ok(size.min(MAX_PREALLOCATION))
}

/// Returns a boxed read trait for a compressed file,
/// given its compression method and expected CRC and size.
fn make_reader<'a, R: Read + 'a>(
    compression_method: CompressionMethod,
    crc32: u32,
    size: u64,
    reader: R,
) -> ZipResult<Box<dyn Read + 'a>> {
    match compression_method {
        CompressionMethod::None => Ok(Box::new(Crc32Reader::new(reader, crc32, size))),
        CompressionMethod::Deflate => {
            let deflate_reader = DeflateDecoder::new(reader);
            Ok(Box::new(Crc32Reader::new(deflate_reader, crc32, size)))
        }
        CompressionMethod::Unsupported(method) => Err(ZipError::Unsupported(format!(
            "Compression method {} not supported",
            method
        ))),
    }
}

/// Copies a payload into `writer`.
///
/// Errors reading the payload are decoding failures;
/// errors writing are the caller's I/O problem.
fn pump<W: Write + ?Sized>(payload: &mut Payload, writer: &mut W) -> ZipResult<u64> {
    let mut buf = vec![0; 64 * 1024];
    let mut written = 0;
    loop {
        let count = match payload.reader.read(&mut buf) {
            Ok(0) => return Ok(written),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(decode_error(&payload.path, e)),
        };
        writer.write_all(&buf[..count])?;
        written += count as u64;
    }
}

fn decode_error(path: &Path, e: io::Error) -> ZipError {
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            ZipError::Decode {
                path: path.clone(),
                reason: e.to_string(),
            }
        }
        _ => ZipError::Io(e),
    }
}

fn truncated_or_io(e: io::Error, what: &'static str, needed: usize) -> ZipError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ZipError::Truncated {
            what,
            needed: needed as u64,
            available: 0,
        }
    } else {
        ZipError::Io(e)
    }
}

/// Reads `length` bytes at `position`, or fails with `Truncated`.
fn read_exact_at(
    file: &mut File,
    position: u64,
    length: usize,
    what: &'static str,
) -> ZipResult<Vec<u8>> {
    file.seek(SeekFrom::Start(position))?;
    let mut buf = vec![0; length];
    file.read_exact(&mut buf)
        .map_err(|e| truncated_or_io(e, what, length))?;
    Ok(buf)
}

/// Finds and validates the End of central directory record
/// at the back of the file.
fn read_end_of_central_directory(file: &mut File, file_length: u64) -> ZipResult<DirectorySummary> {
    // The EOCDR is the last thing in the file, save its comment.
    // Grab enough to see a Zip64 locator before it, too.
    const ZIP64_LOCATOR_SIZE: usize = 20;
    let search_length = file_length.min(
        (spec::EndOfCentralDirectory::fixed_size_in_file()
            + spec::MAX_COMMENT_LENGTH
            + ZIP64_LOCATOR_SIZE) as u64,
    );
    let tail_start = file_length - search_length;
    let tail = read_exact_at(file, tail_start, search_length as usize, "archive tail")?;

    let eocdr_posit = spec::find_eocdr(&tail)?;
    let eocdr = spec::EndOfCentralDirectory::parse(&tail[eocdr_posit..])?;
    trace!("{:?}", eocdr);

    if spec::has_zip64_locator(&tail[..eocdr_posit]) {
        return Err(ZipError::Unsupported(String::from(
            "No support for Zip64 archives",
        )));
    }
    eocdr.check_supported()?;

    // Zip files can be prepended by arbitrary junk,
    // so all the given positions might be off.
    // The offset is the actual position versus the stored one.
    let eocdr_offset = tail_start + eocdr_posit as u64;
    let size = eocdr.central_directory_size as u64;
    let actual_cdr_posit = eocdr_offset
        .checked_sub(size)
        .ok_or(ZipError::Truncated {
            what: "central directory",
            needed: size,
            available: eocdr_offset,
        })?;
    let archive_offset = actual_cdr_posit
        .checked_sub(eocdr.central_directory_offset as u64)
        .ok_or(ZipError::Format("Invalid central directory size or offset"))?;

    Ok(DirectorySummary {
        entries: eocdr.entries,
        size: eocdr.central_directory_size,
        offset: eocdr.central_directory_offset,
        archive_offset,
    })
}

fn empty_tree() -> (Vec<Entry>, HashMap<Path, EntryId>) {
    let mut index = HashMap::new();
    index.insert(Path::new(), EntryId::ROOT);
    (vec![Entry::root()], index)
}

fn child_ids(entry: &Entry) -> &[EntryId] {
    entry.children().unwrap_or(&[])
}

/// Splits an archive's file name into a path,
/// dropping `.` components and refusing `..` ones.
///
/// ZIP makes no promises here, and we'll eventually write
/// these paths to somebody's disk.
fn sanitize(name: &str) -> ZipResult<Path> {
    let mut components = Vec::new();
    for component in name.split(crate::path::SEPARATOR) {
        match component {
            "" => {}
            "." => warn!("Current dir (.) found in path {}", name),
            ".." => {
                return Err(ZipError::Hierarchy(format!(
                    "Parent dir (..) found in path {}",
                    name
                )))
            }
            normal => components.push(normal),
        }
    }
    Ok(components.into_iter().collect())
}

/// Parses `count` central directory records and organizes them
/// into a tree of nested directories and files.
fn build_tree(
    central_directory: &[u8],
    count: u16,
) -> ZipResult<(Vec<Entry>, HashMap<Path, EntryId>)> {
    let mut tree = TreeBuilder::new();
    let mut remaining = central_directory;

    for ordinal in 0..count {
        let record = spec::CentralDirectoryEntry::parse_and_consume(&mut remaining)?;
        trace!("{:?}", record);
        record.check_supported()?;

        let name = spec::decode_name(record.path, record.flags)?;
        let path = sanitize(&name)?;
        if path.is_empty() {
            warn!("Skipping entry with no usable name ({:?})", name);
            continue;
        }

        // Directories are the entries whose names end in a slash.
        if name.ends_with(crate::path::SEPARATOR) {
            debug!("Directory record {}", path);
            tree.insert_directory(&path)?;
            continue;
        }

        let locator = Locator {
            ordinal: ordinal as u64,
            header_offset: record.header_offset as u64,
            compression_method: CompressionMethod::from_u16(record.compression_method),
            crc32: record.crc32,
        };
        let kind = Kind::File {
            uncompressed_size: record.uncompressed_size as u64,
            compressed_size: record.compressed_size as u64,
            date_time: DateTime::from_msdos(record.last_modified_time, record.last_modified_date),
            locator,
        };
        debug!("File record {} {:?}", path, kind);
        tree.insert_file(path, kind)?;
    }

    if !remaining.is_empty() {
        debug!(
            "{} bytes after the last central directory record",
            remaining.len()
        );
    }
    Ok((tree.entries, tree.index))
}

/// Accumulates entries while the central directory is parsed.
struct TreeBuilder {
    entries: Vec<Entry>,
    index: HashMap<Path, EntryId>,
}

impl TreeBuilder {
    fn new() -> Self {
        let (entries, index) = empty_tree();
        Self { entries, index }
    }

    fn next_id(&self) -> EntryId {
        EntryId(self.entries.len())
    }

    /// Adds an entry to the arena, the index, and its parent's children.
    fn push(&mut self, entry: Entry) -> EntryId {
        let id = entry.id;
        if let Some(parent) = entry.parent {
            if let Some(siblings) = self.entries[parent.0].children_mut() {
                siblings.push(id);
            }
        }
        self.index.insert(entry.path.clone(), id);
        self.entries.push(entry);
        id
    }

    /// Walks down `path`, creating any directories that don't exist yet.
    /// Returns the ID of the last one.
    fn insert_directory(&mut self, path: &Path) -> ZipResult<EntryId> {
        let mut current = EntryId::ROOT;
        for depth in 1..=path.directory_count() {
            let prefix = path.sub_directory(0, depth);
            current = match self.index.get(&prefix) {
                Some(&id) if self.entries[id.0].is_dir() => id,
                Some(_) => {
                    return Err(ZipError::Hierarchy(format!(
                        "{} is a file, expected a directory",
                        prefix
                    )))
                }
                None => {
                    let directory = Entry::directory(self.next_id(), prefix, Some(current));
                    self.push(directory)
                }
            };
        }
        Ok(current)
    }

    fn insert_file(&mut self, path: Path, kind: Kind) -> ZipResult<()> {
        if let Some(&existing) = self.index.get(&path) {
            if self.entries[existing.0].is_file() {
                // First one wins.
                warn!("Duplicate entry for {}; keeping the first", path);
                return Ok(());
            }
            return Err(ZipError::Hierarchy(format!(
                "{} is both a file and a directory",
                path
            )));
        }

        let parent = self.insert_directory(&path.parent())?;
        let file = Entry {
            id: self.next_id(),
            path,
            parent: Some(parent),
            kind,
        };
        self.push(file);
        Ok(())
    }
}

/// Iterates over an entry's direct children
#[derive(Clone)]
pub struct Level<'a> {
    entries: &'a [Entry],
    head: Option<EntryId>,
    children: slice::Iter<'a, EntryId>,
}

impl<'a> Iterator for Level<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(head) = self.head.take() {
            return Some(&self.entries[head.0]);
        }
        self.children.next().map(|id| &self.entries[id.0])
    }
}

/// Iterates over everything beneath an entry, depth first
#[derive(Clone)]
pub struct TreeIterator<'a> {
    entries: &'a [Entry],
    head: Option<EntryId>,
    stack: Vec<slice::Iter<'a, EntryId>>,
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(head) = self.head.take() {
            return Some(&self.entries[head.0]);
        }
        loop {
            let next = self.stack.last_mut()?.next();
            match next {
                Some(id) => {
                    let entry = &self.entries[id.0];
                    if entry.is_dir() {
                        self.stack.push(child_ids(entry).iter());
                    }
                    return Some(entry);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}
