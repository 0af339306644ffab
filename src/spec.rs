//! Code specific to the ZIP file format specification.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`read`] module.
//! Unlike the reader, nothing here touches a file:
//! every parser works on bytes the reader already pulled in.
//!
//! Most comments quote the ZIP spec, [`APPNOTE.TXT`].
//!
//! [`read`]: ../read/index.html
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT

use std::borrow::Cow;
use std::convert::TryInto;

use codepage_437::*;
use memchr::memmem;

use crate::result::*;

// Magic numbers denoting various sections of a ZIP archive

/// End of central directory magic number
const EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 5, 6];
/// Zip64 end of central directory locator magic number
const ZIP64_EOCDR_LOCATOR_MAGIC: [u8; 4] = [b'P', b'K', 6, 7];
/// Central directory magic number
const CENTRAL_DIRECTORY_MAGIC: [u8; 4] = [b'P', b'K', 1, 2];
/// Local file header magic number
const LOCAL_FILE_HEADER_MAGIC: [u8; 4] = [b'P', b'K', 3, 4];

/// Longest comment the EOCDR's 16-bit length field can describe
pub const MAX_COMMENT_LENGTH: usize = u16::MAX as usize;

// Straight from the Rust docs.
// Callers check lengths first (see `ensure()`), so these can't run dry.

/// Reads a little-endian u32 from the front of the provided slice, shrinking it.
fn read_u32(input: &mut &[u8]) -> u32 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u32>());
    *input = rest;
    u32::from_le_bytes(int_bytes.try_into().expect("less than four bytes for u32"))
}

/// Reads a little-endian u16 from the front of the provided slice, shrinking it.
fn read_u16(input: &mut &[u8]) -> u16 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u16>());
    *input = rest;
    u16::from_le_bytes(int_bytes.try_into().expect("less than two bytes for u16"))
}

/// Fails with `Truncated` unless `input` holds at least `needed` bytes.
fn ensure(input: &[u8], needed: usize, what: &'static str) -> ZipResult<()> {
    if input.len() < needed {
        return Err(ZipError::Truncated {
            what,
            needed: needed as u64,
            available: input.len() as u64,
        });
    }
    Ok(())
}

/// Splits `len` bytes off the front of `input`, or fails with `Truncated`.
fn take<'a>(input: &mut &'a [u8], len: usize, what: &'static str) -> ZipResult<&'a [u8]> {
    ensure(*input, len, what)?;
    let (taken, rest) = input.split_at(len);
    *input = rest;
    Ok(taken)
}

/// Data from the End of central directory record
///
/// Found at the back of the ZIP archive and provides offsets for finding
/// its central directory, along with lots of stuff that stopped being relevant
/// when we stopped breaking ZIP archives onto multiple floppies.
#[derive(Debug)]
#[allow(dead_code)]
pub struct EndOfCentralDirectory<'a> {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub file_comment: &'a [u8],
}

impl<'a> EndOfCentralDirectory<'a> {
    pub const fn fixed_size_in_file() -> usize {
        22
    }

    pub fn parse(mut eocdr: &'a [u8]) -> ZipResult<Self> {
        // 4.3.16  End of central directory record:
        //
        // end of central dir signature    4 bytes  (0x06054b50)
        // number of this disk             2 bytes
        // number of the disk with the
        // start of the central directory  2 bytes
        // total number of entries in
        // the central dir on this disk    2 bytes
        // total number of entries in
        // the central dir                 2 bytes
        // size of the central directory   4 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        4 bytes
        // zipfile comment length          2 bytes
        ensure(
            eocdr,
            Self::fixed_size_in_file(),
            "End Of Central Directory Record",
        )?;
        if eocdr[..4] != EOCDR_MAGIC {
            return Err(ZipError::Format(
                "Couldn't find End Of Central Directory Record",
            ));
        }
        eocdr = &eocdr[4..];
        let disk_number = read_u16(&mut eocdr);
        let disk_with_central_directory = read_u16(&mut eocdr);
        let entries_on_this_disk = read_u16(&mut eocdr);
        let entries = read_u16(&mut eocdr);
        let central_directory_size = read_u32(&mut eocdr);
        let central_directory_offset = read_u32(&mut eocdr);
        let comment_length = read_u16(&mut eocdr) as usize;
        let file_comment = take(&mut eocdr, comment_length, "archive comment")?;

        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            file_comment,
        })
    }

    /// Rejects everything outside plain, single-disk, 32-bit archives.
    pub fn check_supported(&self) -> ZipResult<()> {
        if self.disk_number != self.disk_with_central_directory {
            return Err(ZipError::Unsupported(format!(
                "No support for multi-disk archives: disk ({}) != disk with central directory ({})",
                self.disk_number, self.disk_with_central_directory
            )));
        }
        if self.entries != self.entries_on_this_disk {
            return Err(ZipError::Unsupported(format!(
                "No support for multi-disk archives: entries ({}) != entries this disk ({})",
                self.entries, self.entries_on_this_disk
            )));
        }
        // 4.4.1.4 If one of the fields in the end of central directory
        // record is too small to hold required data, the field SHOULD be
        // set to -1 (0xFFFF or 0xFFFFFFFF) and the ZIP64 format record
        // SHOULD be created.
        if self.entries == u16::MAX
            || self.central_directory_size == u32::MAX
            || self.central_directory_offset == u32::MAX
        {
            return Err(ZipError::Unsupported(String::from(
                "No support for Zip64 archives",
            )));
        }
        Ok(())
    }
}

/// Searches backward through `tail` (the end of the archive) to find the
/// End of central directory record.
///
/// It should be right at the end of the file,
/// but its variable size means we can't jump to a known offset.
pub fn find_eocdr(tail: &[u8]) -> ZipResult<usize> {
    memmem::rfind(tail, &EOCDR_MAGIC).ok_or(ZipError::Format(
        "Couldn't find End Of Central Directory Record",
    ))
}

/// Checks for the Zip64 end of central directory locator,
/// which should immediately precede the End of central directory record
/// on Zip64 files.
///
/// We don't read Zip64 archives, but we want to say so
/// instead of misreading their 32-bit placeholder fields.
pub fn has_zip64_locator(before_eocdr: &[u8]) -> bool {
    // 4.3.15 Zip64 end of central directory locator
    //
    // zip64 end of central dir locator
    // signature                       4 bytes  (0x07064b50)
    // number of the disk with the
    // start of the zip64 end of
    // central directory               4 bytes
    // relative offset of the zip64
    // end of central directory record 8 bytes
    // total number of disks           4 bytes
    const LOCATOR_SIZE: usize = 20;
    before_eocdr
        .len()
        .checked_sub(LOCATOR_SIZE)
        .map(|start| before_eocdr[start..start + 4] == ZIP64_EOCDR_LOCATOR_MAGIC)
        .unwrap_or(false)
}

/// Data from a central directory entry
///
/// Each of these records contains information about a file or folder
/// stored in the ZIP archive.
#[derive(Debug)]
#[allow(dead_code)]
pub struct CentralDirectoryEntry<'a> {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub header_offset: u32,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
    pub file_comment: &'a [u8],
}

impl<'a> CentralDirectoryEntry<'a> {
    pub const fn fixed_size_in_file() -> usize {
        46
    }

    pub fn parse_and_consume(entry: &mut &'a [u8]) -> ZipResult<Self> {
        // 4.3.12  Central directory structure:
        //
        // File header:
        //
        //   central file header signature   4 bytes  (0x02014b50)
        //   version made by                 2 bytes
        //   version needed to extract       2 bytes
        //   general purpose bit flag        2 bytes
        //   compression method              2 bytes
        //   last mod file time              2 bytes
        //   last mod file date              2 bytes
        //   crc-32                          4 bytes
        //   compressed size                 4 bytes
        //   uncompressed size               4 bytes
        //   file name length                2 bytes
        //   extra field length              2 bytes
        //   file comment length             2 bytes
        //   disk number start               2 bytes
        //   internal file attributes        2 bytes
        //   external file attributes        4 bytes
        //   relative offset of local header 4 bytes
        //
        //   file name (variable size)
        //   extra field (variable size)
        //   file comment (variable size)
        ensure(
            *entry,
            Self::fixed_size_in_file(),
            "central directory entry",
        )?;
        if entry[..4] != CENTRAL_DIRECTORY_MAGIC {
            return Err(ZipError::Format("Invalid central directory entry"));
        }
        *entry = &entry[4..];
        let source_version = read_u16(entry);
        let minimum_extract_version = read_u16(entry);
        let flags = read_u16(entry);
        let compression_method = read_u16(entry);
        let last_modified_time = read_u16(entry);
        let last_modified_date = read_u16(entry);
        let crc32 = read_u32(entry);
        let compressed_size = read_u32(entry);
        let uncompressed_size = read_u32(entry);
        let path_length = read_u16(entry) as usize;
        let extra_field_length = read_u16(entry) as usize;
        let file_comment_length = read_u16(entry) as usize;
        let disk_number = read_u16(entry);
        let internal_file_attributes = read_u16(entry);
        let external_file_attributes = read_u32(entry);
        let header_offset = read_u32(entry);
        let path = take(entry, path_length, "central directory file name")?;
        let extra_field = take(entry, extra_field_length, "central directory extra field")?;
        let file_comment = take(entry, file_comment_length, "central directory file comment")?;

        Ok(Self {
            source_version,
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number,
            internal_file_attributes,
            external_file_attributes,
            header_offset,
            path,
            extra_field,
            file_comment,
        })
    }

    /// Rejects records we can't extract no matter what:
    /// ones on other disks, encrypted ones, and Zip64 ones.
    pub fn check_supported(&self) -> ZipResult<()> {
        if self.disk_number != 0 {
            return Err(ZipError::Unsupported(format!(
                "No support for multi-disk archives: file {} claims to be on disk {}",
                self.name(),
                self.disk_number,
            )));
        }
        if is_encrypted(self.flags) {
            return Err(ZipError::Unsupported(format!(
                "No support for encrypted files, as {} claims to be",
                self.name()
            )));
        }
        if self.compressed_size == u32::MAX
            || self.uncompressed_size == u32::MAX
            || self.header_offset == u32::MAX
        {
            return Err(ZipError::Unsupported(format!(
                "No support for Zip64 files, as {} claims to be",
                self.name()
            )));
        }
        Ok(())
    }

    /// Decodes the stored file name.
    pub fn name(&self) -> Cow<'a, str> {
        decode_name(self.path, self.flags).unwrap_or_else(|_| String::from_utf8_lossy(self.path))
    }
}

/// Decodes a file name: UTF-8 if the flags say so, CP437 otherwise.
pub fn decode_name(raw: &[u8], flags: u16) -> ZipResult<Cow<'_, str>> {
    if is_utf8(flags) {
        Ok(Cow::Borrowed(std::str::from_utf8(raw)?))
    } else {
        Ok(Cow::borrow_from_cp437(raw, &CP437_CONTROL))
    }
}

/// Extracts the "is this text UTF-8?" bit from the 16-bit flags field.
///
/// If false, text is assumed to be CP437.
fn is_utf8(flags: u16) -> bool {
    // Bit 11: Language encoding flag (EFS).  If this bit is set,
    //         the filename and comment fields for this file
    //         MUST be encoded using UTF-8. (see APPENDIX D)
    flags & (1 << 11) != 0
}

/// Extracts the "is this file encrypted?" bit from the 16-bit flags field.
fn is_encrypted(flags: u16) -> bool {
    // Bit 0: If set, indicates that the file is encrypted
    flags & 1 != 0
}

/// Extracts the "sizes come later" bit from the 16-bit flags field.
pub fn has_data_descriptor(flags: u16) -> bool {
    // Bit 3: If this bit is set, the fields crc-32, compressed
    //        size and uncompressed size are set to zero in the
    //        local header.  The correct values are put in the
    //        data descriptor immediately following the compressed
    //        data.
    flags & (1 << 3) != 0
}

/// Data from a local file header
///
/// Each files' actual contents is preceded by this header.
/// These headers allow for "streaming" decompression without
/// the use of the central directory,
/// but we only use them to find the data and double-check the central directory.
#[derive(Debug)]
#[allow(dead_code)]
pub struct LocalFileHeader {
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub path_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    pub const fn fixed_size_in_file() -> usize {
        30
    }

    /// Parses the fixed-size part of the header.
    /// The name and extra field follow; see `variable_size_in_file()`.
    pub fn parse(mut header: &[u8]) -> ZipResult<Self> {
        // 4.3.7  Local file header:
        //
        // local file header signature     4 bytes  (0x04034b50)
        // version needed to extract       2 bytes
        // general purpose bit flag        2 bytes
        // compression method              2 bytes
        // last mod file time              2 bytes
        // last mod file date              2 bytes
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        // file name length                2 bytes
        // extra field length              2 bytes
        //
        // file name (variable size)
        // extra field (variable size)
        ensure(header, Self::fixed_size_in_file(), "local file header")?;
        if header[..4] != LOCAL_FILE_HEADER_MAGIC {
            return Err(ZipError::Format("Invalid local file header"));
        }
        header = &header[4..];
        let header = &mut header;

        Ok(Self {
            minimum_extract_version: read_u16(header),
            flags: read_u16(header),
            compression_method: read_u16(header),
            last_modified_time: read_u16(header),
            last_modified_date: read_u16(header),
            crc32: read_u32(header),
            compressed_size: read_u32(header),
            uncompressed_size: read_u32(header),
            path_length: read_u16(header),
            extra_field_length: read_u16(header),
        })
    }

    /// Bytes between the fixed-size header and the file's data
    pub fn variable_size_in_file(&self) -> usize {
        self.path_length as usize + self.extra_field_length as usize
    }
}
