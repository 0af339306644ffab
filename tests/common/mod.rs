//! Archives for the integration tests, written on the fly with the zip crate.

#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write};

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

pub const FOO_H: &[u8] = b"#pragma once\n\nint foo(void);\n";

pub fn glew_h() -> Vec<u8> {
    (0..400)
        .map(|i| format!("#define GLEW_THING_{} 0x{:04x}\n", i, i * 7))
        .collect::<String>()
        .into_bytes()
}

pub fn lib_bytes() -> Vec<u8> {
    (0..20_000u32).flat_map(|i| (i % 251).to_le_bytes()).collect()
}

pub enum Item<'a> {
    Stored(&'a str, &'a [u8]),
    Deflated(&'a str, &'a [u8]),
    Directory(&'a str),
}

/// Writes the given items, in order, to an in-memory archive.
pub fn zip_bytes(items: &[Item]) -> Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for item in items {
        match item {
            Item::Stored(name, contents) => {
                writer.start_file(*name, stored)?;
                writer.write_all(contents)?;
            }
            Item::Deflated(name, contents) => {
                writer.start_file(*name, deflated)?;
                writer.write_all(contents)?;
            }
            Item::Directory(name) => {
                writer.add_directory(*name, stored)?;
            }
        }
    }
    Ok(writer.finish()?.into_inner())
}

/// A header-and-library bundle like the ones the demo unpacks.
pub fn bundle_bytes() -> Result<Vec<u8>> {
    let glew = glew_h();
    let lib = lib_bytes();
    zip_bytes(&[
        Item::Stored("include/foo.h", FOO_H),
        Item::Deflated("include/gl/glew.h", &glew),
        Item::Deflated("lib/x64/foo.lib", &lib),
        Item::Directory("bin/"),
        Item::Stored("README.txt", b"Read me!\n"),
    ])
}

pub fn write_archive(dir: &Utf8Path, name: &str, bytes: &[u8]) -> Result<Utf8PathBuf> {
    let path = dir.join(name);
    fs::write(&path, bytes).with_context(|| format!("Couldn't write {}", path))?;
    Ok(path)
}

pub fn utf8_tempdir() -> Result<(tempfile::TempDir, Utf8PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .map_err(|p| anyhow::anyhow!("Non-UTF-8 temp dir {}", p.display()))?;
    Ok((dir, path))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Offset of the first central directory record
pub fn central_directory_offset(archive: &[u8]) -> usize {
    find(archive, b"PK\x01\x02").expect("no central directory record")
}

/// Offset of the end of central directory record
pub fn eocdr_offset(archive: &[u8]) -> usize {
    archive
        .windows(4)
        .rposition(|w| w == b"PK\x05\x06")
        .expect("no end of central directory record")
}

/// Offset of the first file's data, right after its local header
pub fn first_payload_offset(archive: &[u8]) -> usize {
    assert_eq!(&archive[..4], b"PK\x03\x04");
    let name_length = u16::from_le_bytes([archive[26], archive[27]]) as usize;
    let extra_length = u16::from_le_bytes([archive[28], archive[29]]) as usize;
    30 + name_length + extra_length
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
