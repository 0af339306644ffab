use std::fs;

use anyhow::{Context, Result};
use log::*;
use rayon::prelude::*;

use zipp::*;

mod common;
use common::*;

#[test]
fn smoke() -> Result<()> {
    init_logging();
    let (_guard, dir) = utf8_tempdir()?;
    let archive = write_archive(&dir, "bundle.zip", &bundle_bytes()?)?;

    let mut reader = ZipReader::open(&archive).context("Couldn't open bundle")?;
    assert_eq!(reader.state(), ReaderState::Open);
    assert!(reader.is_open());
    assert!(reader.can_extract());
    assert!(reader.has_handle());
    assert_eq!(reader.archive_path(), Some(archive.as_path()));
    assert_eq!(reader.prepended_bytes(), 0);

    // root, include, include/foo.h, include/gl, include/gl/glew.h,
    // lib, lib/x64, lib/x64/foo.lib, bin, README.txt
    assert_eq!(reader.len(), 10);

    let foo = reader.entry("include/foo.h")?;
    assert!(foo.is_file());
    assert_eq!(foo.name(), "foo.h");
    assert_eq!(foo.uncompressed_size(), FOO_H.len() as u64);
    assert_eq!(foo.compression_method(), Some(CompressionMethod::None));

    let glew = reader.entry("include/gl/glew.h")?;
    assert_eq!(glew.compression_method(), Some(CompressionMethod::Deflate));
    assert!(glew.compressed_size() < glew.uncompressed_size());

    let bin = reader.entry("bin")?;
    assert!(bin.is_dir());
    assert!(!bin.has_children());

    assert_eq!(reader.extract_to_memory("include/foo.h")?, FOO_H);
    assert_eq!(reader.extract_to_memory("include/gl/glew.h")?, glew_h());
    assert_eq!(reader.extract_to_memory("lib/x64/foo.lib")?, lib_bytes());
    Ok(())
}

#[test]
fn implicit_directories() -> Result<()> {
    init_logging();
    let (_guard, dir) = utf8_tempdir()?;
    let bytes = zip_bytes(&[
        Item::Stored("include/foo.h", FOO_H),
        Item::Stored("include/bar.h", b"int bar;\n"),
    ])?;
    let reader = ZipReader::open(write_archive(&dir, "headers.zip", &bytes)?)?;

    let root = reader.root();
    assert_eq!(root.num_children()?, 1);
    let include = reader.entry(root.child(0)?)?;
    assert!(include.is_dir());
    assert_eq!(include.path(), &Path::from("include"));
    assert_eq!(include.num_children()?, 2);
    assert!(reader.children_of("include")?.all(Entry::is_file));
    assert_eq!(reader.len(), 4);

    // An explicit directory record doesn't add a second one.
    let bytes = zip_bytes(&[
        Item::Directory("include/"),
        Item::Stored("include/foo.h", FOO_H),
        Item::Stored("include/bar.h", b"int bar;\n"),
    ])?;
    let reader = ZipReader::open(write_archive(&dir, "explicit.zip", &bytes)?)?;
    assert_eq!(reader.root().num_children()?, 1);
    assert_eq!(reader.entry("include")?.num_children()?, 2);
    assert_eq!(reader.len(), 4);
    Ok(())
}

#[test]
fn tree_completeness() -> Result<()> {
    init_logging();
    let (_guard, dir) = utf8_tempdir()?;
    let names = [
        "include/foo.h",
        "include/gl/glew.h",
        "lib/x64/foo.lib",
        "README.txt",
    ];
    let reader = ZipReader::open(write_archive(&dir, "bundle.zip", &bundle_bytes()?)?)?;

    for name in &names {
        let path = Path::from(*name);
        let matching = reader
            .recursive(reader.root().id(), false)?
            .filter(|e| e.path() == &path)
            .count();
        assert_eq!(matching, 1, "{} should appear exactly once", name);

        // Every ancestor exists as a directory, linked to its child.
        let mut child = reader.entry(&path)?;
        while child.has_parent() {
            let parent = reader.parent_of(child.id())?;
            assert!(parent.is_dir());
            assert!(parent.children()?.contains(&child.id()));
            assert!(child.path().starts_with(parent.path()));
            child = parent;
        }
        assert_eq!(child.id(), EntryId::ROOT);
    }
    Ok(())
}

#[test]
fn index_correctness() -> Result<()> {
    init_logging();
    let (_guard, dir) = utf8_tempdir()?;
    let reader = ZipReader::open(write_archive(&dir, "bundle.zip", &bundle_bytes()?)?)?;

    for i in 0..reader.len() {
        let entry = reader.by_index(i)?;
        assert_eq!(entry.id().index(), i);
        assert!(reader.contains(entry.path()));
        assert_eq!(reader.entry(entry.path())?.id(), entry.id());
        assert_eq!(reader.entry(entry.path().as_string())?.id(), entry.id());
    }
    assert!(reader.contains("include/gl/"));
    assert!(!reader.contains("include/gl/glut.h"));
    assert!(!reader.contains("Include/foo.h"));
    assert!(matches!(
        reader.entry("no/such/file"),
        Err(ZipError::NotFound(_))
    ));
    assert!(matches!(
        reader.by_index(reader.len()),
        Err(ZipError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn traversal_order() -> Result<()> {
    init_logging();
    let (_guard, dir) = utf8_tempdir()?;
    let bytes = zip_bytes(&[Item::Stored("a/b/c.txt", b"c")])?;
    let reader = ZipReader::open(write_archive(&dir, "abc.zip", &bytes)?)?;

    let mut visited = Vec::new();
    reader.recursive_callback(
        reader.root().id(),
        |e| visited.push(e.path().as_string()),
        true,
    )?;
    assert_eq!(visited, ["", "a", "a/b", "a/b/c.txt"]);

    let mut visited = Vec::new();
    reader.recursive_callback("a", |e| visited.push(e.path().as_string()), false)?;
    assert_eq!(visited, ["a/b", "a/b/c.txt"]);

    let mut visited = Vec::new();
    reader.level_callback("a", |e| visited.push(e.path().as_string()), true)?;
    assert_eq!(visited, ["a", "a/b"]);

    // Files are leaves.
    let leaf: Vec<_> = reader.level("a/b/c.txt", true)?.collect();
    assert_eq!(leaf.len(), 1);
    assert_eq!(reader.recursive("a/b/c.txt", false)?.count(), 0);

    // Iterators restart from a clone.
    let walk = reader.recursive(EntryId::ROOT, true)?;
    assert_eq!(walk.clone().count(), walk.count());
    Ok(())
}

#[test]
fn suspend_and_resume() -> Result<()> {
    init_logging();
    let (_guard, dir) = utf8_tempdir()?;
    let archive = write_archive(&dir, "bundle.zip", &bundle_bytes()?)?;
    let mut reader = ZipReader::open(&archive)?;

    let before: Vec<_> = reader.recursive(EntryId::ROOT, true)?.cloned().collect();
    let first = reader.extract_to_memory("include/gl/glew.h")?;

    reader.suspend()?;
    assert_eq!(reader.state(), ReaderState::Suspended);
    assert!(reader.is_open());
    assert!(reader.is_suspended());
    assert!(!reader.can_extract());
    assert!(!reader.has_handle());
    // The tree outlives the handle.
    assert!(reader.contains("include/gl/glew.h"));
    assert_eq!(reader.entry("lib/x64")?.num_children()?, 1);
    assert!(matches!(
        reader.extract_to_memory("include/gl/glew.h"),
        Err(ZipError::Unavailable(ReaderState::Suspended))
    ));
    assert!(matches!(
        reader.suspend(),
        Err(ZipError::InvalidState { .. })
    ));

    reader.resume()?;
    assert_eq!(reader.state(), ReaderState::Open);
    assert!(reader.has_handle());
    let after: Vec<_> = reader.recursive(EntryId::ROOT, true)?.cloned().collect();
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(&after) {
        assert_eq!(b.id(), a.id());
        assert_eq!(b.path(), a.path());
        assert_eq!(b.crc32(), a.crc32());
    }
    assert_eq!(reader.extract_to_memory("include/gl/glew.h")?, first);
    assert!(matches!(reader.resume(), Err(ZipError::InvalidState { .. })));

    reader.close();
    assert_eq!(reader.state(), ReaderState::Closed);
    assert!(!reader.has_handle());
    assert!(!reader.contains("include/gl/glew.h"));
    Ok(())
}

#[test]
fn stale_handles() -> Result<()> {
    init_logging();
    let (_guard, dir) = utf8_tempdir()?;
    let archive = write_archive(&dir, "bundle.zip", &bundle_bytes()?)?;

    let mut reader = ZipReader::open(&archive)?;
    reader.suspend()?;
    let other = zip_bytes(&[Item::Stored("something/else.txt", b"else")])?;
    fs::write(&archive, &other)?;
    assert!(matches!(
        reader.resume(),
        Err(ZipError::StaleHandle { .. })
    ));
    assert_eq!(reader.state(), ReaderState::Suspended);
    assert!(reader.contains("include/foo.h"));

    // Reopening picks up the new contents.
    reader.open_file(&archive)?;
    assert!(reader.contains("something/else.txt"));
    assert!(!reader.contains("include/foo.h"));

    reader.suspend()?;
    fs::remove_file(&archive)?;
    assert!(matches!(
        reader.resume(),
        Err(ZipError::StaleHandle { .. })
    ));
    assert_eq!(reader.state(), ReaderState::Suspended);
    Ok(())
}

#[test]
fn extraction_is_deterministic() -> Result<()> {
    init_logging();
    let (_guard, dir) = utf8_tempdir()?;
    let mut reader = ZipReader::open(write_archive(&dir, "bundle.zip", &bundle_bytes()?)?)?;

    let files: Vec<(EntryId, u64)> = reader
        .recursive(EntryId::ROOT, false)?
        .filter(|e| e.is_file())
        .map(|e| (e.id(), e.uncompressed_size()))
        .collect();
    assert_eq!(files.len(), 4);
    for (id, size) in files {
        let once = reader.extract_to_memory(id)?;
        let twice = reader.extract_to_memory(id)?;
        assert_eq!(once, twice);
        assert_eq!(once.len() as u64, size);

        let mut streamed = Vec::new();
        assert_eq!(reader.extract_to_stream(id, &mut streamed)?, size);
        assert_eq!(streamed, once);
    }
    Ok(())
}

#[test]
fn extract_to_disk() -> Result<()> {
    init_logging();
    let (_guard, dir) = utf8_tempdir()?;
    let mut reader = ZipReader::open(write_archive(&dir, "bundle.zip", &bundle_bytes()?)?)?;

    let out = dir.join("out/deeply/nested/foo.h");
    assert_eq!(
        reader.extract_to_file("include/foo.h", &out)?,
        FOO_H.len() as u64
    );
    assert_eq!(fs::read(&out)?, FOO_H);

    assert!(matches!(
        reader.extract_to_file("include", dir.join("out/include")),
        Err(ZipError::NotExtractable(_))
    ));
    assert!(!dir.join("out/include").exists());

    let vendor = dir.join("vendor");
    assert_eq!(reader.extract_subtree("include", &vendor)?, 2);
    assert_eq!(fs::read(vendor.join("foo.h"))?, FOO_H);
    assert_eq!(fs::read(vendor.join("gl/glew.h"))?, glew_h());

    let project = dir.join("project");
    assert_eq!(reader.extract_subtree(EntryId::ROOT, &project)?, 4);
    assert_eq!(fs::read(project.join("lib/x64/foo.lib"))?, lib_bytes());
    assert!(project.join("bin").is_dir());

    assert_eq!(reader.extract_subtree("README.txt", &project.join("docs"))?, 1);
    assert!(project.join("docs/README.txt").is_file());
    Ok(())
}

#[test]
fn prepended_data() -> Result<()> {
    init_logging();
    let (_guard, dir) = utf8_tempdir()?;
    let mut bytes = b"#!/bin/sh\necho 'self-extracting, honest'\nexit 0\n".to_vec();
    let stub_length = bytes.len() as u64;
    bytes.extend(bundle_bytes()?);

    let mut reader = ZipReader::open(write_archive(&dir, "prefixed.zip", &bytes)?)?;
    assert_eq!(reader.prepended_bytes(), stub_length);
    assert_eq!(reader.extract_to_memory("include/foo.h")?, FOO_H);
    assert_eq!(reader.extract_to_memory("lib/x64/foo.lib")?, lib_bytes());
    Ok(())
}

#[test]
fn non_ascii_names() -> Result<()> {
    init_logging();
    let (_guard, dir) = utf8_tempdir()?;
    let bytes = zip_bytes(&[Item::Deflated("données/résumé.txt", b"oui")])?;
    let mut reader = ZipReader::open(write_archive(&dir, "utf8.zip", &bytes)?)?;
    assert!(reader.entry("données")?.is_dir());
    assert_eq!(reader.extract_to_memory("données/résumé.txt")?, b"oui");
    Ok(())
}

#[test]
fn parallel_readers() -> Result<()> {
    init_logging();
    let (_guard, dir) = utf8_tempdir()?;
    let archives = (0..8)
        .map(|i| write_archive(&dir, &format!("bundle{}.zip", i), &bundle_bytes()?))
        .collect::<Result<Vec<_>>>()?;

    // Readers share nothing, so each thread gets its own.
    archives.par_iter().try_for_each(|archive| -> Result<()> {
        let mut reader = ZipReader::open(archive)?;
        reader.suspend()?;
        reader.resume()?;
        let glew = reader.extract_to_memory("include/gl/glew.h")?;
        assert_eq!(glew, glew_h());
        info!("{} checks out", archive);
        Ok(())
    })?;
    Ok(())
}
