//! Copies headers, libraries, and binaries out of a batch of library bundles
//! (ZIP archives laid out as `include/`, `lib/`, `bin/`, and maybe a
//! `main.cpp` example) into a project directory.

use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use camino::Utf8PathBuf;
use log::*;
use structopt::*;

use zipp::ZipReader;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "unbundle",
    about = "Unpacks library bundles into a project directory"
)]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    /// Also copy the first bundle's main.cpp into the project as Main.cpp
    /// (and any later ones as <bundle>.cpp)
    #[structopt(short, long)]
    example: bool,

    /// Where to put everything
    #[structopt(short, long, default_value = ".")]
    project: PathBuf,

    #[structopt(name("bundle ZIP files"), required = true)]
    bundles: Vec<Utf8PathBuf>,
}

fn main() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    errlog.init()?;

    // Parse everything up front, holding one file handle at a time.
    let mut readers = Vec::with_capacity(args.bundles.len());
    let mut failures = 0;
    for bundle in &args.bundles {
        match inspect(bundle) {
            Ok(reader) => readers.push(reader),
            Err(e) => {
                error!("{:#}", e);
                failures += 1;
            }
        }
    }

    let mut first_example = true;
    for reader in &mut readers {
        match unpack(reader, &args.project, args.example, &mut first_example) {
            Ok(files) => info!(
                "Copied {} files from {}",
                files,
                reader.archive_path().map(|p| p.as_str()).unwrap_or("?")
            ),
            Err(e) => {
                error!("{:#}", e);
                failures += 1;
            }
        }
        reader.close();
    }
    if args.example && first_example {
        warn!("None of the bundles had a main.cpp");
    }

    ensure!(
        failures == 0,
        "{} of {} bundles failed",
        failures,
        args.bundles.len()
    );
    Ok(())
}

fn inspect(bundle: &Utf8PathBuf) -> Result<ZipReader> {
    let mut reader =
        ZipReader::open(bundle).with_context(|| format!("Couldn't open {}", bundle))?;
    for dir in ["include", "lib", "bin"] {
        if !reader.contains(dir) {
            debug!("{} has no {}/", bundle, dir);
        } else if reader.entry(dir)?.is_file() {
            bail!("{}: {} should be a directory", bundle, dir);
        }
    }
    reader.suspend()?;
    Ok(reader)
}

fn unpack(
    reader: &mut ZipReader,
    project: &Path,
    examples: bool,
    first_example: &mut bool,
) -> Result<usize> {
    let bundle = reader
        .archive_path()
        .map(|p| p.to_owned())
        .unwrap_or_default();
    reader
        .resume()
        .with_context(|| format!("Couldn't reopen {}", bundle))?;

    let mut files = 0;
    for (dir, destination) in [
        ("include", project.join("include")),
        ("lib", project.join("lib")),
        ("bin", project.to_path_buf()),
    ] {
        if reader.contains(dir) {
            files += reader
                .extract_subtree(dir, &destination)
                .with_context(|| format!("Couldn't copy {}/ out of {}", dir, bundle))?;
        }
    }

    if examples && reader.entry("main.cpp").map(|e| e.is_file()).unwrap_or(false) {
        // The first example becomes the project's entry point;
        // later ones are kept alongside it, named for their bundle.
        let destination = if *first_example {
            info!("Generating Main.cpp from {}", bundle);
            *first_example = false;
            project.join("Main.cpp")
        } else {
            let library = bundle.file_stem().unwrap_or("example");
            info!(
                "More than one example found; saving {}'s as {}.cpp",
                bundle, library
            );
            project.join(format!("{}.cpp", library))
        };
        reader
            .extract_to_file("main.cpp", &destination)
            .with_context(|| {
                format!(
                    "Couldn't copy main.cpp out of {} to {}",
                    bundle,
                    destination.display()
                )
            })?;
        files += 1;
    }
    Ok(files)
}
