// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::canonical::{Diagnostic, canonicalize};
use crate::collect::collect_file_inodes;
use crate::error::{LoadStep, ManifestError, OpenError, SqfsError};
use crate::extract::{file_ranges, fragment_ranges};
use crate::hash::{ManifestEntry, hash_ranges};
use crate::session::{Session, read_superblock};
use std::fs::File;
use std::path::Path;
use tracing::{debug, error};

/// Hashed data ranges of an image, sorted by offset.
///
/// The diagnostics found while building the manifest are kept
/// alongside the entries; they do not affect the entries.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    diagnostics: Vec<Diagnostic>,
}

impl Manifest {
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Take ownership of the entries.
    pub fn into_entries(self) -> Vec<ManifestEntry> {
        self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Gaps and overlaps between adjacent entries.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Sum of the sizes of all entries.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.size())).sum()
    }
}

impl Session {
    /// Build the manifest of this image.
    pub fn manifest(&mut self) -> Result<Manifest, ManifestError> {
        let inodes = collect_file_inodes(self.root())?;

        let mut ranges = Vec::new();
        for inode in &inodes {
            file_ranges(inode, &mut ranges)?;
        }
        let file_count = ranges.len();
        fragment_ranges(self.fragment_table(), &mut ranges)?;
        debug!(
            files = inodes.len(),
            blocks = file_count,
            fragments = ranges.len() - file_count,
            "extracted ranges"
        );

        let canonical = canonicalize(ranges)?;
        let entries = hash_ranges(self.reader(), &canonical.ranges)?;
        debug!(
            entries = entries.len(),
            diagnostics = canonical.diagnostics.len(),
            "built manifest"
        );

        Ok(Manifest {
            entries,
            diagnostics: canonical.diagnostics,
        })
    }
}

/// Build the manifest of the image at `path`.
///
/// The image is closed before this returns; the caller owns the
/// returned manifest.
pub fn get_blocks<P: AsRef<Path>>(path: P) -> Result<Manifest, ManifestError> {
    Session::open(path)?.manifest()
}

/// Get the offset of the inode table of the image at `path`.
///
/// Only the superblock is read.
pub fn inode_table_start<P: AsRef<Path>>(path: P) -> Result<u64, OpenError> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|err| {
        OpenError::new(LoadStep::OpenFile, SqfsError::Io(Box::new(err)))
            .with_path(path)
    })?;
    let sb = read_superblock(&mut file).map_err(|err| {
        OpenError::new(LoadStep::ReadSuperblock, err).with_path(path)
    })?;
    Ok(sb.inode_table_start())
}

/// Get the offset of the inode table of the image at `path`, or `0`
/// if the image cannot be read.
///
/// The inode table always follows the superblock, so `0` is never a
/// valid offset. See [`inode_table_start`] for the error.
pub fn get_inode_table_offset<P: AsRef<Path>>(path: P) -> u64 {
    inode_table_start(path).unwrap_or_else(|err| {
        error!("{err}");
        0
    })
}
