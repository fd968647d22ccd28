// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::compressor::Compressor;
use crate::range::Range;
use std::fmt::{self, Debug, Display, Formatter};
use std::path::{Path, PathBuf};

/// Underlying error type for [`SqfsError::Io`].
pub trait IoError: Debug + Display + Send + Sync + 'static {}

/// Common error type for reading a SquashFS image.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SqfsError {
    /// An IO operation failed. This error comes from the [`SqfsRead`]
    /// passed to [`Session::load`].
    ///
    /// [`SqfsRead`]: crate::SqfsRead
    /// [`Session::load`]: crate::Session::load
    #[error("io error: {0}")]
    Io(
        /// Underlying error.
        Box<dyn IoError>,
    ),

    /// The image is not supported by this library. This does not
    /// indicate a problem with the image.
    #[error("incompatible: {0}")]
    Incompatible(#[from] Incompatible),

    /// The image is corrupt in some way.
    #[error("corrupt: {0}")]
    Corrupt(#[from] Corrupt),
}

impl SqfsError {
    /// If the error type is [`SqfsError::Corrupt`], get the underlying error.
    pub fn as_corrupt(&self) -> Option<&Corrupt> {
        if let Self::Corrupt(err) = self {
            Some(err)
        } else {
            None
        }
    }

    /// If the error type is [`SqfsError::Incompatible`], get the underlying error.
    pub fn as_incompatible(&self) -> Option<&Incompatible> {
        if let Self::Incompatible(err) = self {
            Some(err)
        } else {
            None
        }
    }

    /// If the error type is [`SqfsError::Io`], get the underlying error.
    pub fn as_io(&self) -> Option<&dyn IoError> {
        if let Self::Io(err) = self {
            Some(&**err)
        } else {
            None
        }
    }
}

impl PartialEq<Corrupt> for SqfsError {
    fn eq(&self, other: &Corrupt) -> bool {
        self.as_corrupt() == Some(other)
    }
}

impl PartialEq<Incompatible> for SqfsError {
    fn eq(&self, other: &Incompatible) -> bool {
        self.as_incompatible() == Some(other)
    }
}

/// Error type used in [`SqfsError::Corrupt`] when the image is corrupt
/// in some way.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Corrupt {
    /// Superblock magic is invalid.
    #[error("wrong magic value in super block")]
    SuperblockMagic,

    /// `block_log` does not match the block size.
    #[error("block log {0} does not match the block size")]
    BlockLog(u16),

    /// The image is shorter than the size recorded in the superblock.
    #[error("image is shorter than the {0} bytes used recorded in the super block")]
    BytesUsed(u64),

    /// The ID table must have at least one entry.
    #[error("ID table is empty")]
    EmptyIdTable,

    /// A metadata block header is invalid.
    #[error("invalid metadata block header at offset {0}")]
    MetadataHeader(
        /// Absolute offset of the block.
        u64,
    ),

    /// A metadata reference points outside of its block.
    #[error("metadata reference {0:#x} is out of bounds")]
    MetadataRef(u64),

    /// A compressed block could not be decompressed.
    #[error("failed to decompress {compressor} block at offset {offset}: {message}")]
    Decompress {
        compressor: Compressor,
        /// Absolute offset of the block.
        offset: u64,
        message: String,
    },

    /// An inode is invalid.
    #[error("inode {0} is invalid")]
    Inode(
        /// Inode number.
        u32,
    ),

    /// An inode has an unknown type.
    #[error("inode {inode} has unknown type {kind}")]
    InodeType {
        /// Inode number.
        inode: u32,
        kind: u16,
    },

    /// An inode refers to a uid or gid index that is not in the ID table.
    #[error("inode {inode} refers to missing ID table entry {index}")]
    IdIndex {
        /// Inode number.
        inode: u32,
        index: u16,
    },

    /// A directory entry is invalid.
    #[error("invalid directory entry in inode {0}")]
    DirEntry(
        /// Inode number of the directory.
        u32,
    ),

    /// The root inode is not a directory.
    #[error("root inode is not a directory")]
    RootNotDir,

    /// A directory contains one of its own ancestors.
    #[error("directory loop detected at inode {0}")]
    DirLoop(
        /// Inode number.
        u32,
    ),

    /// A lookup table does not fit in the image, or its metadata
    /// blocks hold fewer entries than the superblock claims.
    #[error("{table} table with {count} entries is invalid")]
    Table { table: &'static str, count: u64 },
}

/// Error type used in [`SqfsError::Incompatible`] when the image
/// cannot be read due to incomplete support in this library.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Incompatible {
    /// The superblock version is not 4.0.
    #[error("wrong squashfs version {major}.{minor} in super block")]
    Version { major: u16, minor: u16 },

    /// The block size is not a power of two between 4KiB and 1MiB.
    #[error("invalid block size {0} specified in super block")]
    BlockSize(u32),

    /// The compressor ID is not known.
    #[error("unknown compressor id {0}")]
    UnknownCompressor(u16),

    /// The compressor is known but decompression is not implemented.
    #[error("compressor {0} is not supported")]
    UnsupportedCompressor(Compressor),
}

/// Step of [`Session::load`] that failed.
///
/// [`Session::load`]: crate::Session::load
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadStep {
    OpenFile,
    ReadSuperblock,
    CreateCompressor,
    LoadIdTable,
    LoadTree,
    LoadFragmentTable,
}

impl Display for LoadStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OpenFile => "opening file",
            Self::ReadSuperblock => "reading super block",
            Self::CreateCompressor => "creating compressor",
            Self::LoadIdTable => "loading ID table",
            Self::LoadTree => "loading filesystem tree",
            Self::LoadFragmentTable => "loading fragment table",
        };
        f.write_str(s)
    }
}

/// Error returned when an image cannot be opened.
///
/// Includes the path of the image (if the image was opened from a
/// path) and the step that failed.
#[derive(Debug)]
pub struct OpenError {
    path: Option<PathBuf>,
    step: LoadStep,
    source: SqfsError,
}

impl OpenError {
    pub(crate) fn new(step: LoadStep, source: SqfsError) -> Self {
        Self {
            path: None,
            step,
            source,
        }
    }

    pub(crate) fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_owned());
        self
    }

    /// Path of the image, if known.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The step that failed.
    pub fn step(&self) -> LoadStep {
        self.step
    }

    /// The underlying error.
    pub fn error(&self) -> &SqfsError {
        &self.source
    }
}

impl Display for OpenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: ", path.display())?;
        }
        write!(f, "{}: {}", self.step, self.source)
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// An internal invariant did not hold.
///
/// These indicate that the image reader produced data inconsistent
/// with its own contract. Extraction stops without producing a
/// manifest.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Invariant {
    /// Inodes were out of order after sorting.
    #[error("inode list is not sorted at position {0:#x}")]
    UnsortedInodes(usize),

    /// Ranges were out of order after sorting.
    #[error("range list is not sorted at position {0:#x}")]
    UnsortedRanges(usize),

    /// A non-file inode reached code that only handles files.
    #[error("inode {0} is not a file")]
    NotAFile(
        /// Inode number.
        u32,
    ),

    /// A fragment block is marked sparse.
    #[error("fragment {0}: sparse")]
    SparseFragment(
        /// Fragment index.
        u32,
    ),
}

/// Error type for manifest extraction.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// The image could not be opened.
    #[error(transparent)]
    Open(#[from] OpenError),

    /// An internal invariant did not hold.
    #[error("internal invariant violated: {0}")]
    Invariant(#[from] Invariant),

    /// A data range could not be read for hashing.
    #[error("failed to read {range}: {source}")]
    RangeRead {
        range: Range,
        #[source]
        source: SqfsError,
    },
}

impl ManifestError {
    /// If the error type is [`ManifestError::Invariant`], get the
    /// invariant that failed.
    pub fn as_invariant(&self) -> Option<&Invariant> {
        if let Self::Invariant(err) = self {
            Some(err)
        } else {
            None
        }
    }

    /// If the error type is [`ManifestError::Open`], get the underlying error.
    pub fn as_open(&self) -> Option<&OpenError> {
        if let Self::Open(err) = self {
            Some(err)
        } else {
            None
        }
    }
}
