// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! This crate extracts a manifest of the data blocks of a [SquashFS]
//! image. The manifest lists the byte range of every stored file data
//! block and fragment block, together with the SHA-256 of its raw
//! (possibly compressed) bytes.
//!
//! Two versions of an image can then be compared block by block: a
//! block whose digest appears in both manifests holds the same content,
//! even if it moved because unrelated metadata changed. See
//! [`match_blocks`].
//!
//! Data blocks are never decompressed. Metadata (inodes, directories,
//! and lookup tables) is decompressed to find the blocks.
//!
//! # Example
//!
//! ```no_run
//! let manifest = sqfs_manifest::get_blocks("image.sqfs")?;
//! for entry in manifest.entries() {
//!     println!("{:x} {:x} {}", entry.offset(), entry.size(), entry.hash_hex());
//! }
//! for diag in manifest.diagnostics() {
//!     eprintln!("{diag}");
//! }
//!
//! let inode_table = sqfs_manifest::get_inode_table_offset("image.sqfs");
//! assert_ne!(inode_table, 0);
//! # Ok::<(), sqfs_manifest::ManifestError>(())
//! ```
//!
//! [SquashFS]: https://dr-emann.github.io/squashfs/

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![forbid(unsafe_code)]
#![warn(clippy::as_conversions, clippy::use_self)]
#![warn(unreachable_pub)]

mod canonical;
mod collect;
mod compressor;
mod correspond;
mod data_size;
mod dir;
mod error;
mod extract;
mod fragment;
mod hash;
mod id_table;
mod inode;
mod manifest;
mod metadata;
mod range;
mod reader;
mod session;
mod superblock;
mod tree;
mod util;

#[cfg(test)]
#[allow(dead_code)]
mod test_util;

pub use canonical::{Canonical, Diagnostic, canonicalize};
pub use collect::collect_file_inodes;
pub use compressor::{Compressor, CompressorOptions};
pub use correspond::{BlockMatch, MatchSummary, match_blocks};
pub use data_size::DataSize;
pub use error::{
    Corrupt, Incompatible, Invariant, IoError, LoadStep, ManifestError,
    OpenError, SqfsError,
};
pub use extract::{file_ranges, fragment_ranges};
pub use fragment::{Fragment, FragmentTable};
pub use hash::{Digest, ManifestEntry, hash_ranges};
pub use id_table::IdTable;
pub use inode::{FileLayout, FragmentRef, Inode, InodeType};
pub use manifest::{
    Manifest, get_blocks, get_inode_table_offset, inode_table_start,
};
pub use range::Range;
pub use reader::{MemIoError, SqfsRead};
pub use session::Session;
pub use superblock::{Superblock, SuperblockFlags};
pub use tree::{TreeNode, Walk};
