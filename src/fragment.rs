// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::data_size::DataSize;
use crate::error::SqfsError;
use crate::metadata::MetadataReader;
use crate::superblock::Superblock;
use crate::util::{read_u32le, read_u64le};

/// Location of a fragment block. A fragment block packs the tail
/// bytes of several small files.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Fragment {
    start: u64,
    size: DataSize,
}

impl Fragment {
    const SIZE_IN_BYTES_ON_DISK: usize = 16;

    fn from_bytes(bytes: &[u8]) -> Self {
        // The last four bytes are unused.
        Self {
            start: read_u64le(bytes, 0),
            size: DataSize::from_raw(read_u32le(bytes, 8)),
        }
    }

    /// Absolute offset of the fragment block.
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn size(&self) -> DataSize {
        self.size
    }
}

/// Table of fragment blocks, indexed by the fragment index stored in
/// file inodes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FragmentTable(Vec<Fragment>);

impl FragmentTable {
    pub(crate) fn load(
        meta: &mut MetadataReader,
        sb: &Superblock,
    ) -> Result<Self, SqfsError> {
        if sb.fragment_count == 0 {
            return Ok(Self::default());
        }

        let raw = meta.read_table(
            "fragment",
            sb.fragment_table_start,
            sb.fragment_count,
            Fragment::SIZE_IN_BYTES_ON_DISK,
            sb.bytes_used,
        )?;
        Ok(Self(
            raw.chunks_exact(Fragment::SIZE_IN_BYTES_ON_DISK)
                .map(Fragment::from_bytes)
                .collect(),
        ))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a fragment by index.
    pub fn get(&self, index: u32) -> Option<Fragment> {
        self.0.get(usize::try_from(index).ok()?).copied()
    }

    /// Iterate over the fragments in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.0.iter()
    }
}
