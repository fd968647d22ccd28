// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::SqfsError;
use crate::metadata::MetadataReader;
use crate::superblock::Superblock;
use crate::util::read_u32le;

/// Table of uid and gid values. Inodes store an index into this table
/// rather than the id itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IdTable(Vec<u32>);

impl IdTable {
    pub(crate) fn load(
        meta: &mut MetadataReader,
        sb: &Superblock,
    ) -> Result<Self, SqfsError> {
        let raw = meta.read_table(
            "ID",
            sb.id_table_start,
            u32::from(sb.id_count),
            4,
            sb.bytes_used,
        )?;
        let ids = (0..raw.len() / 4).map(|i| read_u32le(&raw, i * 4)).collect();
        Ok(Self(ids))
    }

    /// Get the id at `index`.
    pub fn get(&self, index: u16) -> Option<u32> {
        self.0.get(usize::from(index)).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
