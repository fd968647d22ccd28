// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::{Corrupt, SqfsError};
use crate::inode::{DirLocation, InodeType};
use crate::metadata::{MetadataCursor, MetadataReader, MetadataRef};
use crate::superblock::Superblock;
use crate::util::usize_from_u32;

/// Maximum number of entries following one listing header.
const MAX_ENTRIES_PER_HEADER: u32 = 256;

/// One entry of a directory listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct DirEntry {
    pub(crate) name: Vec<u8>,
    pub(crate) inode_ref: MetadataRef,
    pub(crate) inode_number: u32,
    pub(crate) entry_type: InodeType,
}

/// Check that `name` is usable as a path component.
fn is_valid_name(name: &[u8]) -> bool {
    !name.is_empty() && name != b"." && name != b".." && !name.contains(&b'/')
}

/// Read the listing of the directory with inode number `dir_inode`.
///
/// A listing is a series of runs. Each run starts with a header naming
/// the inode table block shared by its entries and a base inode
/// number, followed by up to 256 entries.
pub(crate) fn read_dir(
    meta: &mut MetadataReader,
    sb: &Superblock,
    dir_inode: u32,
    loc: DirLocation,
) -> Result<Vec<DirEntry>, SqfsError> {
    let corrupt = || Corrupt::DirEntry(dir_inode);

    // The stored size counts three bytes that are not part of the
    // listing.
    let mut remaining = loc.file_size.checked_sub(3).ok_or_else(corrupt)?;
    let mut entries = Vec::new();
    if remaining == 0 {
        return Ok(entries);
    }

    let mut cursor = MetadataCursor::new(
        sb.directory_table_start,
        MetadataRef {
            block: u64::from(loc.block_index),
            offset: loc.block_offset,
        },
    )?;

    while remaining > 0 {
        remaining = remaining.checked_sub(12).ok_or_else(corrupt)?;
        let count = cursor.read_u32(meta)?.checked_add(1).ok_or_else(corrupt)?;
        let inode_block = cursor.read_u32(meta)?;
        let base_inode = cursor.read_u32(meta)?;
        if count > MAX_ENTRIES_PER_HEADER {
            return Err(corrupt().into());
        }

        for _ in 0..count {
            remaining = remaining.checked_sub(8).ok_or_else(corrupt)?;
            let offset = cursor.read_u16(meta)?;
            let inode_offset =
                i16::from_le_bytes(cursor.read_u16(meta)?.to_le_bytes());
            let raw_type = cursor.read_u16(meta)?;
            let name_len = u32::from(cursor.read_u16(meta)?) + 1;

            remaining = remaining.checked_sub(name_len).ok_or_else(corrupt)?;
            let name = cursor.read_vec(meta, usize_from_u32(name_len))?;
            if !is_valid_name(&name) {
                return Err(corrupt().into());
            }

            // Entries always store the basic type code.
            let entry_type = match InodeType::from_raw(raw_type) {
                Some((t, false)) => t,
                _ => return Err(corrupt().into()),
            };
            let inode_number = base_inode
                .checked_add_signed(i32::from(inode_offset))
                .ok_or_else(corrupt)?;

            entries.push(DirEntry {
                name,
                inode_ref: MetadataRef {
                    block: u64::from(inode_block),
                    offset,
                },
                inode_number,
                entry_type,
            });
        }
    }

    Ok(entries)
}
