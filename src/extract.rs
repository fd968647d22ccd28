// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Conversion of file inodes and fragment table entries into on-disk
//! byte ranges.

use crate::error::Invariant;
use crate::fragment::FragmentTable;
use crate::inode::Inode;
use crate::range::Range;

/// Append the ranges of the data blocks of `inode` to `out`.
///
/// Blocks of a file are stored back to back starting at the file's
/// `blocks_start`. Sparse blocks occupy no space, so they produce no
/// range and do not move the position of the next block.
pub fn file_ranges(inode: &Inode, out: &mut Vec<Range>) -> Result<(), Invariant> {
    let layout = inode
        .file_layout()
        .ok_or(Invariant::NotAFile(inode.number()))?;

    let mut offset = layout.blocks_start();
    for size in layout.block_sizes() {
        if size.is_sparse() {
            continue;
        }
        let range = Range::new(offset, size.on_disk_size());
        offset = range.end();
        out.push(range);
    }
    Ok(())
}

/// Append the ranges of all fragment blocks to `out`.
pub fn fragment_ranges(
    table: &FragmentTable,
    out: &mut Vec<Range>,
) -> Result<(), Invariant> {
    for (index, fragment) in (0u32..).zip(table.iter()) {
        let size = fragment.size();
        if size.is_sparse() {
            return Err(Invariant::SparseFragment(index));
        }
        out.push(Range::new(fragment.start(), size.on_disk_size()));
    }
    Ok(())
}
