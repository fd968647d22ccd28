// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::Invariant;
use crate::inode::{Inode, InodeType};
use crate::tree::TreeNode;
use std::rc::Rc;

/// Collect every regular file inode reachable from `root`, sorted by
/// inode number.
///
/// A file reached through several hard links is returned once.
pub fn collect_file_inodes(
    root: &TreeNode,
) -> Result<Vec<Rc<Inode>>, Invariant> {
    let mut inodes: Vec<Rc<Inode>> = root
        .walk()
        .filter(|node| node.inode().inode_type() == InodeType::File)
        .map(|node| node.inode().clone())
        .collect();

    inodes.sort_by_key(|inode| inode.number());
    dedup_sorted(&mut inodes)?;
    Ok(inodes)
}

/// Collapse adjacent inodes with the same number into one.
fn dedup_sorted(inodes: &mut Vec<Rc<Inode>>) -> Result<(), Invariant> {
    if let Some(pos) = inodes
        .windows(2)
        .position(|w| w[0].number() > w[1].number())
    {
        return Err(Invariant::UnsortedInodes(pos + 1));
    }
    inodes.dedup_by_key(|inode| inode.number());
    Ok(())
}
