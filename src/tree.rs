// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::dir::{DirEntry, read_dir};
use crate::error::{Corrupt, SqfsError};
use crate::id_table::IdTable;
use crate::inode::{Inode, InodeType};
use crate::metadata::{MetadataReader, MetadataRef};
use crate::superblock::Superblock;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::trace;

/// Node in the directory hierarchy of an image.
///
/// Hard links appear as separate nodes sharing one [`Inode`].
#[derive(Clone, Debug)]
pub struct TreeNode {
    name: Vec<u8>,
    inode: Rc<Inode>,
    uid: u32,
    gid: u32,
    children: Vec<TreeNode>,
}

impl TreeNode {
    /// Name of the directory entry. Empty for the root.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn inode(&self) -> &Rc<Inode> {
        &self.inode
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    /// Entries of a directory, sorted by name. Empty for other types.
    pub fn children(&self) -> &[TreeNode] {
        &self.children
    }

    /// Depth-first iterator over this node and all its descendants.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }
}

/// Iterator returned by [`TreeNode::walk`].
pub struct Walk<'a> {
    stack: Vec<&'a TreeNode>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // Push in reverse so that children come out in name order.
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

impl Drop for TreeNode {
    fn drop(&mut self) {
        // Drop descendants from a flat list so that deep hierarchies
        // do not recurse.
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Directory whose entries are still being loaded.
struct PendingDir {
    name: Vec<u8>,
    inode: Rc<Inode>,
    uid: u32,
    gid: u32,
    entries: std::vec::IntoIter<DirEntry>,
    children: Vec<TreeNode>,
}

impl PendingDir {
    fn into_node(self) -> TreeNode {
        TreeNode {
            name: self.name,
            inode: self.inode,
            uid: self.uid,
            gid: self.gid,
            children: self.children,
        }
    }
}

struct TreeLoader<'a> {
    meta: &'a mut MetadataReader,
    sb: &'a Superblock,
    ids: &'a IdTable,

    /// Inodes already read, keyed by raw metadata ref. Hard links share
    /// the cached inode.
    inodes: HashMap<u64, Rc<Inode>>,

    /// Inode numbers of the directories currently being loaded.
    ancestors: HashSet<u32>,
}

impl TreeLoader<'_> {
    fn inode(&mut self, mref: MetadataRef) -> Result<Rc<Inode>, SqfsError> {
        if let Some(inode) = self.inodes.get(&mref.to_raw()) {
            return Ok(inode.clone());
        }
        let inode = Rc::new(Inode::read(self.meta, self.sb, mref)?);
        self.inodes.insert(mref.to_raw(), inode.clone());
        Ok(inode)
    }

    fn id(&self, inode: &Inode, index: u16) -> Result<u32, SqfsError> {
        self.ids.get(index).ok_or_else(|| {
            Corrupt::IdIndex {
                inode: inode.number(),
                index,
            }
            .into()
        })
    }

    /// Read the inode an entry of directory `parent` points to.
    fn child_inode(
        &mut self,
        parent: u32,
        entry: &DirEntry,
    ) -> Result<Rc<Inode>, SqfsError> {
        let inode = self.inode(entry.inode_ref)?;
        // The entry must agree with the inode it points to.
        if inode.number() != entry.inode_number
            || inode.inode_type() != entry.entry_type
        {
            return Err(Corrupt::DirEntry(parent).into());
        }
        Ok(inode)
    }

    /// Read the listing of a directory and mark it as an ancestor of
    /// everything loaded until it is closed.
    fn open_dir(
        &mut self,
        name: Vec<u8>,
        inode: Rc<Inode>,
    ) -> Result<PendingDir, SqfsError> {
        let number = inode.number();
        let uid = self.id(&inode, inode.uid_index())?;
        let gid = self.id(&inode, inode.gid_index())?;

        let mut entries = Vec::new();
        if let Some(loc) = inode.dir_location() {
            if !self.ancestors.insert(number) {
                return Err(Corrupt::DirLoop(number).into());
            }
            entries = read_dir(self.meta, self.sb, number, loc)?;
            trace!(inode = number, entries = entries.len(), "read directory");
        }

        Ok(PendingDir {
            name,
            inode,
            uid,
            gid,
            entries: entries.into_iter(),
            children: Vec::new(),
        })
    }

    fn close_dir(&mut self, dir: PendingDir) -> TreeNode {
        self.ancestors.remove(&dir.inode.number());
        dir.into_node()
    }

    fn load(&mut self, root: Rc<Inode>) -> Result<TreeNode, SqfsError> {
        let mut current = self.open_dir(Vec::new(), root)?;
        let mut parents: Vec<PendingDir> = Vec::new();

        loop {
            if let Some(entry) = current.entries.next() {
                let inode = self.child_inode(current.inode.number(), &entry)?;
                let child = self.open_dir(entry.name, inode)?;
                if child.inode.dir_location().is_some() {
                    parents.push(std::mem::replace(&mut current, child));
                } else {
                    current.children.push(child.into_node());
                }
                continue;
            }

            let node = self.close_dir(current);
            match parents.pop() {
                Some(parent) => {
                    current = parent;
                    current.children.push(node);
                }
                None => return Ok(node),
            }
        }
    }
}

/// Read the full directory hierarchy, starting at the root inode.
pub(crate) fn load_tree(
    meta: &mut MetadataReader,
    sb: &Superblock,
    ids: &IdTable,
) -> Result<TreeNode, SqfsError> {
    let mut loader = TreeLoader {
        meta,
        sb,
        ids,
        inodes: HashMap::new(),
        ancestors: HashSet::new(),
    };
    let root = loader.inode(MetadataRef::from_raw(sb.root_inode_ref))?;
    if root.inode_type() != InodeType::Dir {
        return Err(Corrupt::RootNotDir.into());
    }
    loader.load(root)
}
