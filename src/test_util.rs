// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// In addition to being used as a regular module in lib.rs, this module
// is used in `tests` via the `include!` macro.

// Images are built in memory so that tests do not depend on
// mksquashfs. The inode table is always stored uncompressed; the
// other tables can optionally be zlib-compressed.

use std::io::Write;

const META_SIZE: usize = 8192;
const SUPERBLOCK_SIZE: usize = 96;

/// Handle to a node added to an [`ImageBuilder`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct NodeId(usize);

/// Regular file to add to an image.
#[derive(Clone, Debug)]
pub(crate) struct TestFile {
    pub(crate) blocks_start: u64,
    /// Raw size/flags word of each data block.
    pub(crate) block_sizes: Vec<u32>,
    /// Fragment index and offset within the fragment block.
    pub(crate) fragment: Option<(u32, u32)>,
    pub(crate) file_size: u64,
    pub(crate) extended: bool,
}

enum NodeKind {
    Dir {
        parent: Option<NodeId>,
        entries: Vec<(Vec<u8>, NodeId)>,
    },
    File(TestFile),
    Symlink(Vec<u8>),
}

struct Node {
    kind: NodeKind,
    uid_index: u16,
}

fn u32_of(val: usize) -> u32 {
    u32::try_from(val).unwrap()
}

fn u64_of(val: usize) -> u64 {
    u64::try_from(val).unwrap()
}

/// Split `data` into uncompressed metadata blocks.
pub(crate) fn metadata_blocks(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(META_SIZE) {
        let header = 0x8000 | u16::try_from(chunk.len()).unwrap();
        out.extend(header.to_le_bytes());
        out.extend(chunk);
    }
    out
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::ZlibEncoder::new(
        Vec::new(),
        flate2::Compression::best(),
    );
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Write `data` as metadata blocks. Returns the table and the offset of
/// each block relative to the start of the table.
fn metadata_table(data: &[u8], compress: bool) -> (Vec<u8>, Vec<u64>) {
    let mut out = Vec::new();
    let mut starts = Vec::new();
    for chunk in data.chunks(META_SIZE) {
        starts.push(u64_of(out.len()));
        let compressed = if compress { zlib(chunk) } else { Vec::new() };
        if compress && compressed.len() < chunk.len() {
            out.extend(u16::try_from(compressed.len()).unwrap().to_le_bytes());
            out.extend(compressed);
        } else {
            let header = 0x8000 | u16::try_from(chunk.len()).unwrap();
            out.extend(header.to_le_bytes());
            out.extend(chunk);
        }
    }
    (out, starts)
}

/// Metadata reference of byte `pos` of a table with the given block
/// starts.
fn table_ref(starts: &[u64], table_len: usize, pos: usize) -> u64 {
    let block = starts
        .get(pos / META_SIZE)
        .copied()
        .unwrap_or(u64_of(table_len));
    (block << 16) | u64_of(pos % META_SIZE)
}

/// Builder for small SquashFS 4.0 images.
///
/// Inode numbers are assigned in the order nodes are added, starting
/// with 1 for the root directory.
pub(crate) struct ImageBuilder {
    block_size: u32,
    compressor_id: u16,
    options: Option<Vec<u8>>,
    compress_metadata: bool,
    data: Vec<u8>,
    fragments: Vec<(u64, u32)>,
    ids: Vec<u32>,
    nodes: Vec<Node>,
    root: NodeId,
}

impl ImageBuilder {
    /// Create a gzip image containing an empty root directory.
    pub(crate) fn new(block_size: u32) -> Self {
        Self {
            block_size,
            compressor_id: 1,
            options: None,
            compress_metadata: false,
            data: Vec::new(),
            fragments: Vec::new(),
            ids: vec![0],
            nodes: vec![Node {
                kind: NodeKind::Dir {
                    parent: None,
                    entries: Vec::new(),
                },
                uid_index: 0,
            }],
            root: NodeId(0),
        }
    }

    /// Create an image with a 4KiB block size, the given compressor,
    /// and optionally a compressor options block.
    pub(crate) fn with_options(
        compressor_id: u16,
        options: Option<Vec<u8>>,
    ) -> Self {
        let mut builder = Self::new(4096);
        builder.compressor_id = compressor_id;
        builder.options = options;
        builder
    }

    /// Compress the directory, fragment and ID tables with zlib.
    pub(crate) fn compress_metadata(&mut self) {
        assert_eq!(self.compressor_id, 1);
        self.compress_metadata = true;
    }

    pub(crate) fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Point the superblock's root reference at `node`.
    pub(crate) fn set_root(&mut self, node: NodeId) {
        self.root = node;
    }

    pub(crate) fn set_ids(&mut self, ids: &[u32]) {
        self.ids = ids.to_vec();
    }

    pub(crate) fn set_uid_index(&mut self, node: NodeId, index: u16) {
        self.nodes[node.0].uid_index = index;
    }

    fn options_len(&self) -> usize {
        self.options.as_ref().map_or(0, |opts| 2 + opts.len())
    }

    /// Append raw bytes to the data region. Returns their absolute
    /// offset in the image.
    pub(crate) fn push_data(&mut self, bytes: &[u8]) -> u64 {
        let offset = SUPERBLOCK_SIZE + self.options_len() + self.data.len();
        self.data.extend(bytes);
        u64_of(offset)
    }

    /// Add a fragment table entry. Returns its index.
    pub(crate) fn add_fragment(&mut self, start: u64, size: u32) -> u32 {
        self.fragments.push((start, size));
        u32_of(self.fragments.len() - 1)
    }

    fn add_node(&mut self, parent: NodeId, name: &[u8], kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { kind, uid_index: 0 });
        self.link(parent, name, id);
        id
    }

    pub(crate) fn add_dir(&mut self, parent: NodeId, name: &[u8]) -> NodeId {
        self.add_node(
            parent,
            name,
            NodeKind::Dir {
                parent: Some(parent),
                entries: Vec::new(),
            },
        )
    }

    pub(crate) fn add_file(
        &mut self,
        parent: NodeId,
        name: &[u8],
        file: TestFile,
    ) -> NodeId {
        self.add_node(parent, name, NodeKind::File(file))
    }

    pub(crate) fn add_symlink(
        &mut self,
        parent: NodeId,
        name: &[u8],
        target: &[u8],
    ) -> NodeId {
        self.add_node(parent, name, NodeKind::Symlink(target.to_vec()))
    }

    /// Add a directory entry in `parent` pointing at an existing node.
    pub(crate) fn link(&mut self, parent: NodeId, name: &[u8], target: NodeId) {
        let NodeKind::Dir { entries, .. } = &mut self.nodes[parent.0].kind
        else {
            panic!("parent is not a directory");
        };
        entries.push((name.to_vec(), target));
    }

    fn inode_number(node: NodeId) -> u32 {
        u32_of(node.0 + 1)
    }

    fn type_code(&self, node: NodeId) -> u16 {
        match &self.nodes[node.0].kind {
            NodeKind::Dir { .. } => 1,
            NodeKind::File(_) => 2,
            NodeKind::Symlink(_) => 3,
        }
    }

    fn inode_size(node: &Node) -> usize {
        16 + match &node.kind {
            NodeKind::Dir { .. } => 16,
            NodeKind::File(f) => {
                (if f.extended { 40 } else { 16 }) + 4 * f.block_sizes.len()
            }
            NodeKind::Symlink(target) => 8 + target.len(),
        }
    }

    /// Raw metadata reference of each node's inode, indexed by node.
    pub(crate) fn inode_refs(&self) -> Vec<u64> {
        let mut pos = 0;
        self.nodes
            .iter()
            .map(|node| {
                // The inode table is uncompressed, so every full block
                // takes its size plus the two byte header.
                let mref = (u64_of(pos / META_SIZE * (META_SIZE + 2)) << 16)
                    | u64_of(pos % META_SIZE);
                pos += Self::inode_size(node);
                mref
            })
            .collect()
    }

    fn write_listing(
        &self,
        entries: &[(Vec<u8>, NodeId)],
        refs: &[u64],
        out: &mut Vec<u8>,
    ) {
        let mut sorted: Vec<_> = entries.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut i = 0;
        while i < sorted.len() {
            let first = sorted[i].1;
            let block = refs[first.0] >> 16;
            let base = Self::inode_number(first);
            let run: Vec<_> = sorted[i..]
                .iter()
                .take(256)
                .take_while(|(_, id)| {
                    let diff = i64::from(Self::inode_number(*id))
                        - i64::from(base);
                    refs[id.0] >> 16 == block && i16::try_from(diff).is_ok()
                })
                .collect();

            out.extend(u32_of(run.len() - 1).to_le_bytes());
            out.extend(u32::try_from(block).unwrap().to_le_bytes());
            out.extend(base.to_le_bytes());
            for (name, id) in &run {
                let diff = i64::from(Self::inode_number(*id)) - i64::from(base);
                out.extend(u16::try_from(refs[id.0] & 0xffff).unwrap().to_le_bytes());
                out.extend(i16::try_from(diff).unwrap().to_le_bytes());
                out.extend(self.type_code(*id).to_le_bytes());
                out.extend(u16::try_from(name.len() - 1).unwrap().to_le_bytes());
                out.extend(name);
            }
            i += run.len();
        }
    }

    fn write_inode(
        &self,
        index: usize,
        dir_ref: u64,
        dir_size: usize,
        out: &mut Vec<u8>,
    ) {
        let node = &self.nodes[index];
        let number = Self::inode_number(NodeId(index));
        let (type_code, permissions): (u16, u16) = match &node.kind {
            NodeKind::Dir { .. } => (1, 0o755),
            NodeKind::File(f) => (if f.extended { 9 } else { 2 }, 0o644),
            NodeKind::Symlink(_) => (3, 0o777),
        };
        out.extend(type_code.to_le_bytes());
        out.extend(permissions.to_le_bytes());
        out.extend(node.uid_index.to_le_bytes());
        out.extend(0u16.to_le_bytes());
        out.extend(0u32.to_le_bytes());
        out.extend(number.to_le_bytes());

        match &node.kind {
            NodeKind::Dir { parent, entries } => {
                let parent = match parent {
                    Some(p) => Self::inode_number(*p),
                    None => u32_of(self.nodes.len() + 1),
                };
                let subdirs = entries
                    .iter()
                    .filter(|(_, id)| self.type_code(*id) == 1)
                    .count();
                out.extend(u32::try_from(dir_ref >> 16).unwrap().to_le_bytes());
                out.extend(u32_of(2 + subdirs).to_le_bytes());
                out.extend(u16::try_from(dir_size + 3).unwrap().to_le_bytes());
                out.extend(u16::try_from(dir_ref & 0xffff).unwrap().to_le_bytes());
                out.extend(parent.to_le_bytes());
            }
            NodeKind::File(f) => {
                let (frag_index, frag_offset) =
                    f.fragment.unwrap_or((0xffff_ffff, 0));
                if f.extended {
                    out.extend(f.blocks_start.to_le_bytes());
                    out.extend(f.file_size.to_le_bytes());
                    out.extend(0u64.to_le_bytes());
                    out.extend(1u32.to_le_bytes());
                    out.extend(frag_index.to_le_bytes());
                    out.extend(frag_offset.to_le_bytes());
                    out.extend(0xffff_ffffu32.to_le_bytes());
                } else {
                    out.extend(
                        u32::try_from(f.blocks_start).unwrap().to_le_bytes(),
                    );
                    out.extend(frag_index.to_le_bytes());
                    out.extend(frag_offset.to_le_bytes());
                    out.extend(
                        u32::try_from(f.file_size).unwrap().to_le_bytes(),
                    );
                }
                for size in &f.block_sizes {
                    out.extend(size.to_le_bytes());
                }
            }
            NodeKind::Symlink(target) => {
                out.extend(1u32.to_le_bytes());
                out.extend(u32_of(target.len()).to_le_bytes());
                out.extend(target);
            }
        }
    }

    /// Write a two-level lookup table at `pos`. Returns the table and
    /// the absolute offset of its index.
    fn lookup_table(&self, entries: &[u8], pos: usize) -> (Vec<u8>, u64) {
        let (mut table, starts) =
            metadata_table(entries, self.compress_metadata);
        let index_pos = pos + table.len();
        for start in starts {
            table.extend((u64_of(pos) + start).to_le_bytes());
        }
        (table, u64_of(index_pos))
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let refs = self.inode_refs();

        // Directory table.
        let mut dir_stream = Vec::new();
        let mut listings = vec![(0, 0); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            if let NodeKind::Dir { entries, .. } = &node.kind {
                let start = dir_stream.len();
                self.write_listing(entries, &refs, &mut dir_stream);
                listings[i] = (start, dir_stream.len() - start);
            }
        }
        let (dir_table, dir_starts) =
            metadata_table(&dir_stream, self.compress_metadata);

        // Inode table.
        let mut inode_stream = Vec::new();
        for (i, &(start, len)) in listings.iter().enumerate() {
            let dir_ref = table_ref(&dir_starts, dir_table.len(), start);
            self.write_inode(i, dir_ref, len, &mut inode_stream);
        }
        let inode_table = metadata_blocks(&inode_stream);

        let mut image = vec![0; SUPERBLOCK_SIZE];
        if let Some(opts) = &self.options {
            image.extend(metadata_blocks(opts));
        }
        image.extend(&self.data);

        let inode_table_start = u64_of(image.len());
        image.extend(inode_table);
        let dir_table_start = u64_of(image.len());
        image.extend(dir_table);

        let fragment_table_start = if self.fragments.is_empty() {
            u64::MAX
        } else {
            let entries: Vec<u8> = self
                .fragments
                .iter()
                .flat_map(|(start, size)| {
                    let mut e = start.to_le_bytes().to_vec();
                    e.extend(size.to_le_bytes());
                    e.extend(0u32.to_le_bytes());
                    e
                })
                .collect();
            let (table, index) = self.lookup_table(&entries, image.len());
            image.extend(table);
            index
        };

        let ids: Vec<u8> = self.ids.iter().flat_map(|id| id.to_le_bytes()).collect();
        let (table, id_table_start) = self.lookup_table(&ids, image.len());
        image.extend(table);

        let mut flags: u16 = 0x200;
        if self.fragments.is_empty() {
            flags |= 0x10;
        }
        if self.options.is_some() {
            flags |= 0x400;
        }

        let bytes_used = u64_of(image.len());
        let sb = &mut image[..SUPERBLOCK_SIZE];
        sb[0x0..0x4].copy_from_slice(b"hsqs");
        sb[0x4..0x8].copy_from_slice(&u32_of(self.nodes.len()).to_le_bytes());
        sb[0xc..0x10].copy_from_slice(&self.block_size.to_le_bytes());
        sb[0x10..0x14]
            .copy_from_slice(&u32_of(self.fragments.len()).to_le_bytes());
        sb[0x14..0x16].copy_from_slice(&self.compressor_id.to_le_bytes());
        let block_log = u16::try_from(self.block_size.trailing_zeros()).unwrap();
        sb[0x16..0x18].copy_from_slice(&block_log.to_le_bytes());
        sb[0x18..0x1a].copy_from_slice(&flags.to_le_bytes());
        sb[0x1a..0x1c]
            .copy_from_slice(&u16::try_from(self.ids.len()).unwrap().to_le_bytes());
        sb[0x1c..0x1e].copy_from_slice(&4u16.to_le_bytes());
        sb[0x1e..0x20].copy_from_slice(&0u16.to_le_bytes());
        sb[0x20..0x28].copy_from_slice(&refs[self.root.0].to_le_bytes());
        sb[0x28..0x30].copy_from_slice(&bytes_used.to_le_bytes());
        sb[0x30..0x38].copy_from_slice(&id_table_start.to_le_bytes());
        sb[0x38..0x40].copy_from_slice(&u64::MAX.to_le_bytes());
        sb[0x40..0x48].copy_from_slice(&inode_table_start.to_le_bytes());
        sb[0x48..0x50].copy_from_slice(&dir_table_start.to_le_bytes());
        sb[0x50..0x58].copy_from_slice(&fragment_table_start.to_le_bytes());
        sb[0x58..0x60].copy_from_slice(&u64::MAX.to_le_bytes());
        image
    }
}
