// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::data_size::DataSize;
use crate::error::{Corrupt, SqfsError};
use crate::metadata::{MetadataCursor, MetadataReader, MetadataRef};
use crate::superblock::Superblock;
use crate::util::usize_from_u32;

/// Inode type.
///
/// Each type exists in a basic and an extended on-disk form. The
/// extended form has wider fields and an xattr index, but describes
/// the same kind of object.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum InodeType {
    Dir,
    File,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

impl InodeType {
    /// Offset between a basic type code and its extended form.
    const EXTENDED_OFFSET: u16 = 7;

    /// Decode an on-disk type code. Returns the type and whether the
    /// code is the extended form.
    pub(crate) fn from_raw(raw: u16) -> Option<(Self, bool)> {
        let (basic, extended) = if raw > Self::EXTENDED_OFFSET {
            (raw - Self::EXTENDED_OFFSET, true)
        } else {
            (raw, false)
        };
        let t = match basic {
            1 => Self::Dir,
            2 => Self::File,
            3 => Self::Symlink,
            4 => Self::BlockDevice,
            5 => Self::CharDevice,
            6 => Self::Fifo,
            7 => Self::Socket,
            _ => return None,
        };
        Some((t, extended))
    }
}

/// Location of the first data block and the tail fragment of a regular
/// file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileLayout {
    blocks_start: u64,
    file_size: u64,
    block_sizes: Vec<DataSize>,
    fragment: Option<FragmentRef>,
}

impl FileLayout {
    /// Absolute offset of the first stored data block.
    pub fn blocks_start(&self) -> u64 {
        self.blocks_start
    }

    /// Uncompressed file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Size/flags word of each full data block, in file order.
    pub fn block_sizes(&self) -> &[DataSize] {
        &self.block_sizes
    }

    /// Tail fragment of the file, if the tail is packed into a fragment
    /// block.
    pub fn fragment(&self) -> Option<FragmentRef> {
        self.fragment
    }
}

/// Reference from a file to its tail bytes inside a fragment block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FragmentRef {
    /// Index into the fragment table.
    pub index: u32,
    /// Byte offset within the decompressed fragment block.
    pub offset: u32,
}

/// Location of a directory listing in the directory table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct DirLocation {
    /// Offset of the metadata block, relative to the directory table.
    pub(crate) block_index: u32,
    /// Offset within the decompressed block.
    pub(crate) block_offset: u16,
    /// Listing size plus three.
    pub(crate) file_size: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum InodeData {
    File(FileLayout),
    Dir(DirLocation),
    Symlink(Vec<u8>),
    Other,
}

/// An inode record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Inode {
    number: u32,
    inode_type: InodeType,
    extended: bool,
    permissions: u16,
    uid_index: u16,
    gid_index: u16,
    modification_time: u32,
    data: InodeData,
}

impl Inode {
    /// Fragment index stored by files without a tail fragment.
    const NO_FRAGMENT: u32 = 0xffff_ffff;

    /// Read the inode at `mref` in the inode table.
    pub(crate) fn read(
        meta: &mut MetadataReader,
        sb: &Superblock,
        mref: MetadataRef,
    ) -> Result<Self, SqfsError> {
        let mut cursor = MetadataCursor::new(sb.inode_table_start, mref)?;

        let raw_type = cursor.read_u16(meta)?;
        let permissions = cursor.read_u16(meta)?;
        let uid_index = cursor.read_u16(meta)?;
        let gid_index = cursor.read_u16(meta)?;
        let modification_time = cursor.read_u32(meta)?;
        let number = cursor.read_u32(meta)?;

        let (inode_type, extended) =
            InodeType::from_raw(raw_type).ok_or(Corrupt::InodeType {
                inode: number,
                kind: raw_type,
            })?;

        let data = match inode_type {
            InodeType::File => InodeData::File(read_file(
                &mut cursor,
                meta,
                sb,
                number,
                extended,
            )?),
            InodeType::Dir => {
                InodeData::Dir(read_dir(&mut cursor, meta, extended)?)
            }
            InodeType::Symlink => {
                let _link_count = cursor.read_u32(meta)?;
                let target_size = cursor.read_u32(meta)?;
                if u64::from(target_size) > sb.bytes_used {
                    return Err(Corrupt::Inode(number).into());
                }
                InodeData::Symlink(
                    cursor.read_vec(meta, usize_from_u32(target_size))?,
                )
            }
            // Device and IPC inodes have no data in the image.
            _ => InodeData::Other,
        };

        Ok(Self {
            number,
            inode_type,
            extended,
            permissions,
            uid_index,
            gid_index,
            modification_time,
            data,
        })
    }

    /// Inode number. Hard links to the same file share a number.
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn inode_type(&self) -> InodeType {
        self.inode_type
    }

    /// Whether the inode is stored in the extended on-disk form.
    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Permission bits, not including the file type.
    pub fn permissions(&self) -> u16 {
        self.permissions
    }

    pub(crate) fn uid_index(&self) -> u16 {
        self.uid_index
    }

    pub(crate) fn gid_index(&self) -> u16 {
        self.gid_index
    }

    /// Modification time, in seconds since the UNIX epoch.
    pub fn modification_time(&self) -> u32 {
        self.modification_time
    }

    /// Block layout, if this is a regular file.
    pub fn file_layout(&self) -> Option<&FileLayout> {
        if let InodeData::File(layout) = &self.data {
            Some(layout)
        } else {
            None
        }
    }

    /// Target of a symlink.
    pub fn symlink_target(&self) -> Option<&[u8]> {
        if let InodeData::Symlink(target) = &self.data {
            Some(target)
        } else {
            None
        }
    }

    pub(crate) fn dir_location(&self) -> Option<DirLocation> {
        if let InodeData::Dir(loc) = self.data {
            Some(loc)
        } else {
            None
        }
    }
}

fn read_file(
    cursor: &mut MetadataCursor,
    meta: &mut MetadataReader,
    sb: &Superblock,
    number: u32,
    extended: bool,
) -> Result<FileLayout, SqfsError> {
    let blocks_start;
    let file_size;
    let frag_index;
    let frag_offset;
    if extended {
        blocks_start = cursor.read_u64(meta)?;
        file_size = cursor.read_u64(meta)?;
        let _sparse = cursor.read_u64(meta)?;
        let _link_count = cursor.read_u32(meta)?;
        frag_index = cursor.read_u32(meta)?;
        frag_offset = cursor.read_u32(meta)?;
        let _xattr = cursor.read_u32(meta)?;
    } else {
        blocks_start = u64::from(cursor.read_u32(meta)?);
        frag_index = cursor.read_u32(meta)?;
        frag_offset = cursor.read_u32(meta)?;
        file_size = u64::from(cursor.read_u32(meta)?);
    }

    let block_size = u64::from(sb.block_size);
    let fragment = if frag_index == Inode::NO_FRAGMENT {
        None
    } else {
        Some(FragmentRef {
            index: frag_index,
            offset: frag_offset,
        })
    };
    // Without a fragment, a partial tail is stored as one more block.
    let block_count = if fragment.is_none() {
        file_size.div_ceil(block_size)
    } else {
        file_size / block_size
    };

    // Each block size word takes four bytes of the image, so a count
    // that could not fit is corrupt. This also bounds the allocation.
    if block_count.saturating_mul(4) > sb.bytes_used {
        return Err(Corrupt::Inode(number).into());
    }
    let block_count =
        usize::try_from(block_count).map_err(|_| Corrupt::Inode(number))?;

    let raw = cursor.read_vec(meta, block_count * 4)?;
    let block_sizes = raw
        .chunks_exact(4)
        .map(|c| DataSize::from_raw(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
        .collect();

    Ok(FileLayout {
        blocks_start,
        file_size,
        block_sizes,
        fragment,
    })
}

fn read_dir(
    cursor: &mut MetadataCursor,
    meta: &mut MetadataReader,
    extended: bool,
) -> Result<DirLocation, SqfsError> {
    if extended {
        let _link_count = cursor.read_u32(meta)?;
        let file_size = cursor.read_u32(meta)?;
        let block_index = cursor.read_u32(meta)?;
        let _parent = cursor.read_u32(meta)?;
        let _index_count = cursor.read_u16(meta)?;
        let block_offset = cursor.read_u16(meta)?;
        let _xattr = cursor.read_u32(meta)?;
        Ok(DirLocation {
            block_index,
            block_offset,
            file_size,
        })
    } else {
        let block_index = cursor.read_u32(meta)?;
        let _link_count = cursor.read_u32(meta)?;
        let file_size = cursor.read_u16(meta)?;
        let block_offset = cursor.read_u16(meta)?;
        let _parent = cursor.read_u32(meta)?;
        Ok(DirLocation {
            block_index,
            block_offset,
            file_size: u32::from(file_size),
        })
    }
}
