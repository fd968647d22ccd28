// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::compressor::Compressor;
use crate::error::{Corrupt, Incompatible, SqfsError};
use crate::util::{read_u16le, read_u32le, read_u64le};
use bitflags::bitflags;

bitflags! {
    /// Superblock flags.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
    pub struct SuperblockFlags: u16 {
        const UNCOMPRESSED_INODES = 0x1;
        const UNCOMPRESSED_DATA = 0x2;
        const CHECK = 0x4;
        const UNCOMPRESSED_FRAGMENTS = 0x8;
        const NO_FRAGMENTS = 0x10;
        const ALWAYS_FRAGMENTS = 0x20;

        /// Identical files share data blocks.
        const DUPLICATES = 0x40;

        /// The image has an export table for NFS.
        const EXPORTABLE = 0x80;

        const UNCOMPRESSED_XATTRS = 0x100;
        const NO_XATTRS = 0x200;

        /// A compressor options block follows the superblock.
        const COMPRESSOR_OPTIONS = 0x400;

        const UNCOMPRESSED_IDS = 0x800;
    }
}

/// Information about the image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Superblock {
    pub(crate) inode_count: u32,
    pub(crate) modification_time: u32,
    pub(crate) block_size: u32,
    pub(crate) fragment_count: u32,
    pub(crate) compressor: Compressor,
    pub(crate) flags: SuperblockFlags,
    pub(crate) id_count: u16,
    pub(crate) root_inode_ref: u64,
    pub(crate) bytes_used: u64,
    pub(crate) id_table_start: u64,
    pub(crate) inode_table_start: u64,
    pub(crate) directory_table_start: u64,
    pub(crate) fragment_table_start: u64,
}

impl Superblock {
    /// Size (in bytes) of the superblock on disk.
    pub const SIZE_IN_BYTES_ON_DISK: usize = 96;

    /// Little-endian "hsqs".
    pub(crate) const MAGIC: u32 = 0x7371_7368;

    const MIN_BLOCK_SIZE: u32 = 4096;
    const MAX_BLOCK_SIZE: u32 = 1024 * 1024;

    /// Construct `Superblock` from bytes.
    ///
    /// # Panics
    ///
    /// Panics if the length of `bytes` is less than
    /// [`Self::SIZE_IN_BYTES_ON_DISK`].
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, SqfsError> {
        assert!(bytes.len() >= Self::SIZE_IN_BYTES_ON_DISK);

        let s_magic = read_u32le(bytes, 0x0);
        let s_inode_count = read_u32le(bytes, 0x4);
        let s_modification_time = read_u32le(bytes, 0x8);
        let s_block_size = read_u32le(bytes, 0xc);
        let s_fragment_entry_count = read_u32le(bytes, 0x10);
        let s_compression_id = read_u16le(bytes, 0x14);
        let s_block_log = read_u16le(bytes, 0x16);
        let s_flags = read_u16le(bytes, 0x18);
        let s_id_count = read_u16le(bytes, 0x1a);
        let s_version_major = read_u16le(bytes, 0x1c);
        let s_version_minor = read_u16le(bytes, 0x1e);
        let s_root_inode_ref = read_u64le(bytes, 0x20);
        let s_bytes_used = read_u64le(bytes, 0x28);
        let s_id_table_start = read_u64le(bytes, 0x30);
        let s_inode_table_start = read_u64le(bytes, 0x40);
        let s_directory_table_start = read_u64le(bytes, 0x48);
        let s_fragment_table_start = read_u64le(bytes, 0x50);

        if s_magic != Self::MAGIC {
            return Err(Corrupt::SuperblockMagic.into());
        }

        if s_version_major != 4 || s_version_minor != 0 {
            return Err(Incompatible::Version {
                major: s_version_major,
                minor: s_version_minor,
            }
            .into());
        }

        if !s_block_size.is_power_of_two()
            || !(Self::MIN_BLOCK_SIZE..=Self::MAX_BLOCK_SIZE)
                .contains(&s_block_size)
        {
            return Err(Incompatible::BlockSize(s_block_size).into());
        }

        if u32::from(s_block_log) != s_block_size.trailing_zeros() {
            return Err(Corrupt::BlockLog(s_block_log).into());
        }

        let compressor = Compressor::from_id(s_compression_id)?;

        if s_id_count == 0 {
            return Err(Corrupt::EmptyIdTable.into());
        }

        Ok(Self {
            inode_count: s_inode_count,
            modification_time: s_modification_time,
            block_size: s_block_size,
            fragment_count: s_fragment_entry_count,
            compressor,
            flags: SuperblockFlags::from_bits_retain(s_flags),
            id_count: s_id_count,
            root_inode_ref: s_root_inode_ref,
            bytes_used: s_bytes_used,
            id_table_start: s_id_table_start,
            inode_table_start: s_inode_table_start,
            directory_table_start: s_directory_table_start,
            fragment_table_start: s_fragment_table_start,
        })
    }

    /// Size of a full data block in bytes.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Number of inodes in the image.
    pub fn inode_count(&self) -> u32 {
        self.inode_count
    }

    /// Number of entries in the fragment table.
    pub fn fragment_count(&self) -> u32 {
        self.fragment_count
    }

    /// Compressor used for metadata and data blocks.
    pub fn compressor(&self) -> Compressor {
        self.compressor
    }

    pub fn flags(&self) -> SuperblockFlags {
        self.flags
    }

    /// Last modification time, in seconds since the UNIX epoch.
    pub fn modification_time(&self) -> u32 {
        self.modification_time
    }

    /// Number of bytes of the backing file used by the image.
    pub fn bytes_used(&self) -> u64 {
        self.bytes_used
    }

    /// Absolute offset of the inode table. Data blocks and fragment
    /// blocks are all stored before this offset.
    pub fn inode_table_start(&self) -> u64 {
        self.inode_table_start
    }

    /// Absolute offset of the directory table.
    pub fn directory_table_start(&self) -> u64 {
        self.directory_table_start
    }

    /// Absolute offset of the fragment table index.
    pub fn fragment_table_start(&self) -> u64 {
        self.fragment_table_start
    }

    /// Absolute offset of the ID table index.
    pub fn id_table_start(&self) -> u64 {
        self.id_table_start
    }
}
