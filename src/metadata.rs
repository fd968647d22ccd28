// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::compressor::Decompressor;
use crate::error::{Corrupt, SqfsError};
use crate::reader::{SqfsRead, read_exact_at};
use crate::util::{read_u64le, u64_from_usize, usize_from_u32};
use std::collections::HashMap;
use std::rc::Rc;

/// Maximum size of a decompressed metadata block.
pub(crate) const METADATA_BLOCK_SIZE: usize = 8192;

/// Location of an object (inode, directory listing) within a metadata
/// table.
///
/// On disk this is packed into a `u64`: the upper 48 bits are the
/// offset of the metadata block relative to the start of the table,
/// the lower 16 bits are the offset within the decompressed block.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) struct MetadataRef {
    pub(crate) block: u64,
    pub(crate) offset: u16,
}

impl MetadataRef {
    pub(crate) fn from_raw(raw: u64) -> Self {
        let [lo, hi, ..] = raw.to_le_bytes();
        Self {
            block: raw >> 16,
            offset: u16::from_le_bytes([lo, hi]),
        }
    }

    pub(crate) fn to_raw(self) -> u64 {
        (self.block << 16) | u64::from(self.offset)
    }
}

struct CachedBlock {
    data: Rc<[u8]>,

    /// Absolute offset of the block that follows this one.
    next: u64,
}

/// Reads and caches metadata blocks.
///
/// A metadata block is a `u16` header followed by up to 8KiB of
/// data. The low 15 bits of the header give the stored size, the high
/// bit is set if the data is stored uncompressed.
pub(crate) struct MetadataReader {
    reader: Box<dyn SqfsRead>,
    decompressor: Decompressor,
    cache: HashMap<u64, CachedBlock>,
}

impl MetadataReader {
    const UNCOMPRESSED: u16 = 0x8000;

    pub(crate) fn new(
        reader: Box<dyn SqfsRead>,
        decompressor: Decompressor,
    ) -> Self {
        Self {
            reader,
            decompressor,
            cache: HashMap::new(),
        }
    }

    pub(crate) fn reader(&mut self) -> &mut dyn SqfsRead {
        &mut *self.reader
    }

    /// Read the metadata block at absolute offset `pos`.
    ///
    /// Returns the decompressed data and the absolute offset of the
    /// next block.
    pub(crate) fn read_block(
        &mut self,
        pos: u64,
    ) -> Result<(Rc<[u8]>, u64), SqfsError> {
        if let Some(block) = self.cache.get(&pos) {
            return Ok((block.data.clone(), block.next));
        }

        let mut header = [0; 2];
        read_exact_at(&mut *self.reader, pos, &mut header)?;
        let header = u16::from_le_bytes(header);
        let stored_size = usize::from(header & !Self::UNCOMPRESSED);
        if stored_size == 0 || stored_size > METADATA_BLOCK_SIZE {
            return Err(Corrupt::MetadataHeader(pos).into());
        }

        let data_pos = pos
            .checked_add(2)
            .ok_or(Corrupt::MetadataHeader(pos))?;
        let next = data_pos
            .checked_add(u64_from_usize(stored_size))
            .ok_or(Corrupt::MetadataHeader(pos))?;

        let mut stored = vec![0; stored_size];
        read_exact_at(&mut *self.reader, data_pos, &mut stored)?;

        let data = if header & Self::UNCOMPRESSED != 0 {
            stored
        } else {
            self.decompressor
                .decompress(&stored, pos, METADATA_BLOCK_SIZE)?
        };

        let data: Rc<[u8]> = data.into();
        self.cache.insert(
            pos,
            CachedBlock {
                data: data.clone(),
                next,
            },
        );
        Ok((data, next))
    }

    /// Read a lookup table such as the ID table or fragment table.
    ///
    /// These tables are stored in two levels. The entries are packed
    /// into metadata blocks, and an index of absolute `u64` offsets to
    /// those blocks is stored at `index_start`.
    pub(crate) fn read_table(
        &mut self,
        table: &'static str,
        index_start: u64,
        count: u32,
        entry_size: usize,
        image_len: u64,
    ) -> Result<Vec<u8>, SqfsError> {
        let table_err = || Corrupt::Table {
            table,
            count: u64::from(count),
        };

        if count == 0 {
            return Ok(Vec::new());
        }

        let total = usize_from_u32(count)
            .checked_mul(entry_size)
            .ok_or_else(table_err)?;
        let num_blocks = total.div_ceil(METADATA_BLOCK_SIZE);
        let index_len = num_blocks * size_of::<u64>();
        // The index is stored uncompressed, so it must fit in the image.
        if u64_from_usize(index_len) > image_len {
            return Err(table_err().into());
        }

        let mut index = vec![0; index_len];
        read_exact_at(&mut *self.reader, index_start, &mut index)?;

        let mut out = Vec::new();
        for i in 0..num_blocks {
            let pos = read_u64le(&index, i * size_of::<u64>());
            let (data, _) = self.read_block(pos)?;
            out.extend_from_slice(&data);
        }

        if out.len() < total {
            return Err(table_err().into());
        }
        out.truncate(total);
        Ok(out)
    }
}

/// Sequential reader over a metadata table, starting at a
/// [`MetadataRef`]. Reads continue across block boundaries.
pub(crate) struct MetadataCursor {
    /// Absolute offset of the current block.
    block: u64,

    /// Offset within the current block's decompressed data.
    offset: usize,
}

impl MetadataCursor {
    pub(crate) fn new(
        table_start: u64,
        mref: MetadataRef,
    ) -> Result<Self, SqfsError> {
        let block = table_start
            .checked_add(mref.block)
            .ok_or(Corrupt::MetadataRef(mref.to_raw()))?;
        if usize::from(mref.offset) >= METADATA_BLOCK_SIZE {
            return Err(Corrupt::MetadataRef(mref.to_raw()).into());
        }
        Ok(Self {
            block,
            offset: usize::from(mref.offset),
        })
    }

    pub(crate) fn read(
        &mut self,
        meta: &mut MetadataReader,
        dst: &mut [u8],
    ) -> Result<(), SqfsError> {
        let mut filled = 0;
        while filled < dst.len() {
            let (data, next) = meta.read_block(self.block)?;
            if self.offset == data.len() {
                self.block = next;
                self.offset = 0;
                continue;
            }
            if self.offset > data.len() {
                return Err(Corrupt::MetadataRef(self.block).into());
            }

            let n = (data.len() - self.offset).min(dst.len() - filled);
            dst[filled..filled + n]
                .copy_from_slice(&data[self.offset..self.offset + n]);
            filled += n;
            self.offset += n;
        }
        Ok(())
    }

    /// Read `len` bytes.
    ///
    /// The output grows one block at a time as data is decoded, so a
    /// corrupt length fails when the table runs out instead of
    /// allocating `len` bytes up front.
    pub(crate) fn read_vec(
        &mut self,
        meta: &mut MetadataReader,
        len: usize,
    ) -> Result<Vec<u8>, SqfsError> {
        let mut buf = Vec::new();
        let mut chunk = [0; METADATA_BLOCK_SIZE];
        while buf.len() < len {
            let n = (len - buf.len()).min(chunk.len());
            self.read(meta, &mut chunk[..n])?;
            buf.extend_from_slice(&chunk[..n]);
        }
        Ok(buf)
    }

    pub(crate) fn read_u16(
        &mut self,
        meta: &mut MetadataReader,
    ) -> Result<u16, SqfsError> {
        let mut buf = [0; 2];
        self.read(meta, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub(crate) fn read_u32(
        &mut self,
        meta: &mut MetadataReader,
    ) -> Result<u32, SqfsError> {
        let mut buf = [0; 4];
        self.read(meta, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub(crate) fn read_u64(
        &mut self,
        meta: &mut MetadataReader,
    ) -> Result<u64, SqfsError> {
        let mut buf = [0; 8];
        self.read(meta, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}
