// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::compressor::{CompressorOptions, Decompressor};
use crate::error::{Corrupt, LoadStep, OpenError, SqfsError};
use crate::fragment::FragmentTable;
use crate::id_table::IdTable;
use crate::metadata::MetadataReader;
use crate::reader::{SqfsRead, read_exact_at};
use crate::superblock::{Superblock, SuperblockFlags};
use crate::tree::{TreeNode, load_tree};
use crate::util::u64_from_usize;
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

/// An open image.
///
/// Holds everything needed to extract a manifest: the backing reader,
/// the superblock, the directory hierarchy and the fragment table.
pub struct Session {
    // Fields are dropped in declaration order, which is the reverse of
    // the order they are loaded in.
    fragment_table: FragmentTable,
    root: TreeNode,
    id_table: IdTable,
    compressor_options: Option<CompressorOptions>,
    meta: MetadataReader,
    superblock: Superblock,
}

/// Read and validate the superblock.
pub(crate) fn read_superblock(
    reader: &mut dyn SqfsRead,
) -> Result<Superblock, SqfsError> {
    let mut data = [0; Superblock::SIZE_IN_BYTES_ON_DISK];
    read_exact_at(reader, 0, &mut data)?;
    Superblock::from_bytes(&data)
}

/// Check that the image holds at least `bytes_used` bytes.
///
/// Every other offset and count in the image is validated against
/// `bytes_used`, so it must not claim more data than is present.
fn check_bytes_used(
    reader: &mut dyn SqfsRead,
    sb: &Superblock,
) -> Result<(), SqfsError> {
    let err = Corrupt::BytesUsed(sb.bytes_used);
    let last = sb.bytes_used.checked_sub(1).ok_or(err.clone())?;
    let mut byte = [0; 1];
    read_exact_at(reader, last, &mut byte).map_err(|_| err)?;
    Ok(())
}

/// Read the compressor options block that follows the superblock.
///
/// Any failure is logged and treated as "no options"; the options are
/// informational and never needed to read the image.
fn read_compressor_options(
    meta: &mut MetadataReader,
    sb: &Superblock,
) -> Option<CompressorOptions> {
    let pos = u64_from_usize(Superblock::SIZE_IN_BYTES_ON_DISK);
    let data = match meta.read_block(pos) {
        Ok((data, _)) => data,
        Err(err) => {
            warn!("compressor options not available: {err}");
            return None;
        }
    };
    let options = CompressorOptions::from_bytes(sb.compressor, &data);
    if options.is_none() {
        warn!(
            compressor = %sb.compressor,
            len = data.len(),
            "compressor options not available: invalid options block"
        );
    }
    options
}

impl Session {
    /// Open the image at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OpenError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| {
            OpenError::new(LoadStep::OpenFile, SqfsError::Io(Box::new(err)))
                .with_path(path)
        })?;
        Self::load(Box::new(file)).map_err(|err| err.with_path(path))
    }

    /// Load an image from `reader`.
    pub fn load(mut reader: Box<dyn SqfsRead>) -> Result<Self, OpenError> {
        let superblock = read_superblock(&mut *reader)
            .and_then(|sb| {
                check_bytes_used(&mut *reader, &sb)?;
                Ok(sb)
            })
            .map_err(|err| OpenError::new(LoadStep::ReadSuperblock, err))?;
        debug!(
            block_size = superblock.block_size,
            compressor = %superblock.compressor,
            inodes = superblock.inode_count,
            fragments = superblock.fragment_count,
            "read super block"
        );

        let decompressor = Decompressor::new(superblock.compressor)
            .map_err(|err| {
                OpenError::new(LoadStep::CreateCompressor, err.into())
            })?;
        let mut meta = MetadataReader::new(reader, decompressor);

        let compressor_options = if superblock
            .flags
            .contains(SuperblockFlags::COMPRESSOR_OPTIONS)
        {
            read_compressor_options(&mut meta, &superblock)
        } else {
            None
        };

        let id_table = IdTable::load(&mut meta, &superblock)
            .map_err(|err| OpenError::new(LoadStep::LoadIdTable, err))?;
        debug!(ids = id_table.len(), "loaded ID table");

        let root = load_tree(&mut meta, &superblock, &id_table)
            .map_err(|err| OpenError::new(LoadStep::LoadTree, err))?;
        debug!(nodes = root.walk().count(), "loaded filesystem tree");

        let fragment_table = FragmentTable::load(&mut meta, &superblock)
            .map_err(|err| OpenError::new(LoadStep::LoadFragmentTable, err))?;
        debug!(fragments = fragment_table.len(), "loaded fragment table");

        Ok(Self {
            fragment_table,
            root,
            id_table,
            compressor_options,
            meta,
            superblock,
        })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    /// Options of the compressor, if the image stores them and they
    /// could be read.
    pub fn compressor_options(&self) -> Option<&CompressorOptions> {
        self.compressor_options.as_ref()
    }

    pub fn id_table(&self) -> &IdTable {
        &self.id_table
    }

    /// Root of the directory hierarchy.
    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn fragment_table(&self) -> &FragmentTable {
        &self.fragment_table
    }

    /// Reader for the raw bytes of the image.
    pub(crate) fn reader(&mut self) -> &mut dyn SqfsRead {
        self.meta.reader()
    }
}
