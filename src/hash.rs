// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::{ManifestError, SqfsError};
use crate::range::Range;
use crate::reader::{SqfsRead, read_exact_at};
use crate::util::{u64_from_usize, usize_from_u32};
use sha2::{Digest as _, Sha256};

/// SHA-256 digest of a range.
pub type Digest = sha2::digest::Output<Sha256>;

/// Range of the image together with the digest of its raw bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ManifestEntry {
    offset: u64,
    size: u32,
    hash: Digest,
}

impl ManifestEntry {
    /// Absolute offset of the range in the image.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// On-disk size of the range.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn range(&self) -> Range {
        Range::new(self.offset, self.size)
    }

    /// SHA-256 of the bytes `[offset, offset + size)` as stored in the
    /// image.
    pub fn hash(&self) -> &Digest {
        &self.hash
    }

    /// Lowercase hex form of [`Self::hash`].
    pub fn hash_hex(&self) -> String {
        format!("{:x}", self.hash)
    }
}

/// Bytes read per call while hashing.
const CHUNK_SIZE: usize = 128 * 1024;

fn hash_range(
    reader: &mut dyn SqfsRead,
    hasher: &mut Sha256,
    buf: &mut [u8],
    range: Range,
) -> Result<Digest, SqfsError> {
    let mut pos = range.offset;
    let mut remaining = usize_from_u32(range.size);
    while remaining > 0 {
        let n = remaining.min(buf.len());
        read_exact_at(reader, pos, &mut buf[..n])?;
        hasher.update(&buf[..n]);
        pos += u64_from_usize(n);
        remaining -= n;
    }
    Ok(hasher.finalize_reset())
}

/// Hash the raw bytes of each range.
///
/// Entries are returned in the order of `ranges`. A range that cannot
/// be read in full is an error; no entry is produced from partial data.
pub fn hash_ranges(
    reader: &mut dyn SqfsRead,
    ranges: &[Range],
) -> Result<Vec<ManifestEntry>, ManifestError> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0; CHUNK_SIZE];

    ranges
        .iter()
        .map(|&range| {
            let hash = hash_range(reader, &mut hasher, &mut buf, range)
                .map_err(|source| ManifestError::RangeRead { range, source })?;
            Ok(ManifestEntry {
                offset: range.offset,
                size: range.size,
                hash,
            })
        })
        .collect()
}
