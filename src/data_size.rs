// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt::{self, Debug, Formatter};

/// On-disk size and flags of a data block or fragment block.
///
/// The low 24 bits hold the number of bytes the block occupies in the
/// image. Bit 24 is set if the block is stored uncompressed. A block
/// with an on-disk size of zero is sparse: it reads as all zeros and
/// occupies no space in the image.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct DataSize(u32);

impl DataSize {
    const UNCOMPRESSED: u32 = 1 << 24;
    const SIZE_MASK: u32 = Self::UNCOMPRESSED - 1;

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Number of bytes the block occupies in the image.
    pub const fn on_disk_size(self) -> u32 {
        self.0 & Self::SIZE_MASK
    }

    pub const fn is_compressed(self) -> bool {
        self.0 & Self::UNCOMPRESSED == 0
    }

    pub const fn is_sparse(self) -> bool {
        self.on_disk_size() == 0
    }
}

impl Debug for DataSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSize")
            .field("on_disk_size", &self.on_disk_size())
            .field("compressed", &self.is_compressed())
            .finish()
    }
}
