// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt::{self, Display, Formatter};

/// Contiguous span of bytes in the image holding one stored data block
/// or fragment block.
///
/// `size` is the on-disk size, which may be the compressed size.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Range {
    pub offset: u64,
    pub size: u32,
}

impl Range {
    pub const fn new(offset: u64, size: u32) -> Self {
        Self { offset, size }
    }

    /// Offset of the first byte after the range.
    ///
    /// Saturates rather than overflowing, so a corrupt offset near
    /// `u64::MAX` is reported as an overlap instead of wrapping.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(u64::from(self.size))
    }
}

impl Display for Range {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:x} {:x}", self.offset, self.size)
    }
}
