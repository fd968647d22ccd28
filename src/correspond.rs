// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Matching of blocks between two versions of an image.

use crate::hash::{Digest, ManifestEntry};
use crate::range::Range;
use std::collections::HashMap;

/// A block of the new image, and where the same content is stored in
/// the old image.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockMatch {
    pub new: Range,

    /// Offset of a block in the old image with the same size and
    /// digest, if there is one.
    pub old_offset: Option<u64>,
}

/// Totals over a list of [`BlockMatch`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MatchSummary {
    pub reused_blocks: usize,
    pub reused_bytes: u64,
    pub new_blocks: usize,
    pub new_bytes: u64,
}

impl MatchSummary {
    pub fn from_matches(matches: &[BlockMatch]) -> Self {
        let mut summary = Self::default();
        for m in matches {
            let size = u64::from(m.new.size);
            if m.old_offset.is_some() {
                summary.reused_blocks += 1;
                summary.reused_bytes += size;
            } else {
                summary.new_blocks += 1;
                summary.new_bytes += size;
            }
        }
        summary
    }
}

/// For each entry of `new`, find an entry of `old` holding the same
/// bytes.
///
/// If several old entries match, the one with the lowest offset is
/// used.
pub fn match_blocks(
    old: &[ManifestEntry],
    new: &[ManifestEntry],
) -> Vec<BlockMatch> {
    let mut by_content: HashMap<(u32, &Digest), u64> = HashMap::new();
    for entry in old {
        by_content
            .entry((entry.size(), entry.hash()))
            .and_modify(|offset| *offset = (*offset).min(entry.offset()))
            .or_insert(entry.offset());
    }

    new.iter()
        .map(|entry| BlockMatch {
            new: entry.range(),
            old_offset: by_content.get(&(entry.size(), entry.hash())).copied(),
        })
        .collect()
}
