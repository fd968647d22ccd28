// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::Invariant;
use crate::range::Range;
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use tracing::{info, warn};

/// Anomaly between two adjacent ranges of a canonical range list.
///
/// Diagnostics never stop extraction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Diagnostic {
    /// Bytes between the two ranges are not covered by any range.
    Gap { before: Range, after: Range },

    /// `after` starts before `before` ends.
    Overlap { before: Range, after: Range },
}

impl Diagnostic {
    pub fn is_gap(&self) -> bool {
        matches!(self, Self::Gap { .. })
    }

    pub fn is_overlap(&self) -> bool {
        matches!(self, Self::Overlap { .. })
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gap { before, after } => {
                write!(f, "gap between blocks {before} and {after}")
            }
            Self::Overlap { before, after } => {
                write!(f, "overlap between blocks {before} and {after}")
            }
        }
    }
}

/// Sorted, deduplicated ranges plus the anomalies found between them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Canonical {
    pub ranges: Vec<Range>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Sort `ranges` by offset, drop exact duplicates, and check the
/// boundary between each adjacent pair.
///
/// Ranges that share an offset but differ in size are both kept; the
/// pair is reported as an overlap.
pub fn canonicalize(mut ranges: Vec<Range>) -> Result<Canonical, Invariant> {
    ranges.sort_unstable();
    check_sorted(&ranges)?;
    ranges.dedup();

    let diagnostics = ranges
        .windows(2)
        .filter_map(|w| classify(w[0], w[1]))
        .inspect(|diag| {
            if diag.is_gap() {
                info!("{diag}");
            } else {
                warn!("{diag}");
            }
        })
        .collect();

    Ok(Canonical {
        ranges,
        diagnostics,
    })
}

fn check_sorted(ranges: &[Range]) -> Result<(), Invariant> {
    match ranges.windows(2).position(|w| w[0].offset > w[1].offset) {
        Some(pos) => Err(Invariant::UnsortedRanges(pos + 1)),
        None => Ok(()),
    }
}

fn classify(before: Range, after: Range) -> Option<Diagnostic> {
    match before.end().cmp(&after.offset) {
        Ordering::Less => Some(Diagnostic::Gap { before, after }),
        Ordering::Greater => Some(Diagnostic::Overlap { before, after }),
        Ordering::Equal => None,
    }
}
