// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::test_util::{ImageBuilder, TestFile};
use crate::write_image;
use sqfs_manifest::{MatchSummary, get_blocks, match_blocks};

fn image(prefix: &[u8], blocks: &[&[u8]]) -> Vec<u8> {
    let mut builder = ImageBuilder::new(4096);
    let root = builder.root();
    builder.push_data(prefix);
    for (i, block) in blocks.iter().enumerate() {
        let start = builder.push_data(block);
        builder.add_file(
            root,
            format!("file{i}").as_bytes(),
            TestFile {
                blocks_start: start,
                block_sizes: vec![u32::try_from(block.len()).unwrap()],
                fragment: None,
                file_size: 100,
                extended: false,
            },
        );
    }
    builder.build()
}

/// Blocks that move between versions are still matched by content.
#[test]
fn test_moved_blocks() {
    let one = [0x11; 300];
    let two = [0x22; 200];
    let three = [0x33; 100];

    let old = write_image(&image(&[], &[&one, &two]));
    let new = write_image(&image(&[0xff; 64], &[&three, &one, &two]));

    let old = get_blocks(old.path()).unwrap();
    let new = get_blocks(new.path()).unwrap();
    let matches = match_blocks(old.entries(), new.entries());

    assert_eq!(matches.len(), 3);
    // "three" is new.
    assert_eq!(matches[0].old_offset, None);
    // "one" and "two" moved by 164 bytes.
    assert_eq!(matches[1].old_offset, Some(old.entries()[0].offset()));
    assert_eq!(matches[1].new.offset, old.entries()[0].offset() + 164);
    assert_eq!(matches[2].old_offset, Some(old.entries()[1].offset()));

    assert_eq!(
        MatchSummary::from_matches(&matches),
        MatchSummary {
            reused_blocks: 2,
            reused_bytes: 500,
            new_blocks: 1,
            new_bytes: 100,
        }
    );
}
