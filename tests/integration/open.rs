// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::test_util::ImageBuilder;
use crate::write_image;
use sqfs_manifest::{
    Corrupt, LoadStep, ManifestError, get_blocks, get_inode_table_offset,
    inode_table_start,
};

fn expect_open_error(err: ManifestError) -> sqfs_manifest::OpenError {
    match err {
        ManifestError::Open(err) => err,
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_wrong_magic() {
    let mut image = ImageBuilder::new(4096).build();
    image[..4].copy_from_slice(b"sqsh");
    let tmp = write_image(&image);

    let err = expect_open_error(get_blocks(tmp.path()).unwrap_err());
    assert_eq!(err.step(), LoadStep::ReadSuperblock);
    assert_eq!(*err.error(), Corrupt::SuperblockMagic);
    assert_eq!(err.path(), Some(tmp.path()));

    assert_eq!(get_inode_table_offset(tmp.path()), 0);
    assert_eq!(
        *inode_table_start(tmp.path()).unwrap_err().error(),
        Corrupt::SuperblockMagic
    );
}

#[test]
fn test_not_an_image() {
    let tmp = write_image(b"just some text, shorter than a superblock");
    assert!(get_blocks(tmp.path()).is_err());
    assert_eq!(get_inode_table_offset(tmp.path()), 0);
}

#[test]
fn test_missing_file() {
    let path = "/this/path/does/not/exist.sqfs";
    let err = expect_open_error(get_blocks(path).unwrap_err());
    assert_eq!(err.step(), LoadStep::OpenFile);
    assert!(err.to_string().starts_with(path));
    assert_eq!(get_inode_table_offset(path), 0);
}

/// An image cut short after the superblock fails as a whole, even
/// though the inode table offset can still be read.
#[test]
fn test_truncated_image() {
    let image = ImageBuilder::new(4096).build();
    let tmp = write_image(&image[..120]);

    let err = expect_open_error(get_blocks(tmp.path()).unwrap_err());
    assert_eq!(err.step(), LoadStep::ReadSuperblock);
    let bytes_used = u64::try_from(image.len()).unwrap();
    assert_eq!(*err.error(), Corrupt::BytesUsed(bytes_used));

    assert_ne!(get_inode_table_offset(tmp.path()), 0);
}
