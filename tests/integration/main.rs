// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod correspond;
mod open;

use sha2::{Digest as _, Sha256};
use sqfs_manifest::Digest;
use std::io::Write;
use tempfile::NamedTempFile;

#[allow(dead_code)]
mod test_util {
    include!("../../src/test_util.rs");
}

/// Write `image` to a temporary file.
fn write_image(image: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(image).unwrap();
    file.flush().unwrap();
    file
}

/// Digest of `len` bytes at `offset`, read directly from the file.
fn file_digest(path: &std::path::Path, offset: u64, len: u32) -> Digest {
    let data = std::fs::read(path).unwrap();
    let start = usize::try_from(offset).unwrap();
    let end = start + usize::try_from(len).unwrap();
    Sha256::digest(&data[start..end])
}
