// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::{IoError, SqfsError};
use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

impl IoError for std::io::Error {}

fn box_err<E: IoError>(err: E) -> Box<dyn IoError> {
    Box::new(err)
}

/// Interface used by [`Session`] to read the image from a storage file
/// or device.
///
/// Both the image structures and the raw data ranges that get hashed
/// are read through this trait, so a positioned read must return
/// exactly the bytes stored in the image.
///
/// [`Session`]: crate::Session
pub trait SqfsRead {
    /// Read bytes into `dst`, starting at `start_byte`.
    ///
    /// Exactly `dst.len()` bytes will be read; an error will be
    /// returned if there is not enough data to fill `dst`, or if the
    /// data cannot be read for any reason.
    fn read(
        &mut self,
        start_byte: u64,
        dst: &mut [u8],
    ) -> Result<(), Box<dyn IoError>>;
}

impl SqfsRead for File {
    fn read(
        &mut self,
        start_byte: u64,
        dst: &mut [u8],
    ) -> Result<(), Box<dyn IoError>> {
        self.seek(SeekFrom::Start(start_byte)).map_err(box_err)?;
        self.read_exact(dst).map_err(box_err)?;
        Ok(())
    }
}

/// Error type used by the [`Vec<u8>`] impl of [`SqfsRead`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemIoError {
    start: u64,
    read_len: usize,
    src_len: usize,
}

impl IoError for MemIoError {}

impl Display for MemIoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to read {} bytes at offset {} from a slice of length {}",
            self.read_len, self.start, self.src_len
        )
    }
}

impl std::error::Error for MemIoError {}

impl SqfsRead for Vec<u8> {
    fn read(
        &mut self,
        start_byte: u64,
        dst: &mut [u8],
    ) -> Result<(), Box<dyn IoError>> {
        let err = || {
            box_err(MemIoError {
                start: start_byte,
                read_len: dst.len(),
                src_len: self.len(),
            })
        };

        let start = usize::try_from(start_byte).map_err(|_| err())?;
        let end = start.checked_add(dst.len()).ok_or_else(err)?;
        let src = self.get(start..end).ok_or_else(err)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

/// Read `dst.len()` bytes at `start_byte`, converting the error.
pub(crate) fn read_exact_at(
    reader: &mut dyn SqfsRead,
    start_byte: u64,
    dst: &mut [u8],
) -> Result<(), SqfsError> {
    reader.read(start_byte, dst).map_err(SqfsError::Io)
}
