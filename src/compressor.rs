// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::{Corrupt, Incompatible, SqfsError};
use crate::util::{read_u16le, read_u32le, u64_from_usize};
use std::fmt::{self, Display, Formatter};
use std::io::{self, Read, Write};

/// Compression algorithm used for the image.
///
/// Only metadata blocks are ever decompressed by this crate; data
/// blocks are hashed as stored.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Compressor {
    Gzip,
    Lzma,
    Lzo,
    Xz,
    Lz4,
    Zstd,
}

impl Compressor {
    /// Get the compressor from the superblock `compression_id` field.
    pub(crate) fn from_id(id: u16) -> Result<Self, Incompatible> {
        match id {
            1 => Ok(Self::Gzip),
            2 => Ok(Self::Lzma),
            3 => Ok(Self::Lzo),
            4 => Ok(Self::Xz),
            5 => Ok(Self::Lz4),
            6 => Ok(Self::Zstd),
            _ => Err(Incompatible::UnknownCompressor(id)),
        }
    }

    /// Value of the superblock `compression_id` field.
    pub fn id(self) -> u16 {
        match self {
            Self::Gzip => 1,
            Self::Lzma => 2,
            Self::Lzo => 3,
            Self::Xz => 4,
            Self::Lz4 => 5,
            Self::Zstd => 6,
        }
    }
}

impl Display for Compressor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gzip => "gzip",
            Self::Lzma => "lzma",
            Self::Lzo => "lzo",
            Self::Xz => "xz",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        };
        f.write_str(s)
    }
}

/// Compressor-specific settings stored directly after the superblock.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompressorOptions {
    Gzip {
        level: u32,
        window_size: u16,
        strategies: u16,
    },
    Xz {
        dictionary_size: u32,
        filters: u32,
    },
    Lz4 {
        version: u32,
        flags: u32,
    },
    Zstd {
        level: u32,
    },
    Lzo {
        algorithm: u32,
        level: u32,
    },
}

impl CompressorOptions {
    /// Parse the options for `compressor` from the decompressed
    /// contents of the options metadata block.
    ///
    /// Returns `None` if the options are not valid for the compressor.
    pub(crate) fn from_bytes(
        compressor: Compressor,
        bytes: &[u8],
    ) -> Option<Self> {
        let expected_len = match compressor {
            Compressor::Zstd => 4,
            // Legacy lzma has no options.
            Compressor::Lzma => return None,
            _ => 8,
        };
        if bytes.len() != expected_len {
            return None;
        }

        let opts = match compressor {
            Compressor::Gzip => {
                let level = read_u32le(bytes, 0);
                let window_size = read_u16le(bytes, 4);
                if !(1..=9).contains(&level) || !(8..=15).contains(&window_size)
                {
                    return None;
                }
                Self::Gzip {
                    level,
                    window_size,
                    strategies: read_u16le(bytes, 6),
                }
            }
            Compressor::Xz => Self::Xz {
                dictionary_size: read_u32le(bytes, 0),
                filters: read_u32le(bytes, 4),
            },
            Compressor::Lz4 => {
                // Only the legacy frame format (version 1) exists.
                let version = read_u32le(bytes, 0);
                if version != 1 {
                    return None;
                }
                Self::Lz4 {
                    version,
                    flags: read_u32le(bytes, 4),
                }
            }
            Compressor::Zstd => {
                let level = read_u32le(bytes, 0);
                if !(1..=22).contains(&level) {
                    return None;
                }
                Self::Zstd { level }
            }
            Compressor::Lzo => Self::Lzo {
                algorithm: read_u32le(bytes, 0),
                level: read_u32le(bytes, 4),
            },
            Compressor::Lzma => return None,
        };
        Some(opts)
    }
}

/// Memory limit for the xz decoder. Images use a dictionary no larger
/// than the 1MiB maximum block size.
const XZ_MEMLIMIT: u64 = 64 * 1024 * 1024;

/// Read at most `max_len + 1` bytes from `reader`.
///
/// The extra byte lets the caller tell oversized output apart from
/// output that is exactly `max_len` bytes.
fn read_limited<R: Read>(reader: R, max_len: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader
        .take(u64_from_usize(max_len) + 1)
        .read_to_end(&mut out)?;
    Ok(out)
}

/// Output buffer that fails once more than `limit` bytes are written.
struct LimitedWriter {
    buf: Vec<u8>,
    limit: usize,
}

impl LimitedWriter {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }
}

impl Write for LimitedWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buf.len() + data.len() > self.limit {
            return Err(io::Error::other(format!(
                "output exceeds {} bytes",
                self.limit
            )));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Decompressor for metadata blocks.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Decompressor {
    compressor: Compressor,
}

impl Decompressor {
    /// Create a decompressor. Fails if decompression is not
    /// implemented for `compressor`.
    pub(crate) fn new(compressor: Compressor) -> Result<Self, Incompatible> {
        if compressor == Compressor::Lzo {
            return Err(Incompatible::UnsupportedCompressor(compressor));
        }
        Ok(Self { compressor })
    }

    /// Decompress `src`, which was read from absolute offset `offset`
    /// in the image. The output may not exceed `max_len` bytes.
    pub(crate) fn decompress(
        &self,
        src: &[u8],
        offset: u64,
        max_len: usize,
    ) -> Result<Vec<u8>, SqfsError> {
        let err = |message: String| {
            SqfsError::Corrupt(Corrupt::Decompress {
                compressor: self.compressor,
                offset,
                message,
            })
        };

        let out = match self.compressor {
            Compressor::Gzip => {
                read_limited(flate2::read::ZlibDecoder::new(src), max_len)
                    .map_err(|e| err(e.to_string()))?
            }
            Compressor::Lzma => {
                // Bound both the dictionary and the output.
                let options = lzma_rs::decompress::Options {
                    memlimit: Some(max_len + 1),
                    ..Default::default()
                };
                let mut out = LimitedWriter::new(max_len + 1);
                lzma_rs::lzma_decompress_with_options(
                    &mut &*src,
                    &mut out,
                    &options,
                )
                .map_err(|e| err(e.to_string()))?;
                out.buf
            }
            Compressor::Xz => {
                xz2::stream::Stream::new_stream_decoder(XZ_MEMLIMIT, 0)
                    .map_err(io::Error::from)
                    .and_then(|stream| {
                        read_limited(
                            xz2::read::XzDecoder::new_stream(src, stream),
                            max_len,
                        )
                    })
                    .map_err(|e| err(e.to_string()))?
            }
            Compressor::Lz4 => {
                let mut out = vec![0; max_len];
                let len = lz4_flex::block::decompress_into(src, &mut out)
                    .map_err(|e| err(e.to_string()))?;
                out.truncate(len);
                out
            }
            Compressor::Zstd => zstd::stream::read::Decoder::new(src)
                .and_then(|decoder| read_limited(decoder, max_len))
                .map_err(|e| err(e.to_string()))?,
            Compressor::Lzo => {
                return Err(Incompatible::UnsupportedCompressor(
                    self.compressor,
                )
                .into());
            }
        };

        if out.is_empty() || out.len() > max_len {
            return Err(err(format!(
                "decompressed size {} is not in 1..={max_len}",
                out.len()
            )));
        }
        Ok(out)
    }
}
