// Copyright 2024 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::error::{Error, Reason, Result};
use byteorder::{ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use memmap2::Mmap;
use std::{fs::File, io::Read, path::Path};


/// First four bytes of an uncompressed XRK image.
pub const XRK_MAGIC: [u8; 4] = *b"XRK\x1a";
/// First four bytes of the XRZ container wrapping a deflated XRK image.
pub const XRZ_MAGIC: [u8; 4] = *b"XRZ\x1a";

/// Byte length of the XRZ container preamble: magic plus the u64
/// uncompressed length.
const XRZ_PREAMBLE: usize = 12;


/// Read-only byte image of an uncompressed XRK file. Plain XRK files are
/// memory mapped; XRZ files are inflated into an owned buffer on open. The
/// distinction is invisible to callers, which only ever see `&[u8]`.
#[derive(Debug)]
pub enum ByteSource {
  Mapped(Mmap),
  Owned(Vec<u8>),
}

impl ByteSource {
  /// Opens `path` and yields the uncompressed XRK image. The container
  /// kind is determined by the `.xrz` extension or, failing that, by the
  /// magic, so a misnamed file still opens.
  pub fn open(path: &Path) -> Result<Self> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
      return Err(Error::format(0, Reason::ShortHeader));
    }

    // Mapping is cheap and read-only; the map stays valid for the lifetime
    // of this object and nothing in this crate writes through it.
    let map = unsafe { Mmap::map(&file)? };

    let by_extension = path.extension()
                           .and_then(|ext| ext.to_str())
                           .map(|ext| ext.eq_ignore_ascii_case("xrz"))
                           .unwrap_or(false);
    let by_magic = map.len() >= XRZ_MAGIC.len() && map[..4] == XRZ_MAGIC;

    if by_extension || by_magic {
      tracing::debug!("inflating XRZ container: {}", path.display());
      Ok(Self::Owned(inflate(&map)?))
    } else {
      Ok(Self::Mapped(map))
    }
  }

  pub fn bytes(&self) -> &[u8] {
    match self {
      Self::Mapped(map) => map,
      Self::Owned(buffer) => buffer,
    }
  }
}


/// Unpacks the XRZ container: magic, u64 uncompressed length, zlib stream
/// of the complete XRK image.
fn inflate(data: &[u8]) -> Result<Vec<u8>> {
  if data.len() < XRZ_PREAMBLE || data[..4] != XRZ_MAGIC {
    return Err(Error::format(0, Reason::BadCompression));
  }

  let expected = LittleEndian::read_u64(&data[4..12]) as usize;
  let mut image = Vec::with_capacity(expected);
  ZlibDecoder::new(&data[XRZ_PREAMBLE..]).read_to_end(&mut image)
                                         .map_err(|_| {
                                           Error::format(0,
                                                         Reason::BadCompression)
                                         })?;

  if image.len() != expected {
    return Err(Error::format(0, Reason::BadCompression));
  }
  Ok(image)
}
