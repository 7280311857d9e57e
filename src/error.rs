// Copyright 2024 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use serde::Serialize;
use std::fmt;
use thiserror::Error;


/// Library result type. Everything fallible in this crate reports `Error`.
pub type Result<T> = std::result::Result<T, Error>;


/// Why a byte range could not be understood as XRK data.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum Reason {
  #[error("bad magic")]
  BadMagic,
  #[error("short header")]
  ShortHeader,
  #[error("truncated")]
  Truncated,
  #[error("unrecoverable")]
  Unrecoverable,
  #[error("field out of range: {0}")]
  FieldOutOfRange(&'static str),
  #[error("bad compression")]
  BadCompression,
}


/// Errors which abort a parse. `Io` covers opening and reading the file,
/// `Format` covers everything between the first byte and the last. The
/// `position` of a `Format` error is the absolute file offset at which the
/// data stopped making sense.
#[derive(Debug, Error)]
pub enum Error {
  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),
  #[error("format error at byte {position}: {reason}")]
  Format { position: usize, reason: Reason },
}

impl Error {
  pub(crate) fn format(position: usize, reason: Reason) -> Self {
    Self::Format { position, reason }
  }
}


/// Non-fatal findings collected while parsing. These never abort the parse;
/// they are accumulated and exposed on the resulting `LogFile`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum SchemaWarning {
  /// A channel descriptor reused a name already taken by an earlier
  /// descriptor. The first descriptor keeps the name.
  DuplicateChannelName { name: String, id: u16 },
  /// Framing was lost and recovered by scanning forward for a plausible
  /// discriminator. `skipped` bytes were discarded.
  ResyncRecovered { position: usize, skipped: usize },
  /// A channel declared in the directory had no records in the sample
  /// region and was omitted from the channel map.
  EmptyChannelDropped { name: String },
  /// A decoded sample did not advance its channel's timecode and was
  /// dropped to keep the channel strictly time-ordered.
  NonMonotonicSample { name: String, timecode: i64 },
}

impl fmt::Display for SchemaWarning {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::DuplicateChannelName { name, id } => {
        write!(f, "duplicate channel name '{}' (id {}), keeping first", name, id)
      }
      Self::ResyncRecovered { position, skipped } => {
        write!(f, "resync at byte {}: skipped {} bytes", position, skipped)
      }
      Self::EmptyChannelDropped { name } => {
        write!(f, "channel '{}' has no samples, dropped", name)
      }
      Self::NonMonotonicSample { name, timecode } => {
        write!(f,
               "channel '{}': sample at {}ms does not advance time, dropped",
               name, timecode)
      }
    }
  }
}
