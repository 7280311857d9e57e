// Copyright 2024 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{channel::DESCRIPTOR_LEN,
            error::{Error, Reason, Result},
            lap::LAP_RECORD_LEN,
            source::XRK_MAGIC};
use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, NaiveDateTime};
use getset::{CopyGetters, Getters};
use serde::Serialize;
use std::{collections::BTreeMap, fmt};


/// Total length of the fixed preamble.
pub(crate) const HEADER_LEN: usize = 692;

pub(crate) const VERSION_OFFSET: usize = 4;
pub(crate) const LOG_START_OFFSET: usize = 8;
pub(crate) const DRIVER_OFFSET: usize = 16;
pub(crate) const VENUE_OFFSET: usize = 80;
pub(crate) const VEHICLE_OFFSET: usize = 144;
pub(crate) const SESSION_OFFSET: usize = 208;
pub(crate) const SERIES_OFFSET: usize = 272;
pub(crate) const COMMENT_OFFSET: usize = 336;
pub(crate) const ODO_OFFSET: usize = 592;
pub(crate) const CHANNEL_COUNT_OFFSET: usize = 652;
pub(crate) const CHANNEL_DIRECTORY_OFFSET: usize = 656;
pub(crate) const LAP_COUNT_OFFSET: usize = 664;
pub(crate) const LAP_TABLE_OFFSET: usize = 668;
pub(crate) const SAMPLE_REGION_OFFSET: usize = 676;
pub(crate) const SAMPLE_REGION_LENGTH_OFFSET: usize = 684;

pub(crate) const NAME_FIELD_LEN: usize = 64;
pub(crate) const COMMENT_FIELD_LEN: usize = 256;

/// One odometer slot: distance f64 plus seconds u32.
pub(crate) const ODO_STRIDE: usize = 12;
pub(crate) const ODO_LABELS: [&str; 5] =
  ["System", "Usr 1", "Usr 2", "Usr 3", "Usr 4"];

/// The only on-disk version this library understands.
const SUPPORTED_VERSION: u16 = 2;


/// A session metadata value: the string fields stay strings, the odometer
/// distances come through as floats.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
  Text(String),
  Number(f64),
}

impl MetaValue {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(text) => Some(text),
      Self::Number(_) => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Text(_) => None,
      Self::Number(number) => Some(*number),
    }
  }
}

impl fmt::Display for MetaValue {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::Text(text) => write!(f, "{}", text),
      Self::Number(number) => write!(f, "{}", number),
    }
  }
}


/// The parsed fixed preamble: session metadata plus the locations of the
/// channel directory, the lap table and the sample region.
#[derive(Debug, CopyGetters, Getters)]
pub(crate) struct Header {
  #[getset(get_copy = "pub")]
  version: u16,
  #[getset(get_copy = "pub")]
  started: NaiveDateTime,
  #[getset(get = "pub")]
  metadata: BTreeMap<String, MetaValue>,
  #[getset(get_copy = "pub")]
  channel_count: usize,
  #[getset(get_copy = "pub")]
  channel_directory_offset: usize,
  #[getset(get_copy = "pub")]
  lap_count: usize,
  #[getset(get_copy = "pub")]
  lap_table_offset: usize,
  #[getset(get_copy = "pub")]
  sample_region_offset: usize,
  #[getset(get_copy = "pub")]
  sample_region_length: usize,
}

impl Header {
  pub fn parse(data: &[u8]) -> Result<Self> {
    if data.len() < HEADER_LEN {
      return Err(Error::format(0, Reason::ShortHeader));
    }
    if data[..4] != XRK_MAGIC {
      return Err(Error::format(0, Reason::BadMagic));
    }

    let version = LittleEndian::read_u16(&data[VERSION_OFFSET..]);
    if version != SUPPORTED_VERSION {
      return Err(Error::format(VERSION_OFFSET,
                               Reason::FieldOutOfRange("version")));
    }

    let started =
      DateTime::from_timestamp(LittleEndian::read_i64(&data[LOG_START_OFFSET..]),
                               0).map(|datetime| datetime.naive_utc())
                                 .ok_or(Error::format(LOG_START_OFFSET,
                                                      Reason::FieldOutOfRange("log start")))?;

    let channel_count =
      LittleEndian::read_u32(&data[CHANNEL_COUNT_OFFSET..]) as usize;
    let channel_directory_offset =
      LittleEndian::read_u64(&data[CHANNEL_DIRECTORY_OFFSET..]) as usize;
    let lap_count = LittleEndian::read_u32(&data[LAP_COUNT_OFFSET..]) as usize;
    let lap_table_offset =
      LittleEndian::read_u64(&data[LAP_TABLE_OFFSET..]) as usize;
    let sample_region_offset =
      LittleEndian::read_u64(&data[SAMPLE_REGION_OFFSET..]) as usize;
    let sample_region_length =
      LittleEndian::read_u64(&data[SAMPLE_REGION_LENGTH_OFFSET..]) as usize;

    check_extent(channel_directory_offset,
                 channel_count,
                 DESCRIPTOR_LEN,
                 data.len(),
                 CHANNEL_DIRECTORY_OFFSET,
                 "channel directory")?;
    check_extent(lap_table_offset,
                 lap_count,
                 LAP_RECORD_LEN,
                 data.len(),
                 LAP_TABLE_OFFSET,
                 "lap table")?;
    check_extent(sample_region_offset,
                 sample_region_length,
                 1,
                 data.len(),
                 SAMPLE_REGION_OFFSET,
                 "sample region")?;

    let metadata = build_metadata(data, started)?;

    Ok(Self { version,
              started,
              metadata,
              channel_count,
              channel_directory_offset,
              lap_count,
              lap_table_offset,
              sample_region_offset,
              sample_region_length })
  }

  /// Hands the metadata map over to the log file once parsing is done.
  pub fn into_metadata(self) -> BTreeMap<String, MetaValue> {
    self.metadata
  }
}

/// Verifies that `count` entries of `stride` bytes starting at `offset`
/// stay inside a file of `len` bytes.
fn check_extent(offset: usize,
                count: usize,
                stride: usize,
                len: usize,
                position: usize,
                what: &'static str)
                -> Result<()>
{
  let fits = count.checked_mul(stride)
                  .and_then(|span| offset.checked_add(span))
                  .map(|end| end <= len)
                  .unwrap_or(false);
  if fits {
    Ok(())
  } else {
    Err(Error::format(position, Reason::FieldOutOfRange(what)))
  }
}

fn build_metadata(data: &[u8],
                  started: NaiveDateTime)
                  -> Result<BTreeMap<String, MetaValue>>
{
  let mut metadata = BTreeMap::new();
  let mut insert_text = |key: &str, offset: usize, width: usize| {
    metadata.insert(key.to_string(),
                    MetaValue::Text(read_string(&data[offset..], width)));
  };

  insert_text("Driver", DRIVER_OFFSET, NAME_FIELD_LEN);
  insert_text("Venue", VENUE_OFFSET, NAME_FIELD_LEN);
  insert_text("Vehicle", VEHICLE_OFFSET, NAME_FIELD_LEN);
  insert_text("Session", SESSION_OFFSET, NAME_FIELD_LEN);
  insert_text("Series", SERIES_OFFSET, NAME_FIELD_LEN);
  insert_text("Long Comment", COMMENT_OFFSET, COMMENT_FIELD_LEN);

  metadata.insert("Log Date".to_string(),
                  MetaValue::Text(started.format("%m/%d/%Y").to_string()));
  metadata.insert("Log Time".to_string(),
                  MetaValue::Text(started.format("%H:%M:%S").to_string()));

  for (slot, label) in ODO_LABELS.iter().enumerate() {
    let offset = ODO_OFFSET + slot * ODO_STRIDE;
    let distance = LittleEndian::read_f64(&data[offset..]);
    if !distance.is_finite() {
      return Err(Error::format(offset,
                               Reason::FieldOutOfRange("odometer distance")));
    }
    let seconds = LittleEndian::read_u32(&data[offset + 8..]);

    metadata.insert(format!("Odo/{} Distance (km)", label),
                    MetaValue::Number(distance));
    metadata.insert(format!("Odo/{} Time", label),
                    MetaValue::Text(format_hms(seconds)));
  }

  Ok(metadata)
}

/// Reads a fixed-width, null-padded string: cut at the first NUL, decode
/// leniently, drop trailing whitespace.
pub(crate) fn read_string(data: &[u8], width: usize) -> String {
  let field = &data[..width.min(data.len())];
  let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
  String::from_utf8_lossy(&field[..end]).trim_end().to_string()
}

/// Odometer time rendering. Hours are unpadded and unbounded, so a device
/// lifetime of `79:29:53` comes out exactly as the logger shows it.
fn format_hms(seconds: u32) -> String {
  format!("{}:{:02}:{:02}", seconds / 3600, (seconds / 60) % 60, seconds % 60)
}
