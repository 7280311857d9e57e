// Copyright 2024 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{error::{Error, Reason, Result, SchemaWarning},
            header::{read_string, Header},
            table::{Array, Column, Field, Table}};
use byteorder::{ByteOrder, LittleEndian};
use getset::{CopyGetters, Getters};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};


/// Fixed width of one channel descriptor in the directory.
pub(crate) const DESCRIPTOR_LEN: usize = 96;

pub(crate) const DESC_ID_OFFSET: usize = 0;
pub(crate) const DESC_TYPE_OFFSET: usize = 2;
pub(crate) const DESC_FLAGS_OFFSET: usize = 3;
pub(crate) const DESC_DEC_PTS_OFFSET: usize = 4;
pub(crate) const DESC_SCALE_OFFSET: usize = 8;
pub(crate) const DESC_OFFSET_OFFSET: usize = 16;
pub(crate) const DESC_NAME_OFFSET: usize = 24;
pub(crate) const DESC_NAME_LEN: usize = 48;
pub(crate) const DESC_UNITS_OFFSET: usize = 72;
pub(crate) const DESC_UNITS_LEN: usize = 24;

/// Channel ids share the record discriminator with the two shape bits, so
/// they must fit in 14 bits.
pub(crate) const MAX_CHANNEL_ID: u16 = 0x3fff;


/// Storage type of a channel's raw samples. Governs the raw width in the
/// sample region and, together with the scaling, the value column type.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum PhysicalType {
  F32,
  F64,
  I32,
  Gear,
}

impl PhysicalType {
  fn parse(raw: u8, position: usize) -> Result<Self> {
    match raw {
      0 => Ok(Self::F32),
      1 => Ok(Self::F64),
      2 => Ok(Self::I32),
      3 => Ok(Self::Gear),
      _ => {
        Err(Error::format(position, Reason::FieldOutOfRange("physical type")))
      }
    }
  }

  /// Byte width of one raw sample in the record stream.
  pub fn raw_width(self) -> usize {
    match self {
      Self::F32 | Self::I32 => 4,
      Self::F64 => 8,
      Self::Gear => 1,
    }
  }
}


/// Element type of the finished value column.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ColumnKind {
  I32,
  F32,
  F64,
}


/// Everything the directory knows about one channel.
#[derive(Clone, CopyGetters, Debug, Getters, PartialEq, Serialize)]
pub struct ChannelDescriptor {
  #[getset(get_copy = "pub")]
  id:            u16,
  #[getset(get = "pub")]
  name:          String,
  #[getset(get = "pub")]
  units:         String,
  #[getset(get_copy = "pub")]
  dec_pts:       u16,
  #[getset(get_copy = "pub")]
  interpolate:   bool,
  #[getset(get_copy = "pub")]
  physical_type: PhysicalType,
  #[getset(get_copy = "pub")]
  scale:         f64,
  #[getset(get_copy = "pub")]
  offset:        f64,
}

impl ChannelDescriptor {
  fn parse(bytes: &[u8], position: usize) -> Result<Self> {
    let id = LittleEndian::read_u16(&bytes[DESC_ID_OFFSET..]);
    if id > MAX_CHANNEL_ID {
      return Err(Error::format(position,
                               Reason::FieldOutOfRange("channel id")));
    }

    let physical_type = PhysicalType::parse(bytes[DESC_TYPE_OFFSET],
                                            position + DESC_TYPE_OFFSET)?;
    let interpolate = bytes[DESC_FLAGS_OFFSET] & 0x01 != 0;
    let dec_pts = LittleEndian::read_u16(&bytes[DESC_DEC_PTS_OFFSET..]);

    let scale = LittleEndian::read_f64(&bytes[DESC_SCALE_OFFSET..]);
    let offset = LittleEndian::read_f64(&bytes[DESC_OFFSET_OFFSET..]);
    if !scale.is_finite() || !offset.is_finite() {
      return Err(Error::format(position + DESC_SCALE_OFFSET,
                               Reason::FieldOutOfRange("channel scaling")));
    }

    let name = read_string(&bytes[DESC_NAME_OFFSET..], DESC_NAME_LEN);
    if name.is_empty() {
      return Err(Error::format(position + DESC_NAME_OFFSET,
                               Reason::FieldOutOfRange("channel name")));
    }
    let units = read_string(&bytes[DESC_UNITS_OFFSET..], DESC_UNITS_LEN);

    Ok(Self { id,
              name,
              units,
              dec_pts,
              interpolate,
              physical_type,
              scale,
              offset })
  }

  /// The value column type this channel produces. An i32 channel with a
  /// non-trivial scaling is fixed-point (GPS coordinates are stored this
  /// way) and surfaces as f64; everything else keeps its declared width.
  pub(crate) fn column_kind(&self) -> ColumnKind {
    match self.physical_type {
      PhysicalType::F32 => ColumnKind::F32,
      PhysicalType::F64 => ColumnKind::F64,
      PhysicalType::Gear => ColumnKind::I32,
      PhysicalType::I32 => {
        if self.scale == 1.0 && self.offset == 0.0 {
          ColumnKind::I32
        } else {
          ColumnKind::F64
        }
      }
    }
  }

  /// Whether merging fills gaps by linear interpolation. Non-float
  /// channels step regardless of the interpolate flag.
  pub(crate) fn fills_linearly(&self) -> bool {
    self.interpolate
    && matches!(self.column_kind(), ColumnKind::F32 | ColumnKind::F64)
  }

  /// The annotated field under which this channel's values leave the
  /// library.
  pub(crate) fn field(&self) -> Field {
    let mut metadata = BTreeMap::new();
    metadata.insert("units".to_string(), self.units.clone());
    metadata.insert("dec_pts".to_string(), self.dec_pts.to_string());
    metadata.insert("interpolate".to_string(),
                    if self.interpolate { "True" } else { "False" }.to_string());
    Field::with_metadata(&self.name, metadata)
  }
}


/// The parsed channel descriptor table, addressable by record id.
#[derive(Debug)]
pub(crate) struct ChannelDirectory {
  descriptors: Vec<ChannelDescriptor>,
  by_id:       HashMap<u16, usize>,
}

impl ChannelDirectory {
  pub fn parse(data: &[u8],
               header: &Header,
               warnings: &mut Vec<SchemaWarning>)
               -> Result<Self>
  {
    let mut descriptors: Vec<ChannelDescriptor> =
      Vec::with_capacity(header.channel_count());
    let mut by_id = HashMap::with_capacity(header.channel_count());

    for index in 0..header.channel_count() {
      let position = header.channel_directory_offset() + index * DESCRIPTOR_LEN;
      let descriptor =
        ChannelDescriptor::parse(&data[position..position + DESCRIPTOR_LEN],
                                 position)?;

      if by_id.contains_key(&descriptor.id()) {
        return Err(Error::format(position,
                                 Reason::FieldOutOfRange("channel id")));
      }
      if descriptors.iter().any(|other| other.name() == descriptor.name()) {
        tracing::warn!("duplicate channel name '{}' (id {}), keeping first",
                       descriptor.name(),
                       descriptor.id());
        warnings.push(SchemaWarning::DuplicateChannelName {
          name: descriptor.name().clone(),
          id:   descriptor.id(),
        });
      }

      by_id.insert(descriptor.id(), descriptors.len());
      descriptors.push(descriptor);
    }

    Ok(Self { descriptors,
              by_id })
  }

  pub fn get(&self, id: u16) -> Option<&ChannelDescriptor> {
    self.by_id.get(&id).map(|&index| &self.descriptors[index])
  }

  pub fn descriptors(&self) -> &[ChannelDescriptor] {
    &self.descriptors
  }

  pub fn len(&self) -> usize {
    self.descriptors.len()
  }
}


/// Decoded values of one channel, stored at the width the descriptor
/// dictates.
#[derive(Clone, Debug, PartialEq)]
pub enum Values {
  I32(Vec<i32>),
  F32(Vec<f32>),
  F64(Vec<f64>),
}

impl Values {
  pub(crate) fn for_kind(kind: ColumnKind) -> Self {
    match kind {
      ColumnKind::I32 => Self::I32(Vec::new()),
      ColumnKind::F32 => Self::F32(Vec::new()),
      ColumnKind::F64 => Self::F64(Vec::new()),
    }
  }

  pub fn len(&self) -> usize {
    match self {
      Self::I32(values) => values.len(),
      Self::F32(values) => values.len(),
      Self::F64(values) => values.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Numeric view of a single element.
  pub fn value(&self, index: usize) -> f64 {
    match self {
      Self::I32(values) => values[index] as f64,
      Self::F32(values) => values[index] as f64,
      Self::F64(values) => values[index],
    }
  }

  /// Appends a physical (already scaled) sample at this column's width.
  pub(crate) fn push_physical(&mut self, physical: f64) {
    match self {
      Self::I32(values) => values.push(physical.round() as i32),
      Self::F32(values) => values.push(physical as f32),
      Self::F64(values) => values.push(physical),
    }
  }

  /// Keeps only the elements whose index is flagged in `keep`.
  pub(crate) fn retain_by_index(&mut self, keep: &[bool]) {
    fn filter<T: Copy>(values: &mut Vec<T>, keep: &[bool]) {
      let mut index = 0;
      values.retain(|_| {
              let kept = keep[index];
              index += 1;
              kept
            });
    }
    match self {
      Self::I32(values) => filter(values, keep),
      Self::F32(values) => filter(values, keep),
      Self::F64(values) => filter(values, keep),
    }
  }

  pub(crate) fn to_array(&self) -> Array {
    match self {
      Self::I32(values) => Array::I32(values.clone()),
      Self::F32(values) => Array::F32(values.clone()),
      Self::F64(values) => Array::F64(values.clone()),
    }
  }
}


/// Per-id collection state during demultiplexing: the growing columns
/// plus the channel's absolute timecode cursor.
#[derive(Debug)]
pub(crate) struct Accumulator {
  pub timecodes: Vec<i64>,
  pub values:    Values,
  pub cursor:    i64,
}

impl Accumulator {
  pub fn new(kind: ColumnKind) -> Self {
    Self { timecodes: Vec::new(),
           values:    Values::for_kind(kind),
           cursor:    0, }
  }

  pub fn push(&mut self, timecode: i64, physical: f64) {
    self.timecodes.push(timecode);
    self.values.push_physical(physical);
    self.cursor = timecode;
  }

  pub fn is_empty(&self) -> bool {
    self.timecodes.is_empty()
  }
}


/// A finished channel: descriptor plus two equal-length, time-sorted
/// columns.
#[derive(Clone, Debug, Getters, PartialEq)]
#[getset(get = "pub")]
pub struct Channel {
  descriptor: ChannelDescriptor,
  timecodes:  Vec<i64>,
  values:     Values,
}

impl Channel {
  pub(crate) fn new(descriptor: ChannelDescriptor,
                    timecodes: Vec<i64>,
                    values: Values)
                    -> Self
  {
    assert!(timecodes.len() == values.len(),
            "number of timecodes not equivalent to number of values");
    Self { descriptor,
           timecodes,
           values }
  }

  pub fn name(&self) -> &str {
    self.descriptor.name()
  }

  pub fn len(&self) -> usize {
    self.timecodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.timecodes.is_empty()
  }

  /// Renders this channel in boundary form: a `timecodes` column plus one
  /// value column annotated with `units`, `dec_pts` and `interpolate`.
  pub fn to_table(&self) -> Table {
    Table::new(vec![Column::new(Field::new("timecodes"),
                                Array::I64(self.timecodes.clone())),
                    Column::new(self.descriptor.field(),
                                self.values.to_array()),])
  }
}


/// Finalizes the per-id accumulators into the by-name channel map.
/// Channels without samples are dropped with a warning, as are samples
/// which failed to advance their channel's clock (they can only appear
/// downstream of a resync). Where two descriptors share a name, the
/// first one keeps it and the other accumulator is discarded; the
/// warning was already emitted when the directory was read.
pub(crate) fn assemble(directory: &ChannelDirectory,
                       mut accumulators: HashMap<u16, Accumulator>,
                       warnings: &mut Vec<SchemaWarning>)
                       -> BTreeMap<String, Channel>
{
  let mut channels = BTreeMap::new();

  for descriptor in directory.descriptors() {
    if channels.contains_key(descriptor.name()) {
      continue;
    }

    let accumulator = match accumulators.remove(&descriptor.id()) {
      Some(accumulator) if !accumulator.is_empty() => accumulator,
      _ => {
        tracing::debug!("channel '{}' has no samples, dropped",
                        descriptor.name());
        warnings.push(SchemaWarning::EmptyChannelDropped {
          name: descriptor.name().clone(),
        });
        continue;
      }
    };

    let (timecodes, values) =
      enforce_monotonic(descriptor.name(), accumulator, warnings);
    channels.insert(descriptor.name().clone(),
                    Channel::new(descriptor.clone(), timecodes, values));
  }

  channels
}

fn enforce_monotonic(name: &str,
                     accumulator: Accumulator,
                     warnings: &mut Vec<SchemaWarning>)
                     -> (Vec<i64>, Values)
{
  let Accumulator { mut timecodes,
                    mut values,
                    .. } = accumulator;

  let mut keep = Vec::with_capacity(timecodes.len());
  let mut last = i64::MIN;
  for &timecode in &timecodes {
    let advances = timecode > last;
    if advances {
      last = timecode;
    } else {
      tracing::warn!("channel '{}': sample at {}ms does not advance time",
                     name, timecode);
      warnings.push(SchemaWarning::NonMonotonicSample { name:
                                                          name.to_string(),
                                                        timecode });
    }
    keep.push(advances);
  }

  if keep.iter().any(|&kept| !kept) {
    let mut index = 0;
    timecodes.retain(|_| {
               let kept = keep[index];
               index += 1;
               kept
             });
    values.retain_by_index(&keep);
  }

  (timecodes, values)
}
