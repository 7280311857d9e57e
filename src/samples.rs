// Copyright 2024 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

//! The sample region demultiplexer. The region is a flat run of records,
//! interleaved across channels by the logger's internal scheduling but
//! strictly time-ordered within each channel. Every record leads with a
//! u16 discriminator carrying the channel id in its upper 14 bits and the
//! record shape in its lower two:
//!
//! - shape 0, singleton: `disc, timecode delta u32, raw value`
//! - shape 1, block:     `disc, base u32, count u16, period u32, raws`
//! - shape 2, block:     `disc, base u32, count u16, offsets u32 each, raws`
//!
//! Raw widths come from the channel's physical type. Block bases carry
//! only the low 32 bits of the absolute timecode and are unwrapped
//! against the channel's cursor; all timecode arithmetic is 64 bit.
//!
//! Each record passes through AwaitDisc, ReadHeader, ReadPayload and
//! Commit; an implausible discriminator takes the error edge into a
//! bounded forward scan (resync) and back to AwaitDisc.

use super::{channel::{Accumulator, ChannelDescriptor, ChannelDirectory},
            error::{Error, Reason, Result, SchemaWarning}};
use byteorder::{ByteOrder, LittleEndian};
use getset::CopyGetters;
use serde::Serialize;
use std::collections::HashMap;


const SHAPE_SINGLETON: u16 = 0;
const SHAPE_BLOCK_PERIODIC: u16 = 1;
const SHAPE_BLOCK_EXPLICIT: u16 = 2;

const DISC_LEN: usize = 2;
/// Singleton header: discriminator plus timecode delta.
const SINGLETON_HEADER_LEN: usize = DISC_LEN + 4;
/// Block header: discriminator, base timecode, sample count.
const BLOCK_HEADER_LEN: usize = DISC_LEN + 4 + 2;

/// A resync scan gives up after this many bytes.
const RESYNC_WINDOW: usize = 1024;
/// Progress is reported at least once per this many consumed bytes.
const PROGRESS_STRIDE: usize = 1 << 20;
/// Upper bound on samples per block record. A count beyond this cannot
/// come from a real logger and would let a corrupt record swallow the
/// region.
const MAX_BLOCK_SAMPLES: usize = 4096;


/// Counters accumulated over one walk of the sample region.
#[derive(Clone, Copy, CopyGetters, Debug, Default, Eq, PartialEq, Serialize)]
#[getset(get_copy = "pub")]
pub struct ParseStats {
  /// Records decoded and committed.
  records: u64,
  /// Samples emitted across all channels.
  samples: u64,
  /// Resync scans which recovered framing.
  resyncs: u64,
  /// Sample-region bytes consumed.
  bytes:   u64,
}


/// How a single record attempt ended: either the region position after
/// the record, or one of the two failure edges.
enum RecordFailure {
  /// The discriminator does not name a known channel and shape. This is
  /// the recoverable edge into the resync scan.
  LostFraming,
  /// Structural damage which aborts the parse.
  Fatal(Error),
}

impl From<Error> for RecordFailure {
  fn from(error: Error) -> Self {
    Self::Fatal(error)
  }
}


/// Walks `region` and distributes decoded samples into per-channel
/// accumulators. `base` is the absolute file offset of the region, used
/// for error and warning positions. The progress callback, when present,
/// sees `(bytes_consumed, total)` pairs on a 1 MiB stride and exactly one
/// final `(total, total)`.
pub(crate) fn demultiplex(region: &[u8],
                          base: usize,
                          directory: &ChannelDirectory,
                          progress: Option<&mut dyn FnMut(u64, u64)>,
                          warnings: &mut Vec<SchemaWarning>)
                          -> Result<(HashMap<u16, Accumulator>, ParseStats)>
{
  Demultiplexer { region,
                  base,
                  directory,
                  accumulators: HashMap::new(),
                  stats: ParseStats::default(),
                  progress,
                  reported: 0 }.run(warnings)
}


struct Demultiplexer<'a, 'p> {
  region:       &'a [u8],
  base:         usize,
  directory:    &'a ChannelDirectory,
  accumulators: HashMap<u16, Accumulator>,
  stats:        ParseStats,
  progress:     Option<&'p mut dyn FnMut(u64, u64)>,
  reported:     usize,
}

impl<'a, 'p> Demultiplexer<'a, 'p> {
  fn run(mut self,
         warnings: &mut Vec<SchemaWarning>)
         -> Result<(HashMap<u16, Accumulator>, ParseStats)>
  {
    let mut position = 0;
    while position < self.region.len() {
      // AwaitDisc
      match self.read_record(position) {
        Ok(next) => {
          self.stats.records += 1;
          position = next;
          self.report(position);
        }
        Err(RecordFailure::LostFraming) => {
          position = self.resync(position, warnings)?;
        }
        Err(RecordFailure::Fatal(error)) => return Err(error),
      }
    }

    self.stats.bytes = self.region.len() as u64;
    if let Some(callback) = self.progress.as_mut() {
      let total = self.region.len() as u64;
      callback(total, total);
    }
    Ok((self.accumulators, self.stats))
  }

  /// Decodes one record starting at `position` and commits its samples.
  /// Nothing is committed unless the whole record decodes.
  fn read_record(&mut self,
                 position: usize)
                 -> std::result::Result<usize, RecordFailure>
  {
    let region = self.region;
    if position + DISC_LEN > region.len() {
      return Err(self.truncated(position).into());
    }

    // ReadHeader
    let disc = LittleEndian::read_u16(&region[position..]);
    let (id, shape) = (disc >> 2, disc & 0b11);
    let descriptor = match self.directory.get(id) {
      Some(descriptor) if shape != 0b11 => descriptor,
      _ => return Err(RecordFailure::LostFraming),
    };
    let width = descriptor.physical_type().raw_width();

    match shape {
      SHAPE_SINGLETON => self.read_singleton(position, descriptor, width),
      _ => self.read_block(position, descriptor, width, shape),
    }
  }

  fn read_singleton(&mut self,
                    position: usize,
                    descriptor: &'a ChannelDescriptor,
                    width: usize)
                    -> std::result::Result<usize, RecordFailure>
  {
    let region = self.region;
    let end = position + SINGLETON_HEADER_LEN + width;
    if end > region.len() {
      return Err(self.truncated(position).into());
    }

    // ReadPayload
    let delta = LittleEndian::read_u32(&region[position + DISC_LEN..]);
    let physical =
      decode_raw(descriptor, &region[position + SINGLETON_HEADER_LEN..]);

    // Commit
    let accumulator = self.accumulator(descriptor);
    let timecode = accumulator.cursor + i64::from(delta);
    accumulator.push(timecode, physical);
    self.stats.samples += 1;

    Ok(end)
  }

  fn read_block(&mut self,
                position: usize,
                descriptor: &'a ChannelDescriptor,
                width: usize,
                shape: u16)
                -> std::result::Result<usize, RecordFailure>
  {
    let region = self.region;
    if position + BLOCK_HEADER_LEN > region.len() {
      return Err(self.truncated(position).into());
    }

    let low = LittleEndian::read_u32(&region[position + DISC_LEN..]);
    let count =
      LittleEndian::read_u16(&region[position + DISC_LEN + 4..]) as usize;
    if count == 0 || count > MAX_BLOCK_SAMPLES {
      return Err(Error::format(self.base + position,
                               Reason::FieldOutOfRange("block count")).into());
    }

    let timecode_len = match shape {
      SHAPE_BLOCK_PERIODIC => 4,
      _ => count * 4,
    };
    let payload = position + BLOCK_HEADER_LEN;
    let end = payload + timecode_len + count * width;
    if end > region.len() {
      return Err(self.truncated(position).into());
    }

    // ReadPayload
    let block_base = unwrap_forward(self.accumulator(descriptor).cursor, low);
    let raws = &region[payload + timecode_len..];

    let mut samples = Vec::with_capacity(count);
    match shape {
      SHAPE_BLOCK_PERIODIC => {
        let period = i64::from(LittleEndian::read_u32(&region[payload..]));
        for k in 0..count {
          samples.push((block_base + k as i64 * period,
                        decode_raw(descriptor, &raws[k * width..])));
        }
      }
      SHAPE_BLOCK_EXPLICIT => {
        for k in 0..count {
          let offset = LittleEndian::read_u32(&region[payload + k * 4..]);
          samples.push((block_base + i64::from(offset),
                        decode_raw(descriptor, &raws[k * width..])));
        }
      }
      _ => unreachable!("shape checked in read_record"),
    }

    // Commit
    let accumulator = self.accumulator(descriptor);
    for (timecode, physical) in samples {
      accumulator.push(timecode, physical);
    }
    self.stats.samples += count as u64;

    Ok(end)
  }

  fn accumulator(&mut self, descriptor: &ChannelDescriptor) -> &mut Accumulator {
    let kind = descriptor.column_kind();
    self.accumulators
        .entry(descriptor.id())
        .or_insert_with(|| Accumulator::new(kind))
  }

  /// The error edge: scan forward, at most `RESYNC_WINDOW` bytes, for a
  /// discriminator naming a known channel whose full record would fit in
  /// the rest of the region. Returns the new region position.
  fn resync(&mut self,
            error_at: usize,
            warnings: &mut Vec<SchemaWarning>)
            -> Result<usize>
  {
    let limit = (error_at + RESYNC_WINDOW).min(self.region.len());
    let mut candidate = error_at + 1;

    while candidate < limit {
      if self.plausible(candidate) {
        let skipped = candidate - error_at;
        tracing::warn!("resync at byte {}: skipped {} bytes",
                       self.base + error_at,
                       skipped);
        warnings.push(SchemaWarning::ResyncRecovered {
          position: self.base + error_at,
          skipped,
        });
        self.stats.resyncs += 1;
        return Ok(candidate);
      }
      candidate += 1;
    }

    Err(Error::format(self.base + error_at, Reason::Unrecoverable))
  }

  /// Whether the bytes at `position` look like the start of a record:
  /// known channel id, valid shape, sane count, payload inside the
  /// region.
  fn plausible(&self, position: usize) -> bool {
    if position + DISC_LEN > self.region.len() {
      return false;
    }
    let disc = LittleEndian::read_u16(&self.region[position..]);
    let (id, shape) = (disc >> 2, disc & 0b11);
    let descriptor = match self.directory.get(id) {
      Some(descriptor) => descriptor,
      None => return false,
    };
    let width = descriptor.physical_type().raw_width();

    match shape {
      SHAPE_SINGLETON => {
        position + SINGLETON_HEADER_LEN + width <= self.region.len()
      }
      SHAPE_BLOCK_PERIODIC | SHAPE_BLOCK_EXPLICIT => {
        if position + BLOCK_HEADER_LEN > self.region.len() {
          return false;
        }
        let count =
          LittleEndian::read_u16(&self.region[position + DISC_LEN + 4..])
            as usize;
        if count == 0 || count > MAX_BLOCK_SAMPLES {
          return false;
        }
        let timecode_len =
          if shape == SHAPE_BLOCK_PERIODIC { 4 } else { count * 4 };
        position + BLOCK_HEADER_LEN + timecode_len + count * width
        <= self.region.len()
      }
      _ => false,
    }
  }

  fn truncated(&self, position: usize) -> Error {
    Error::format(self.base + position, Reason::Truncated)
  }

  /// Counter-guarded progress. The final pair is emitted once by `run`,
  /// so intermediate reports stop short of the region end.
  fn report(&mut self, position: usize) {
    if let Some(callback) = self.progress.as_mut() {
      if position < self.region.len()
         && position - self.reported >= PROGRESS_STRIDE
      {
        callback(position as u64, self.region.len() as u64);
        self.reported = position;
      }
    }
  }
}


/// Decodes one raw value at the descriptor's width and applies its
/// scaling.
fn decode_raw(descriptor: &ChannelDescriptor, bytes: &[u8]) -> f64 {
  use super::channel::PhysicalType::*;
  let raw = match descriptor.physical_type() {
    F32 => LittleEndian::read_f32(bytes) as f64,
    F64 => LittleEndian::read_f64(bytes),
    I32 => LittleEndian::read_i32(bytes) as f64,
    Gear => bytes[0] as f64,
  };
  raw * descriptor.scale() + descriptor.offset()
}

/// Reconstructs an absolute timecode from its low 32 bits. The stream is
/// time-ordered per channel, so the value is always at or ahead of the
/// cursor; the distance is the 32-bit wrapping difference.
fn unwrap_forward(cursor: i64, low: u32) -> i64 {
  cursor + i64::from(low.wrapping_sub(cursor as u32))
}
