// Copyright 2024 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

//! Synchronizes the independently sampled channels into one wide table.
//! The timecode axis is the sorted union of every channel's timecodes;
//! each channel is projected onto it with a two-pointer walk, filling
//! gaps by linear interpolation (float channels flagged for it) or by
//! holding the last earlier sample. Extrapolation beyond a channel's
//! first or last sample is always flat.

use super::{channel::{Channel, Values},
            table::{Array, Column, Field, Table}};
use std::{cmp::Reverse,
          collections::{BTreeMap, BinaryHeap}};


/// Builds the merged table: a strictly increasing `timecodes` column
/// followed by one gap-free column per channel, in ascending name order,
/// with each channel's field metadata preserved.
pub(crate) fn merge(channels: &BTreeMap<String, Channel>) -> Table {
  let union = union_timecodes(channels);

  let mut columns = Vec::with_capacity(channels.len() + 1);
  columns.push(Column::new(Field::new("timecodes"),
                           Array::I64(union.clone())));
  // BTreeMap iteration delivers the channels alphabetically
  for channel in channels.values() {
    columns.push(Column::new(channel.descriptor().field(),
                             project(channel, &union)));
  }

  Table::new(columns)
}

/// K-way merge of the sorted per-channel timecode arrays, deduplicated.
/// O(N log K) for N total samples over K channels.
fn union_timecodes(channels: &BTreeMap<String, Channel>) -> Vec<i64> {
  let sources: Vec<&[i64]> = channels.values()
                                     .map(|channel| {
                                       channel.timecodes().as_slice()
                                     })
                                     .collect();

  let mut heap = BinaryHeap::with_capacity(sources.len());
  let mut cursors = vec![0usize; sources.len()];
  for (k, source) in sources.iter().enumerate() {
    if let Some(&first) = source.first() {
      heap.push(Reverse((first, k)));
    }
  }

  let mut union = Vec::new();
  while let Some(Reverse((timecode, k))) = heap.pop() {
    if union.last() != Some(&timecode) {
      union.push(timecode);
    }
    cursors[k] += 1;
    if let Some(&next) = sources[k].get(cursors[k]) {
      heap.push(Reverse((next, k)));
    }
  }
  union
}

/// Projects one channel onto the union axis. O(U + S).
fn project(channel: &Channel, union: &[i64]) -> Array {
  let timecodes = channel.timecodes();
  debug_assert!(!timecodes.is_empty(),
                "assembly never emits empty channels");

  match (channel.descriptor().fills_linearly(), channel.values()) {
    (_, Values::I32(values)) => Array::I32(step(timecodes, values, union)),
    (false, Values::F32(values)) => {
      Array::F32(step(timecodes, values, union))
    }
    (false, Values::F64(values)) => {
      Array::F64(step(timecodes, values, union))
    }
    (true, Values::F32(values)) => {
      Array::F32(linear(timecodes, values, union, |v| v as f64, |v| v as f32))
    }
    (true, Values::F64(values)) => {
      Array::F64(linear(timecodes, values, union, |v| v, |v| v))
    }
  }
}

/// Forward fill: the last sample at or before the union timecode, or the
/// first sample for timecodes before the channel starts.
fn step<T: Copy>(timecodes: &[i64], values: &[T], union: &[i64]) -> Vec<T> {
  let mut projected = Vec::with_capacity(union.len());
  let mut at = 0;
  for &timecode in union {
    while at + 1 < timecodes.len() && timecodes[at + 1] <= timecode {
      at += 1;
    }
    if timecodes[at] <= timecode {
      projected.push(values[at]);
    } else {
      projected.push(values[0]);
    }
  }
  projected
}

/// Linear interpolation between bracketing samples, flat beyond the
/// channel's ends. Arithmetic is carried out in f64 regardless of the
/// column width.
fn linear<T: Copy>(timecodes: &[i64],
                   values: &[T],
                   union: &[i64],
                   up: fn(T) -> f64,
                   down: fn(f64) -> T)
                   -> Vec<T>
{
  let last = timecodes.len() - 1;
  let mut projected = Vec::with_capacity(union.len());
  let mut at = 0;
  for &timecode in union {
    while at + 1 < timecodes.len() && timecodes[at + 1] <= timecode {
      at += 1;
    }

    if timecode <= timecodes[0] {
      projected.push(values[0]);
    } else if timecode >= timecodes[last] {
      projected.push(values[last]);
    } else if timecodes[at] == timecode {
      projected.push(values[at]);
    } else {
      // timecodes[at] < timecode < timecodes[at + 1]
      let (t0, t1) = (timecodes[at], timecodes[at + 1]);
      let (v0, v1) = (up(values[at]), up(values[at + 1]));
      let fraction = (timecode - t0) as f64 / (t1 - t0) as f64;
      projected.push(down(v0 + (v1 - v0) * fraction));
    }
  }
  projected
}
