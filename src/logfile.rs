// Copyright 2024 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{channel::{self, Channel, ChannelDirectory},
            error::{Result, SchemaWarning},
            header::{Header, MetaValue},
            lap::{self, Lap},
            merge,
            samples::{self, ParseStats},
            source::ByteSource,
            table::Table};
use getset::{CopyGetters, Getters};
use std::{collections::BTreeMap, path::Path};


/// Progress callback: receives `(bytes_consumed, total_bytes)` for the
/// sample region, from the thread driving the parse, in non-decreasing
/// order, with exactly one final `(total, total)` pair.
pub type ProgressFn<'a> = dyn FnMut(u64, u64) + 'a;


/// Knobs for a single load. The default runs silently.
#[derive(Default)]
pub struct LoadOptions<'a> {
  progress: Option<&'a mut ProgressFn<'a>>,
}

impl<'a> LoadOptions<'a> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_progress(mut self, progress: &'a mut ProgressFn<'a>) -> Self {
    self.progress = Some(progress);
    self
  }
}


/// A fully parsed log: per-channel time series keyed by channel name, the
/// lap table, the session metadata and the parse diagnostics. Immutable
/// once loaded; the file itself is closed before `load` returns.
#[derive(CopyGetters, Debug, Getters)]
pub struct LogFile {
  #[getset(get = "pub")]
  channels:  BTreeMap<String, Channel>,
  #[getset(get = "pub")]
  laps:      Vec<Lap>,
  #[getset(get = "pub")]
  metadata:  BTreeMap<String, MetaValue>,
  #[getset(get = "pub")]
  file_name: String,
  #[getset(get = "pub")]
  warnings:  Vec<SchemaWarning>,
  #[getset(get_copy = "pub")]
  stats:     ParseStats,
}

impl LogFile {
  /// Loads an XRK or XRZ file.
  pub fn load(path: &Path) -> Result<Self> {
    Self::load_with(path, LoadOptions::new())
  }

  /// Loads an XRK or XRZ file with explicit options, e.g. a progress
  /// callback. On failure nothing is returned and all intermediate
  /// buffers are released.
  pub fn load_with(path: &Path, options: LoadOptions) -> Result<Self> {
    let mut warnings = Vec::new();

    let source = ByteSource::open(path)?;
    let data = source.bytes();

    let header = Header::parse(data)?;
    let directory = ChannelDirectory::parse(data, &header, &mut warnings)?;
    let laps = lap::parse(data, &header)?;

    let region = &data[header.sample_region_offset()
                       ..header.sample_region_offset()
                         + header.sample_region_length()];
    let (accumulators, stats) =
      samples::demultiplex(region,
                           header.sample_region_offset(),
                           &directory,
                           options.progress,
                           &mut warnings)?;
    let channels = channel::assemble(&directory, accumulators, &mut warnings);

    tracing::debug!("parsed '{}': {} channels, {} laps, {} records",
                    path.display(),
                    channels.len(),
                    laps.len(),
                    stats.records());

    Ok(Self { channels,
              laps,
              metadata: header.into_metadata(),
              file_name: path.display().to_string(),
              warnings,
              stats })
  }

  /// Looks up a channel by name.
  pub fn channel(&self, name: &str) -> Option<&Channel> {
    self.channels.get(name)
  }

  /// All channels in boundary form: one two-column table per channel,
  /// keyed by channel name.
  pub fn channel_tables(&self) -> BTreeMap<String, Table> {
    self.channels
        .iter()
        .map(|(name, channel)| (name.clone(), channel.to_table()))
        .collect()
  }

  /// The names of the speed, latitude, longitude and altitude channels,
  /// in that order, where the file provides them. Downstream consumers
  /// use these to find the position fix without scanning the channel
  /// map.
  pub fn key_channel_map(&self) -> [Option<&str>; 4] {
    ["GPS Speed", "GPS Latitude", "GPS Longitude", "GPS Altitude"].map(|name| {
      self.channels
          .get_key_value(name)
          .map(|(key, _)| key.as_str())
    })
  }

  /// The lap table in boundary form: `num`, `start_time`, `end_time`.
  pub fn laps_table(&self) -> Table {
    lap::to_table(&self.laps)
  }

  /// Synchronizes all channels onto one timecode axis. See the merge
  /// module for fill semantics.
  pub fn get_channels_as_table(&self) -> Table {
    merge::merge(&self.channels)
  }
}
