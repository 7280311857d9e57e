// Copyright 2024 bmc::labs Gmbh. All rights reserved.
//
// Author: Florian Eich <florian@bmc-labs.com>

//! `xrk` is a native Rust reader for data in XRK or XRZ format. Such data
//! is recorded by devices from _AiM Tech Srl_, a company focused on data
//! logging products for the motor racing segment.
//!
//! The formats themselves are proprietary, but the data they contain is
//! fairly straight forward:
//!
//! - session metadata: driver, venue, vehicle, date and time, odometers
//! - information with regard to the _laps_ contained, where a _lap_ is a
//!   data segment within a list of segments produced by splitting the
//!   data because of some higher level information (e.g. _arriving on the
//!   finishing line_)
//! - time series data of logged sensory measurements, one stream per
//!   channel, each channel sampled at its own rate and interleaved with
//!   all the others in a single record stream
//!
//! This crate parses the container directly, with no dependency on the
//! original shared library. [`LogFile::load`] reads a file into
//! per-channel columns; [`LogFile::get_channels_as_table`] provides the
//! machinery to synchronize the raw data into matching time series.

mod channel;
mod error;
mod header;
mod lap;
mod logfile;
mod merge;
mod samples;
mod source;
mod table;
#[cfg(test)]
mod testutil;
mod track;

pub use channel::{Channel, ChannelDescriptor, PhysicalType, Values};
pub use error::{Error, Reason, Result, SchemaWarning};
pub use header::MetaValue;
pub use lap::Lap;
pub use logfile::{LoadOptions, LogFile, ProgressFn};
pub use samples::ParseStats;
pub use table::{Array, Column, Field, Table};
pub use track::aim_track;
