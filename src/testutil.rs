// Copyright 2024 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

//! Synthetic XRK images for the test suites. The builder emits the exact
//! layout the parser reads: fixed preamble, channel directory, lap table
//! and sample region, with the record encodings of the sample stream.

use super::{channel::{DESCRIPTOR_LEN,
                      DESC_DEC_PTS_OFFSET,
                      DESC_FLAGS_OFFSET,
                      DESC_ID_OFFSET,
                      DESC_NAME_LEN,
                      DESC_NAME_OFFSET,
                      DESC_OFFSET_OFFSET,
                      DESC_SCALE_OFFSET,
                      DESC_TYPE_OFFSET,
                      DESC_UNITS_LEN,
                      DESC_UNITS_OFFSET,
                      PhysicalType},
            header::{CHANNEL_COUNT_OFFSET,
                     CHANNEL_DIRECTORY_OFFSET,
                     COMMENT_FIELD_LEN,
                     COMMENT_OFFSET,
                     DRIVER_OFFSET,
                     HEADER_LEN,
                     LAP_COUNT_OFFSET,
                     LAP_TABLE_OFFSET,
                     LOG_START_OFFSET,
                     NAME_FIELD_LEN,
                     ODO_LABELS,
                     ODO_OFFSET,
                     ODO_STRIDE,
                     SAMPLE_REGION_LENGTH_OFFSET,
                     SAMPLE_REGION_OFFSET,
                     SERIES_OFFSET,
                     SESSION_OFFSET,
                     VEHICLE_OFFSET,
                     VENUE_OFFSET,
                     VERSION_OFFSET},
            lap::LAP_RECORD_LEN,
            source::{XRK_MAGIC, XRZ_MAGIC}};
use flate2::{write::ZlibEncoder, Compression};
use std::{io::Write, path::PathBuf};


/// Writes `bytes` to a uniquely named file under the system temp
/// directory and returns its path.
pub fn write_temp(name: &str, bytes: &[u8]) -> PathBuf {
  let path = std::env::temp_dir().join(format!("xrk-{}-{}",
                                               std::process::id(),
                                               name));
  std::fs::write(&path, bytes).unwrap();
  path
}


/// Channel directory entry under construction.
#[derive(Clone, Debug)]
pub struct ChannelSpec {
  pub id:            u16,
  pub name:          String,
  pub units:         String,
  pub dec_pts:       u16,
  pub interpolate:   bool,
  pub physical_type: PhysicalType,
  pub scale:         f64,
  pub offset:        f64,
}

impl ChannelSpec {
  fn new(id: u16, name: &str, units: &str, physical_type: PhysicalType)
         -> Self {
    Self { id,
           name: name.to_string(),
           units: units.to_string(),
           dec_pts: 0,
           interpolate: false,
           physical_type,
           scale: 1.0,
           offset: 0.0 }
  }

  pub fn f32(id: u16, name: &str, units: &str) -> Self {
    Self::new(id, name, units, PhysicalType::F32)
  }

  pub fn f64(id: u16, name: &str, units: &str) -> Self {
    Self::new(id, name, units, PhysicalType::F64)
  }

  pub fn i32(id: u16, name: &str, units: &str) -> Self {
    Self::new(id, name, units, PhysicalType::I32)
  }

  pub fn gear(id: u16, name: &str, units: &str) -> Self {
    Self::new(id, name, units, PhysicalType::Gear)
  }

  pub fn dec_pts(mut self, dec_pts: u16) -> Self {
    self.dec_pts = dec_pts;
    self
  }

  pub fn interpolate(mut self, interpolate: bool) -> Self {
    self.interpolate = interpolate;
    self
  }

  pub fn scaling(mut self, scale: f64, offset: f64) -> Self {
    self.scale = scale;
    self.offset = offset;
    self
  }

  fn type_byte(&self) -> u8 {
    match self.physical_type {
      PhysicalType::F32 => 0,
      PhysicalType::F64 => 1,
      PhysicalType::I32 => 2,
      PhysicalType::Gear => 3,
    }
  }
}


/// Builds a complete XRK (or XRZ) image: header fields, channel specs,
/// auto-numbered laps and a hand-assembled sample region.
#[derive(Clone, Debug)]
pub struct XrkBuilder {
  driver:       String,
  venue:        String,
  vehicle:      String,
  session:      String,
  series:       String,
  comment:      String,
  log_start:    i64,
  odo_distance: f64,
  odo_seconds:  u32,
  channels:     Vec<ChannelSpec>,
  laps:         Vec<(i64, i64)>,
  records:      Vec<u8>,
}

impl XrkBuilder {
  pub fn new() -> Self {
    Self { driver:       String::new(),
           venue:        String::new(),
           vehicle:      String::new(),
           session:      String::new(),
           series:       String::new(),
           comment:      String::new(),
           log_start:    0,
           odo_distance: 0.0,
           odo_seconds:  0,
           channels:     Vec::new(),
           laps:         Vec::new(),
           records:      Vec::new(), }
  }

  pub fn driver(mut self, driver: &str) -> Self {
    self.driver = driver.to_string();
    self
  }

  pub fn venue(mut self, venue: &str) -> Self {
    self.venue = venue.to_string();
    self
  }

  pub fn vehicle(mut self, vehicle: &str) -> Self {
    self.vehicle = vehicle.to_string();
    self
  }

  pub fn session(mut self, session: &str) -> Self {
    self.session = session.to_string();
    self
  }

  pub fn series(mut self, series: &str) -> Self {
    self.series = series.to_string();
    self
  }

  pub fn comment(mut self, comment: &str) -> Self {
    self.comment = comment.to_string();
    self
  }

  pub fn log_start(mut self, log_start: i64) -> Self {
    self.log_start = log_start;
    self
  }

  pub fn odometer(mut self, distance: f64, seconds: u32) -> Self {
    self.odo_distance = distance;
    self.odo_seconds = seconds;
    self
  }

  pub fn channel(mut self, spec: ChannelSpec) -> Self {
    self.channels.push(spec);
    self
  }

  pub fn lap(mut self, start: i64, end: i64) -> Self {
    self.laps.push((start, end));
    self
  }

  // RECORD EMITTERS ------------------------------------------------------- //

  fn disc(id: u16, shape: u16) -> [u8; 2] {
    ((id << 2) | shape).to_le_bytes()
  }

  pub fn singleton_f32(mut self, id: u16, delta: u32, value: f32) -> Self {
    self.records.extend_from_slice(&Self::disc(id, 0));
    self.records.extend_from_slice(&delta.to_le_bytes());
    self.records.extend_from_slice(&value.to_le_bytes());
    self
  }

  pub fn singleton_i32(mut self, id: u16, delta: u32, value: i32) -> Self {
    self.records.extend_from_slice(&Self::disc(id, 0));
    self.records.extend_from_slice(&delta.to_le_bytes());
    self.records.extend_from_slice(&value.to_le_bytes());
    self
  }

  pub fn singleton_gear(mut self, id: u16, delta: u32, value: u8) -> Self {
    self.records.extend_from_slice(&Self::disc(id, 0));
    self.records.extend_from_slice(&delta.to_le_bytes());
    self.records.push(value);
    self
  }

  fn block_header(&mut self, id: u16, shape: u16, base: u32, count: u16) {
    self.records.extend_from_slice(&Self::disc(id, shape));
    self.records.extend_from_slice(&base.to_le_bytes());
    self.records.extend_from_slice(&count.to_le_bytes());
  }

  pub fn block_periodic_f32(mut self,
                            id: u16,
                            base: u32,
                            period: u32,
                            values: &[f32])
                            -> Self
  {
    self.block_header(id, 1, base, values.len() as u16);
    self.records.extend_from_slice(&period.to_le_bytes());
    for value in values {
      self.records.extend_from_slice(&value.to_le_bytes());
    }
    self
  }

  pub fn block_periodic_f64(mut self,
                            id: u16,
                            base: u32,
                            period: u32,
                            values: &[f64])
                            -> Self
  {
    self.block_header(id, 1, base, values.len() as u16);
    self.records.extend_from_slice(&period.to_le_bytes());
    for value in values {
      self.records.extend_from_slice(&value.to_le_bytes());
    }
    self
  }

  pub fn block_explicit_f32(mut self,
                            id: u16,
                            base: u32,
                            offsets: &[u32],
                            values: &[f32])
                            -> Self
  {
    assert_eq!(offsets.len(), values.len());
    self.block_header(id, 2, base, values.len() as u16);
    for offset in offsets {
      self.records.extend_from_slice(&offset.to_le_bytes());
    }
    for value in values {
      self.records.extend_from_slice(&value.to_le_bytes());
    }
    self
  }

  /// Injects raw bytes into the sample region, for framing-damage tests.
  pub fn garbage(mut self, bytes: &[u8]) -> Self {
    self.records.extend_from_slice(bytes);
    self
  }

  /// Strips the last `n` bytes off the sample region, for truncation
  /// tests.
  pub fn truncate_region(mut self, n: usize) -> Self {
    let len = self.records.len() - n;
    self.records.truncate(len);
    self
  }

  // IMAGE ASSEMBLY -------------------------------------------------------- //

  pub fn build(&self) -> Vec<u8> {
    let directory_offset = HEADER_LEN;
    let lap_offset = directory_offset + self.channels.len() * DESCRIPTOR_LEN;
    let region_offset = lap_offset + self.laps.len() * LAP_RECORD_LEN;

    let mut image = vec![0u8; region_offset + self.records.len()];

    image[..4].copy_from_slice(&XRK_MAGIC);
    write_u16(&mut image, VERSION_OFFSET, 2);
    write_i64(&mut image, LOG_START_OFFSET, self.log_start);

    write_str(&mut image, DRIVER_OFFSET, NAME_FIELD_LEN, &self.driver);
    write_str(&mut image, VENUE_OFFSET, NAME_FIELD_LEN, &self.venue);
    write_str(&mut image, VEHICLE_OFFSET, NAME_FIELD_LEN, &self.vehicle);
    write_str(&mut image, SESSION_OFFSET, NAME_FIELD_LEN, &self.session);
    write_str(&mut image, SERIES_OFFSET, NAME_FIELD_LEN, &self.series);
    write_str(&mut image, COMMENT_OFFSET, COMMENT_FIELD_LEN, &self.comment);

    for slot in 0..ODO_LABELS.len() {
      let offset = ODO_OFFSET + slot * ODO_STRIDE;
      write_f64(&mut image, offset, self.odo_distance);
      write_u32(&mut image, offset + 8, self.odo_seconds);
    }

    write_u32(&mut image, CHANNEL_COUNT_OFFSET, self.channels.len() as u32);
    write_u64(&mut image, CHANNEL_DIRECTORY_OFFSET, directory_offset as u64);
    write_u32(&mut image, LAP_COUNT_OFFSET, self.laps.len() as u32);
    write_u64(&mut image, LAP_TABLE_OFFSET, lap_offset as u64);
    write_u64(&mut image, SAMPLE_REGION_OFFSET, region_offset as u64);
    write_u64(&mut image,
              SAMPLE_REGION_LENGTH_OFFSET,
              self.records.len() as u64);

    for (index, spec) in self.channels.iter().enumerate() {
      let at = directory_offset + index * DESCRIPTOR_LEN;
      write_u16(&mut image, at + DESC_ID_OFFSET, spec.id);
      image[at + DESC_TYPE_OFFSET] = spec.type_byte();
      image[at + DESC_FLAGS_OFFSET] = spec.interpolate as u8;
      write_u16(&mut image, at + DESC_DEC_PTS_OFFSET, spec.dec_pts);
      write_f64(&mut image, at + DESC_SCALE_OFFSET, spec.scale);
      write_f64(&mut image, at + DESC_OFFSET_OFFSET, spec.offset);
      write_str(&mut image, at + DESC_NAME_OFFSET, DESC_NAME_LEN, &spec.name);
      write_str(&mut image,
                at + DESC_UNITS_OFFSET,
                DESC_UNITS_LEN,
                &spec.units);
    }

    for (index, &(start, end)) in self.laps.iter().enumerate() {
      let at = lap_offset + index * LAP_RECORD_LEN;
      write_u32(&mut image, at, index as u32);
      write_i64(&mut image, at + 4, start);
      write_i64(&mut image, at + 12, end);
    }

    image[region_offset..].copy_from_slice(&self.records);
    image
  }

  pub fn build_xrz(&self) -> Vec<u8> {
    let image = self.build();
    let mut container = Vec::from(&XRZ_MAGIC[..]);
    container.extend_from_slice(&(image.len() as u64).to_le_bytes());
    let mut encoder = ZlibEncoder::new(container, Compression::default());
    encoder.write_all(&image).unwrap();
    encoder.finish().unwrap()
  }

  pub fn write(&self, name: &str) -> PathBuf {
    write_temp(name, &self.build())
  }
}


fn write_u16(image: &mut [u8], offset: usize, value: u16) {
  image[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(image: &mut [u8], offset: usize, value: u32) {
  image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_u64(image: &mut [u8], offset: usize, value: u64) {
  image[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn write_i64(image: &mut [u8], offset: usize, value: i64) {
  image[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn write_f64(image: &mut [u8], offset: usize, value: f64) {
  image[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn write_str(image: &mut [u8], offset: usize, width: usize, value: &str) {
  let bytes = value.as_bytes();
  assert!(bytes.len() <= width, "fixture string too long");
  image[offset..offset + bytes.len()].copy_from_slice(bytes);
}
