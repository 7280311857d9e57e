// Copyright 2024 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{error::{Error, Reason, Result},
            header::Header,
            table::{Array, Column, Field, Table}};
use byteorder::{ByteOrder, LittleEndian};
use getset::CopyGetters;
use serde::Serialize;


/// Fixed width of one lap record: num u32, start i64, end i64.
pub(crate) const LAP_RECORD_LEN: usize = 20;


/// One data segment within the run, split on the timing line. The
/// interval is `[start_time, end_time)` in milliseconds; consecutive laps
/// chain without gaps.
#[derive(Clone, Copy, CopyGetters, Debug, Eq, PartialEq, Serialize)]
#[getset(get_copy = "pub")]
pub struct Lap {
  num:        i64,
  start_time: i64,
  end_time:   i64,
}

impl Lap {
  pub fn new(num: i64, start_time: i64, end_time: i64) -> Self {
    Self { num,
           start_time,
           end_time }
  }

  pub fn duration(&self) -> i64 {
    self.end_time - self.start_time
  }
}


/// Reads `lap_count` records from the lap table and checks the chain
/// invariants: lap numbers contiguous from 0, no negative durations, each
/// lap starting where the previous one ended.
pub(crate) fn parse(data: &[u8], header: &Header) -> Result<Vec<Lap>> {
  let mut laps: Vec<Lap> = Vec::with_capacity(header.lap_count());

  for index in 0..header.lap_count() {
    let position = header.lap_table_offset() + index * LAP_RECORD_LEN;
    let record = &data[position..position + LAP_RECORD_LEN];

    let num = LittleEndian::read_u32(&record[0..]) as i64;
    let start_time = LittleEndian::read_i64(&record[4..]);
    let end_time = LittleEndian::read_i64(&record[12..]);

    if num != index as i64 {
      return Err(Error::format(position, Reason::FieldOutOfRange("lap num")));
    }
    if start_time > end_time {
      return Err(Error::format(position,
                               Reason::FieldOutOfRange("lap times")));
    }
    if let Some(previous) = laps.last() {
      if start_time != previous.end_time() {
        return Err(Error::format(position,
                                 Reason::FieldOutOfRange("lap chain")));
      }
    }

    laps.push(Lap::new(num, start_time, end_time));
  }

  Ok(laps)
}

/// The lap table in boundary form: `num`, `start_time`, `end_time`, all
/// 64 bit.
pub(crate) fn to_table(laps: &[Lap]) -> Table {
  Table::new(vec![Column::new(Field::new("num"),
                              Array::I64(laps.iter()
                                             .map(Lap::num)
                                             .collect())),
                  Column::new(Field::new("start_time"),
                              Array::I64(laps.iter()
                                             .map(Lap::start_time)
                                             .collect())),
                  Column::new(Field::new("end_time"),
                              Array::I64(laps.iter()
                                             .map(Lap::end_time)
                                             .collect())),])
}
