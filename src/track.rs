// Copyright 2024 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{error::Result, logfile::LogFile};
use serde_json::{json, Map, Value};
use std::path::Path;


const GPS_CHANNELS: [(&str, &str); 4] = [("latitude", "GPS Latitude"),
                                         ("longitude", "GPS Longitude"),
                                         ("altitude", "GPS Altitude"),
                                         ("speed", "GPS Speed")];


/// Loads `path` and describes its GPS track as a JSON object: the venue,
/// the sample times of the position fix and parallel coordinate arrays.
/// Files logged without GPS yield empty arrays and a zero point count.
pub fn aim_track(path: &Path) -> Result<Value> {
  let log = LogFile::load(path)?;

  let mut track = Map::new();
  track.insert("file_name".to_string(), json!(log.file_name()));
  track.insert("venue".to_string(),
               json!(log.metadata()
                        .get("Venue")
                        .and_then(|value| value.as_str())
                        .unwrap_or("")));

  let fixes = log.channel("GPS Latitude");
  track.insert("point_count".to_string(),
               json!(fixes.map(|channel| channel.len()).unwrap_or(0)));
  track.insert("time".to_string(),
               json!(fixes.map(|channel| channel.timecodes().clone())
                          .unwrap_or_default()));

  for (key, name) in GPS_CHANNELS.iter() {
    let values: Vec<f64> = log.channel(name)
                              .map(|channel| {
                                (0..channel.len()).map(|index| {
                                                    channel.values()
                                                           .value(index)
                                                  })
                                                  .collect()
                              })
                              .unwrap_or_default();
    track.insert(key.to_string(), json!(values));
  }

  Ok(Value::Object(track))
}


#[cfg(test)]
mod tests {
  use super::{super::testutil::{ChannelSpec, XrkBuilder}, *};
  use pretty_assertions::assert_eq;


  #[test]
  fn aim_track_test() {
    let latitude = |deg: f64| (deg / 1e-7).round() as i32;
    let longitude = |deg: f64| (deg / 1e-7).round() as i32;
    let path =
      XrkBuilder::new().venue("Fuji GP Sh")
                       .channel(ChannelSpec::i32(1, "GPS Latitude", "deg")
                                  .dec_pts(4)
                                  .interpolate(true)
                                  .scaling(1e-7, 0.0))
                       .channel(ChannelSpec::i32(2, "GPS Longitude", "deg")
                                  .dec_pts(4)
                                  .interpolate(true)
                                  .scaling(1e-7, 0.0))
                       .channel(ChannelSpec::f32(3, "GPS Speed", "m/s")
                                  .dec_pts(1)
                                  .interpolate(true))
                       .singleton_i32(1, 100, latitude(35.3741))
                       .singleton_i32(2, 100, longitude(138.9301))
                       .singleton_f32(3, 100, 42.5)
                       .singleton_i32(1, 100, latitude(35.3742))
                       .singleton_i32(2, 100, longitude(138.9302))
                       .singleton_f32(3, 100, 43.5)
                       .write("track_gps.xrk");

    let track = aim_track(&path).unwrap();

    assert_eq!("Fuji GP Sh", track["venue"]);
    assert_eq!(2, track["point_count"]);
    assert_eq!(json!([100, 200]), track["time"]);

    let latitudes = track["latitude"].as_array().unwrap();
    assert_eq!(2, latitudes.len());
    assert!((latitudes[0].as_f64().unwrap() - 35.3741).abs() < 1e-6);

    let speeds = track["speed"].as_array().unwrap();
    assert_eq!(43.5, speeds[1].as_f64().unwrap());

    // no altitude channel in this file
    assert_eq!(json!([]), track["altitude"]);
  }

  #[test]
  fn aim_track_without_gps_test() {
    let path = XrkBuilder::new().channel(ChannelSpec::f32(1, "RPM", "rpm"))
                                .singleton_f32(1, 0, 712.0)
                                .write("track_no_gps.xrk");

    let track = aim_track(&path).unwrap();
    assert_eq!(0, track["point_count"]);
    assert_eq!(json!([]), track["time"]);
    assert_eq!(json!([]), track["latitude"]);
    assert_eq!(json!([]), track["longitude"]);
  }
}
