// Copyright 2024 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use getset::Getters;
use std::collections::BTreeMap;


/// Column-level schema: a name plus the key/value pairs which travel with
/// the column across the library boundary. Inside the crate metadata lives
/// in typed descriptors; it is rendered into these pairs only when a table
/// is built.
#[derive(Clone, Debug, Getters, PartialEq)]
#[getset(get = "pub")]
pub struct Field {
  name:     String,
  metadata: BTreeMap<String, String>,
}

impl Field {
  pub fn new(name: &str) -> Self {
    Self { name:     name.to_string(),
           metadata: BTreeMap::new(), }
  }

  pub fn with_metadata(name: &str,
                       metadata: BTreeMap<String, String>)
                       -> Self
  {
    Self { name: name.to_string(),
           metadata }
  }

  /// Metadata in boundary form, i.e. as byte-string pairs.
  pub fn metadata_bytes(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
    self.metadata
        .iter()
        .map(|(k, v)| (k.clone().into_bytes(), v.clone().into_bytes()))
        .collect()
  }
}


/// Typed column storage. Timecodes are always `I64`; value columns take
/// whichever variant the channel descriptor dictates.
#[derive(Clone, Debug, PartialEq)]
pub enum Array {
  I64(Vec<i64>),
  I32(Vec<i32>),
  F32(Vec<f32>),
  F64(Vec<f64>),
}

impl Array {
  pub fn len(&self) -> usize {
    match self {
      Self::I64(values) => values.len(),
      Self::I32(values) => values.len(),
      Self::F32(values) => values.len(),
      Self::F64(values) => values.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Numeric view of a single element. Lossless for everything except
  /// `I64` values beyond 2^53, which do not occur in timecode ranges this
  /// library produces.
  pub fn value(&self, index: usize) -> f64 {
    match self {
      Self::I64(values) => values[index] as f64,
      Self::I32(values) => values[index] as f64,
      Self::F32(values) => values[index] as f64,
      Self::F64(values) => values[index],
    }
  }
}


/// One named, annotated column.
#[derive(Clone, Debug, Getters, PartialEq)]
#[getset(get = "pub")]
pub struct Column {
  field: Field,
  data:  Array,
}

impl Column {
  pub fn new(field: Field, data: Array) -> Self {
    Self { field, data }
  }

  pub fn name(&self) -> &str {
    self.field.name()
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}


/// An ordered set of equal-length columns. This is the shape in which all
/// results leave the library: per-channel tables, the lap table and the
/// merged wide table are all `Table`s.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
  columns: Vec<Column>,
}

impl Table {
  pub fn new(columns: Vec<Column>) -> Self {
    if let Some(first) = columns.first() {
      assert!(columns.iter().all(|column| column.len() == first.len()),
              "table columns must have equal lengths");
    }
    Self { columns }
  }

  pub fn columns(&self) -> &[Column] {
    &self.columns
  }

  pub fn num_columns(&self) -> usize {
    self.columns.len()
  }

  pub fn num_rows(&self) -> usize {
    self.columns.first().map(Column::len).unwrap_or(0)
  }

  pub fn column_names(&self) -> Vec<&str> {
    self.columns.iter().map(Column::name).collect()
  }

  pub fn column(&self, name: &str) -> Option<&Column> {
    self.columns.iter().find(|column| column.name() == name)
  }
}
