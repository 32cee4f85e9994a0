// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! PointCloud2 field layout access.
//!
//! Point-cloud-native LiDAR drivers publish `sensor_msgs/PointCloud2` with
//! driver-specific field sets. [`CloudLayout`] resolves named fields once per
//! message and reads typed values from each packed record, honouring
//! `is_bigendian`, `point_step` and `row_step`.
//!
//! ```text
//! row_step
//! ├───────────────────────────────────────────────┤
//! ┌───────┬───────┬───────┬───────────┬──────┬─────┐
//! │ x:f32 │ y:f32 │ z:f32 │ intensity │ ring │ ... │  ← point_step
//! └───────┴───────┴───────┴───────────┴──────┴─────┘
//! ```
//!
//! [`PointCloudWriter`] goes the other way and packs records into a cloud; it
//! is used to build synthetic driver output.

use crate::lidar::Error;
use edgefirst_schemas::{
    sensor_msgs::{PointCloud2, PointField},
    std_msgs::Header,
};

/// Point field data types for PointCloud2 messages.
///
/// These values correspond to the ROS sensor_msgs/PointField datatype field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PointFieldType {
    INT8 = 1,
    UINT8 = 2,
    INT16 = 3,
    UINT16 = 4,
    INT32 = 5,
    UINT32 = 6,
    FLOAT32 = 7,
    FLOAT64 = 8,
}

impl PointFieldType {
    pub fn from_datatype(datatype: u8) -> Option<Self> {
        match datatype {
            1 => Some(PointFieldType::INT8),
            2 => Some(PointFieldType::UINT8),
            3 => Some(PointFieldType::INT16),
            4 => Some(PointFieldType::UINT16),
            5 => Some(PointFieldType::INT32),
            6 => Some(PointFieldType::UINT32),
            7 => Some(PointFieldType::FLOAT32),
            8 => Some(PointFieldType::FLOAT64),
            _ => None,
        }
    }

    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            PointFieldType::INT8 | PointFieldType::UINT8 => 1,
            PointFieldType::INT16 | PointFieldType::UINT16 => 2,
            PointFieldType::INT32 | PointFieldType::UINT32 | PointFieldType::FLOAT32 => 4,
            PointFieldType::FLOAT64 => 8,
        }
    }
}

/// Build packed point fields from `(name, type)` pairs, assigning offsets in
/// order with no padding.
///
/// Returns the fields and the resulting point step.
pub fn packed_fields(schema: &[(&str, PointFieldType)]) -> (Vec<PointField>, u32) {
    let mut offset = 0u32;
    let fields = schema
        .iter()
        .map(|&(name, datatype)| {
            let field = PointField {
                name: String::from(name),
                offset,
                datatype: datatype as u8,
                count: 1,
            };
            offset += datatype.size() as u32;
            field
        })
        .collect();
    (fields, offset)
}

/// Location and type of one field inside a point record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAccessor {
    offset: usize,
    datatype: PointFieldType,
    big_endian: bool,
}

impl FieldAccessor {
    pub fn datatype(&self) -> PointFieldType {
        self.datatype
    }

    /// Read the field from `record` as `f64`.
    ///
    /// Returns `None` when the record is too short to hold the field.
    #[inline]
    pub fn read(&self, record: &[u8]) -> Option<f64> {
        let bytes = record.get(self.offset..self.offset + self.datatype.size())?;
        let value = match (self.datatype, self.big_endian) {
            (PointFieldType::INT8, _) => bytes[0] as i8 as f64,
            (PointFieldType::UINT8, _) => bytes[0] as f64,
            (PointFieldType::INT16, false) => i16::from_le_bytes(bytes.try_into().ok()?) as f64,
            (PointFieldType::INT16, true) => i16::from_be_bytes(bytes.try_into().ok()?) as f64,
            (PointFieldType::UINT16, false) => u16::from_le_bytes(bytes.try_into().ok()?) as f64,
            (PointFieldType::UINT16, true) => u16::from_be_bytes(bytes.try_into().ok()?) as f64,
            (PointFieldType::INT32, false) => i32::from_le_bytes(bytes.try_into().ok()?) as f64,
            (PointFieldType::INT32, true) => i32::from_be_bytes(bytes.try_into().ok()?) as f64,
            (PointFieldType::UINT32, false) => u32::from_le_bytes(bytes.try_into().ok()?) as f64,
            (PointFieldType::UINT32, true) => u32::from_be_bytes(bytes.try_into().ok()?) as f64,
            (PointFieldType::FLOAT32, false) => f32::from_le_bytes(bytes.try_into().ok()?) as f64,
            (PointFieldType::FLOAT32, true) => f32::from_be_bytes(bytes.try_into().ok()?) as f64,
            (PointFieldType::FLOAT64, false) => f64::from_le_bytes(bytes.try_into().ok()?),
            (PointFieldType::FLOAT64, true) => f64::from_be_bytes(bytes.try_into().ok()?),
        };
        Some(value)
    }

    /// Read a `FLOAT32` field without widening, falling back to the generic
    /// path for other types.
    #[inline]
    pub fn read_f32(&self, record: &[u8]) -> Option<f32> {
        if self.datatype == PointFieldType::FLOAT32 {
            let bytes: [u8; 4] = record.get(self.offset..self.offset + 4)?.try_into().ok()?;
            return Some(if self.big_endian {
                f32::from_be_bytes(bytes)
            } else {
                f32::from_le_bytes(bytes)
            });
        }
        self.read(record).map(|v| v as f32)
    }
}

/// Field-level view of a `PointCloud2` message.
#[derive(Debug, Clone, Copy)]
pub struct CloudLayout<'a> {
    cloud: &'a PointCloud2,
}

impl<'a> CloudLayout<'a> {
    pub fn new(cloud: &'a PointCloud2) -> Self {
        Self { cloud }
    }

    /// Look up a field by name.
    ///
    /// Fields with an unknown datatype, or whose extent does not fit inside
    /// `point_step`, are treated as absent.
    pub fn field(&self, name: &str) -> Option<FieldAccessor> {
        let field = self.cloud.fields.iter().find(|f| f.name == name)?;
        let datatype = PointFieldType::from_datatype(field.datatype)?;
        let offset = field.offset as usize;
        if offset + datatype.size() > self.cloud.point_step as usize {
            return None;
        }
        Some(FieldAccessor {
            offset,
            datatype,
            big_endian: self.cloud.is_bigendian,
        })
    }

    /// First field present among `names`.
    pub fn first_field(&self, names: &[&str]) -> Option<FieldAccessor> {
        names.iter().find_map(|name| self.field(name))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Number of point records declared by the header (`width * height`).
    pub fn len(&self) -> usize {
        self.cloud.width as usize * self.cloud.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of record `index`, or `None` when the data buffer is too short.
    #[inline]
    pub fn record(&self, index: usize) -> Option<&'a [u8]> {
        let width = self.cloud.width as usize;
        if width == 0 {
            return None;
        }
        let (row, col) = (index / width, index % width);
        let start = row * self.cloud.row_step as usize + col * self.cloud.point_step as usize;
        self.cloud
            .data
            .get(start..start + self.cloud.point_step as usize)
    }

    /// Iterate over complete records in storage order, stopping at the first
    /// truncated one.
    pub fn records(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        (0..self.len()).map_while(move |i| self.record(i))
    }
}

/// The mandatory `x`, `y`, `z` fields of a cloud.
#[derive(Debug, Clone, Copy)]
pub struct XyzFields {
    x: FieldAccessor,
    y: FieldAccessor,
    z: FieldAccessor,
}

impl XyzFields {
    /// Resolve the coordinate fields, failing with [`Error::MissingField`].
    pub fn resolve(layout: &CloudLayout) -> Result<Self, Error> {
        Ok(Self {
            x: required(layout, "x")?,
            y: required(layout, "y")?,
            z: required(layout, "z")?,
        })
    }

    /// Coordinates of `record`, or `None` unless all three are finite.
    #[inline]
    pub fn read(&self, record: &[u8]) -> Option<(f32, f32, f32)> {
        let x = self.x.read_f32(record)?;
        let y = self.y.read_f32(record)?;
        let z = self.z.read_f32(record)?;
        (x.is_finite() && y.is_finite() && z.is_finite()).then_some((x, y, z))
    }
}

/// Look up a field that must be present.
pub fn required(layout: &CloudLayout, name: &str) -> Result<FieldAccessor, Error> {
    layout
        .field(name)
        .ok_or_else(|| Error::MissingField(name.to_string()))
}

/// Packs point records into an unorganized (`height = 1`) little-endian
/// `PointCloud2`.
///
/// # Example
///
/// ```
/// use edgefirst_lidar_decode::formats::{CloudLayout, PointCloudWriter, PointFieldType};
/// use edgefirst_lidar_decode::msgs::make_header;
///
/// let mut writer = PointCloudWriter::new(&[
///     ("x", PointFieldType::FLOAT32),
///     ("ring", PointFieldType::UINT16),
/// ]);
/// writer.push(&[1.5, 7.0]);
/// let cloud = writer.finish(make_header(0.0, "lidar"));
///
/// let layout = CloudLayout::new(&cloud);
/// let ring = layout.field("ring").unwrap();
/// assert_eq!(ring.read(layout.record(0).unwrap()), Some(7.0));
/// ```
pub struct PointCloudWriter {
    fields: Vec<PointField>,
    types: Vec<PointFieldType>,
    point_step: u32,
    data: Vec<u8>,
    width: u32,
}

impl PointCloudWriter {
    pub fn new(schema: &[(&str, PointFieldType)]) -> Self {
        let (fields, point_step) = packed_fields(schema);
        Self {
            fields,
            types: schema.iter().map(|(_, datatype)| *datatype).collect(),
            point_step,
            data: Vec::new(),
            width: 0,
        }
    }

    /// Append one record; `values` are given in field order and cast to each
    /// field's type.
    ///
    /// # Panics
    ///
    /// Panics if `values.len()` differs from the number of fields.
    pub fn push(&mut self, values: &[f64]) {
        assert_eq!(values.len(), self.fields.len(), "one value per field");
        for (datatype, &value) in self.types.iter().zip(values) {
            match datatype {
                PointFieldType::INT8 => self.data.push(value as i8 as u8),
                PointFieldType::UINT8 => self.data.push(value as u8),
                PointFieldType::INT16 => self.data.extend_from_slice(&(value as i16).to_le_bytes()),
                PointFieldType::UINT16 => {
                    self.data.extend_from_slice(&(value as u16).to_le_bytes())
                }
                PointFieldType::INT32 => self.data.extend_from_slice(&(value as i32).to_le_bytes()),
                PointFieldType::UINT32 => {
                    self.data.extend_from_slice(&(value as u32).to_le_bytes())
                }
                PointFieldType::FLOAT32 => {
                    self.data.extend_from_slice(&(value as f32).to_le_bytes())
                }
                PointFieldType::FLOAT64 => self.data.extend_from_slice(&value.to_le_bytes()),
            }
        }
        self.width += 1;
    }

    pub fn len(&self) -> usize {
        self.width as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0
    }

    pub fn finish(self, header: Header) -> PointCloud2 {
        PointCloud2 {
            header,
            height: 1,
            width: self.width,
            fields: self.fields,
            is_bigendian: false,
            point_step: self.point_step,
            row_step: self.point_step * self.width,
            data: self.data,
            is_dense: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs::make_header;

    fn cloud(is_bigendian: bool, data: Vec<u8>, fields: Vec<PointField>, step: u32) -> PointCloud2 {
        let width = data.len() as u32 / step;
        PointCloud2 {
            header: make_header(0.0, "lidar"),
            height: 1,
            width,
            fields,
            is_bigendian,
            point_step: step,
            row_step: step * width,
            data,
            is_dense: true,
        }
    }

    #[test]
    fn test_packed_fields() {
        let (fields, step) = packed_fields(&[
            ("x", PointFieldType::FLOAT32),
            ("y", PointFieldType::FLOAT32),
            ("z", PointFieldType::FLOAT32),
            ("intensity", PointFieldType::FLOAT32),
            ("ring", PointFieldType::UINT16),
            ("time", PointFieldType::FLOAT32),
        ]);
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[0].name, "x");
        assert_eq!(fields[0].offset, 0);
        assert_eq!(fields[4].name, "ring");
        assert_eq!(fields[4].offset, 16);
        assert_eq!(fields[4].datatype, PointFieldType::UINT16 as u8);
        assert_eq!(fields[5].offset, 18);
        assert_eq!(step, 22);
    }

    #[test]
    fn test_read_little_and_big_endian() {
        let (fields, step) = packed_fields(&[
            ("t", PointFieldType::UINT32),
            ("v", PointFieldType::FLOAT64),
        ]);

        let mut le = Vec::new();
        le.extend_from_slice(&123_456u32.to_le_bytes());
        le.extend_from_slice(&(-2.5f64).to_le_bytes());
        let le_cloud = cloud(false, le, fields.clone(), step);

        let mut be = Vec::new();
        be.extend_from_slice(&123_456u32.to_be_bytes());
        be.extend_from_slice(&(-2.5f64).to_be_bytes());
        let be_cloud = cloud(true, be, fields, step);

        for c in [&le_cloud, &be_cloud] {
            let layout = CloudLayout::new(c);
            let record = layout.record(0).unwrap();
            assert_eq!(layout.field("t").unwrap().read(record), Some(123_456.0));
            assert_eq!(layout.field("v").unwrap().read(record), Some(-2.5));
        }
    }

    #[test]
    fn test_signed_and_small_types() {
        let (fields, step) = packed_fields(&[
            ("a", PointFieldType::INT8),
            ("b", PointFieldType::INT16),
            ("c", PointFieldType::INT32),
        ]);
        let mut data = vec![(-3i8) as u8];
        data.extend_from_slice(&(-300i16).to_le_bytes());
        data.extend_from_slice(&(-70_000i32).to_le_bytes());
        let c = cloud(false, data, fields, step);
        let layout = CloudLayout::new(&c);
        let record = layout.record(0).unwrap();
        assert_eq!(layout.field("a").unwrap().read(record), Some(-3.0));
        assert_eq!(layout.field("b").unwrap().read(record), Some(-300.0));
        assert_eq!(layout.field("c").unwrap().read(record), Some(-70_000.0));
    }

    #[test]
    fn test_missing_and_invalid_fields() {
        let fields = vec![
            PointField {
                name: String::from("x"),
                offset: 0,
                datatype: PointFieldType::FLOAT32 as u8,
                count: 1,
            },
            PointField {
                name: String::from("bogus"),
                offset: 0,
                datatype: 42,
                count: 1,
            },
            PointField {
                name: String::from("outside"),
                offset: 4,
                datatype: PointFieldType::FLOAT32 as u8,
                count: 1,
            },
        ];
        let c = cloud(false, vec![0u8; 4], fields, 4);
        let layout = CloudLayout::new(&c);
        assert!(layout.has_field("x"));
        assert!(!layout.has_field("bogus"));
        assert!(!layout.has_field("outside"));
        assert!(!layout.has_field("y"));
        assert_eq!(
            layout.first_field(&["y", "x"]).map(|f| f.datatype()),
            Some(PointFieldType::FLOAT32)
        );
    }

    #[test]
    fn test_truncated_data_stops_iteration() {
        let (fields, step) = packed_fields(&[("x", PointFieldType::FLOAT32)]);
        let mut c = cloud(false, vec![0u8; 8], fields, step);
        c.width = 5;
        c.row_step = 20;
        let layout = CloudLayout::new(&c);
        assert_eq!(layout.len(), 5);
        assert_eq!(layout.records().count(), 2);
        assert!(layout.record(2).is_none());
    }

    #[test]
    fn test_organized_cloud_row_step() {
        // 2 rows of 2 points, with 4 bytes of row padding
        let (fields, step) = packed_fields(&[("x", PointFieldType::FLOAT32)]);
        let mut data = Vec::new();
        for row in 0..2 {
            for col in 0..2 {
                data.extend_from_slice(&((row * 10 + col) as f32).to_le_bytes());
            }
            data.extend_from_slice(&[0xAA; 4]);
        }
        let c = PointCloud2 {
            header: make_header(0.0, "lidar"),
            height: 2,
            width: 2,
            fields,
            is_bigendian: false,
            point_step: step,
            row_step: 12,
            data,
            is_dense: true,
        };
        let layout = CloudLayout::new(&c);
        let x = layout.field("x").unwrap();
        let values: Vec<f32> = layout.records().filter_map(|r| x.read_f32(r)).collect();
        assert_eq!(values, vec![0.0, 1.0, 10.0, 11.0]);
    }

    #[test]
    fn test_writer_round_trip() {
        let mut writer = PointCloudWriter::new(&[
            ("x", PointFieldType::FLOAT32),
            ("t", PointFieldType::UINT32),
            ("timestamp", PointFieldType::FLOAT64),
        ]);
        assert!(writer.is_empty());
        writer.push(&[1.25, 5000.0, 1_700_000_000.123456]);
        writer.push(&[-4.0, 6000.0, 1_700_000_000.5]);
        assert_eq!(writer.len(), 2);

        let c = writer.finish(make_header(0.0, "lidar"));
        assert_eq!(c.point_step, 16);
        assert_eq!(c.row_step, 32);
        assert_eq!(c.data.len(), 32);

        let layout = CloudLayout::new(&c);
        let x = layout.field("x").unwrap();
        let t = layout.field("t").unwrap();
        let ts = layout.field("timestamp").unwrap();
        let r1 = layout.record(1).unwrap();
        assert_eq!(x.read_f32(r1), Some(-4.0));
        assert_eq!(t.read(r1), Some(6000.0));
        assert_eq!(ts.read(layout.record(0).unwrap()), Some(1_700_000_000.123456));
    }

    #[test]
    fn test_xyz_fields() {
        let mut writer = PointCloudWriter::new(&[
            ("x", PointFieldType::FLOAT32),
            ("y", PointFieldType::FLOAT32),
            ("z", PointFieldType::FLOAT32),
        ]);
        writer.push(&[1.0, 2.0, 3.0]);
        writer.push(&[1.0, f64::INFINITY, 3.0]);
        let c = writer.finish(make_header(0.0, "lidar"));
        let layout = CloudLayout::new(&c);
        let xyz = XyzFields::resolve(&layout).unwrap();
        assert_eq!(xyz.read(layout.record(0).unwrap()), Some((1.0, 2.0, 3.0)));
        assert_eq!(xyz.read(layout.record(1).unwrap()), None);

        let c = PointCloudWriter::new(&[("x", PointFieldType::FLOAT32)])
            .finish(make_header(0.0, "lidar"));
        let layout = CloudLayout::new(&c);
        match XyzFields::resolve(&layout) {
            Err(Error::MissingField(name)) => assert_eq!(name, "y"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
