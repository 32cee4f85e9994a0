// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Ouster OS0/OS1/OS2 point clouds from the Ouster ROS driver.
//!
//! The driver publishes organized clouds (`height` = beams) whose records
//! carry `t`, the firing time in nanoseconds from the start of the scan, so
//! no timing reconstruction is needed here.
//!
//! | field          | type | use                         |
//! |----------------|------|-----------------------------|
//! | x, y, z        | f32  | position                    |
//! | t              | u32  | ns relative to header stamp |
//! | intensity      | f32  | intensity (preferred)       |
//! | signal         | u16  | intensity fallback          |
//! | reflectivity   | u16  | intensity fallback          |
//! | ring           | u16  | beam index                  |

use crate::{
    buffer::{Point, PointBatch},
    config::{DecoderConfig, ScanFilter},
    formats::{CloudLayout, XyzFields, required},
    lidar::{Error, LidarDecoder, LidarModel, clockwise_azimuth},
    msgs::{ScanMessage, stamp_seconds},
};
use edgefirst_schemas::sensor_msgs::PointCloud2;
use tracing::{instrument, trace};

/// Fields tried, in order, for point intensity.
const INTENSITY_FIELDS: [&str; 3] = ["intensity", "signal", "reflectivity"];

pub struct OusterDecoder {
    model: LidarModel,
    filter: ScanFilter,
}

impl OusterDecoder {
    pub fn new(model: LidarModel, config: &DecoderConfig) -> Self {
        Self {
            model,
            filter: config.filter,
        }
    }

    #[instrument(skip_all, fields(width = cloud.width, height = cloud.height))]
    fn unpack_cloud(&self, cloud: &PointCloud2) -> Result<PointBatch, Error> {
        let layout = CloudLayout::new(cloud);
        let xyz = XyzFields::resolve(&layout)?;
        let t = required(&layout, "t")?;
        let intensity = layout.first_field(&INTENSITY_FIELDS);
        let ring = layout.field("ring");
        let width = (cloud.width as usize).max(1);

        let mut batch = PointBatch::with_capacity(stamp_seconds(&cloud.header.stamp), layout.len());
        for (index, record) in layout.records().enumerate() {
            let Some((x, y, z)) = xyz.read(record) else {
                continue;
            };
            let range = ((x * x + y * y + z * z) as f64).sqrt();
            if !self.filter.accepts(range, clockwise_azimuth(x, y)) {
                continue;
            }

            let Some(nanos) = t.read(record) else {
                continue;
            };
            // Organized clouds store one beam per row.
            let ring = match ring {
                Some(acc) => acc.read(record).unwrap_or_default() as u16,
                None => (index / width) as u16,
            };

            batch.push_with_range(
                Point {
                    x,
                    y,
                    z,
                    intensity: intensity
                        .and_then(|acc| acc.read_f32(record))
                        .unwrap_or_default(),
                    ring,
                    time: nanos * 1e-9,
                },
                range as f32,
            );
        }

        trace!(points = batch.len(), "unpacked ouster point cloud");
        Ok(batch)
    }
}

impl LidarDecoder for OusterDecoder {
    fn model(&self) -> LidarModel {
        self.model
    }

    fn unpack_scan(&mut self, msg: &ScanMessage) -> Result<PointBatch, Error> {
        match msg {
            ScanMessage::PointCloud2(cloud) => self.unpack_cloud(cloud),
            other => Err(self.type_mismatch(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        formats::{PointCloudWriter, PointFieldType},
        msgs::make_header,
    };

    fn decoder() -> OusterDecoder {
        OusterDecoder::new(LidarModel::Ouster64Points, &DecoderConfig::default())
    }

    #[test]
    fn test_time_and_intensity() {
        let mut writer = PointCloudWriter::new(&[
            ("x", PointFieldType::FLOAT32),
            ("y", PointFieldType::FLOAT32),
            ("z", PointFieldType::FLOAT32),
            ("intensity", PointFieldType::FLOAT32),
            ("t", PointFieldType::UINT32),
            ("reflectivity", PointFieldType::UINT16),
            ("ring", PointFieldType::UINT16),
        ]);
        writer.push(&[3.0, 4.0, 0.0, 120.0, 0.0, 9.0, 12.0]);
        writer.push(&[3.0, 0.0, 4.0, 80.0, 48_828.0, 9.0, 63.0]);
        let cloud = writer.finish(make_header(7.5, "os_sensor"));

        let batch = decoder()
            .unpack_scan(&ScanMessage::PointCloud2(cloud))
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.timestamp(), 7.5);
        assert_eq!(batch.time(), &[0.0, 48_828.0 * 1e-9]);
        assert_eq!(batch.intensity(), &[120.0, 80.0]);
        assert_eq!(batch.ring(), &[12, 63]);
        assert_eq!(batch.range(), &[5.0, 5.0]);
    }

    #[test]
    fn test_intensity_falls_back_to_signal() {
        let mut writer = PointCloudWriter::new(&[
            ("x", PointFieldType::FLOAT32),
            ("y", PointFieldType::FLOAT32),
            ("z", PointFieldType::FLOAT32),
            ("t", PointFieldType::UINT32),
            ("signal", PointFieldType::UINT16),
            ("reflectivity", PointFieldType::UINT16),
        ]);
        writer.push(&[1.0, 0.0, 0.0, 10.0, 311.0, 12.0]);
        let cloud = writer.finish(make_header(0.0, "os_sensor"));
        let batch = decoder()
            .unpack_scan(&ScanMessage::PointCloud2(cloud))
            .unwrap();
        assert_eq!(batch.intensity(), &[311.0]);
    }

    #[test]
    fn test_organized_cloud_ring_from_row() {
        let mut writer = PointCloudWriter::new(&[
            ("x", PointFieldType::FLOAT32),
            ("y", PointFieldType::FLOAT32),
            ("z", PointFieldType::FLOAT32),
            ("t", PointFieldType::UINT32),
        ]);
        for _ in 0..6 {
            writer.push(&[2.0, 0.0, 0.0, 0.0]);
        }
        let mut cloud = writer.finish(make_header(0.0, "os_sensor"));
        cloud.width = 3;
        cloud.height = 2;
        cloud.row_step = cloud.point_step * 3;

        let batch = decoder()
            .unpack_scan(&ScanMessage::PointCloud2(cloud))
            .unwrap();
        assert_eq!(batch.ring(), &[0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_zero_and_nan_returns_dropped() {
        let mut writer = PointCloudWriter::new(&[
            ("x", PointFieldType::FLOAT32),
            ("y", PointFieldType::FLOAT32),
            ("z", PointFieldType::FLOAT32),
            ("t", PointFieldType::UINT32),
        ]);
        writer.push(&[0.0, 0.0, 0.0, 0.0]);
        writer.push(&[f64::NAN, 1.0, 1.0, 0.0]);
        writer.push(&[250.0, 0.0, 0.0, 0.0]);
        writer.push(&[10.0, 0.0, 0.0, 100.0]);
        let cloud = writer.finish(make_header(0.0, "os_sensor"));
        let batch = decoder()
            .unpack_scan(&ScanMessage::PointCloud2(cloud))
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.x(), &[10.0]);
    }

    #[test]
    fn test_missing_time_field() {
        let mut writer = PointCloudWriter::new(&[
            ("x", PointFieldType::FLOAT32),
            ("y", PointFieldType::FLOAT32),
            ("z", PointFieldType::FLOAT32),
        ]);
        writer.push(&[1.0, 0.0, 0.0]);
        let cloud = writer.finish(make_header(0.0, "os_sensor"));
        let err = decoder()
            .unpack_scan(&ScanMessage::PointCloud2(cloud))
            .unwrap_err();
        assert!(matches!(err, Error::MissingField(ref name) if name == "t"));
    }
}
