// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Hesai Pandar XT16/XT32 point clouds.
//!
//! The Hesai driver stamps every point with an absolute `timestamp` (f64
//! seconds); point times here are that value minus the header stamp.

use crate::{
    buffer::{Point, PointBatch},
    config::{DecoderConfig, ScanFilter},
    formats::{CloudLayout, XyzFields, required},
    lidar::{Error, LidarDecoder, LidarModel, clockwise_azimuth},
    msgs::{ScanMessage, stamp_seconds},
};
use edgefirst_schemas::sensor_msgs::PointCloud2;
use tracing::{instrument, trace};

pub struct PandarXtDecoder {
    model: LidarModel,
    filter: ScanFilter,
}

impl PandarXtDecoder {
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
        let timestamp = required(&layout, "timestamp")?;
        let intensity = layout.field("intensity");
        let ring = layout.field("ring");

        let reference = stamp_seconds(&cloud.header.stamp);
        let mut batch = PointBatch::with_capacity(reference, layout.len());
        for record in layout.records() {
            let Some((x, y, z)) = xyz.read(record) else {
                continue;
            };
            let range = ((x * x + y * y + z * z) as f64).sqrt();
            if !self.filter.accepts(range, clockwise_azimuth(x, y)) {
                continue;
            }
            let Some(absolute) = timestamp.read(record) else {
                continue;
            };

            batch.push_with_range(
                Point {
                    x,
                    y,
                    z,
                    intensity: intensity
                        .and_then(|acc| acc.read_f32(record))
                        .unwrap_or_default(),
                    ring: ring
                        .and_then(|acc| acc.read(record))
                        .unwrap_or_default() as u16,
                    time: absolute - reference,
                },
                range as f32,
            );
        }

        trace!(points = batch.len(), "unpacked pandar point cloud");
        Ok(batch)
    }
}

impl LidarDecoder for PandarXtDecoder {
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
