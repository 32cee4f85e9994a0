// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Decoder for point clouds published by the Velodyne driver.
//!
//! The driver output may or may not carry `time` and `ring` fields depending
//! on its version and settings. The first message is probed once to learn the
//! schema and the azimuth covered by one scan; later messages reuse that
//! probe.
//!
//! Without a `time` field, point times come from the azimuth travelled since
//! the first point of the message, assuming a uniform rotation rate:
//!
//! ```text
//! t = (travelled - travelled_first) / scan_angle × scan_period
//! ```
//!
//! Travelled azimuth is unwrapped by a [`ContinuityTracker`] that lives as
//! long as the decoder, so revolutions are counted across messages.

use crate::{
    buffer::{Point, PointBatch},
    config::{DecoderConfig, ScanFilter},
    formats::{CloudLayout, FieldAccessor, XyzFields, required},
    lidar::{Error, LidarDecoder, LidarModel, clockwise_azimuth},
    msgs::{ScanMessage, stamp_seconds},
};
use edgefirst_schemas::sensor_msgs::PointCloud2;
use std::collections::BTreeSet;
use tracing::{debug, instrument, trace};

/// Smallest azimuth span, in degrees, accepted for time inference.
const MIN_SCAN_ANGLE: f64 = 1.0;

/// Unwraps clockwise azimuth into total degrees travelled.
///
/// A drop of more than 180° between consecutive observations counts as a new
/// revolution; a jump of more than 180° counts as stepping back over zero.
#[derive(Clone, Debug, Default)]
pub struct ContinuityTracker {
    start: f64,
    last: Option<f64>,
    revolutions: i64,
}

impl ContinuityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `azimuth` (degrees, clockwise) and return the degrees
    /// travelled since the first observation.
    pub fn travelled(&mut self, azimuth: f64) -> f64 {
        match self.last {
            None => self.start = azimuth,
            Some(last) => {
                let delta = azimuth - last;
                if delta < -180.0 {
                    self.revolutions += 1;
                } else if delta > 180.0 {
                    self.revolutions -= 1;
                }
            }
        }
        self.last = Some(azimuth);
        self.revolutions as f64 * 360.0 + azimuth - self.start
    }

    /// Completed revolutions since the first observation.
    pub fn revolutions(&self) -> i64 {
        self.revolutions
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Schema and geometry learned from the first message.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanGeometry {
    pub has_time: bool,
    pub has_ring: bool,
    pub num_rings: usize,
    /// Azimuth travelled from the first to the last point, degrees
    pub scan_angle: f64,
}

/// Vertical angle of the lowest laser and the spacing between lasers.
#[derive(Clone, Copy, Debug)]
struct VerticalLayout {
    lowest: f64,
    step: f64,
}

impl VerticalLayout {
    fn for_model(model: LidarModel) -> Self {
        match model {
            LidarModel::Vlp32ePoints => Self {
                lowest: -30.67,
                step: 1.333,
            },
            _ => Self {
                lowest: -15.0,
                step: 2.0,
            },
        }
    }

    /// Ring whose nominal vertical angle is closest to the point's, clamped
    /// to the `rings` lasers of the scan.
    fn ring(&self, x: f32, y: f32, z: f32, rings: usize) -> u16 {
        let xy = ((x * x + y * y) as f64).sqrt();
        let angle = (z as f64).atan2(xy).to_degrees();
        let ring = ((angle - self.lowest) / self.step).round();
        ring.clamp(0.0, rings.saturating_sub(1) as f64) as u16
    }
}

/// Field accessors resolved for one message.
struct Fields {
    xyz: XyzFields,
    intensity: Option<FieldAccessor>,
    ring: Option<FieldAccessor>,
    time: Option<FieldAccessor>,
}

impl Fields {
    fn resolve(layout: &CloudLayout, geometry: &ScanGeometry) -> Result<Self, Error> {
        Ok(Self {
            xyz: XyzFields::resolve(layout)?,
            intensity: layout.field("intensity"),
            ring: geometry
                .has_ring
                .then(|| required(layout, "ring"))
                .transpose()?,
            time: geometry
                .has_time
                .then(|| required(layout, "time"))
                .transpose()?,
        })
    }
}

/// Decoder for `VLP_16_POINTS` and `VLP_32E_POINTS`.
pub struct VelodynePointsDecoder {
    model: LidarModel,
    filter: ScanFilter,
    scan_period: f64,
    vertical: VerticalLayout,
    geometry: Option<ScanGeometry>,
    tracker: ContinuityTracker,
}

impl VelodynePointsDecoder {
    pub fn new(model: LidarModel, config: &DecoderConfig) -> Self {
        Self {
            model,
            filter: config.filter,
            scan_period: config.scan_period(),
            vertical: VerticalLayout::for_model(model),
            geometry: None,
            tracker: ContinuityTracker::new(),
        }
    }

    /// Geometry probed from the first message, once available.
    pub fn geometry(&self) -> Option<&ScanGeometry> {
        self.geometry.as_ref()
    }

    fn probe(&self, cloud: &PointCloud2) -> Result<ScanGeometry, Error> {
        let layout = CloudLayout::new(cloud);
        for name in ["x", "y", "z"] {
            if !layout.has_field(name) {
                return Err(Error::ScanParameterInitFailure(format!(
                    "point cloud has no '{}' field",
                    name
                )));
            }
        }
        let has_time = layout.has_field("time");
        let has_ring = layout.has_field("ring");
        let geometry = ScanGeometry {
            has_time,
            has_ring,
            num_rings: 0,
            scan_angle: 0.0,
        };
        let fields = Fields::resolve(&layout, &geometry)?;

        let mut tracker = ContinuityTracker::new();
        let mut rings = BTreeSet::new();
        let mut scan_angle = None;
        for record in layout.records() {
            let Some((x, y, _)) = fields.xyz.read(record) else {
                continue;
            };
            scan_angle = Some(tracker.travelled(clockwise_azimuth(x, y)));
            if let Some(ring) = fields.ring.and_then(|acc| acc.read(record)) {
                rings.insert(ring as u16);
            }
        }

        let Some(scan_angle) = scan_angle else {
            return Err(Error::ScanParameterInitFailure(
                "first message has no finite points".to_string(),
            ));
        };
        // Counter-clockwise or stationary clouds cannot be timed by azimuth.
        if !has_time && scan_angle < MIN_SCAN_ANGLE {
            return Err(Error::ScanParameterInitFailure(format!(
                "first message spans {:.3} degrees clockwise, too little to infer point times",
                scan_angle
            )));
        }

        let num_rings = if has_ring {
            rings.len()
        } else {
            self.model.channels()
        };
        Ok(ScanGeometry {
            num_rings,
            scan_angle,
            ..geometry
        })
    }

    #[instrument(skip_all, fields(points = cloud.width as u64 * cloud.height as u64))]
    fn unpack_cloud(&mut self, cloud: &PointCloud2) -> Result<PointBatch, Error> {
        let geometry = match self.geometry {
            Some(geometry) => geometry,
            None => {
                let geometry = self.probe(cloud)?;
                debug!(model = %self.model, ?geometry, "probed point cloud schema");
                self.geometry = Some(geometry);
                geometry
            }
        };

        let layout = CloudLayout::new(cloud);
        let fields = Fields::resolve(&layout, &geometry)?;
        let mut batch = PointBatch::with_capacity(stamp_seconds(&cloud.header.stamp), layout.len());

        let mut first_travelled = None;
        let mut last_time = 0.0f64;
        for record in layout.records() {
            let Some((x, y, z)) = fields.xyz.read(record) else {
                continue;
            };
            let azimuth = clockwise_azimuth(x, y);

            let time = match fields.time {
                Some(acc) => acc.read(record).unwrap_or_default(),
                None => {
                    let travelled = self.tracker.travelled(azimuth);
                    let first = *first_travelled.get_or_insert(travelled);
                    let t = (travelled - first) / geometry.scan_angle * self.scan_period;
                    last_time = t.max(last_time);
                    last_time
                }
            };

            let range = ((x * x + y * y + z * z) as f64).sqrt();
            if !self.filter.accepts(range, azimuth) {
                continue;
            }

            let ring = match fields.ring {
                Some(acc) => acc.read(record).unwrap_or_default() as u16,
                None => self.vertical.ring(x, y, z, geometry.num_rings),
            };
            let intensity = fields
                .intensity
                .and_then(|acc| acc.read_f32(record))
                .unwrap_or_default();

            batch.push_with_range(
                Point {
                    x,
                    y,
                    z,
                    intensity,
                    ring,
                    time,
                },
                range as f32,
            );
        }

        trace!(
            points = batch.len(),
            revolutions = self.tracker.revolutions(),
            "unpacked velodyne point cloud"
        );
        Ok(batch)
    }
}

impl LidarDecoder for VelodynePointsDecoder {
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
