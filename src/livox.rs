// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Livox Mid-360 / Avia custom messages.
//!
//! Livox sensors use a non-repetitive scan pattern, so there is no azimuth
//! based timing: each point carries `offset_time` in nanoseconds from the
//! message `timebase`, which becomes the batch reference time.
//!
//! The `tag` byte packs return information; bits 4-5 select the return:
//!
//! ```text
//! tag & 0x30 == 0x00   single/strongest return   kept
//! tag & 0x30 == 0x10   first return              kept
//! tag & 0x30 == 0x20   second return             dropped
//! tag & 0x30 == 0x30   third return              dropped
//! ```

use crate::{
    buffer::{Point, PointBatch},
    config::{DecoderConfig, ScanFilter},
    lidar::{Error, LidarDecoder, LidarModel, clockwise_azimuth},
    msgs::{LivoxCustomMsg, LivoxPoint, ScanMessage},
};
use tracing::{instrument, trace};

const RETURN_MASK: u8 = 0x30;

pub struct LivoxDecoder {
    model: LidarModel,
    filter: ScanFilter,
    lines: usize,
}

impl LivoxDecoder {
    pub fn new(model: LidarModel, config: &DecoderConfig) -> Self {
        Self {
            model,
            filter: config.filter,
            lines: model.channels(),
        }
    }

    /// Primary return on a known scan line.
    #[inline]
    fn keep(&self, point: &LivoxPoint) -> bool {
        (point.line as usize) < self.lines && matches!(point.tag & RETURN_MASK, 0x00 | 0x10)
    }

    #[instrument(skip_all, fields(points = msg.points.len()))]
    fn unpack_custom(&self, msg: &LivoxCustomMsg) -> PointBatch {
        let mut batch = PointBatch::with_capacity(msg.timebase as f64 * 1e-9, msg.points.len());
        for point in msg.points.iter().filter(|p| self.keep(p)) {
            let LivoxPoint { x, y, z, .. } = *point;
            if !(x.is_finite() && y.is_finite() && z.is_finite()) {
                continue;
            }
            let range = ((x * x + y * y + z * z) as f64).sqrt();
            if !self.filter.accepts(range, clockwise_azimuth(x, y)) {
                continue;
            }
            batch.push_with_range(
                Point {
                    x,
                    y,
                    z,
                    intensity: point.reflectivity as f32,
                    ring: point.line as u16,
                    time: point.offset_time as f64 * 1e-9,
                },
                range as f32,
            );
        }

        trace!(
            lidar_id = msg.lidar_id,
            points = batch.len(),
            "unpacked livox message"
        );
        batch
    }
}

impl LidarDecoder for LivoxDecoder {
    fn model(&self) -> LidarModel {
        self.model
    }

    fn unpack_scan(&mut self, msg: &ScanMessage) -> Result<PointBatch, Error> {
        match msg {
            ScanMessage::LivoxCustom(custom) => Ok(self.unpack_custom(custom)),
            other => Err(self.type_mismatch(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs::make_header;

    fn point(offset_time: u32, x: f32, line: u8, tag: u8) -> LivoxPoint {
        LivoxPoint {
            offset_time,
            x,
            y: 0.0,
            z: 0.0,
            reflectivity: 42,
            tag,
            line,
        }
    }

    fn message(points: Vec<LivoxPoint>) -> ScanMessage {
        ScanMessage::LivoxCustom(LivoxCustomMsg {
            header: make_header(0.0, "livox_frame"),
            timebase: 1_700_000_000_500_000_000,
            point_num: points.len() as u32,
            lidar_id: 0,
            rsvd: [0; 3],
            points,
        })
    }

    #[test]
    fn test_times_from_timebase() {
        let mut decoder = LivoxDecoder::new(LidarModel::LivoxMid360, &DecoderConfig::default());
        let batch = decoder
            .unpack_scan(&message(vec![point(0, 5.0, 0, 0x00), point(250_000, 6.0, 3, 0x10)]))
            .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.timestamp(), 1_700_000_000_500_000_000u64 as f64 * 1e-9);
        assert_eq!(batch.time(), &[0.0, 250_000.0 * 1e-9]);
        assert_eq!(batch.ring(), &[0, 3]);
        assert_eq!(batch.intensity(), &[42.0, 42.0]);
    }

    #[test]
    fn test_secondary_returns_dropped() {
        let mut decoder = LivoxDecoder::new(LidarModel::LivoxAvia, &DecoderConfig::default());
        let batch = decoder
            .unpack_scan(&message(vec![
                point(0, 5.0, 0, 0x00),
                point(1, 5.0, 0, 0x20),
                point(2, 5.0, 0, 0x30),
                point(3, 5.0, 0, 0x15),
            ]))
            .unwrap();
        assert_eq!(batch.time(), &[0.0, 3.0 * 1e-9]);
    }

    #[test]
    fn test_unknown_lines_dropped() {
        // Mid-360 has 4 lines, Avia 6
        let points = vec![point(0, 5.0, 3, 0), point(1, 5.0, 4, 0), point(2, 5.0, 5, 0)];
        let mut mid = LivoxDecoder::new(LidarModel::LivoxMid360, &DecoderConfig::default());
        assert_eq!(mid.unpack_scan(&message(points.clone())).unwrap().len(), 1);
        let mut avia = LivoxDecoder::new(LidarModel::LivoxAvia, &DecoderConfig::default());
        assert_eq!(avia.unpack_scan(&message(points)).unwrap().len(), 3);
    }

    #[test]
    fn test_range_filter() {
        let mut decoder = LivoxDecoder::new(LidarModel::LivoxAvia, &DecoderConfig::default());
        let batch = decoder
            .unpack_scan(&message(vec![
                point(0, 0.1, 0, 0),
                point(1, 0.2, 0, 0),
                point(2, f32::NAN, 0, 0),
            ]))
            .unwrap();
        assert_eq!(batch.len(), 1);
    }
}
