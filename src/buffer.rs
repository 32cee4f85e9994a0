// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Decoded point batch storage.
//!
//! A [`PointBatch`] holds the points decoded from one input message in a
//! structure-of-arrays (SoA) layout, so downstream consumers can hand single
//! columns (e.g. `x()`, `time()`) to vectorised code without repacking.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ PointBatch   timestamp: f64 (reference, seconds) │
//! │   x: [f32]  y: [f32]  z: [f32]  range: [f32]     │
//! │   intensity: [f32]  ring: [u16]  time: [f64]     │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! `time` holds offsets in seconds from `timestamp`, not absolute times.
//!
//! # Example
//!
//! ```
//! use edgefirst_lidar_decode::buffer::{Point, PointBatch};
//!
//! let mut batch = PointBatch::with_capacity(1_700_000_000.0, 2);
//! batch.push(Point { x: 1.0, y: 0.0, z: 0.0, intensity: 10.0, ring: 3, time: 0.0 });
//! batch.push(Point { x: 0.0, y: 2.0, z: 0.0, intensity: 20.0, ring: 4, time: 1e-4 });
//!
//! assert_eq!(batch.len(), 2);
//! assert_eq!(batch.range()[1], 2.0);
//! assert!(batch.is_time_sorted());
//! ```

/// A single decoded point.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
    /// Laser channel (ring) index, bottom-up for spinning sensors
    pub ring: u16,
    /// Seconds relative to the batch reference time
    pub time: f64,
}

impl Point {
    /// Euclidean distance from the sensor origin.
    #[inline]
    pub fn range(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Points decoded from one message.
///
/// # Memory Layout
///
/// - `x`, `y`, `z`: coordinates in the sensor frame, meters
/// - `intensity`: reflectivity/signal strength as reported by the sensor
/// - `ring`: laser channel
/// - `range`: pre-computed distance (sqrt(x² + y² + z²))
/// - `time`: per-point offset from `timestamp`, seconds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointBatch {
    timestamp: f64,
    x: Vec<f32>,
    y: Vec<f32>,
    z: Vec<f32>,
    intensity: Vec<f32>,
    ring: Vec<u16>,
    range: Vec<f32>,
    time: Vec<f64>,
}

impl PointBatch {
    /// Create an empty batch with the given reference time (seconds).
    pub fn new(timestamp: f64) -> Self {
        Self::with_capacity(timestamp, 0)
    }

    /// Create an empty batch with room for `capacity` points.
    pub fn with_capacity(timestamp: f64, capacity: usize) -> Self {
        Self {
            timestamp,
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            intensity: Vec::with_capacity(capacity),
            ring: Vec::with_capacity(capacity),
            range: Vec::with_capacity(capacity),
            time: Vec::with_capacity(capacity),
        }
    }

    /// Reference time of the batch in seconds.
    #[inline]
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Append a point, computing its range.
    #[inline]
    pub fn push(&mut self, point: Point) {
        let range = point.range();
        self.push_with_range(point, range);
    }

    /// Append a point whose range is already known, avoiding the sqrt.
    #[inline]
    pub fn push_with_range(&mut self, point: Point, range: f32) {
        self.x.push(point.x);
        self.y.push(point.y);
        self.z.push(point.z);
        self.intensity.push(point.intensity);
        self.ring.push(point.ring);
        self.range.push(range);
        self.time.push(point.time);
    }

    #[inline]
    pub fn x(&self) -> &[f32] {
        &self.x
    }

    #[inline]
    pub fn y(&self) -> &[f32] {
        &self.y
    }

    #[inline]
    pub fn z(&self) -> &[f32] {
        &self.z
    }

    #[inline]
    pub fn intensity(&self) -> &[f32] {
        &self.intensity
    }

    #[inline]
    pub fn ring(&self) -> &[u16] {
        &self.ring
    }

    /// Pre-computed distances from the sensor origin.
    #[inline]
    pub fn range(&self) -> &[f32] {
        &self.range
    }

    /// Per-point time offsets in seconds from [`Self::timestamp`].
    #[inline]
    pub fn time(&self) -> &[f64] {
        &self.time
    }

    /// Point at `index`, if any.
    pub fn get(&self, index: usize) -> Option<Point> {
        if index >= self.len() {
            return None;
        }
        Some(Point {
            x: self.x[index],
            y: self.y[index],
            z: self.z[index],
            intensity: self.intensity[index],
            ring: self.ring[index],
            time: self.time[index],
        })
    }

    /// Iterate over the points in emission order.
    pub fn iter(&self) -> impl Iterator<Item = Point> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Earliest and latest relative time, or `None` for an empty batch.
    pub fn time_span(&self) -> Option<(f64, f64)> {
        self.time.iter().fold(None, |acc, &t| match acc {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        })
    }

    /// True when relative times never decrease in emission order.
    pub fn is_time_sorted(&self) -> bool {
        self.time.windows(2).all(|w| w[0] <= w[1])
    }
}
