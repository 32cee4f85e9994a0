// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Runtime decoder configuration.
//!
//! Per-model constants (firing cadence, resolution, vertical angles) are fixed
//! in the decoders. Only the point filter and the nominal scan rate are
//! configurable; both deserialize from the calibration configuration with
//! `serde`, falling back to the defaults below for omitted keys.
//!
//! ```
//! use edgefirst_lidar_decode::DecoderConfig;
//!
//! let config: DecoderConfig =
//!     serde_json::from_str(r#"{ "filter": { "max_range": 80.0 } }"#).unwrap();
//! assert_eq!(config.filter.max_range, 80.0);
//! assert_eq!(config.filter.min_range, 0.2);
//! assert_eq!(config.scan_rate_hz, 10.0);
//! ```

use crate::lidar::Error;
use serde::{Deserialize, Serialize};

/// Default minimum range in meters.
pub const DEFAULT_MIN_RANGE: f64 = 0.2;

/// Default maximum range in meters.
pub const DEFAULT_MAX_RANGE: f64 = 200.0;

/// Default rotation rate of spinning sensors.
pub const DEFAULT_SCAN_RATE_HZ: f64 = 10.0;

/// Range and azimuth filter applied to every decoded point.
///
/// Both range bounds are inclusive. The azimuth window uses the clockwise
/// azimuth in degrees (see [`crate::lidar::clockwise_azimuth`]); when
/// `min_azimuth > max_azimuth` the window wraps through zero.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanFilter {
    pub min_range: f64,
    pub max_range: f64,
    pub min_azimuth: Option<f64>,
    pub max_azimuth: Option<f64>,
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self {
            min_range: DEFAULT_MIN_RANGE,
            max_range: DEFAULT_MAX_RANGE,
            min_azimuth: None,
            max_azimuth: None,
        }
    }
}

impl ScanFilter {
    /// Check that the bounds describe a usable filter.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.min_range.is_finite() || !self.max_range.is_finite() {
            return Err(Error::Config("range limits must be finite".to_string()));
        }
        if self.min_range < 0.0 {
            return Err(Error::Config(format!(
                "min_range must not be negative: {}",
                self.min_range
            )));
        }
        if self.min_range > self.max_range {
            return Err(Error::Config(format!(
                "min_range {} is greater than max_range {}",
                self.min_range, self.max_range
            )));
        }
        for azimuth in [self.min_azimuth, self.max_azimuth].into_iter().flatten() {
            if !(0.0..=360.0).contains(&azimuth) {
                return Err(Error::Config(format!(
                    "azimuth limit {} outside [0, 360]",
                    azimuth
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn range_ok(&self, range: f64) -> bool {
        range >= self.min_range && range <= self.max_range
    }

    /// Whether `azimuth` (degrees) lies inside the window. A window with a
    /// single bound set is open on the other side.
    #[inline]
    pub fn azimuth_ok(&self, azimuth: f64) -> bool {
        match (self.min_azimuth, self.max_azimuth) {
            (None, None) => true,
            (Some(min), None) => azimuth >= min,
            (None, Some(max)) => azimuth <= max,
            (Some(min), Some(max)) if min <= max => azimuth >= min && azimuth <= max,
            (Some(min), Some(max)) => azimuth >= min || azimuth <= max,
        }
    }

    #[inline]
    pub fn accepts(&self, range: f64, azimuth: f64) -> bool {
        self.range_ok(range) && self.azimuth_ok(azimuth)
    }
}

/// Configuration shared by all decoders.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub filter: ScanFilter,
    /// Nominal rotation rate, used to turn azimuth into time when a point
    /// cloud carries no time field.
    pub scan_rate_hz: f64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            filter: ScanFilter::default(),
            scan_rate_hz: DEFAULT_SCAN_RATE_HZ,
        }
    }
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<(), Error> {
        self.filter.validate()?;
        if !self.scan_rate_hz.is_finite() || self.scan_rate_hz <= 0.0 {
            return Err(Error::Config(format!(
                "scan_rate_hz must be positive: {}",
                self.scan_rate_hz
            )));
        }
        Ok(())
    }

    /// Duration of one revolution in seconds.
    #[inline]
    pub fn scan_period(&self) -> f64 {
        1.0 / self.scan_rate_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DecoderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.filter.min_range, DEFAULT_MIN_RANGE);
        assert_eq!(config.filter.max_range, DEFAULT_MAX_RANGE);
        assert!((config.scan_period() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_range_bounds_inclusive() {
        let filter = ScanFilter {
            min_range: 5.0,
            max_range: 10.0,
            ..Default::default()
        };
        assert!(filter.range_ok(5.0));
        assert!(filter.range_ok(10.0));
        assert!(!filter.range_ok(4.999));
        assert!(!filter.range_ok(10.001));
    }

    #[test]
    fn test_azimuth_window() {
        let filter = ScanFilter {
            min_azimuth: Some(90.0),
            max_azimuth: Some(180.0),
            ..Default::default()
        };
        assert!(filter.azimuth_ok(90.0));
        assert!(filter.azimuth_ok(135.0));
        assert!(!filter.azimuth_ok(200.0));

        // Wrapping window covering the rear
        let filter = ScanFilter {
            min_azimuth: Some(270.0),
            max_azimuth: Some(90.0),
            ..Default::default()
        };
        assert!(filter.azimuth_ok(0.0));
        assert!(filter.azimuth_ok(300.0));
        assert!(filter.azimuth_ok(45.0));
        assert!(!filter.azimuth_ok(180.0));
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = DecoderConfig::default();
        config.scan_rate_hz = 0.0;
        assert!(config.validate().is_err());

        let mut config = DecoderConfig::default();
        config.filter.min_range = -1.0;
        assert!(config.validate().is_err());

        let mut config = DecoderConfig::default();
        config.filter.max_azimuth = Some(400.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: DecoderConfig = serde_json::from_str(
            r#"{ "filter": { "min_range": 1.0, "min_azimuth": 10.0 }, "scan_rate_hz": 20.0 }"#,
        )
        .unwrap();
        assert_eq!(config.filter.min_range, 1.0);
        assert_eq!(config.filter.max_range, DEFAULT_MAX_RANGE);
        assert_eq!(config.filter.min_azimuth, Some(10.0));
        assert_eq!(config.filter.max_azimuth, None);
        assert_eq!(config.scan_rate_hz, 20.0);
    }
}
