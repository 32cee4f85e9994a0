// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_lidar_decode::{DecoderConfig, Error, LidarModel};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Input files.  Files ending in .pcap or .pcapng are read as packet
    /// captures (VLP_16_PACKET only), anything else as one CDR encoded
    /// message of the model's wire type.
    #[arg(env, required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// LiDAR model of the recording
    #[arg(long, env, value_enum)]
    pub model: LidarModel,

    /// JSON decoder configuration; the options below override its values
    #[arg(long, env)]
    pub config: Option<PathBuf>,

    /// Minimum range in meters, inclusive
    #[arg(long, env)]
    pub min_range: Option<f64>,

    /// Maximum range in meters, inclusive
    #[arg(long, env)]
    pub max_range: Option<f64>,

    /// Azimuth window as START,STOP in degrees, clockwise from the sensor's
    /// +x axis.  A start larger than stop wraps through 0.
    #[arg(long, env, value_name = "START,STOP", value_delimiter = ',')]
    pub azimuth: Option<Vec<f64>>,

    /// Rotation rate in Hz, used to time points of clouds without a time field
    #[arg(long, env)]
    pub scan_rate: Option<f64>,

    /// UDP port of the data packets inside packet captures
    #[arg(long, env, default_value = "2368")]
    pub port: u16,

    /// Frame id given to scans assembled from packet captures
    #[arg(long, env, default_value = "velodyne")]
    pub frame_id: String,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,
}

impl Args {
    /// Decoder configuration from the optional JSON file and the command line.
    pub fn decoder_config(&self) -> Result<DecoderConfig, Error> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                serde_json::from_str(&text)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
            }
            None => DecoderConfig::default(),
        };

        if let Some(min_range) = self.min_range {
            config.filter.min_range = min_range;
        }
        if let Some(max_range) = self.max_range {
            config.filter.max_range = max_range;
        }
        if let Some(azimuth) = &self.azimuth {
            let [start, stop] = azimuth.as_slice() else {
                return Err(Error::Config(format!(
                    "azimuth window needs START,STOP, got {} values",
                    azimuth.len()
                )));
            };
            config.filter.min_azimuth = Some(*start);
            config.filter.max_azimuth = Some(*stop);
        }
        if let Some(scan_rate) = self.scan_rate {
            config.scan_rate_hz = scan_rate;
        }

        config.validate()?;
        Ok(config)
    }
}
