// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst LiDAR Decode Library
//!
//! This library turns raw LiDAR scan messages from several sensor families
//! into uniform, timestamped point batches for downstream calibration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌────────────────────┐     ┌──────────────┐
//! │  ScanMessage    │ ──► │  dyn LidarDecoder  │ ──► │  PointBatch  │
//! │  (CDR/pcap/test)│     │  (per model)       │     │  (SoA)       │
//! └─────────────────┘     └────────────────────┘     └──────────────┘
//!                                   ▲
//!                  create_decoder("VLP_16_PACKET", &config)
//! ```
//!
//! A decoder is created once per sensor stream from a model string and a
//! [`DecoderConfig`], then fed one message at a time. Every point in the
//! returned batch carries a time offset relative to the batch reference time
//! and has passed the configured range and azimuth filter.
//!
//! Supported inputs:
//! - [`velodyne`]: raw VLP-16 packets (`velodyne_msgs/VelodyneScan`)
//! - [`velodyne_points`]: VLP-16 / VLP-32E driver point clouds, with or
//!   without per-point time
//! - [`ouster`]: Ouster driver point clouds
//! - [`pandar`]: Hesai Pandar XT point clouds
//! - [`livox`]: Livox custom messages
//!
//! # Modules
//!
//! - [`lidar`]: Model registry, decoder trait, factory and error handling
//! - [`config`]: Range/azimuth filter and scan rate
//! - [`buffer`]: Decoded point batch
//! - [`msgs`]: Message types and CDR decoding
//! - [`formats`]: PointCloud2 field access
//! - `pcap_source`: Packet capture replay (feature `pcap`)
//!
//! # Example
//!
//! ```
//! use edgefirst_lidar_decode::{
//!     DecoderConfig, ScanMessage, create_decoder,
//!     msgs::{VelodynePacket, VelodyneScan, make_header, seconds_to_stamp},
//!     velodyne::{RawPacketBuilder, UPPER_BANK},
//! };
//!
//! let data = RawPacketBuilder::new()
//!     .block(0, UPPER_BANK, 0)
//!     .reading(0, 0, 1, 5.0, 100)
//!     .build();
//! let scan = VelodyneScan {
//!     header: make_header(10.0, "velodyne"),
//!     packets: vec![VelodynePacket { stamp: seconds_to_stamp(10.0), data }],
//! };
//!
//! let mut decoder = create_decoder("VLP_16_PACKET", &DecoderConfig::default()).unwrap();
//! let batch = decoder.unpack_scan(&ScanMessage::from(scan)).unwrap();
//! assert_eq!(batch.len(), 1);
//! assert_eq!(batch.range()[0], 5.0);
//! ```

pub mod buffer;
pub mod config;
pub mod formats;
pub mod lidar;
pub mod livox;
pub mod msgs;
pub mod ouster;
pub mod pandar;
#[cfg(feature = "pcap")]
pub mod pcap_source;
pub mod velodyne;
pub mod velodyne_points;

// Re-exports for convenience
pub use buffer::{Point, PointBatch};
pub use config::{DecoderConfig, ScanFilter};
pub use formats::PointFieldType;
pub use lidar::{Error, LidarDecoder, LidarModel, create_decoder};
pub use msgs::{MessageKind, ScanMessage};
