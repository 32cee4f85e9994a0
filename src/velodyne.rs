// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Velodyne VLP-16 raw packet decoder.
//!
//! The VLP-16 is a 16 channel spinning LiDAR with:
//! - 360° horizontal FOV, 30° vertical FOV (-15° to +15°, 2° spacing)
//! - 2 mm distance resolution, 100 m rated range
//! - 16 lasers fired every 2.304 µs, one firing sequence every 55.296 µs
//!
//! # Packet Structure
//!
//! Data packets are 1206 bytes, UDP port 2368:
//! - 12 data blocks × 100 bytes = 1200 bytes
//!   - Flag: 2 bytes, `0xFFEE` (upper bank) or `0xFFDD` (lower bank)
//!   - Azimuth: 2 bytes little endian, hundredths of a degree (0-35999)
//!   - 32 channel readings × 3 bytes (two firing sequences of 16 channels):
//!     distance u16 LE in 2 mm units, calibrated reflectivity u8
//! - Timestamp: 4 bytes, µs past the top of the hour
//! - Factory: 2 bytes, return mode then product id
//!
//! ```text
//! ┌──────┬─────────┬──────────────────────────────┐
//! │ flag │ azimuth │ 32 × (distance:u16, refl:u8) │ × 12
//! └──────┴─────────┴──────────────────────────────┘
//! ┌───────────────┬──────────┐
//! │ timestamp:u32 │ factory  │
//! └───────────────┴──────────┘
//! ```
//!
//! Point times are reconstructed from the firing cadence: a point's offset from
//! the scan start is `packet_start + block × 110.592 µs + firing × 55.296 µs +
//! channel × 2.304 µs`. The per-(firing, channel) part is a table built at
//! construction.

use crate::{
    buffer::{Point, PointBatch},
    config::{DecoderConfig, ScanFilter},
    lidar::{Error, LidarDecoder, LidarModel},
    msgs::{
        ScanMessage, VELODYNE_PACKET_SIZE, VelodynePacket, VelodyneScan, make_header,
        seconds_to_stamp, stamp_seconds,
    },
};
use tracing::{debug, instrument, trace, warn};

/// Number of data blocks per packet
const BLOCKS_PER_PACKET: usize = 12;

/// Size of each data block in bytes
const BLOCK_SIZE: usize = 100;

/// Size of one channel reading in bytes
const RAW_SCAN_SIZE: usize = 3;

/// Firing sequences per data block
const FIRINGS_PER_BLOCK: usize = 2;

/// Channels per firing sequence
const SCANS_PER_FIRING: usize = 16;

/// Firing sequences per packet in single return mode
const FIRINGS_PER_PACKET: usize = BLOCKS_PER_PACKET * FIRINGS_PER_BLOCK;

/// Points per packet
const POINTS_PER_PACKET: usize = FIRINGS_PER_PACKET * SCANS_PER_FIRING;

/// Block flag for the upper laser bank
pub const UPPER_BANK: u16 = 0xeeff;

/// Block flag for the lower laser bank
pub const LOWER_BANK: u16 = 0xddff;

/// Rotation codes per revolution
const ROTATION_MAX_UNITS: usize = 36000;

/// Degrees per rotation code
const ROTATION_RESOLUTION: f64 = 0.01;

/// Distance resolution in meters (2 mm)
const DISTANCE_RESOLUTION: f64 = 0.002;

/// Duration of one data block (two firing sequences), seconds
const BLOCK_TDURATION: f64 = 110.592e-6;

/// Delay between consecutive channels, seconds
const DSR_TOFFSET: f64 = 2.304e-6;

/// Delay between firing sequences, seconds
const FIRING_TOFFSET: f64 = 55.296e-6;

/// Offset of the timestamp word
const TIMESTAMP_OFFSET: usize = BLOCKS_PER_PACKET * BLOCK_SIZE;

/// Offset of the two factory bytes
const FACTORY_OFFSET: usize = TIMESTAMP_OFFSET + 4;

/// Vertical angle of each channel in firing order, degrees
const VLP16_VERTICAL_ANGLES: [f64; SCANS_PER_FIRING] = [
    -15.0, 1.0, -13.0, 3.0, -11.0, 5.0, -9.0, 7.0, -7.0, 9.0, -5.0, 11.0, -3.0, 13.0, -1.0, 15.0,
];

/// Product id of the VLP-16 in the second factory byte
pub const VLP16_PRODUCT_ID: u8 = 0x22;

/// Return mode reported in the first factory byte
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReturnMode {
    #[default]
    Strongest = 0x37,
    Last = 0x38,
    /// Blocks come in pairs sharing one azimuth and firing sequence
    Dual = 0x39,
}

impl From<u8> for ReturnMode {
    fn from(value: u8) -> Self {
        match value {
            0x38 => ReturnMode::Last,
            0x39 => ReturnMode::Dual,
            _ => ReturnMode::Strongest,
        }
    }
}

impl ReturnMode {
    /// Blocks between two distinct azimuths.
    #[inline]
    fn block_stride(&self) -> usize {
        match self {
            ReturnMode::Dual => 2,
            _ => 1,
        }
    }

    /// Time covered by one packet, seconds.
    #[inline]
    pub fn packet_duration(&self) -> f64 {
        (BLOCKS_PER_PACKET / self.block_stride()) as f64 * BLOCK_TDURATION
    }
}

/// Zero-copy view of one raw data packet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PacketSlice<'a> {
    slice: &'a [u8],
}

impl<'a> PacketSlice<'a> {
    /// Wrap `slice`, which must hold a complete data packet.
    pub fn from_slice(slice: &'a [u8]) -> Option<PacketSlice<'a>> {
        if slice.len() < VELODYNE_PACKET_SIZE {
            return None;
        }
        Some(PacketSlice { slice })
    }

    pub fn block(&self, index: usize) -> BlockSlice<'a> {
        let start = index * BLOCK_SIZE;
        BlockSlice {
            slice: &self.slice[start..start + BLOCK_SIZE],
        }
    }

    /// Microseconds past the top of the hour of the first firing.
    pub fn timestamp_us(&self) -> u32 {
        u32::from_le_bytes([
            self.slice[TIMESTAMP_OFFSET],
            self.slice[TIMESTAMP_OFFSET + 1],
            self.slice[TIMESTAMP_OFFSET + 2],
            self.slice[TIMESTAMP_OFFSET + 3],
        ])
    }

    pub fn return_mode(&self) -> ReturnMode {
        ReturnMode::from(self.slice[FACTORY_OFFSET])
    }

    pub fn product_id(&self) -> u8 {
        self.slice[FACTORY_OFFSET + 1]
    }

    /// Rotation of the first valid block, if any.
    pub fn first_rotation(&self) -> Option<u16> {
        (0..BLOCKS_PER_PACKET)
            .map(|i| self.block(i))
            .find(|b| b.is_valid())
            .map(|b| b.rotation())
    }
}

/// Zero-copy view of one 100 byte data block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlockSlice<'a> {
    slice: &'a [u8],
}

impl BlockSlice<'_> {
    pub fn bank(&self) -> u16 {
        u16::from_le_bytes([self.slice[0], self.slice[1]])
    }

    /// Rotation code in hundredths of a degree.
    pub fn rotation(&self) -> u16 {
        u16::from_le_bytes([self.slice[2], self.slice[3]])
    }

    /// Known bank flag and in-range rotation code.
    pub fn is_valid(&self) -> bool {
        matches!(self.bank(), UPPER_BANK | LOWER_BANK)
            && (self.rotation() as usize) < ROTATION_MAX_UNITS
    }

    /// Raw distance and reflectivity of `channel` in `firing`.
    #[inline]
    pub fn reading(&self, firing: usize, channel: usize) -> (u16, u8) {
        let k = 4 + (firing * SCANS_PER_FIRING + channel) * RAW_SCAN_SIZE;
        (
            u16::from_le_bytes([self.slice[k], self.slice[k + 1]]),
            self.slice[k + 2],
        )
    }
}

/// Constant lookup tables, computed once per decoder.
struct Vlp16Tables {
    sin_rot: Box<[f32]>,
    cos_rot: Box<[f32]>,
    sin_vert: [f64; SCANS_PER_FIRING],
    cos_vert: [f64; SCANS_PER_FIRING],
    /// Bottom-up ring index of each channel
    ring: [u16; SCANS_PER_FIRING],
    /// Time of each (firing sequence, channel) from the packet start
    time_offset: [[f64; SCANS_PER_FIRING]; FIRINGS_PER_PACKET],
    /// Share of the block's azimuth advance elapsed at each (firing, channel)
    azimuth_fraction: [[f64; SCANS_PER_FIRING]; FIRINGS_PER_BLOCK],
}

impl Vlp16Tables {
    fn new() -> Self {
        let (sin_rot, cos_rot): (Vec<f32>, Vec<f32>) = (0..ROTATION_MAX_UNITS)
            .map(|code| {
                let angle = (code as f64 * ROTATION_RESOLUTION).to_radians();
                (angle.sin() as f32, angle.cos() as f32)
            })
            .unzip();

        let mut sin_vert = [0.0; SCANS_PER_FIRING];
        let mut cos_vert = [0.0; SCANS_PER_FIRING];
        let mut ring = [0u16; SCANS_PER_FIRING];
        for (dsr, &angle) in VLP16_VERTICAL_ANGLES.iter().enumerate() {
            sin_vert[dsr] = angle.to_radians().sin();
            cos_vert[dsr] = angle.to_radians().cos();
            ring[dsr] = ((angle + 15.0) / 2.0).round() as u16;
        }

        let mut time_offset = [[0.0; SCANS_PER_FIRING]; FIRINGS_PER_PACKET];
        for (sequence, row) in time_offset.iter_mut().enumerate() {
            let block = sequence / FIRINGS_PER_BLOCK;
            let firing = sequence % FIRINGS_PER_BLOCK;
            for (dsr, t) in row.iter_mut().enumerate() {
                *t = block as f64 * BLOCK_TDURATION
                    + firing as f64 * FIRING_TOFFSET
                    + dsr as f64 * DSR_TOFFSET;
            }
        }

        let mut azimuth_fraction = [[0.0; SCANS_PER_FIRING]; FIRINGS_PER_BLOCK];
        for (firing, row) in azimuth_fraction.iter_mut().enumerate() {
            for (dsr, frac) in row.iter_mut().enumerate() {
                *frac = (dsr as f64 * DSR_TOFFSET + firing as f64 * FIRING_TOFFSET)
                    / BLOCK_TDURATION;
            }
        }

        Self {
            sin_rot: sin_rot.into_boxed_slice(),
            cos_rot: cos_rot.into_boxed_slice(),
            sin_vert,
            cos_vert,
            ring,
            time_offset,
            azimuth_fraction,
        }
    }
}

/// Decoder for `velodyne_msgs/VelodyneScan` messages from a VLP-16.
pub struct Vlp16PacketDecoder {
    model: LidarModel,
    filter: ScanFilter,
    tables: Vlp16Tables,
}

impl Vlp16PacketDecoder {
    pub fn new(model: LidarModel, config: &DecoderConfig) -> Self {
        debug!(%model, "building VLP-16 lookup tables");
        Self {
            model,
            filter: config.filter,
            tables: Vlp16Tables::new(),
        }
    }

    /// Decode every packet of a scan.
    ///
    /// Point times are relative to the scan header stamp, with packet `n`
    /// starting after the durations of packets `0..n`.
    #[instrument(skip_all, fields(packets = scan.packets.len()))]
    pub fn unpack_packets(&self, scan: &VelodyneScan) -> PointBatch {
        let mut batch = PointBatch::with_capacity(
            stamp_seconds(&scan.header.stamp),
            scan.packets.len() * POINTS_PER_PACKET,
        );

        let mut packet_start = 0.0;
        let mut packet_duration = ReturnMode::Strongest.packet_duration();
        let mut first_timestamp_us = None;
        for (index, packet) in scan.packets.iter().enumerate() {
            match PacketSlice::from_slice(&packet.data) {
                Some(raw) => {
                    if first_timestamp_us.is_none() {
                        first_timestamp_us = Some(raw.timestamp_us());
                        if raw.product_id() != VLP16_PRODUCT_ID {
                            debug!(
                                product_id = raw.product_id(),
                                "packet product id is not a VLP-16"
                            );
                        }
                    }
                    packet_duration = raw.return_mode().packet_duration();
                    self.unpack_packet(raw, packet_start, &mut batch);
                }
                None => warn!(
                    index,
                    len = packet.data.len(),
                    "skipping truncated velodyne packet"
                ),
            }
            packet_start += packet_duration;
        }

        trace!(
            points = batch.len(),
            sensor_time_us = ?first_timestamp_us,
            "unpacked velodyne scan"
        );
        batch
    }

    /// Azimuth advance of each valid block, in rotation codes.
    ///
    /// The advance is taken to the block `stride` ahead. Blocks without a
    /// valid successor reuse the previous advance.
    fn azimuth_diffs(raw: PacketSlice, stride: usize) -> [Option<f64>; BLOCKS_PER_PACKET] {
        let mut diffs = [None; BLOCKS_PER_PACKET];
        let mut last_azimuth_diff = 0.0;
        for (block_index, diff) in diffs.iter_mut().enumerate() {
            let block = raw.block(block_index);
            if !block.is_valid() {
                continue;
            }
            let next = block_index + stride;
            if next < BLOCKS_PER_PACKET && raw.block(next).is_valid() {
                let next_rotation = raw.block(next).rotation() as usize;
                last_azimuth_diff = ((next_rotation + ROTATION_MAX_UNITS
                    - block.rotation() as usize)
                    % ROTATION_MAX_UNITS) as f64;
            }
            *diff = Some(last_azimuth_diff);
        }
        diffs
    }

    /// Emit the points of one packet in firing order.
    ///
    /// In dual return mode the two blocks of a pair hold both returns of the
    /// same laser shots, so both returns of a channel are emitted before the
    /// next channel fires.
    fn unpack_packet(&self, raw: PacketSlice, packet_start: f64, batch: &mut PointBatch) {
        let tables = &self.tables;
        let stride = raw.return_mode().block_stride();
        let azimuth_diffs = Self::azimuth_diffs(raw, stride);

        for sequence_block in 0..BLOCKS_PER_PACKET / stride {
            let blocks = sequence_block * stride..(sequence_block + 1) * stride;
            for firing in 0..FIRINGS_PER_BLOCK {
                let times = &tables.time_offset[sequence_block * FIRINGS_PER_BLOCK + firing];
                for dsr in 0..SCANS_PER_FIRING {
                    for block_index in blocks.clone() {
                        let Some(azimuth_diff) = azimuth_diffs[block_index] else {
                            continue;
                        };
                        let block = raw.block(block_index);
                        let (raw_distance, intensity) = block.reading(firing, dsr);
                        if raw_distance == 0 {
                            continue;
                        }
                        let distance = raw_distance as f64 * DISTANCE_RESOLUTION;

                        let corrected = block.rotation() as f64
                            + azimuth_diff * tables.azimuth_fraction[firing][dsr];
                        let rotation = (corrected.round() as usize) % ROTATION_MAX_UNITS;

                        if !self
                            .filter
                            .accepts(distance, rotation as f64 * ROTATION_RESOLUTION)
                        {
                            continue;
                        }

                        let xy_distance = distance * tables.cos_vert[dsr];
                        let point = Point {
                            x: (xy_distance * tables.cos_rot[rotation] as f64) as f32,
                            y: (-xy_distance * tables.sin_rot[rotation] as f64) as f32,
                            z: (distance * tables.sin_vert[dsr]) as f32,
                            intensity: intensity as f32,
                            ring: tables.ring[dsr],
                            time: packet_start + times[dsr],
                        };
                        batch.push_with_range(point, distance as f32);
                    }
                }
            }
        }
    }
}

impl LidarDecoder for Vlp16PacketDecoder {
    fn model(&self) -> LidarModel {
        self.model
    }

    fn unpack_scan(&mut self, msg: &ScanMessage) -> Result<PointBatch, Error> {
        match msg {
            ScanMessage::VelodyneScan(scan) => Ok(self.unpack_packets(scan)),
            other => Err(self.type_mismatch(other)),
        }
    }
}

/// Groups raw data packets into one [`VelodyneScan`] per revolution.
///
/// A revolution ends when a packet's first azimuth is lower than the previous
/// packet's, i.e. the rotation wrapped through zero.
pub struct ScanAssembler {
    frame_id: String,
    packets: Vec<VelodynePacket>,
    last_rotation: Option<u16>,
}

impl ScanAssembler {
    pub fn new(frame_id: &str) -> Self {
        Self {
            frame_id: String::from(frame_id),
            packets: Vec::new(),
            last_rotation: None,
        }
    }

    /// Add a packet received at `stamp` seconds.
    ///
    /// Returns the completed scan when this packet starts a new revolution.
    /// Packets of the wrong size or without any valid block are dropped.
    pub fn push(&mut self, stamp: f64, data: &[u8]) -> Option<VelodyneScan> {
        if data.len() != VELODYNE_PACKET_SIZE {
            trace!(len = data.len(), "ignoring non data packet");
            return None;
        }
        let rotation = PacketSlice::from_slice(data)?.first_rotation()?;

        let wrapped = self.last_rotation.is_some_and(|last| rotation < last);
        self.last_rotation = Some(rotation);

        let completed = if wrapped { self.take_scan() } else { None };
        self.packets.push(VelodynePacket {
            stamp: seconds_to_stamp(stamp),
            data: data.to_vec(),
        });
        completed
    }

    /// Flush the partially assembled scan, if any.
    pub fn finish(mut self) -> Option<VelodyneScan> {
        self.take_scan()
    }

    fn take_scan(&mut self) -> Option<VelodyneScan> {
        let first = self.packets.first()?;
        let header = make_header(stamp_seconds(&first.stamp), &self.frame_id);
        Some(VelodyneScan {
            header,
            packets: std::mem::take(&mut self.packets),
        })
    }
}

/// Builds raw VLP-16 data packets, e.g. for simulation.
///
/// Blocks start zeroed, which is an invalid bank flag, so only blocks set
/// through [`Self::block`] decode.
///
/// # Panics
///
/// Block, firing and channel indices beyond the packet layout panic.
#[derive(Clone, Debug)]
pub struct RawPacketBuilder {
    data: Vec<u8>,
}

impl Default for RawPacketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RawPacketBuilder {
    pub fn new() -> Self {
        let mut data = vec![0u8; VELODYNE_PACKET_SIZE];
        data[FACTORY_OFFSET] = ReturnMode::Strongest as u8;
        data[FACTORY_OFFSET + 1] = VLP16_PRODUCT_ID;
        Self { data }
    }

    /// Set the bank flag and rotation code of `block`.
    pub fn block(mut self, block: usize, bank: u16, rotation: u16) -> Self {
        assert!(block < BLOCKS_PER_PACKET);
        let start = block * BLOCK_SIZE;
        self.data[start..start + 2].copy_from_slice(&bank.to_le_bytes());
        self.data[start + 2..start + 4].copy_from_slice(&rotation.to_le_bytes());
        self
    }

    /// Set a raw reading in 2 mm units.
    pub fn raw_reading(
        mut self,
        block: usize,
        firing: usize,
        channel: usize,
        distance: u16,
        intensity: u8,
    ) -> Self {
        assert!(block < BLOCKS_PER_PACKET && firing < FIRINGS_PER_BLOCK);
        assert!(channel < SCANS_PER_FIRING);
        let k = block * BLOCK_SIZE + 4 + (firing * SCANS_PER_FIRING + channel) * RAW_SCAN_SIZE;
        self.data[k..k + 2].copy_from_slice(&distance.to_le_bytes());
        self.data[k + 2] = intensity;
        self
    }

    /// Set a reading in meters, rounded to the 2 mm resolution.
    pub fn reading(
        self,
        block: usize,
        firing: usize,
        channel: usize,
        distance: f64,
        intensity: u8,
    ) -> Self {
        let raw = (distance / DISTANCE_RESOLUTION).round() as u16;
        self.raw_reading(block, firing, channel, raw, intensity)
    }

    pub fn return_mode(mut self, mode: ReturnMode) -> Self {
        self.data[FACTORY_OFFSET] = mode as u8;
        self
    }

    pub fn timestamp_us(mut self, timestamp: u32) -> Self {
        self.data[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4].copy_from_slice(&timestamp.to_le_bytes());
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}
