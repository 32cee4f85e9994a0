// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! PCAP file replay of raw LiDAR packets.
//!
//! [`PcapSource`] reads the UDP payloads of a PCAP/PCAPNG capture together
//! with their capture times, so raw-packet decoders can be exercised without
//! hardware or a ROS bag.
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_lidar_decode::pcap_source::{PcapSource, VELODYNE_DATA_PORT};
//!
//! let source = PcapSource::from_file("vlp16.pcap", Some(VELODYNE_DATA_PORT))?;
//! for scan in source.velodyne_scans("velodyne") {
//!     let batch = decoder.unpack_scan(&scan.into())?;
//! }
//! ```

use crate::{lidar::Error, msgs::VelodyneScan, velodyne::ScanAssembler};
use pcap_parser::traits::PcapReaderIterator;
use std::path::Path;

/// UDP port of Velodyne data packets.
pub const VELODYNE_DATA_PORT: u16 = 2368;

/// One captured UDP payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayPacket {
    /// Capture time in seconds
    pub timestamp: f64,
    /// UDP payload data
    pub payload: Vec<u8>,
}

/// In-memory replay of the UDP packets of a capture file.
///
/// Supports both legacy PCAP and PCAPNG formats.
pub struct PcapSource {
    packets: Vec<ReplayPacket>,
    index: usize,
}

impl PcapSource {
    /// Load a capture from disk, optionally keeping only packets whose source
    /// or destination port is `port`.
    pub fn from_file<P: AsRef<Path>>(path: P, port: Option<u16>) -> Result<Self, Error> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(&data, port)
    }

    /// Load a capture from its raw file contents.
    pub fn from_bytes(data: &[u8], port: Option<u16>) -> Result<Self, Error> {
        let mut packets = Vec::new();

        if data.len() >= 4 && data[0..4] == [0x0a, 0x0d, 0x0d, 0x0a] {
            // PCAPNG section header block magic
            Self::extract_pcapng(data, port, &mut packets)?;
        } else {
            Self::extract_legacy_pcap(data, port, &mut packets)?;
        }

        Ok(Self { packets, index: 0 })
    }

    fn extract_legacy_pcap(
        data: &[u8],
        port: Option<u16>,
        packets: &mut Vec<ReplayPacket>,
    ) -> Result<(), Error> {
        use pcap_parser::*;

        // Buffer must hold the whole file to avoid Incomplete errors
        let mut reader = LegacyPcapReader::new(data.len().max(65536), data)
            .map_err(|e| Error::InvalidMessage(format!("failed to create PCAP reader: {:?}", e)))?;
        let mut subsecond_scale = 1e-6;

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    match block {
                        PcapBlockOwned::Legacy(packet) => {
                            let timestamp =
                                packet.ts_sec as f64 + packet.ts_usec as f64 * subsecond_scale;
                            if let Some(extracted) =
                                Self::extract_udp_payload(packet.data, port, timestamp)
                            {
                                packets.push(extracted);
                            }
                        }
                        PcapBlockOwned::LegacyHeader(header) => {
                            if header.is_nanosecond_precision() {
                                subsecond_scale = 1e-9;
                            }
                        }
                        _ => {}
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => break,
                Err(e) => {
                    return Err(Error::InvalidMessage(format!("PCAP parse error: {:?}", e)));
                }
            }
        }

        Ok(())
    }

    fn extract_pcapng(
        data: &[u8],
        port: Option<u16>,
        packets: &mut Vec<ReplayPacket>,
    ) -> Result<(), Error> {
        use pcap_parser::*;

        let mut reader = PcapNGReader::new(data.len().max(65536), data).map_err(|e| {
            Error::InvalidMessage(format!("failed to create PCAPNG reader: {:?}", e))
        })?;

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    match block {
                        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                            // Default interface resolution of microseconds
                            let ticks = ((epb.ts_high as u64) << 32) | epb.ts_low as u64;
                            if let Some(extracted) =
                                Self::extract_udp_payload(epb.data, port, ticks as f64 * 1e-6)
                            {
                                packets.push(extracted);
                            }
                        }
                        PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                            if let Some(extracted) = Self::extract_udp_payload(spb.data, port, 0.0)
                            {
                                packets.push(extracted);
                            }
                        }
                        _ => {}
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => break,
                Err(e) => {
                    return Err(Error::InvalidMessage(format!("PCAPNG parse error: {:?}", e)));
                }
            }
        }

        Ok(())
    }

    /// UDP payload of an Ethernet frame, if it passes the port filter.
    fn extract_udp_payload(data: &[u8], port: Option<u16>, timestamp: f64) -> Option<ReplayPacket> {
        use etherparse::{SlicedPacket, TransportSlice};

        let packet = SlicedPacket::from_ethernet(data).ok()?;
        let Some(TransportSlice::Udp(udp)) = packet.transport else {
            return None;
        };

        if let Some(filter_port) = port {
            if udp.source_port() != filter_port && udp.destination_port() != filter_port {
                return None;
            }
        }

        let payload = udp.payload().to_vec();
        if payload.is_empty() {
            return None;
        }

        Some(ReplayPacket { timestamp, payload })
    }

    /// Next packet in capture order.
    pub fn next_packet(&mut self) -> Option<&ReplayPacket> {
        let packet = self.packets.get(self.index)?;
        self.index += 1;
        Some(packet)
    }

    /// All packets in capture order.
    pub fn packets(&self) -> &[ReplayPacket] {
        &self.packets
    }

    /// Group the packets into one `VelodyneScan` per revolution.
    ///
    /// Payloads that are not 1206 byte data packets (e.g. position packets
    /// sharing the port filter) are skipped.
    pub fn velodyne_scans(&self, frame_id: &str) -> Vec<VelodyneScan> {
        let mut assembler = ScanAssembler::new(frame_id);
        let mut scans: Vec<VelodyneScan> = self
            .packets
            .iter()
            .filter_map(|packet| assembler.push(packet.timestamp, &packet.payload))
            .collect();
        scans.extend(assembler.finish());
        scans
    }

    /// Rewind to the first packet.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.index < self.packets.len()
    }

    /// Packets not yet returned by [`Self::next_packet`].
    pub fn remaining(&self) -> usize {
        self.packets.len().saturating_sub(self.index)
    }
}
