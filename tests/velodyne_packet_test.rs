// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Integration tests for the VLP-16 raw packet decoder using synthetic scans.

use edgefirst_lidar_decode::{
    DecoderConfig, Error, LidarModel, MessageKind, ScanMessage, create_decoder,
    msgs::{VelodynePacket, VelodyneScan, make_header, seconds_to_stamp},
    velodyne::{LOWER_BANK, RawPacketBuilder, ReturnMode, UPPER_BANK},
};

/// Deterministic pseudo random sequence for synthetic readings.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }
}

fn scan_of(packets: Vec<Vec<u8>>, stamp: f64) -> ScanMessage {
    ScanMessage::VelodyneScan(VelodyneScan {
        header: make_header(stamp, "velodyne"),
        packets: packets
            .into_iter()
            .enumerate()
            .map(|(i, data)| VelodynePacket {
                stamp: seconds_to_stamp(stamp + i as f64 * 1.327e-3),
                data,
            })
            .collect(),
    })
}

/// One revolution of packets with random readings, some missing.
fn random_revolution(seed: u64) -> ScanMessage {
    let mut rng = Lcg(seed);
    let packets = (0..75)
        .map(|p| {
            let mut builder = RawPacketBuilder::new();
            for block in 0..12 {
                let rotation = ((p * 12 + block) * 40 % 36000) as u16;
                let bank = if block % 2 == 0 { UPPER_BANK } else { LOWER_BANK };
                builder = builder.block(block, bank, rotation);
                for firing in 0..2 {
                    for channel in 0..16 {
                        // 0..=65535 raw units, i.e. up to ~131 m, 0 is no return
                        let raw = (rng.next() % 65536) as u16;
                        let raw = if rng.next() % 10 == 0 { 0 } else { raw };
                        builder = builder.raw_reading(block, firing, channel, raw, rng.next() as u8);
                    }
                }
            }
            builder.build()
        })
        .collect();
    scan_of(packets, 1_700_000_000.0)
}

fn config(min_range: f64, max_range: f64) -> DecoderConfig {
    let mut config = DecoderConfig::default();
    config.filter.min_range = min_range;
    config.filter.max_range = max_range;
    config
}

#[test]
fn test_point_at_min_range_along_zero_azimuth() {
    let data = RawPacketBuilder::new()
        .block(0, UPPER_BANK, 0)
        .reading(0, 0, 14, 5.0, 10) // channel 14 is -1°
        .build();
    let mut decoder = create_decoder("VLP_16_PACKET", &config(5.0, 100.0)).unwrap();
    let batch = decoder.unpack_scan(&scan_of(vec![data], 3.0)).unwrap();

    assert_eq!(batch.len(), 1);
    let point = batch.get(0).unwrap();
    assert!((point.range() - 5.0).abs() < 1e-5);
    assert!((point.x - 5.0 * 1f32.to_radians().cos()).abs() < 1e-5);
    assert!(point.y.abs() < 1e-6);
    assert!(point.z < 0.0);
    assert_eq!(point.ring, 7);
}

#[test]
fn test_point_beyond_max_range() {
    let data = RawPacketBuilder::new()
        .block(0, UPPER_BANK, 0)
        .raw_reading(0, 0, 0, 2501, 10) // 5.002 m
        .build();
    let mut decoder = create_decoder("VLP_16_PACKET", &config(0.2, 5.0)).unwrap();
    let batch = decoder.unpack_scan(&scan_of(vec![data], 3.0)).unwrap();
    assert!(batch.is_empty());
}

#[test]
fn test_revolution_properties() {
    let msg = random_revolution(7);
    let mut decoder = create_decoder("VLP_16_PACKET", &config(1.0, 100.0)).unwrap();
    let batch = decoder.unpack_scan(&msg).unwrap();

    assert!(!batch.is_empty());
    assert!(batch.len() < 75 * 384);
    assert!(batch.is_time_sorted());
    assert_eq!(batch.timestamp(), 1_700_000_000.0);
    for (&range, &ring) in batch.range().iter().zip(batch.ring()) {
        assert!((1.0..=100.0).contains(&(range as f64)), "range {}", range);
        assert!(ring < 16);
    }

    let (first, last) = batch.time_span().unwrap();
    assert!(first >= 0.0);
    // 75 packets of 1327.104 µs
    assert!(last < 75.0 * 1327.104e-6);
}

#[test]
fn test_fresh_decoders_are_deterministic() {
    let msg = random_revolution(42);
    let config = DecoderConfig::default();

    let mut first = create_decoder("VLP_16_PACKET", &config).unwrap();
    let mut second = create_decoder("VLP_16_PACKET", &config).unwrap();
    let a = first.unpack_scan(&msg).unwrap();
    let b = second.unpack_scan(&msg).unwrap();
    assert_eq!(a, b);

    // The packet decoder carries no state between scans
    assert_eq!(first.unpack_scan(&msg).unwrap(), a);
}

#[test]
fn test_dual_return_packet_times() {
    let mut builder = RawPacketBuilder::new().return_mode(ReturnMode::Dual);
    for block in 0..12 {
        let rotation = (block / 2 * 20) as u16;
        builder = builder
            .block(block, UPPER_BANK, rotation)
            .reading(block, 0, 0, 10.0 + block as f64, 1);
    }
    let mut decoder = create_decoder("VLP_16_PACKET", &DecoderConfig::default()).unwrap();
    let batch = decoder.unpack_scan(&scan_of(vec![builder.build()], 0.0)).unwrap();

    assert_eq!(batch.len(), 12);
    assert!(batch.is_time_sorted());
    for pair in batch.time().chunks(2) {
        assert_eq!(pair[0], pair[1]);
    }
    let (_, last) = batch.time_span().unwrap();
    assert!((last - 5.0 * 110.592e-6).abs() < 1e-12);
}

#[test]
fn test_dual_return_both_firings_sorted() {
    let packets = (0..4)
        .map(|p| {
            let mut builder = RawPacketBuilder::new().return_mode(ReturnMode::Dual);
            for block in 0..12 {
                let rotation = ((p * 6 + block / 2) * 20) as u16;
                builder = builder.block(block, UPPER_BANK, rotation);
                for firing in 0..2 {
                    builder = builder
                        .reading(block, firing, 0, 10.0 + block as f64, 1)
                        .reading(block, firing, 15, 10.0 + block as f64, 1);
                }
            }
            builder.build()
        })
        .collect();
    let mut decoder = create_decoder("VLP_16_PACKET", &DecoderConfig::default()).unwrap();
    let batch = decoder.unpack_scan(&scan_of(packets, 0.0)).unwrap();

    assert_eq!(batch.len(), 4 * 12 * 2 * 2);
    assert!(batch.is_time_sorted());
}

#[test]
fn test_decode_from_cdr() {
    let msg = random_revolution(3);
    let bytes = msg.to_cdr().unwrap();
    let decoded = ScanMessage::from_cdr("velodyne_msgs/msg/VelodyneScan", &bytes).unwrap();
    assert_eq!(decoded.kind(), MessageKind::VelodyneScan);

    let config = DecoderConfig::default();
    let expected = create_decoder("VLP_16_PACKET", &config)
        .unwrap()
        .unpack_scan(&msg)
        .unwrap();
    let actual = create_decoder("VLP_16_PACKET", &config)
        .unwrap()
        .unpack_scan(&decoded)
        .unwrap();
    assert_eq!(actual, expected);
}

#[test]
fn test_wrong_message_type() {
    let mut decoder = LidarModel::Vlp16Packet
        .decoder(&DecoderConfig::default())
        .unwrap();
    let cloud = edgefirst_lidar_decode::formats::PointCloudWriter::new(&[])
        .finish(make_header(0.0, "velodyne"));

    match decoder.unpack_scan(&ScanMessage::PointCloud2(cloud)) {
        Err(Error::MessageTypeMismatch {
            model,
            expected,
            found,
        }) => {
            assert_eq!(model, LidarModel::Vlp16Packet);
            assert_eq!(expected, MessageKind::VelodyneScan);
            assert_eq!(found, MessageKind::PointCloud2);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_unsupported_model() {
    assert!(matches!(
        create_decoder("VLP_64_PACKET", &DecoderConfig::default()),
        Err(Error::UnsupportedModel(_))
    ));
}
