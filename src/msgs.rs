// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Input message types.
//!
//! A decoder receives a [`ScanMessage`]: one sensor-log message tagged with
//! its wire type. `sensor_msgs/PointCloud2` comes from `edgefirst-schemas`;
//! the Velodyne packet scan and the Livox custom point message are defined
//! here with the same field layout as their ROS 2 definitions so they decode
//! straight from CDR.

use crate::lidar::Error;
use cdr::{CdrLe, Infinite};
use edgefirst_schemas::{builtin_interfaces::Time, sensor_msgs::PointCloud2, std_msgs::Header};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of one raw Velodyne data packet in bytes.
pub const VELODYNE_PACKET_SIZE: usize = 1206;

/// `velodyne_msgs/VelodynePacket`: one raw UDP data packet.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VelodynePacket {
    /// Host receive time of the packet
    pub stamp: Time,
    /// Raw packet bytes; the wire format is a fixed 1206 byte array
    #[serde(with = "packet_bytes")]
    pub data: Vec<u8>,
}

/// `velodyne_msgs/VelodyneScan`: the packets of one revolution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VelodyneScan {
    pub header: Header,
    pub packets: Vec<VelodynePacket>,
}

/// `livox_ros_driver2/CustomPoint`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LivoxPoint {
    /// Nanoseconds from the message `timebase`
    pub offset_time: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub reflectivity: u8,
    /// Return and confidence flags
    pub tag: u8,
    /// Laser (scan line) number
    pub line: u8,
}

/// `livox_ros_driver2/CustomMsg`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LivoxCustomMsg {
    pub header: Header,
    /// Time of the first point in nanoseconds
    pub timebase: u64,
    pub point_num: u32,
    pub lidar_id: u8,
    pub rsvd: [u8; 3],
    pub points: Vec<LivoxPoint>,
}

/// Wire type of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    VelodyneScan,
    PointCloud2,
    LivoxCustom,
}

impl MessageKind {
    /// ROS 2 schema name.
    pub fn schema(&self) -> &'static str {
        match self {
            MessageKind::VelodyneScan => "velodyne_msgs/msg/VelodyneScan",
            MessageKind::PointCloud2 => "sensor_msgs/msg/PointCloud2",
            MessageKind::LivoxCustom => "livox_ros_driver2/msg/CustomMsg",
        }
    }

    /// Resolve a schema name, accepting both ROS 1 (`pkg/Type`) and ROS 2
    /// (`pkg/msg/Type`) spellings and the older `livox_ros_driver` package.
    pub fn from_schema(schema: &str) -> Option<MessageKind> {
        let schema = schema.trim();
        let (package, name) = match schema.split('/').collect::<Vec<_>>()[..] {
            [package, name] => (package, name),
            [package, "msg", name] => (package, name),
            _ => return None,
        };

        match (package, name) {
            ("velodyne_msgs", "VelodyneScan") => Some(MessageKind::VelodyneScan),
            ("sensor_msgs", "PointCloud2") => Some(MessageKind::PointCloud2),
            ("livox_ros_driver2" | "livox_ros_driver", "CustomMsg") => {
                Some(MessageKind::LivoxCustom)
            }
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.schema())
    }
}

/// One raw sensor message, tagged with its wire type.
#[derive(Clone, Debug)]
pub enum ScanMessage {
    VelodyneScan(VelodyneScan),
    PointCloud2(PointCloud2),
    LivoxCustom(LivoxCustomMsg),
}

impl ScanMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ScanMessage::VelodyneScan(_) => MessageKind::VelodyneScan,
            ScanMessage::PointCloud2(_) => MessageKind::PointCloud2,
            ScanMessage::LivoxCustom(_) => MessageKind::LivoxCustom,
        }
    }

    pub fn header(&self) -> &Header {
        match self {
            ScanMessage::VelodyneScan(msg) => &msg.header,
            ScanMessage::PointCloud2(msg) => &msg.header,
            ScanMessage::LivoxCustom(msg) => &msg.header,
        }
    }

    /// Decode a CDR payload whose schema name is `schema`.
    pub fn from_cdr(schema: &str, payload: &[u8]) -> Result<Self, Error> {
        let kind =
            MessageKind::from_schema(schema).ok_or_else(|| Error::UnknownSchema(schema.into()))?;
        Self::from_cdr_kind(kind, payload)
    }

    /// Decode a CDR payload of a known wire type.
    pub fn from_cdr_kind(kind: MessageKind, payload: &[u8]) -> Result<Self, Error> {
        let msg = match kind {
            MessageKind::VelodyneScan => ScanMessage::VelodyneScan(cdr::deserialize(payload)?),
            MessageKind::PointCloud2 => ScanMessage::PointCloud2(cdr::deserialize(payload)?),
            MessageKind::LivoxCustom => ScanMessage::LivoxCustom(cdr::deserialize(payload)?),
        };
        Ok(msg)
    }

    /// Encode as little-endian CDR.
    pub fn to_cdr(&self) -> Result<Vec<u8>, Error> {
        let bytes = match self {
            ScanMessage::VelodyneScan(msg) => cdr::serialize::<_, _, CdrLe>(msg, Infinite)?,
            ScanMessage::PointCloud2(msg) => cdr::serialize::<_, _, CdrLe>(msg, Infinite)?,
            ScanMessage::LivoxCustom(msg) => cdr::serialize::<_, _, CdrLe>(msg, Infinite)?,
        };
        Ok(bytes)
    }
}

impl From<VelodyneScan> for ScanMessage {
    fn from(msg: VelodyneScan) -> Self {
        ScanMessage::VelodyneScan(msg)
    }
}

impl From<PointCloud2> for ScanMessage {
    fn from(msg: PointCloud2) -> Self {
        ScanMessage::PointCloud2(msg)
    }
}

impl From<LivoxCustomMsg> for ScanMessage {
    fn from(msg: LivoxCustomMsg) -> Self {
        ScanMessage::LivoxCustom(msg)
    }
}

/// `builtin_interfaces/Time` as seconds.
#[inline]
pub fn stamp_seconds(stamp: &Time) -> f64 {
    stamp.sec as f64 + stamp.nanosec as f64 * 1e-9
}

/// Seconds as `builtin_interfaces/Time`, rounded to whole nanoseconds.
pub fn seconds_to_stamp(seconds: f64) -> Time {
    let sec = seconds.floor();
    let nanosec = ((seconds - sec) * 1e9).round().min(999_999_999.0);
    Time {
        sec: sec as i32,
        nanosec: nanosec as u32,
    }
}

/// Build a message header stamped at `seconds`.
pub fn make_header(seconds: f64, frame_id: &str) -> Header {
    Header {
        stamp: seconds_to_stamp(seconds),
        frame_id: String::from(frame_id),
    }
}

/// Fixed-size packet payload: serialized as a tuple so CDR writes no length
/// prefix, matching `uint8[1206]`.
mod packet_bytes {
    use super::VELODYNE_PACKET_SIZE;
    use serde::{
        Deserializer, Serializer,
        de::{self, SeqAccess, Visitor},
        ser::{self, SerializeTuple as _},
    };
    use std::fmt;

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if data.len() != VELODYNE_PACKET_SIZE {
            return Err(ser::Error::custom(format!(
                "velodyne packet must be {} bytes, got {}",
                VELODYNE_PACKET_SIZE,
                data.len()
            )));
        }
        let mut tuple = serializer.serialize_tuple(VELODYNE_PACKET_SIZE)?;
        for byte in data {
            tuple.serialize_element(byte)?;
        }
        tuple.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        struct PacketVisitor;

        impl<'de> Visitor<'de> for PacketVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "an array of {} bytes", VELODYNE_PACKET_SIZE)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u8>, A::Error> {
                let mut data = Vec::with_capacity(VELODYNE_PACKET_SIZE);
                for index in 0..VELODYNE_PACKET_SIZE {
                    let byte = seq
                        .next_element::<u8>()?
                        .ok_or_else(|| de::Error::invalid_length(index, &self))?;
                    data.push(byte);
                }
                Ok(data)
            }
        }

        deserializer.deserialize_tuple(VELODYNE_PACKET_SIZE, PacketVisitor)
    }
}
