// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common LiDAR types and trait abstraction for multi-sensor decoding.
//!
//! This module provides the sensor-agnostic pieces every decoder shares: the
//! [`LidarModel`] registry, the [`LidarDecoder`] trait, the crate [`Error`]
//! type and the [`create_decoder`] factory which turns a model configuration
//! string into a ready decoder.

use crate::{
    buffer::PointBatch,
    config::DecoderConfig,
    livox::LivoxDecoder,
    msgs::{MessageKind, ScanMessage},
    ouster::OusterDecoder,
    pandar::PandarXtDecoder,
    velodyne::Vlp16PacketDecoder,
    velodyne_points::VelodynePointsDecoder,
};
use clap::ValueEnum;
use std::{fmt, str::FromStr};
use tracing::debug;

/// Common error type for LiDAR decoding.
///
/// Structural problems (wrong model, wrong message type, unusable first
/// message) are errors. Individual bad points or blocks are never errors;
/// they are dropped from the batch.
#[derive(Debug)]
pub enum Error {
    /// I/O error (file operations)
    Io(std::io::Error),
    /// Model configuration string not in the registry
    UnsupportedModel(String),
    /// Message handed to a decoder does not match its wire type
    MessageTypeMismatch {
        model: LidarModel,
        expected: MessageKind,
        found: MessageKind,
    },
    /// Scan geometry could not be established from the first message
    ScanParameterInitFailure(String),
    /// Invalid decoder configuration
    Config(String),
    /// Message payload could not be decoded
    InvalidMessage(String),
    /// Schema name not known to [`ScanMessage::from_cdr`]
    UnknownSchema(String),
    /// Field detected at probe time is absent from a later message
    MissingField(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::UnsupportedModel(model) => write!(f, "unsupported lidar model: {}", model),
            Error::MessageTypeMismatch {
                model,
                expected,
                found,
            } => write!(
                f,
                "message type of lidar {} was set incorrectly: expected {}, got {}",
                model, expected, found
            ),
            Error::ScanParameterInitFailure(msg) => {
                write!(f, "failed to initialize scan parameters: {}", msg)
            }
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::InvalidMessage(msg) => write!(f, "invalid message: {}", msg),
            Error::UnknownSchema(schema) => write!(f, "unknown message schema: {}", schema),
            Error::MissingField(name) => write!(f, "point cloud field missing: {}", name),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<cdr::Error> for Error {
    fn from(err: cdr::Error) -> Self {
        Error::InvalidMessage(err.to_string())
    }
}

/// Decoder family a model belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderFamily {
    /// Raw Velodyne packets, decoded block by block
    VelodynePacket,
    /// Velodyne driver point clouds, timing inferred when missing
    VelodynePoints,
    /// Ouster driver point clouds with `t` field
    Ouster,
    /// Hesai Pandar XT point clouds with absolute `timestamp` field
    PandarXt,
    /// Livox custom messages
    Livox,
}

/// Supported sensor models.
///
/// The `value(name = ...)` strings are the configuration strings accepted by
/// [`create_decoder`] and by the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum)]
pub enum LidarModel {
    #[value(name = "VLP_16_PACKET")]
    Vlp16Packet,
    #[value(name = "VLP_16_POINTS")]
    Vlp16Points,
    #[value(name = "VLP_32E_POINTS")]
    Vlp32ePoints,
    #[value(name = "OUSTER_16_POINTS")]
    Ouster16Points,
    #[value(name = "OUSTER_32_POINTS")]
    Ouster32Points,
    #[value(name = "OUSTER_64_POINTS")]
    Ouster64Points,
    #[value(name = "OUSTER_128_POINTS")]
    Ouster128Points,
    #[value(name = "PANDAR_XT_16")]
    PandarXt16,
    #[value(name = "PANDAR_XT_32")]
    PandarXt32,
    #[value(name = "LIVOX_MID_360")]
    LivoxMid360,
    #[value(name = "LIVOX_AVIA")]
    LivoxAvia,
}

impl LidarModel {
    /// Every registered model, in registry order.
    pub const ALL: [LidarModel; 11] = [
        LidarModel::Vlp16Packet,
        LidarModel::Vlp16Points,
        LidarModel::Vlp32ePoints,
        LidarModel::Ouster16Points,
        LidarModel::Ouster32Points,
        LidarModel::Ouster64Points,
        LidarModel::Ouster128Points,
        LidarModel::PandarXt16,
        LidarModel::PandarXt32,
        LidarModel::LivoxMid360,
        LidarModel::LivoxAvia,
    ];

    /// Configuration string for this model.
    pub fn as_str(&self) -> &'static str {
        match self {
            LidarModel::Vlp16Packet => "VLP_16_PACKET",
            LidarModel::Vlp16Points => "VLP_16_POINTS",
            LidarModel::Vlp32ePoints => "VLP_32E_POINTS",
            LidarModel::Ouster16Points => "OUSTER_16_POINTS",
            LidarModel::Ouster32Points => "OUSTER_32_POINTS",
            LidarModel::Ouster64Points => "OUSTER_64_POINTS",
            LidarModel::Ouster128Points => "OUSTER_128_POINTS",
            LidarModel::PandarXt16 => "PANDAR_XT_16",
            LidarModel::PandarXt32 => "PANDAR_XT_32",
            LidarModel::LivoxMid360 => "LIVOX_MID_360",
            LidarModel::LivoxAvia => "LIVOX_AVIA",
        }
    }

    /// Number of laser channels (rings, or scan lines for Livox).
    pub fn channels(&self) -> usize {
        match self {
            LidarModel::Vlp16Packet | LidarModel::Vlp16Points => 16,
            LidarModel::Vlp32ePoints => 32,
            LidarModel::Ouster16Points | LidarModel::PandarXt16 => 16,
            LidarModel::Ouster32Points | LidarModel::PandarXt32 => 32,
            LidarModel::Ouster64Points => 64,
            LidarModel::Ouster128Points => 128,
            LidarModel::LivoxMid360 => 4,
            LidarModel::LivoxAvia => 6,
        }
    }

    /// Wire type this model's messages arrive as.
    pub fn message_kind(&self) -> MessageKind {
        match self.family() {
            DecoderFamily::VelodynePacket => MessageKind::VelodyneScan,
            DecoderFamily::Livox => MessageKind::LivoxCustom,
            DecoderFamily::VelodynePoints | DecoderFamily::Ouster | DecoderFamily::PandarXt => {
                MessageKind::PointCloud2
            }
        }
    }

    pub fn family(&self) -> DecoderFamily {
        match self {
            LidarModel::Vlp16Packet => DecoderFamily::VelodynePacket,
            LidarModel::Vlp16Points | LidarModel::Vlp32ePoints => DecoderFamily::VelodynePoints,
            LidarModel::Ouster16Points
            | LidarModel::Ouster32Points
            | LidarModel::Ouster64Points
            | LidarModel::Ouster128Points => DecoderFamily::Ouster,
            LidarModel::PandarXt16 | LidarModel::PandarXt32 => DecoderFamily::PandarXt,
            LidarModel::LivoxMid360 | LidarModel::LivoxAvia => DecoderFamily::Livox,
        }
    }

    /// Build a decoder for this model.
    ///
    /// All lookup tables are computed here so that decoding never recomputes
    /// them.
    pub fn decoder(&self, config: &DecoderConfig) -> Result<Box<dyn LidarDecoder>, Error> {
        config.validate()?;
        debug!(model = %self, family = ?self.family(), "creating lidar decoder");

        let decoder: Box<dyn LidarDecoder> = match self.family() {
            DecoderFamily::VelodynePacket => Box::new(Vlp16PacketDecoder::new(*self, config)),
            DecoderFamily::VelodynePoints => Box::new(VelodynePointsDecoder::new(*self, config)),
            DecoderFamily::Ouster => Box::new(OusterDecoder::new(*self, config)),
            DecoderFamily::PandarXt => Box::new(PandarXtDecoder::new(*self, config)),
            DecoderFamily::Livox => Box::new(LivoxDecoder::new(*self, config)),
        };

        Ok(decoder)
    }
}

impl fmt::Display for LidarModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LidarModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LidarModel::ALL
            .iter()
            .find(|model| model.as_str() == s.trim())
            .copied()
            .ok_or_else(|| Error::UnsupportedModel(s.to_string()))
    }
}

/// Trait for LiDAR decoder implementations.
///
/// One decoder is created per sensor topic and fed one message at a time.
/// Calls take `&mut self`: a decoder must not be shared between concurrent
/// callers, but distinct decoders are independent and may live on different
/// threads.
pub trait LidarDecoder: Send {
    /// Model this decoder was built for.
    fn model(&self) -> LidarModel;

    /// Decode one message into a point batch.
    ///
    /// # Returns
    /// - `Ok(batch)` with only the points passing the configured filter; an
    ///   empty batch is a valid result
    /// - `Err(Error::MessageTypeMismatch)` if the message is not the model's
    ///   wire type
    /// - `Err(Error::ScanParameterInitFailure)` if a stateful decoder cannot
    ///   establish scan geometry from its first message
    fn unpack_scan(&mut self, msg: &ScanMessage) -> Result<PointBatch, Error>;

    /// Fail with [`Error::MessageTypeMismatch`] unless `msg` is this
    /// decoder's wire type.
    fn check_message(&self, msg: &ScanMessage) -> Result<(), Error> {
        if self.model().message_kind() != msg.kind() {
            return Err(self.type_mismatch(msg));
        }
        Ok(())
    }

    /// [`Error::MessageTypeMismatch`] for `msg`.
    fn type_mismatch(&self, msg: &ScanMessage) -> Error {
        let model = self.model();
        Error::MessageTypeMismatch {
            model,
            expected: model.message_kind(),
            found: msg.kind(),
        }
    }
}

/// Create a decoder from a model configuration string.
///
/// # Example
///
/// ```
/// use edgefirst_lidar_decode::{DecoderConfig, create_decoder};
///
/// let decoder = create_decoder("VLP_16_PACKET", &DecoderConfig::default()).unwrap();
/// assert_eq!(decoder.model().to_string(), "VLP_16_PACKET");
///
/// assert!(create_decoder("HDL_64_PACKET", &DecoderConfig::default()).is_err());
/// ```
pub fn create_decoder(model: &str, config: &DecoderConfig) -> Result<Box<dyn LidarDecoder>, Error> {
    let model = model.parse::<LidarModel>()?;
    model.decoder(config)
}

/// Clockwise azimuth of a point in degrees, `[0, 360)`.
///
/// Zero azimuth is the +x axis; angles grow in the sensor's spin direction
/// (clockwise seen from above), matching the Velodyne rotation code.
#[inline]
pub fn clockwise_azimuth(x: f32, y: f32) -> f64 {
    let deg = -(y as f64).atan2(x as f64).to_degrees();
    let deg = deg.rem_euclid(360.0);
    // rem_euclid may round up to exactly 360.0 for tiny negative inputs
    if deg >= 360.0 { 0.0 } else { deg }
}
