// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser as _;
use edgefirst_lidar_decode::{Error, LidarDecoder, LidarModel, PointBatch, ScanMessage};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Running totals over every decoded batch.
#[derive(Debug, Default)]
struct Summary {
    messages: usize,
    empty: usize,
    points: usize,
    min_range: f32,
    max_range: f32,
}

impl Summary {
    fn add(&mut self, batch: &PointBatch) {
        self.messages += 1;
        if batch.is_empty() {
            self.empty += 1;
            return;
        }
        let (lo, hi) = batch
            .range()
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &r| (lo.min(r), hi.max(r)));
        if self.points == 0 {
            (self.min_range, self.max_range) = (lo, hi);
        } else {
            self.min_range = self.min_range.min(lo);
            self.max_range = self.max_range.max(hi);
        }
        self.points += batch.len();
    }
}

fn is_capture(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("pcap" | "pcapng")
    )
}

#[cfg(feature = "pcap")]
fn load_capture(path: &Path, args: &Args) -> Result<Vec<ScanMessage>, Error> {
    use edgefirst_lidar_decode::pcap_source::PcapSource;

    let source = PcapSource::from_file(path, Some(args.port))?;
    debug!(packets = source.len(), "loaded packet capture");
    Ok(source
        .velodyne_scans(&args.frame_id)
        .into_iter()
        .map(ScanMessage::from)
        .collect())
}

#[cfg(not(feature = "pcap"))]
fn load_capture(path: &Path, _args: &Args) -> Result<Vec<ScanMessage>, Error> {
    Err(Error::Config(format!(
        "{}: built without the pcap feature",
        path.display()
    )))
}

/// Messages stored in one input file.
fn load_messages(path: &Path, args: &Args) -> Result<Vec<ScanMessage>, Error> {
    if is_capture(path) {
        if args.model != LidarModel::Vlp16Packet {
            return Err(Error::Config(format!(
                "packet captures need model {}, not {}",
                LidarModel::Vlp16Packet,
                args.model
            )));
        }
        return load_capture(path, args);
    }

    let payload = std::fs::read(path)?;
    let msg = ScanMessage::from_cdr_kind(args.model.message_kind(), &payload)?;
    Ok(vec![msg])
}

#[instrument(skip_all, fields(path = %path.display()))]
fn decode_file(
    decoder: &mut dyn LidarDecoder,
    path: &Path,
    args: &Args,
    summary: &mut Summary,
) -> Result<(), Error> {
    for msg in load_messages(path, args)? {
        let batch = decoder.unpack_scan(&msg)?;
        match batch.time_span() {
            Some((first, last)) => info!(
                stamp = batch.timestamp(),
                points = batch.len(),
                first,
                last,
                "decoded scan"
            ),
            None => warn!(stamp = batch.timestamp(), "scan has no points after filtering"),
        }
        summary.add(&batch);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.rust_log)
        .init();

    let config = args.decoder_config()?;
    debug!(?config, "decoder configuration");
    let mut decoder = args.model.decoder(&config)?;

    let mut summary = Summary::default();
    for path in &args.inputs {
        decode_file(decoder.as_mut(), path, &args, &mut summary)?;
    }

    info!(
        model = %args.model,
        messages = summary.messages,
        empty = summary.empty,
        points = summary.points,
        min_range = summary.min_range,
        max_range = summary.max_range,
        "done"
    );
    Ok(())
}
