// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use anyhow::Context;
use clap::Parser;
use std::{path::PathBuf, time::Instant};

use mono_vors::core::odometry::{self, Termination};
use mono_vors::core::trajectory::{FramePose, Quality, ScaleReference};
use mono_vors::dataset::kitti;
use mono_vors::math::so3;
use mono_vors::misc::type_aliases::{Float, Iso3};

/// Monocular visual odometry on a KITTI odometry sequence.
///
/// Prints one pose per frame on stdout, in the KITTI format.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Root directory of the dataset, containing "sequences/" and "poses/".
    dataset_root: PathBuf,

    /// Sequence number.
    #[arg(default_value = "00")]
    sequence: String,

    /// Do not scale translations with the ground truth poses.
    #[arg(long)]
    no_scale_reference: bool,

    /// Maximum number of frames to process.
    #[arg(long)]
    max_frames: Option<usize>,

    /// Tracks are re-detected when fewer are alive.
    #[arg(long)]
    min_tracks: Option<usize>,

    /// Intensity threshold of the FAST corner detector.
    #[arg(long)]
    fast_threshold: Option<u8>,

    /// Seed of the RANSAC sampling.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let sequence = kitti::Sequence::new(&args.dataset_root, &args.sequence);

    // Calibration is required, ground truth is optional.
    let intrinsics = sequence
        .read_calibration()
        .context("cannot load the camera calibration")?;
    log::info!(
        "sequence {}: focal {:?}, principal point {:?}",
        sequence.id(),
        intrinsics.focal,
        intrinsics.principal_point
    );
    let ground_truth = match sequence.read_poses() {
        Ok(poses) => Some(poses),
        Err(err) => {
            log::warn!("no ground truth ({}), scale will be unverified", err);
            None
        }
    };
    let reference = if args.no_scale_reference {
        None
    } else {
        ground_truth.as_ref().map(|poses| poses as &dyn ScaleReference)
    };

    // Setup tracking configuration.
    let mut config = odometry::Config::new(intrinsics);
    if let Some(min_tracks) = args.min_tracks {
        config.min_tracks = min_tracks;
    }
    if let Some(threshold) = args.fast_threshold {
        config.fast.threshold = threshold;
    }
    if let Some(seed) = args.seed {
        config.ransac.seed = seed;
    }

    // Track every frame of the sequence.
    let mut frames = sequence.frames(kitti::frame_limit(sequence.id()));
    let tic = Instant::now();
    let run = odometry::run(config, &mut frames, reference, args.max_frames);
    let duration = tic.elapsed().as_secs_f64();

    for frame_pose in run.poses.iter() {
        println!("{}", kitti::format_pose(&frame_pose.pose));
    }
    summary(&run.poses, run.warnings.len(), duration, ground_truth.as_deref());

    match run.termination {
        Termination::EndOfSequence => Ok(()),
        Termination::FrameSupplyFailed(err) => {
            Err(err).context(format!("stopped after {} frames", run.poses.len()))
        }
    }
}

/// Log timing, quality counts and final position error.
#[allow(clippy::cast_precision_loss)]
fn summary(
    poses: &[FramePose],
    nb_warnings: usize,
    duration: Float,
    ground_truth: Option<&[Option<Iso3>]>,
) {
    let nb_frames = poses.len();
    log::info!(
        "total time: {:.2} s, average: {:.1} fps",
        duration,
        nb_frames as Float / duration.max(Float::EPSILON)
    );
    let count = |f: fn(&Quality) -> bool| poses.iter().filter(|p| f(&p.quality)).count();
    log::info!(
        "{} frames: {} normal, {} scale unverified, {} gaps, {} quality warnings",
        nb_frames,
        count(|q| *q == Quality::Normal),
        count(|q| *q == Quality::ScaleUnverified),
        count(|q| matches!(q, Quality::DeadReckoningGap(_))),
        nb_warnings
    );
    let last = poses.last();
    let truth = last.and_then(|p| ground_truth?.get(p.index)?.as_ref());
    if let (Some(last), Some(truth)) = (last, truth) {
        let error = (last.pose.translation.vector - truth.translation.vector).norm();
        let rotation_error = so3::angle_between(
            &last.pose.rotation.to_rotation_matrix().into_inner(),
            &truth.rotation.to_rotation_matrix().into_inner(),
        );
        log::info!(
            "final error at frame {}: {:.3} m, {:.3} deg",
            last.index,
            error,
            rotation_error.to_degrees()
        );
    }
}
