// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Frame by frame monocular visual odometry.
//!
//! For each new frame, points are tracked from the previous frame,
//! the essential matrix of the correspondences is estimated and decomposed
//! into a relative motion, which is then scaled and accumulated into the trajectory.
//! Tracks are re-detected when too few of them survive.

use nalgebra::DMatrix;

use crate::core::{
    camera::Intrinsics,
    candidates::fast,
    epipolar::{decomposition, ransac},
    multires::Pyramid,
    track::{
        klt,
        tracks::{Correspondences, TrackSet},
    },
    trajectory::{self, FramePose, GapCause, GapWarning, ScaleReference, Step, Trajectory},
};

/// Struct used for tracking the camera at each frame.
/// Can only be constructed by initialization from a `Config`.
pub struct Tracker {
    config: Config,
    state: State,
}

/// Configuration of the Tracker.
#[derive(Debug, Clone)]
pub struct Config {
    /// Camera intrinsic parameters.
    pub intrinsics: Intrinsics,
    /// Configuration of the KLT point tracker.
    pub klt: klt::Config,
    /// Configuration of the FAST corner detector.
    pub fast: fast::Config,
    /// Tracks are re-detected when fewer are alive.
    pub min_tracks: usize,
    /// Configuration of the essential matrix estimation.
    pub ransac: ransac::Config,
    /// Configuration of the essential matrix decomposition.
    pub decomposition: decomposition::Config,
    /// Configuration of the trajectory accumulation.
    pub trajectory: trajectory::Config,
}

/// Whether the tracker currently has enough tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    /// Enough tracks are alive.
    Tracking,
    /// Tracks were just re-detected, or not enough corners were found.
    Reinitializing,
}

/// Internal state of the tracker.
struct State {
    pyramid: Pyramid,
    tracks: TrackSet,
    trajectory: Trajectory,
    tracking_state: TrackingState,
    nb_reinitializations: usize,
}

impl Config {
    /// Default configuration for a camera.
    pub fn new(intrinsics: Intrinsics) -> Self {
        Self {
            intrinsics,
            klt: klt::Config::default(),
            fast: fast::Config::default(),
            min_tracks: 2000,
            ransac: ransac::Config::default(),
            decomposition: decomposition::Config::default(),
            trajectory: trajectory::Config::default(),
        }
    }

    /// Initialize a tracker with the first frame, at the origin.
    pub fn init(self, index: usize, first_frame: DMatrix<u8>) -> Tracker {
        let pyramid = self.klt.pyramid(first_frame);
        let mut tracks = TrackSet::new();
        let mut tracking_state = TrackingState::Reinitializing;
        if let Some(detected) = maintain(&self.fast, self.min_tracks, &mut tracks, pyramid.base()) {
            tracking_state = state_after_detection(index, detected, self.min_tracks);
        }
        log::info!("frame {}: tracker initialized with {} tracks", index, tracks.len());
        Tracker {
            state: State {
                pyramid,
                tracks,
                trajectory: Trajectory::new(self.trajectory.clone(), index),
                tracking_state,
                nb_reinitializations: 0,
            },
            config: self,
        }
    }
} // impl Config

impl Tracker {
    /// Track a new frame and return its pose.
    ///
    /// Frames must come in increasing index order.
    /// Geometry failures never abort tracking:
    /// the pose is carried over and flagged as a gap.
    pub fn track(
        &mut self,
        index: usize,
        frame: DMatrix<u8>,
        reference: Option<&dyn ScaleReference>,
    ) -> &FramePose {
        let pyramid = self.config.klt.pyramid(frame);
        let results = self.config.klt.track(
            &self.state.pyramid,
            &pyramid,
            &self.state.tracks.positions(),
        );
        let correspondences = self.state.tracks.advance(results);
        debug_assert_eq!(correspondences.previous.len(), correspondences.current.len());
        log::debug!(
            "frame {}: {} correspondences",
            index,
            correspondences.len()
        );

        let step = self.two_view_step(&correspondences);
        self.state.trajectory.integrate(index, step, reference);

        if let Some(detected) = maintain(
            &self.config.fast,
            self.config.min_tracks,
            &mut self.state.tracks,
            pyramid.base(),
        ) {
            self.state.nb_reinitializations += 1;
            self.state.tracking_state =
                state_after_detection(index, detected, self.config.min_tracks);
        }

        // Only the current frame is kept for the next call.
        self.state.pyramid = pyramid;
        self.state.trajectory.current()
    }

    /// Relative motion from the previous frame, or the reason why there is none.
    fn two_view_step(&self, correspondences: &Correspondences) -> Step {
        // Current points first: the motion is then the pose of the current
        // camera in the previous camera frame.
        let estimate = match self.config.ransac.estimate(
            &self.config.intrinsics,
            &correspondences.current,
            &correspondences.previous,
        ) {
            Ok(estimate) => estimate,
            Err(err) => return Step::Gap(GapCause::Degenerate(err)),
        };
        match self.config.decomposition.decompose(&estimate) {
            Err(err) => Step::Gap(GapCause::Degenerate(err)),
            Ok(d) if d.ambiguous => Step::Gap(GapCause::Ambiguous {
                support: d.support,
                runner_up: d.runner_up,
            }),
            Ok(d) => {
                log::debug!(
                    "{} inliers, rotation of {:.4} rad, direction {:?}",
                    estimate.nb_inliers,
                    d.motion.rotation.angle(),
                    d.motion.translation.as_slice()
                );
                Step::Motion(d.motion)
            }
        }
    }

    /// Pose of the last tracked frame.
    pub fn current_frame(&self) -> &FramePose {
        self.state.trajectory.current()
    }

    /// Whether the tracks were recently re-detected.
    pub fn tracking_state(&self) -> TrackingState {
        self.state.tracking_state
    }

    /// Currently alive tracks.
    pub fn tracks(&self) -> &TrackSet {
        &self.state.tracks
    }

    /// Trajectory so far.
    pub fn trajectory(&self) -> &Trajectory {
        &self.state.trajectory
    }

    /// Number of times tracks were re-detected after initialization.
    pub fn nb_reinitializations(&self) -> usize {
        self.state.nb_reinitializations
    }

    /// Stop tracking and return the trajectory.
    pub fn into_trajectory(self) -> Trajectory {
        self.state.trajectory
    }
} // impl Tracker

/// Re-detect tracks on the frame if fewer than `min_tracks` are alive.
///
/// All current tracks are then discarded and replaced by the detected corners.
/// Returns the number of detected corners if a detection happened.
pub fn maintain(
    fast: &fast::Config,
    min_tracks: usize,
    tracks: &mut TrackSet,
    frame: &DMatrix<u8>,
) -> Option<usize> {
    if tracks.len() >= min_tracks.max(1) {
        return None;
    }
    log::debug!("{} tracks alive, {} required: re-detecting", tracks.len(), min_tracks);
    let corners = fast.detect(frame);
    tracks.replace(corners.iter().map(fast::Corner::position));
    Some(tracks.len())
}

fn state_after_detection(index: usize, detected: usize, min_tracks: usize) -> TrackingState {
    if detected >= min_tracks {
        log::info!("frame {}: re-detected {} tracks, tracking", index, detected);
        TrackingState::Tracking
    } else {
        log::info!(
            "frame {}: only {} corners detected ({} wanted), reinitializing",
            index,
            detected,
            min_tracks
        );
        TrackingState::Reinitializing
    }
}

// Frames supply ##############################################################

/// Supplier of frames, by increasing index.
pub trait FrameSource {
    /// Unrecoverable error of the supplier.
    type Error;

    /// Frame at a given index, `None` after the last frame.
    fn frame(&mut self, index: usize) -> Result<Option<DMatrix<u8>>, Self::Error>;
}

/// Frames held in memory.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    frames: Vec<DMatrix<u8>>,
}

impl VecSource {
    /// Source of the given frames, indexed from 0.
    pub fn new(frames: Vec<DMatrix<u8>>) -> Self {
        Self { frames }
    }
}

impl FrameSource for VecSource {
    type Error = std::convert::Infallible;

    fn frame(&mut self, index: usize) -> Result<Option<DMatrix<u8>>, Self::Error> {
        Ok(self.frames.get(index).cloned())
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination<E> {
    /// No more frames, or the requested number of frames was processed.
    EndOfSequence,
    /// The frame supplier failed.
    FrameSupplyFailed(E),
}

/// Output of a whole run.
#[derive(Debug, Clone)]
pub struct Run<E> {
    /// One pose per processed frame.
    pub poses: Vec<FramePose>,
    /// Trajectory quality warnings.
    pub warnings: Vec<GapWarning>,
    /// Why the run stopped.
    pub termination: Termination<E>,
}

/// Track all frames of a source, starting at index 0.
///
/// At most `max_frames` frames are processed if given.
/// The trajectory computed so far is always returned,
/// even if the frame supplier fails.
pub fn run<S: FrameSource>(
    config: Config,
    source: &mut S,
    reference: Option<&dyn ScaleReference>,
    max_frames: Option<usize>,
) -> Run<S::Error> {
    let stop = |termination| Run {
        poses: Vec::new(),
        warnings: Vec::new(),
        termination,
    };
    if max_frames == Some(0) {
        return stop(Termination::EndOfSequence);
    }
    let mut tracker = match source.frame(0) {
        Ok(Some(frame)) => config.init(0, frame),
        Ok(None) => return stop(Termination::EndOfSequence),
        Err(err) => return stop(Termination::FrameSupplyFailed(err)),
    };

    let mut index = 1;
    let termination = loop {
        if max_frames.map_or(false, |max| index >= max) {
            break Termination::EndOfSequence;
        }
        match source.frame(index) {
            Ok(Some(frame)) => {
                let frame_pose = tracker.track(index, frame, reference);
                log::debug!("frame {}: {}", index, frame_pose.quality);
            }
            Ok(None) => break Termination::EndOfSequence,
            Err(err) => {
                log::warn!("frame {}: frame supply failed, stopping", index);
                break Termination::FrameSupplyFailed(err);
            }
        }
        index += 1;
    };

    log::info!(
        "processed {} frames, {} re-detections",
        index,
        tracker.nb_reinitializations()
    );
    let (poses, warnings) = tracker.into_trajectory().into_parts();
    Run {
        poses,
        warnings,
        termination,
    }
}

// TESTS #############################################################
