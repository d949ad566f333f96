// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Accumulation of scaled relative motions into a global trajectory.
//!
//! A monocular camera only observes the direction of its translation.
//! The length of each step comes from an external scale reference,
//! typically ground truth positions or an odometer.

use std::fmt;

use crate::core::epipolar::{decomposition::RelativeMotion, EpipolarError};
use crate::math::so3;
use crate::misc::type_aliases::{Float, Iso3, Point3};

/// Configuration of the accumulator.
#[derive(Debug, Clone)]
pub struct Config {
    /// Scale used when no reference was ever available.
    pub default_scale: Float,
    /// A warning is raised when more consecutive frames are gaps.
    pub max_consecutive_gaps: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_scale: 1.0,
            max_consecutive_gaps: 3,
        }
    }
}

/// Provider of reference camera positions, used to scale translations.
pub trait ScaleReference {
    /// Position of the camera at a frame index, if known.
    fn position(&self, index: usize) -> Option<Point3>;
}

/// Ground truth poses, indexed by frame.
impl ScaleReference for [Iso3] {
    fn position(&self, index: usize) -> Option<Point3> {
        self.get(index).map(|pose| Point3::from(pose.translation.vector))
    }
}

impl ScaleReference for Vec<Iso3> {
    fn position(&self, index: usize) -> Option<Point3> {
        self.as_slice().position(index)
    }
}

/// Ground truth poses with holes, indexed by frame.
impl ScaleReference for [Option<Iso3>] {
    fn position(&self, index: usize) -> Option<Point3> {
        let pose = self.get(index)?.as_ref()?;
        Some(Point3::from(pose.translation.vector))
    }
}

impl ScaleReference for Vec<Option<Iso3>> {
    fn position(&self, index: usize) -> Option<Point3> {
        self.as_slice().position(index)
    }
}

/// Why a frame did not update the pose.
#[derive(Debug, Clone, PartialEq)]
pub enum GapCause {
    /// The two-view geometry could not be estimated.
    Degenerate(EpipolarError),
    /// The relative motion could not be chosen with confidence.
    Ambiguous {
        /// Support of the best candidate.
        support: usize,
        /// Support of the second best candidate.
        runner_up: usize,
    },
}

/// Quality flag of a pose.
#[derive(Debug, Clone, PartialEq)]
pub enum Quality {
    /// Pose updated with a reference scale.
    Normal,
    /// Pose updated, but some scale in the trajectory was not given by the reference.
    ScaleUnverified,
    /// Pose carried over from the previous frame.
    DeadReckoningGap(GapCause),
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Quality::Normal => write!(f, "normal"),
            Quality::ScaleUnverified => write!(f, "scale unverified"),
            Quality::DeadReckoningGap(GapCause::Degenerate(err)) => write!(f, "gap ({})", err),
            Quality::DeadReckoningGap(GapCause::Ambiguous { support, runner_up }) => write!(
                f,
                "gap (ambiguous pose: {} vs {} points)",
                support, runner_up
            ),
        }
    }
}

/// Pose of a frame in the coordinates of the first frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePose {
    /// Frame index.
    pub index: usize,
    /// Camera to world rigid body motion.
    pub pose: Iso3,
    /// Quality flag.
    pub quality: Quality,
}

/// Raised when too many consecutive frames are gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct GapWarning {
    /// Frame at which the limit was exceeded.
    pub index: usize,
    /// Number of consecutive gaps at this frame.
    pub consecutive_gaps: usize,
}

/// Outcome of the two-view geometry of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Motion of the current camera in the previous camera frame.
    Motion(RelativeMotion),
    /// No usable motion.
    Gap(GapCause),
}

/// Sequence of poses, owned by the odometry tracker.
#[derive(Debug, Clone)]
pub struct Trajectory {
    config: Config,
    poses: Vec<FramePose>,
    warnings: Vec<GapWarning>,
    last_scale: Option<Float>,
    scale_unverified: bool,
    consecutive_gaps: usize,
}

impl Trajectory {
    /// Start a trajectory at the identity.
    pub fn new(config: Config, first_index: usize) -> Self {
        Self {
            config,
            poses: vec![FramePose {
                index: first_index,
                pose: Iso3::identity(),
                quality: Quality::Normal,
            }],
            warnings: Vec::new(),
            last_scale: None,
            scale_unverified: false,
            consecutive_gaps: 0,
        }
    }

    /// Latest pose.
    pub fn current(&self) -> &FramePose {
        // There is always at least the first pose.
        &self.poses[self.poses.len() - 1]
    }

    /// All poses, in frame order.
    pub fn poses(&self) -> &[FramePose] {
        &self.poses
    }

    /// Warnings raised so far.
    pub fn warnings(&self) -> &[GapWarning] {
        &self.warnings
    }

    /// Poses and warnings.
    pub fn into_parts(self) -> (Vec<FramePose>, Vec<GapWarning>) {
        (self.poses, self.warnings)
    }

    /// Integrate the step of a new frame.
    ///
    /// A motion is scaled with the distance between the reference positions
    /// of the previous and new frames, and composed with the previous pose.
    /// Without reference, the last known scale is used and the trajectory
    /// becomes scale-unverified from this frame on.
    /// A gap carries the previous pose over.
    pub fn integrate(
        &mut self,
        index: usize,
        step: Step,
        reference: Option<&dyn ScaleReference>,
    ) -> &FramePose {
        let previous = self.current().clone();
        let frame_pose = match step {
            Step::Motion(motion) => {
                self.consecutive_gaps = 0;
                let scale = self.scale(previous.index, index, reference);
                let mut pose = previous.pose * motion.scaled(scale);
                pose.rotation = so3::renormalize(pose.rotation);
                let quality = if self.scale_unverified {
                    Quality::ScaleUnverified
                } else {
                    Quality::Normal
                };
                FramePose {
                    index,
                    pose,
                    quality,
                }
            }
            Step::Gap(cause) => {
                self.consecutive_gaps += 1;
                log::warn!("frame {}: dead-reckoning gap, {:?}", index, cause);
                if self.consecutive_gaps == self.config.max_consecutive_gaps + 1 {
                    log::warn!(
                        "frame {}: more than {} consecutive gaps, trajectory quality degraded",
                        index,
                        self.config.max_consecutive_gaps
                    );
                    self.warnings.push(GapWarning {
                        index,
                        consecutive_gaps: self.consecutive_gaps,
                    });
                }
                FramePose {
                    index,
                    pose: previous.pose,
                    quality: Quality::DeadReckoningGap(cause),
                }
            }
        };
        self.poses.push(frame_pose);
        self.current()
    }

    /// Length of the step between two frames.
    fn scale(
        &mut self,
        previous_index: usize,
        index: usize,
        reference: Option<&dyn ScaleReference>,
    ) -> Float {
        let from_reference = reference.and_then(|r| {
            let a = r.position(previous_index)?;
            let b = r.position(index)?;
            Some((b - a).norm())
        });
        match from_reference {
            Some(scale) => {
                self.last_scale = Some(scale);
                scale
            }
            None => {
                let scale = self.last_scale.unwrap_or(self.config.default_scale);
                if !self.scale_unverified {
                    log::warn!(
                        "frame {}: no scale reference, using {} from now on unverified",
                        index,
                        scale
                    );
                }
                self.scale_unverified = true;
                scale
            }
        }
    }
}

// TESTS #############################################################
