// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Monocular visual odometry.
//!
//! Points are tracked from frame to frame with a pyramidal KLT tracker,
//! the relative motion between consecutive frames is recovered
//! from the essential matrix of the tracked points,
//! and motions are accumulated into a trajectory scaled by an external reference.
//!
//! The entry point is `core::odometry`: a `Config` is turned into a `Tracker`
//! with the first frame, then every new frame is given to `Tracker::track`.
//! `core::odometry::run` does it for a whole `FrameSource`.

pub mod core;
pub mod dataset;
pub mod math;
pub mod misc;
