// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Core functionalities of monocular visual odometry.

pub mod camera;
pub mod candidates;
pub mod epipolar;
pub mod gradient;
pub mod multires;
pub mod odometry;
pub mod track;
pub mod trajectory;
