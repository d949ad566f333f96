// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Type aliases for common types used all over the code base.

use nalgebra as na;

/// Epipolar geometry requires double precision,
/// so the whole library computes with f64.
pub type Float = f64;

/// A point with two Float coordinates.
pub type Point2 = na::Point2<Float>;
/// A point with three Float coordinates.
pub type Point3 = na::Point3<Float>;

/// A vector with two Float coordinates.
pub type Vec2 = na::Vector2<Float>;
/// A vector with three Float coordinates.
pub type Vec3 = na::Vector3<Float>;

/// A 2x2 matrix of Floats.
pub type Mat2 = na::Matrix2<Float>;
/// A 3x3 matrix of Floats.
pub type Mat3 = na::Matrix3<Float>;

/// A rotation parameterized by a unit quaternion.
pub type UnitQuat = na::UnitQuaternion<Float>;
/// A direct 3D isometry, also known as rigid body motion.
pub type Iso3 = na::Isometry3<Float>;
