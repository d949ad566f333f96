// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helpers for 3D rotations.

use nalgebra::{Rotation3, UnitQuaternion};

use crate::misc::type_aliases::{Float, Mat3, UnitQuat};
#[cfg(test)]
use crate::misc::type_aliases::Vec3;

/// Cross product matrix: `hat(w) * v == w.cross(&v)`.
#[cfg(test)]
#[rustfmt::skip]
pub fn hat(w: Vec3) -> Mat3 {
    Mat3::new(
         0.0,  -w.z,   w.y,
         w.z,   0.0,  -w.x,
        -w.y,   w.x,   0.0,
    )
}

/// Angle (in radians) of the rotation bringing `a` onto `b`.
pub fn angle_between(a: &Mat3, b: &Mat3) -> Float {
    let cos_theta = 0.5 * ((a.transpose() * b).trace() - 1.0);
    cos_theta.max(-1.0).min(1.0).acos()
}

/// Closest rotation to a 3x3 matrix that is already almost a rotation.
pub fn orthonormalize(mat: &Mat3) -> UnitQuat {
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(mat))
}

/// First order Taylor approximation for unit quaternion re-normalization.
/// Keeps accumulated rotations on the unit sphere.
pub fn renormalize(uq: UnitQuat) -> UnitQuat {
    let q = uq.into_inner();
    let sq_norm = q.norm_squared();
    UnitQuaternion::new_unchecked(0.5 * (3.0 - sq_norm) * q)
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;
    use quickcheck_macros;

    #[test]
    fn angle_between_known_rotation() {
        let a = UnitQuat::from_scaled_axis(Vec3::new(0.0, 0.3, 0.0)).to_rotation_matrix();
        let b = UnitQuat::from_scaled_axis(Vec3::new(0.0, -0.2, 0.0)).to_rotation_matrix();
        let (a, b) = (a.into_inner(), b.into_inner());
        approx::assert_relative_eq!(0.5, angle_between(&a, &b), epsilon = 1e-12);
        approx::assert_relative_eq!(0.0, angle_between(&a, &a), epsilon = 1e-6);
    }

    #[test]
    fn orthonormalize_recovers_perturbed_rotation() {
        let rotation = UnitQuat::from_scaled_axis(Vec3::new(0.1, -0.4, 0.25));
        let mut mat = rotation.to_rotation_matrix().into_inner();
        mat.m12 += 1e-7;
        mat.m31 -= 1e-7;
        let fixed = orthonormalize(&mat);
        approx::assert_relative_eq!(fixed, rotation, epsilon = 1e-6);
    }

    // PROPERTY TESTS ################################################

    #[quickcheck_macros::quickcheck]
    fn hat_is_cross_product(x: i16, y: i16, z: i16) -> bool {
        let w = gen_vector(x, y, z);
        let v = gen_vector(z, x, y);
        approx::relative_eq!(hat(w) * v, w.cross(&v), epsilon = 1e-12)
    }

    #[quickcheck_macros::quickcheck]
    fn angle_between_is_symmetric(roll: i16, pitch: i16, yaw: i16) -> bool {
        let a = gen_rotation(roll, pitch, yaw).to_rotation_matrix().into_inner();
        let b = gen_rotation(yaw, roll, pitch).to_rotation_matrix().into_inner();
        approx::relative_eq!(angle_between(&a, &b), angle_between(&b, &a), epsilon = 1e-6)
    }

    #[quickcheck_macros::quickcheck]
    fn renormalize_keeps_unit_norm(roll: i16, pitch: i16, yaw: i16) -> bool {
        let rotation = gen_rotation(roll, pitch, yaw);
        let composed = renormalize(rotation * rotation * rotation);
        (composed.into_inner().norm() - 1.0).abs() < 1e-12
    }

    // GENERATORS ####################################################

    fn gen_vector(x: i16, y: i16, z: i16) -> Vec3 {
        Vec3::new(Float::from(x), Float::from(y), Float::from(z)) / 1000.0
    }

    fn gen_rotation(roll: i16, pitch: i16, yaw: i16) -> UnitQuat {
        let to_angle = |a: i16| Float::from(a) / Float::from(i16::MAX) * 3.0;
        UnitQuaternion::from_euler_angles(to_angle(roll), to_angle(pitch), to_angle(yaw))
    }
}
