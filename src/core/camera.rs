// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Camera intrinsics and pixel / normalized coordinates conversions.

use crate::misc::type_aliases::{Float, Mat3, Point2, Point3, Vec3};

/// Intrinsic parameters of a pinhole camera.
#[derive(PartialEq, Debug, Clone)]
pub struct Intrinsics {
    /// Principal point (cx, cy) in pixels.
    pub principal_point: (Float, Float),
    /// Focal lengths (fx, fy) in pixels.
    pub focal: (Float, Float),
    /// Skew coefficient, zero for most cameras.
    pub skew: Float,
}

impl Intrinsics {
    /// Extract intrinsics from a 3x3 calibration matrix `K`.
    pub fn from_matrix(k: &Mat3) -> Self {
        Self {
            principal_point: (k.m13, k.m23),
            focal: (k.m11, k.m22),
            skew: k.m12,
        }
    }

    /// Mean of the two focal lengths.
    /// Used to convert pixel thresholds into normalized coordinates.
    pub fn mean_focal(&self) -> Float {
        0.5 * (self.focal.0.abs() + self.focal.1.abs())
    }

    /// Project a 3D point in camera frame into homogeneous pixel coordinates `(u*z, v*z, z)`.
    pub fn project(&self, point: Point3) -> Vec3 {
        Vec3::new(
            self.focal.0 * point[0] + self.skew * point[1] + self.principal_point.0 * point[2],
            self.focal.1 * point[1] + self.principal_point.1 * point[2],
            point[2],
        )
    }

    /// Back project a pixel at a given depth into a 3D point in camera frame.
    pub fn back_project(&self, point: Point2, depth: Float) -> Point3 {
        let z = depth;
        let y = (point[1] - self.principal_point.1) * z / self.focal.1;
        let x = ((point[0] - self.principal_point.0) * z - self.skew * y) / self.focal.0;
        Point3::new(x, y, z)
    }

    /// Pixel coordinates into normalized image coordinates (`K^-1 * p`).
    pub fn normalize(&self, pixel: Point2) -> Point2 {
        let p = self.back_project(pixel, 1.0);
        Point2::new(p.x, p.y)
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;
    use quickcheck_macros;

    /// KITTI sequence 00 left gray camera.
    const KITTI_00: Intrinsics = Intrinsics {
        principal_point: (607.1928, 185.2157),
        focal: (718.856, 718.856),
        skew: 0.0,
    };

    #[test]
    #[rustfmt::skip]
    fn from_calibration_matrix() {
        let k = Mat3::new(
            718.856, 0.5,     607.1928,
            0.0,     718.856, 185.2157,
            0.0,     0.0,     1.0,
        );
        let skewed = Intrinsics {
            skew: 0.5,
            ..KITTI_00
        };
        assert_eq!(skewed, Intrinsics::from_matrix(&k));
    }

    #[test]
    fn principal_point_is_optical_axis() {
        let center = Point2::new(607.1928, 185.2157);
        assert_eq!(Point2::origin(), KITTI_00.normalize(center));
    }

    // PROPERTY TESTS ################################################

    #[quickcheck_macros::quickcheck]
    fn normalize_then_project(u: u16, v: u16, skew: u8) -> bool {
        let intrinsics = Intrinsics {
            skew: Float::from(skew) / 100.0,
            ..KITTI_00
        };
        let pixel = Point2::new(Float::from(u) / 50.0, Float::from(v) / 100.0);
        let p = intrinsics.normalize(pixel);
        let uvz = intrinsics.project(Point3::new(p.x, p.y, 1.0));
        approx::relative_eq!(pixel, Point2::new(uvz.x, uvz.y), epsilon = 1e-9)
    }

    #[quickcheck_macros::quickcheck]
    fn back_project_then_project(u: u16, v: u16, depth: u8) -> bool {
        let pixel = Point2::new(Float::from(u) / 50.0, Float::from(v) / 100.0);
        let depth = 1.0 + Float::from(depth);
        let uvz = KITTI_00.project(KITTI_00.back_project(pixel, depth));
        approx::relative_eq!(depth, uvz.z)
            && approx::relative_eq!(pixel, Point2::new(uvz.x / uvz.z, uvz.y / uvz.z), epsilon = 1e-9)
    }
}
