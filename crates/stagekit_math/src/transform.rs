// Transform utilities for DMat4
//
// glam::DMat4 already provides transform_point3() and inverse().

use glam::{DMat3, DMat4, DVec3};

use crate::Aabb;

/// Extension trait for DMat4 with scene-graph helpers.
pub trait DMat4Ext {
    /// Transform an axis-aligned bounding box.
    /// Computes the bounding box of all 8 transformed corners.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;

    /// Transform a surface normal by the inverse-transpose of the upper 3x3.
    ///
    /// The result is re-normalized; zero-length inputs stay zero.
    fn transform_normal(&self, normal: DVec3) -> DVec3;
}

impl DMat4Ext for DMat4 {
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        Aabb::enclosing(
            aabb.corners()
                .into_iter()
                .map(|corner| self.transform_point3(corner)),
        )
    }

    fn transform_normal(&self, normal: DVec3) -> DVec3 {
        let linear = DMat3::from_mat4(*self);
        let normal_matrix = if linear.determinant().abs() > f64::EPSILON {
            linear.inverse().transpose()
        } else {
            linear
        };
        (normal_matrix * normal).normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_aabb_translation() {
        let mat = DMat4::from_translation(DVec3::splat(5.0));
        let aabb = Aabb::from_points(DVec3::ZERO, DVec3::ONE);
        let transformed = mat.transform_aabb(&aabb);

        assert!((transformed.min_corner().unwrap() - DVec3::splat(5.0)).length() < 1e-12);
        assert!((transformed.max_corner().unwrap() - DVec3::splat(6.0)).length() < 1e-12);
    }

    #[test]
    fn test_transform_aabb_empty_stays_empty() {
        let mat = DMat4::from_scale(DVec3::splat(3.0));
        assert!(mat.transform_aabb(&Aabb::EMPTY).is_empty());
    }

    #[test]
    fn test_transform_aabb_rotation() {
        use std::f64::consts::FRAC_PI_2;

        let mat = DMat4::from_rotation_z(FRAC_PI_2);
        let aabb = Aabb::from_points(DVec3::ZERO, DVec3::new(2.0, 1.0, 1.0));
        let transformed = mat.transform_aabb(&aabb);

        assert!((transformed.size() - DVec3::new(1.0, 2.0, 1.0)).length() < 1e-9);
    }

    #[test]
    fn test_transform_normal_ignores_translation() {
        let mat = DMat4::from_translation(DVec3::new(10.0, 20.0, 30.0));
        assert_eq!(mat.transform_normal(DVec3::X), DVec3::X);
    }

    #[test]
    fn test_transform_normal_nonuniform_scale() {
        // A 45 degree normal on a surface squashed along X tilts toward X
        let mat = DMat4::from_scale(DVec3::new(0.5, 1.0, 1.0));
        let n = mat.transform_normal(DVec3::new(1.0, 1.0, 0.0).normalize());
        assert!((n.length() - 1.0).abs() < 1e-12);
        assert!(n.x > n.y);
    }
}
