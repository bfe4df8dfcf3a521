use crate::{DVec3, Interval};

/// Axis-aligned bounding box in double precision.
///
/// An AABB is defined by three intervals (one per axis). The empty box
/// (every interval empty) is distinct from a zero-size box around a point.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub x: Interval,
    pub y: Interval,
    pub z: Interval,
}

impl Aabb {
    /// Create a new AABB from three intervals.
    pub fn new(x: Interval, y: Interval, z: Interval) -> Self {
        Self { x, y, z }
    }

    /// Create an AABB from two corner points.
    pub fn from_points(a: DVec3, b: DVec3) -> Self {
        Self {
            x: Interval::new(a.x.min(b.x), a.x.max(b.x)),
            y: Interval::new(a.y.min(b.y), a.y.max(b.y)),
            z: Interval::new(a.z.min(b.z), a.z.max(b.z)),
        }
    }

    /// Smallest AABB enclosing every point. Yields the empty box for no points.
    pub fn enclosing<I>(points: I) -> Self
    where
        I: IntoIterator<Item = DVec3>,
    {
        points
            .into_iter()
            .fold(Self::EMPTY, |aabb, p| aabb.include_point(p))
    }

    /// Create an AABB that surrounds two other AABBs.
    pub fn surrounding(box0: &Aabb, box1: &Aabb) -> Self {
        Self {
            x: Interval::surrounding(&box0.x, &box1.x),
            y: Interval::surrounding(&box0.y, &box1.y),
            z: Interval::surrounding(&box0.z, &box1.z),
        }
    }

    /// Grow the box so that it contains `p`.
    pub fn include_point(&self, p: DVec3) -> Self {
        Self {
            x: self.x.include(p.x),
            y: self.y.include(p.y),
            z: self.z.include(p.z),
        }
    }

    /// True if the box contains nothing.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty() || self.z.is_empty()
    }

    /// True if `other` lies entirely inside this box (inclusive).
    pub fn contains(&self, other: &Aabb) -> bool {
        other.is_empty()
            || (self.x.contains_interval(&other.x)
                && self.y.contains_interval(&other.y)
                && self.z.contains_interval(&other.z))
    }

    /// Minimum corner, or `None` for the empty box.
    pub fn min_corner(&self) -> Option<DVec3> {
        (!self.is_empty()).then(|| DVec3::new(self.x.min, self.y.min, self.z.min))
    }

    /// Maximum corner, or `None` for the empty box.
    pub fn max_corner(&self) -> Option<DVec3> {
        (!self.is_empty()).then(|| DVec3::new(self.x.max, self.y.max, self.z.max))
    }

    /// Extent along each axis. Zero for the empty box.
    pub fn size(&self) -> DVec3 {
        if self.is_empty() {
            return DVec3::ZERO;
        }
        DVec3::new(self.x.size(), self.y.size(), self.z.size())
    }

    /// The 8 corners of the box, or none for the empty box.
    pub fn corners(&self) -> Vec<DVec3> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut corners = Vec::with_capacity(8);
        for &x in &[self.x.min, self.x.max] {
            for &y in &[self.y.min, self.y.max] {
                for &z in &[self.z.min, self.z.max] {
                    corners.push(DVec3::new(x, y, z));
                }
            }
        }
        corners
    }

    /// Returns the center point of the bounding box.
    pub fn centroid(&self) -> DVec3 {
        DVec3::new(
            (self.x.min + self.x.max) * 0.5,
            (self.y.min + self.y.max) * 0.5,
            (self.z.min + self.z.max) * 0.5,
        )
    }

    pub const EMPTY: Aabb = Aabb {
        x: Interval::EMPTY,
        y: Interval::EMPTY,
        z: Interval::EMPTY,
    };
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}
