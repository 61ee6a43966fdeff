//! Spatial bounds of composed nodes
//!
//! A loaded node reports the exact bounds of its live content. Anything else
//! falls back to the bounds snapshot the content store keeps next to the
//! package, moved into place with the node's current placement. That snapshot
//! is only refreshed when the package is saved, so it can lag behind unsaved
//! edits.

use glam::{Affine3A, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::content::ContentStore;
use crate::host::{HostScene, NodeId};
use crate::registry::Registry;

/// Axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// Inverted box; the identity for [`union`](Self::union)
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    /// Create from min and max corners
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create from center and half-extents
    #[inline]
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Center point
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half-extents
    #[inline]
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// An empty (inverted) box contains nothing
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Grow to include a point
    #[inline]
    pub fn include_point(self, point: Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    /// Smallest box containing both
    pub fn union(&self, other: &Bounds) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// The 8 corners
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Move the box by a placement; the result stays axis-aligned, so a
    /// rotated box grows to enclose its rotated corners
    pub fn transformed(&self, placement: &Placement) -> Self {
        if !self.is_valid() {
            return *self;
        }
        let affine = placement.to_affine();
        self.corners()
            .iter()
            .fold(Self::EMPTY, |acc, &corner| acc.include_point(affine.transform_point3(corner)))
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Translation and rotation of a node in its containing world
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Placement {
    /// No translation, no rotation
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Placement from a translation only
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            rotation: Quat::IDENTITY,
        }
    }

    /// Placement from translation and rotation
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self { translation, rotation }
    }

    /// As an affine transform
    pub fn to_affine(&self) -> Affine3A {
        Affine3A::from_rotation_translation(self.rotation, self.translation)
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Computes bounds for registered nodes, loaded or not
pub struct BoundsAggregator;

impl BoundsAggregator {
    /// Bounds of a node
    ///
    /// Loaded nodes are measured from their live container. Unloaded and
    /// editing nodes use the package's saved bounds metadata, placed with the
    /// node's current placement.
    pub fn get_bounds(
        registry: &Registry,
        host: &dyn HostScene,
        store: &dyn ContentStore,
        node: NodeId,
    ) -> Option<Bounds> {
        let record = registry.node(node)?;

        if let Some(instance) = record
            .composite_id()
            .and_then(|id| registry.instance(id))
        {
            if let Some(bounds) = host.container_bounds(instance.container) {
                return Some(bounds);
            }
        }

        let content = record.content()?;
        if !content.is_valid() {
            return None;
        }
        store
            .bounds_metadata(content.path())
            .map(|saved| saved.transformed(&record.placement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::FRAC_PI_2;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-4
    }

    #[test]
    fn test_translation_moves_box() {
        let bounds = Bounds::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let moved = bounds.transformed(&Placement::from_translation(Vec3::new(10.0, 0.0, 0.0)));

        assert!(approx(moved.min, Vec3::new(9.0, -1.0, -1.0)));
        assert!(approx(moved.max, Vec3::new(11.0, 1.0, 1.0)));
    }

    #[test]
    fn test_quarter_turn_swaps_axes() {
        let bounds = Bounds::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(4.0, 2.0, 1.0));
        let rotated = bounds.transformed(&Placement::new(Vec3::ZERO, Quat::from_rotation_z(FRAC_PI_2)));

        assert!(approx(rotated.min, Vec3::new(-2.0, 0.0, 0.0)));
        assert!(approx(rotated.max, Vec3::new(0.0, 4.0, 1.0)));
    }

    #[test]
    fn test_rotation_grows_box() {
        let bounds = Bounds::from_center_extents(Vec3::ZERO, Vec3::ONE);
        let rotated = bounds.transformed(&Placement::new(
            Vec3::ZERO,
            Quat::from_rotation_z(core::f32::consts::FRAC_PI_4),
        ));

        assert!(rotated.extents().x > 1.4);
        assert!(approx(rotated.center(), Vec3::ZERO));
    }

    #[test]
    fn test_empty_stays_empty() {
        let moved = Bounds::EMPTY.transformed(&Placement::from_translation(Vec3::ONE));
        assert!(!moved.is_valid());
    }

    #[test]
    fn test_union() {
        let a = Bounds::new(Vec3::ZERO, Vec3::ONE);
        let b = Bounds::new(Vec3::splat(-2.0), Vec3::splat(-1.0));
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::splat(-2.0));
        assert_eq!(u.max, Vec3::ONE);
        assert_eq!(Bounds::EMPTY.union(&a), a);
    }
}
