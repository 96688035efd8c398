//! Flat bone arena standing in for the host's scene graph.
//!
//! Bones are addressed by [`BoneId`] (their index in the arena). A bone's
//! parent always has a smaller index than the bone itself, so a single
//! forward pass over the arena visits parents before children.

use bevy::prelude::Resource;
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

use crate::error::SkeletonError;

/// Index of a bone in a [`Skeleton`].
pub type BoneId = usize;

/// A single bone: parent link plus local transform.
#[derive(Debug, Clone)]
pub struct Bone {
    /// Bone name, unique within a skeleton by convention.
    pub name: String,
    /// Parent bone, `None` for roots.
    pub parent: Option<BoneId>,
    /// Offset from the parent's frame.
    pub translation: Vector3<f32>,
    /// Rotation relative to the parent's frame.
    pub rotation: UnitQuaternion<f32>,
}

impl Bone {
    /// Local transform (parent frame to this bone's frame).
    pub fn local_transform(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
    }
}

/// Arena of bones with a cached world-matrix pass.
///
/// [`Skeleton::world_transform`] is always computed live from the current
/// local rotations. [`Skeleton::world_matrices`] returns the cache filled by
/// the last [`Skeleton::update_world_matrices`] call, which the host runs
/// once per frame after every chain has settled.
#[derive(Debug, Clone, Default, Resource)]
pub struct Skeleton {
    bones: Vec<Bone>,
    world: Vec<Isometry3<f32>>,
}

impl Skeleton {
    /// Create an empty skeleton.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bones: Vec::new(),
            world: Vec::new(),
        }
    }

    /// Append a bone and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`SkeletonError::InvalidParent`] if `parent` does not refer to
    /// a bone already in the arena.
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: Option<BoneId>,
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    ) -> Result<BoneId, SkeletonError> {
        if let Some(parent) = parent {
            if parent >= self.bones.len() {
                return Err(SkeletonError::InvalidParent {
                    parent,
                    len: self.bones.len(),
                });
            }
        }
        let id = self.bones.len();
        self.bones.push(Bone {
            name: name.into(),
            parent,
            translation,
            rotation,
        });
        let world = match parent {
            Some(p) => self.world[p] * self.bones[id].local_transform(),
            None => self.bones[id].local_transform(),
        };
        self.world.push(world);
        Ok(id)
    }

    /// Number of bones.
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    /// Whether the arena has no bones.
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Access a bone.
    pub fn bone(&self, id: BoneId) -> Option<&Bone> {
        self.bones.get(id)
    }

    /// All bones in arena order.
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    /// Look up a bone by name.
    pub fn find(&self, name: &str) -> Option<BoneId> {
        self.bones.iter().position(|b| b.name == name)
    }

    /// Parent of `id`, if any.
    pub fn parent(&self, id: BoneId) -> Option<BoneId> {
        self.bones.get(id).and_then(|b| b.parent)
    }

    /// Local transform of a bone.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    pub fn local_transform(&self, id: BoneId) -> Isometry3<f32> {
        self.bones[id].local_transform()
    }

    /// Local rotation of a bone.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    pub fn local_rotation(&self, id: BoneId) -> UnitQuaternion<f32> {
        self.bones[id].rotation
    }

    /// Overwrite the local rotation of a bone.
    ///
    /// The cached world matrices are not touched; call
    /// [`Skeleton::update_world_matrices`] once all writes for the frame
    /// are done.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    pub fn set_local_rotation(&mut self, id: BoneId, rotation: UnitQuaternion<f32>) {
        self.bones[id].rotation = rotation;
    }

    /// World transform of a bone, composed live from its ancestors.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    pub fn world_transform(&self, id: BoneId) -> Isometry3<f32> {
        let mut transform = self.bones[id].local_transform();
        let mut current = self.bones[id].parent;
        while let Some(p) = current {
            transform = self.bones[p].local_transform() * transform;
            current = self.bones[p].parent;
        }
        transform
    }

    /// World position of a bone, computed live.
    pub fn world_position(&self, id: BoneId) -> Vector3<f32> {
        self.world_transform(id).translation.vector
    }

    /// Recompute every cached world matrix in one forward pass.
    pub fn update_world_matrices(&mut self) {
        for id in 0..self.bones.len() {
            let local = self.bones[id].local_transform();
            self.world[id] = match self.bones[id].parent {
                Some(p) => self.world[p] * local,
                None => local,
            };
        }
    }

    /// Cached world matrices from the last [`Skeleton::update_world_matrices`].
    pub fn world_matrices(&self) -> &[Isometry3<f32>] {
        &self.world
    }

    /// Walk parent links from `end` toward `base`.
    ///
    /// Returns the bones visited, `end` first and `base` last, or `None` if
    /// `base` is not reached within `max_depth` parent links. `end == base`
    /// is not a path (the end must be a strict descendant).
    pub fn path_to_ancestor(
        &self,
        end: BoneId,
        base: BoneId,
        max_depth: usize,
    ) -> Option<Vec<BoneId>> {
        if end >= self.bones.len() || base >= self.bones.len() || end == base {
            return None;
        }
        let mut path = vec![end];
        let mut current = end;
        for _ in 0..max_depth {
            current = self.bones[current].parent?;
            path.push(current);
            if current == base {
                return Some(path);
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
