//! Pose model seam and a forward-kinematics skeleton implementing it.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::clip::Clip;
use crate::error::{MotionSpaceError, Result};

/// Something a clip can be applied to so bone transforms can be read back.
pub trait PoseModel {
    /// Every track of `clip` must drive a bone of this model.
    fn validate_clip(&self, clip: &Clip) -> Result<()>;

    /// World transform of `bone` with `clip` applied at `time`.
    fn world_transform(&self, clip: &Clip, time: f32, bone: &str) -> Result<Isometry3<f32>>;

    /// Transform of `bone` expressed in the frame of `superior` (world when None).
    fn relative_transform(
        &self,
        clip: &Clip,
        time: f32,
        bone: &str,
        superior: Option<&str>,
    ) -> Result<Isometry3<f32>> {
        let target = self.world_transform(clip, time, bone)?;
        match superior {
            Some(sup) => Ok(self.world_transform(clip, time, sup)?.inverse() * target),
            None => Ok(target),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    /// Index of the parent bone; parents precede children.
    pub parent: Option<usize>,
    pub bind_translation: Vector3<f32>,
    pub bind_rotation: UnitQuaternion<f32>,
}

/// Bone hierarchy with bind pose. Bones without a track in the applied clip keep
/// their bind transform.
///
/// Every parent index points at an earlier bone; deserialization rejects
/// hierarchies that break this.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SkeletonData")]
pub struct Skeleton {
    bones: Vec<Bone>,
}

#[derive(Deserialize)]
struct SkeletonData {
    bones: Vec<Bone>,
}

impl TryFrom<SkeletonData> for Skeleton {
    type Error = MotionSpaceError;

    fn try_from(data: SkeletonData) -> Result<Self> {
        for (index, bone) in data.bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent >= index {
                    return Err(MotionSpaceError::InvalidBoneParent {
                        bone: bone.name.clone(),
                        parent,
                    });
                }
            }
        }
        Ok(Self { bones: data.bones })
    }
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bone under `parent` (root when None).
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: Option<&str>,
        bind_translation: Vector3<f32>,
        bind_rotation: UnitQuaternion<f32>,
    ) -> Result<usize> {
        let parent = match parent {
            Some(p) => Some(
                self.bone_index(p)
                    .ok_or_else(|| MotionSpaceError::UnknownBone(p.to_string()))?,
            ),
            None => None,
        };
        self.bones.push(Bone {
            name: name.into(),
            parent,
            bind_translation,
            bind_rotation,
        });
        Ok(self.bones.len() - 1)
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    fn local_transform(&self, clip: &Clip, time: f32, bone: &Bone) -> Isometry3<f32> {
        match clip.track(&bone.name) {
            Some(track) => {
                let key = track.interpolated(time);
                Isometry3::from_parts(Translation3::from(key.translation), key.rotation)
            }
            None => Isometry3::from_parts(
                Translation3::from(bone.bind_translation),
                bone.bind_rotation,
            ),
        }
    }
}

impl PoseModel for Skeleton {
    fn validate_clip(&self, clip: &Clip) -> Result<()> {
        for track in &clip.tracks {
            if self.bone_index(&track.bone).is_none() {
                return Err(MotionSpaceError::SkeletonMismatch {
                    clip: clip.name.clone(),
                    bone: track.bone.clone(),
                });
            }
        }
        Ok(())
    }

    fn world_transform(&self, clip: &Clip, time: f32, bone: &str) -> Result<Isometry3<f32>> {
        let index = self
            .bone_index(bone)
            .ok_or_else(|| MotionSpaceError::UnknownBone(bone.to_string()))?;
        let mut current = &self.bones[index];
        let mut world = self.local_transform(clip, time, current);
        while let Some(parent) = current.parent {
            current = self
                .bones
                .get(parent)
                .ok_or_else(|| MotionSpaceError::InvalidBoneParent {
                    bone: current.name.clone(),
                    parent,
                })?;
            world = self.local_transform(clip, time, current) * world;
        }
        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{KeyFrame, Track};
    use approx::assert_relative_eq;

    fn chain() -> Skeleton {
        let mut s = Skeleton::new();
        s.add_bone("root", None, Vector3::zeros(), UnitQuaternion::identity())
            .unwrap();
        s.add_bone(
            "hand",
            Some("root"),
            Vector3::new(0.0, 0.0, 1.0),
            UnitQuaternion::identity(),
        )
        .unwrap();
        s
    }

    fn turning_clip() -> Clip {
        let mut clip = Clip::new("turn", 30.0, 1.0);
        let mut root = Track::new("root");
        for (t, yaw) in [(0.0f32, 0.0f32), (1.0, std::f32::consts::FRAC_PI_2)] {
            root.keys.push(KeyFrame {
                time: t,
                translation: Vector3::new(t, 0.0, 0.0),
                rotation: UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw),
            });
        }
        clip.tracks.push(root);
        clip
    }

    #[test]
    fn forward_kinematics_composes_parents() {
        let s = chain();
        let clip = turning_clip();
        let hand = s.world_transform(&clip, 1.0, "hand").unwrap();
        // Root turned 90° about Y moves the +Z offset onto +X.
        assert_relative_eq!(hand.translation.vector.x, 2.0, epsilon = 1e-5);
        assert_relative_eq!(hand.translation.vector.z, 0.0, epsilon = 1e-5);

        let rel = s.relative_transform(&clip, 1.0, "hand", Some("root")).unwrap();
        assert_relative_eq!(rel.translation.vector.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn validation_reports_missing_bones() {
        let s = chain();
        let mut clip = turning_clip();
        assert!(s.validate_clip(&clip).is_ok());
        clip.tracks.push(Track::new("tail"));
        assert!(matches!(
            s.validate_clip(&clip),
            Err(MotionSpaceError::SkeletonMismatch { bone, .. }) if bone == "tail"
        ));
        assert!(s.world_transform(&clip, 0.0, "nope").is_err());
    }

    #[test]
    fn deserialization_rejects_forward_parents() {
        let bad = r#"{"bones":[{"name":"root","parent":5,
            "bind_translation":[0,0,0],"bind_rotation":[0,0,0,1]}]}"#;
        let err = serde_json::from_str::<Skeleton>(bad).unwrap_err();
        assert!(err.to_string().contains("root"), "{err}");

        let cycle = r#"{"bones":[
            {"name":"a","parent":1,"bind_translation":[0,0,0],"bind_rotation":[0,0,0,1]},
            {"name":"b","parent":0,"bind_translation":[0,0,0],"bind_rotation":[0,0,0,1]}]}"#;
        assert!(serde_json::from_str::<Skeleton>(cycle).is_err());

        let json = serde_json::to_string(&chain()).unwrap();
        let back: Skeleton = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chain());
        let hand = back.world_transform(&turning_clip(), 0.0, "hand").unwrap();
        assert_relative_eq!(hand.translation.vector.z, 1.0, epsilon = 1e-5);
    }
}
