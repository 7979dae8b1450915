//! In-memory motion clip model and the animation set that owns clips.
//!
//! Tracks hold local bone transforms keyed in clip seconds. Sampling between keys
//! lerps translation and slerps rotation; times outside the keyed range clamp.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Deserializer, Serialize};

use crate::annotation::AnnotationSet;
use crate::error::{MotionSpaceError, Result};
use crate::ids::{ClipId, IdAllocator, SpaceId};
use crate::math::slerp;

/// Local bone transform at a point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyFrame {
    pub time: f32,
    pub translation: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl KeyFrame {
    pub fn identity(time: f32) -> Self {
        Self {
            time,
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Same transform at another time.
    pub fn at(&self, time: f32) -> Self {
        Self {
            time,
            ..self.clone()
        }
    }
}

/// Keyframes of one bone, sorted by time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub bone: String,
    #[serde(default, deserialize_with = "sorted_keys")]
    pub keys: Vec<KeyFrame>,
}

fn sorted_keys<'de, D>(deserializer: D) -> std::result::Result<Vec<KeyFrame>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut keys = Vec::<KeyFrame>::deserialize(deserializer)?;
    keys.sort_by(|a, b| a.time.total_cmp(&b.time));
    Ok(keys)
}

impl Track {
    pub fn new(bone: impl Into<String>) -> Self {
        Self {
            bone: bone.into(),
            keys: Vec::new(),
        }
    }

    pub fn keys(&self) -> &[KeyFrame] {
        &self.keys
    }

    /// Key at `time`, inserted in order if absent. An existing key within
    /// `f32::EPSILON` is reused.
    pub fn create_key_frame(&mut self, time: f32) -> &mut KeyFrame {
        let idx = self.keys.partition_point(|k| k.time < time - f32::EPSILON);
        let exists = self
            .keys
            .get(idx)
            .is_some_and(|k| (k.time - time).abs() <= f32::EPSILON);
        if !exists {
            let seed = self.interpolated(time).at(time);
            self.keys.insert(idx, seed);
        }
        &mut self.keys[idx]
    }

    /// Interpolated transform at `time`; identity for an empty track.
    pub fn interpolated(&self, time: f32) -> KeyFrame {
        let n = self.keys.len();
        if n == 0 {
            return KeyFrame::identity(time);
        }
        if n == 1 || time <= self.keys[0].time {
            return self.keys[0].at(time);
        }
        if time >= self.keys[n - 1].time {
            return self.keys[n - 1].at(time);
        }
        let hi = self.keys.partition_point(|k| k.time <= time);
        let a = &self.keys[hi - 1];
        let b = &self.keys[hi];
        let denom = (b.time - a.time).max(f32::EPSILON);
        let t = ((time - a.time) / denom).clamp(0.0, 1.0);
        KeyFrame {
            time,
            translation: a.translation.lerp(&b.translation, t),
            rotation: slerp(&a.rotation, &b.rotation, t),
        }
    }
}

/// A motion clip: bone tracks plus per-class annotations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Assigned when the clip is added to an [`AnimationSet`].
    #[serde(skip)]
    pub id: Option<ClipId>,
    pub name: String,
    /// Frames per second of the source capture.
    pub frame_rate: f32,
    /// Length in seconds.
    pub length: f32,
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub annotations: AnnotationSet,
}

impl Clip {
    pub fn new(name: impl Into<String>, frame_rate: f32, length: f32) -> Self {
        Self {
            id: None,
            name: name.into(),
            frame_rate,
            length,
            tracks: Vec::new(),
            annotations: AnnotationSet::default(),
        }
    }

    pub fn track(&self, bone: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.bone == bone)
    }

    /// Bone names in track order.
    pub fn track_layout(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.bone.clone()).collect()
    }

    /// Interpolated pose, one key per track in track order.
    pub fn interpolated_key_frame(&self, time: f32) -> Vec<KeyFrame> {
        self.tracks.iter().map(|t| t.interpolated(time)).collect()
    }
}

/// Arena owning every clip; spaces refer to clips by [`ClipId`].
#[derive(Debug, Default, Clone)]
pub struct AnimationSet {
    clips: Vec<Clip>,
    ids: IdAllocator,
}

impl AnimationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a clip and assign its id.
    pub fn add_clip(&mut self, mut clip: Clip) -> ClipId {
        let id = self.ids.alloc_clip();
        clip.id = Some(id);
        self.clips.push(clip);
        id
    }

    pub fn clip(&self, id: ClipId) -> Result<&Clip> {
        self.clips
            .iter()
            .find(|c| c.id == Some(id))
            .ok_or(MotionSpaceError::UnknownClip(id))
    }

    pub fn clip_mut(&mut self, id: ClipId) -> Result<&mut Clip> {
        self.clips
            .iter_mut()
            .find(|c| c.id == Some(id))
            .ok_or(MotionSpaceError::UnknownClip(id))
    }

    pub(crate) fn alloc_space_id(&mut self) -> SpaceId {
        self.ids.alloc_space()
    }

    pub fn remove_clip(&mut self, id: ClipId) -> Option<Clip> {
        let idx = self.clips.iter().position(|c| c.id == Some(id))?;
        Some(self.clips.remove(idx))
    }

    pub fn find_by_name(&self, name: &str) -> Option<ClipId> {
        self.clips.iter().find(|c| c.name == name).and_then(|c| c.id)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clip> {
        self.clips.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp_track() -> Track {
        let mut track = Track::new("hips");
        for i in 0..3 {
            let t = i as f32;
            track.keys.push(KeyFrame {
                time: t,
                translation: Vector3::new(t, 0.0, 0.0),
                rotation: UnitQuaternion::from_axis_angle(&Vector3::y_axis(), t * 0.5),
            });
        }
        track
    }

    #[test]
    fn interpolation_lerps_and_clamps() {
        let track = ramp_track();
        let mid = track.interpolated(0.5);
        assert_relative_eq!(mid.translation.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(mid.rotation.angle(), 0.25, epsilon = 1e-4);
        assert_relative_eq!(track.interpolated(-1.0).translation.x, 0.0);
        assert_relative_eq!(track.interpolated(7.0).translation.x, 2.0);
        assert_eq!(track.interpolated(7.0).time, 7.0);
    }

    #[test]
    fn create_key_frame_inserts_sorted_or_reuses() {
        let mut track = ramp_track();
        track.create_key_frame(1.5).translation.y = 3.0;
        assert_eq!(track.keys().len(), 4);
        assert_eq!(track.keys()[2].time, 1.5);
        assert_relative_eq!(track.keys()[2].translation.x, 1.5, epsilon = 1e-6);
        assert_eq!(track.keys()[2].translation.y, 3.0);

        track.create_key_frame(1.0);
        assert_eq!(track.keys().len(), 4);
    }

    #[test]
    fn loaded_keys_are_time_sorted() {
        let json = r#"{"bone": "hips", "keys": [
            {"time": 1.0, "translation": [1, 0, 0], "rotation": [0, 0, 0, 1]},
            {"time": 0.0, "translation": [0, 0, 0], "rotation": [0, 0, 0, 1]},
            {"time": 0.5, "translation": [0.5, 0, 0], "rotation": [0, 0, 0, 1]}
        ]}"#;
        let track: Track = serde_json::from_str(json).unwrap();
        let times: Vec<f32> = track.keys().iter().map(|k| k.time).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0]);
        assert_relative_eq!(track.interpolated(0.75).translation.x, 0.75, epsilon = 1e-6);
    }

    #[test]
    fn set_assigns_ids_and_removes() {
        let mut set = AnimationSet::new();
        let a = set.add_clip(Clip::new("a", 30.0, 1.0));
        let b = set.add_clip(Clip::new("b", 30.0, 2.0));
        assert_ne!(a, b);
        assert_eq!(set.clip(b).unwrap().length, 2.0);
        assert_eq!(set.find_by_name("a"), Some(a));
        assert!(set.remove_clip(a).is_some());
        assert!(matches!(
            set.clip(a),
            Err(MotionSpaceError::UnknownClip(_))
        ));
    }
}
