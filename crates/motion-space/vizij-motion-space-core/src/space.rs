//! The animation space: base clip references, blend curves and parametrization.

use log::debug;
use nalgebra::Isometry2;

use crate::clip::AnimationSet;
use crate::curve::BlendCurve;
use crate::error::{MotionSpaceError, Result};
use crate::ids::{ClipId, SpaceId};
use crate::math::alignment_from_components;
use crate::param::AnimationParametrization;

/// A continuously parametrized family of corresponding clips.
///
/// Base clips are owned by the [`AnimationSet`]; the space only references them.
/// When present, the timewarp curve has one dimension per base clip and the
/// alignment curve three (x, z, heading).
#[derive(Clone, Debug)]
pub struct AnimationSpace {
    id: SpaceId,
    name: String,
    base_clips: Vec<ClipId>,
    timewarp: Option<BlendCurve>,
    alignment: Option<BlendCurve>,
    parametrization: Option<AnimationParametrization>,
}

impl AnimationSpace {
    pub fn new(id: SpaceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            base_clips: Vec::new(),
            timewarp: None,
            alignment: None,
            parametrization: None,
        }
    }

    pub fn id(&self) -> SpaceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_clips(&self) -> &[ClipId] {
        &self.base_clips
    }

    pub fn base_clip_count(&self) -> usize {
        self.base_clips.len()
    }

    pub fn timewarp_curve(&self) -> Option<&BlendCurve> {
        self.timewarp.as_ref()
    }

    pub fn alignment_curve(&self) -> Option<&BlendCurve> {
        self.alignment.as_ref()
    }

    pub fn parametrization(&self) -> Option<&AnimationParametrization> {
        self.parametrization.as_ref()
    }

    /// Replace the base clip list, returning the previous one.
    pub(crate) fn replace_base_clips(&mut self, clips: Vec<ClipId>) -> Vec<ClipId> {
        std::mem::replace(&mut self.base_clips, clips)
    }

    pub(crate) fn set_blend_curves(
        &mut self,
        timewarp: Option<BlendCurve>,
        alignment: Option<BlendCurve>,
    ) {
        self.timewarp = timewarp;
        self.alignment = alignment;
    }

    /// Install a parametrization, returning the one it replaces.
    pub fn set_parametrization(
        &mut self,
        parametrization: AnimationParametrization,
    ) -> Option<AnimationParametrization> {
        self.parametrization.replace(parametrization)
    }

    /// Detach the parametrization so the caller can drop or keep it.
    pub fn take_parametrization(&mut self) -> Option<AnimationParametrization> {
        self.parametrization.take()
    }

    pub fn clear_parametrization(&mut self) {
        if self.parametrization.take().is_some() {
            debug!("space '{}': parametrization discarded", self.name);
        }
    }

    /// Blend weights (one per base clip) for a parameter vector.
    pub fn sample(&self, params: &[f32]) -> Result<Vec<f32>> {
        self.parametrization
            .as_ref()
            .ok_or(MotionSpaceError::MissingParametrization)?
            .sample(params)
    }

    /// Per-clip local times at normalized reference time `u`.
    pub fn clip_times(&self, u: f32) -> Option<Vec<f32>> {
        let p = self.timewarp.as_ref()?.point_at(u)?;
        Some(p.iter().copied().collect())
    }

    /// Ground-plane alignment of base clip `clip_index` at normalized reference time `u`.
    pub fn alignment_at(&self, u: f32, clip_index: usize) -> Option<Isometry2<f32>> {
        let p = self.alignment.as_ref()?.point_at(u)?;
        let base = clip_index * 3;
        if base + 2 >= p.len() {
            return None;
        }
        Some(alignment_from_components(p[base], p[base + 1], p[base + 2]))
    }

    /// All base clips must exist and share the first clip's track layout.
    pub fn validate_layout(&self, set: &AnimationSet) -> Result<()> {
        let Some(first) = self.base_clips.first() else {
            return Ok(());
        };
        let expected = set.clip(*first)?.track_layout();
        for &id in &self.base_clips[1..] {
            let found = set.clip(id)?.track_layout();
            if found != expected {
                return Err(MotionSpaceError::TrackLayoutMismatch {
                    clip: id,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }
}

impl AnimationSet {
    /// New empty space with a fresh id.
    pub fn create_space(&mut self, name: impl Into<String>) -> AnimationSpace {
        AnimationSpace::new(self.alloc_space_id(), name)
    }
}
