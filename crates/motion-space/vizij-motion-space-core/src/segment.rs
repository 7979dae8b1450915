//! Time window on a clip.

use serde::{Deserialize, Serialize};

use crate::clip::AnimationSet;
use crate::error::{MotionSpaceError, Result};
use crate::ids::ClipId;

/// Interval `[start, end]` (seconds) of a clip; a view, owns nothing.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationSegment {
    pub clip: ClipId,
    pub start: f32,
    pub end: f32,
}

impl AnimationSegment {
    pub fn new(clip: ClipId, start: f32, end: f32) -> Self {
        Self { clip, start, end }
    }

    #[inline]
    pub fn duration(&self) -> f32 {
        self.end - self.start
    }

    /// Check the window against the clip it refers to.
    pub fn validate(&self, set: &AnimationSet) -> Result<()> {
        let length = set.clip(self.clip)?.length;
        let ok = self.start.is_finite()
            && self.end.is_finite()
            && self.start >= 0.0
            && self.end > self.start
            && self.end <= length + f32::EPSILON;
        if ok {
            Ok(())
        } else {
            Err(MotionSpaceError::InvalidSegment {
                clip: self.clip,
                start: self.start,
                end: self.end,
                length,
            })
        }
    }
}
