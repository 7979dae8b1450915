//! Error types for blend-space construction and parametrization.
//!
//! Only precondition violations are errors. Degenerate geometry short-circuits to
//! identity results and dense-sampling exhaustion is reported through
//! [`DenseSamplingReport`](crate::param_builder::DenseSamplingReport).

use crate::ids::{ClipId, EdgeId, NodeHandle};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum MotionSpaceError {
    #[error("match graph has no node {0:?}")]
    UnknownNode(NodeHandle),

    #[error("match graph has no edge {0:?}")]
    UnknownEdge(EdgeId),

    #[error("reference node {0:?} has no path to itself")]
    ReferenceUnreachable(NodeHandle),

    #[error("animation set has no clip {0:?}")]
    UnknownClip(ClipId),

    #[error("invalid segment [{start}, {end}] on clip {clip:?} of length {length}")]
    InvalidSegment {
        clip: ClipId,
        start: f32,
        end: f32,
        length: f32,
    },

    #[error(
        "clip {clip:?} track layout differs from the first base clip \
         (expected {expected:?}, found {found:?})"
    )]
    TrackLayoutMismatch {
        clip: ClipId,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("skeleton has no bone '{bone}' required by clip '{clip}'")]
    SkeletonMismatch { clip: String, bone: String },

    #[error("bone '{bone}' has parent index {parent}, which is not an earlier bone")]
    InvalidBoneParent { bone: String, parent: usize },

    #[error("unknown bone '{0}'")]
    UnknownBone(String),

    #[error("animation space has no base clips")]
    EmptySpace,

    #[error("animation space has no parametrization")]
    MissingParametrization,

    #[error("parameter vector has {found} entries, expected {expected}")]
    ParamDimension { expected: usize, found: usize },

    #[error("parameter spec '{name}' references base clip {index} but the space has {count}")]
    InvalidParamSource {
        name: String,
        index: usize,
        count: usize,
    },
}

impl MotionSpaceError {
    /// Category label for log lines.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnknownNode(_) | Self::UnknownEdge(_) | Self::ReferenceUnreachable(_) => {
                "graph"
            }
            Self::UnknownClip(_)
            | Self::InvalidSegment { .. }
            | Self::TrackLayoutMismatch { .. } => "clip",
            Self::SkeletonMismatch { .. }
            | Self::InvalidBoneParent { .. }
            | Self::UnknownBone(_) => "skeleton",
            Self::EmptySpace
            | Self::MissingParametrization
            | Self::ParamDimension { .. }
            | Self::InvalidParamSource { .. } => "parametrization",
        }
    }
}

pub type Result<T> = std::result::Result<T, MotionSpaceError>;
