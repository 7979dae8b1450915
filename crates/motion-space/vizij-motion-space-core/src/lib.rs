//! Vizij Motion Space Core (engine-agnostic)
//!
//! Builds blend spaces from corresponding motion clip segments: base clips cut
//! from a match graph, timewarp and alignment curves fitted along optimal
//! correspondence paths, annotations reconciled across clips, and a
//! dense-sampling parametrization mapping control parameters to blend weights.

pub mod annotation;
pub mod annotation_match;
pub mod builder;
pub mod clip;
pub mod config;
pub mod curve;
pub mod error;
pub mod ids;
pub mod match_graph;
pub mod math;
pub mod param;
pub mod param_builder;
pub mod segment;
pub mod skeleton;
pub mod space;
pub mod timewarp;

// Re-exports for consumers (adapters)
pub use annotation::{
    Annotation, AnnotationClass, AnnotationContainer, AnnotationPayload, AnnotationSet,
};
pub use annotation_match::{AnnotationMatcher, ClassMatchReport, MatchReport};
pub use builder::{create_base_clip, BuildReport, SpaceBuilder};
pub use clip::{AnimationSet, Clip, KeyFrame, Track};
pub use config::{AnnotationMatchConfig, DenseSamplingConfig, SpaceBuildConfig};
pub use curve::{BlendCurve, CurveFitter, CurvePoint, RotationCurve};
pub use error::{MotionSpaceError, Result};
pub use ids::{ClipId, EdgeId, NodeHandle, SpaceId};
pub use match_graph::{Correspondence, CorrespondenceGraph, MatchGraph, MatchPath, PathStep};
pub use param::{
    export_parametrization_json, AnimationParametrization, DenseSample,
    DenseSamplingParametrization, ParamModel,
};
pub use param_builder::{
    Axis, DenseSamplingParamBuilder, DenseSamplingReport, ParamAnimationBuilder, ParamChannel,
    ParamSpaceBuilder, ParamSpec,
};
pub use segment::AnimationSegment;
pub use skeleton::{Bone, PoseModel, Skeleton};
pub use space::AnimationSpace;
