//! Space construction: base clip extraction, blend-curve fitting and the
//! annotation pass that follows it.
//!
//! The builder walks optimal paths through a [`CorrespondenceGraph`] from a
//! reference node. Every reachable node becomes a base clip cut from its
//! segment; walking the same paths at evenly spaced reference times yields the
//! timewarp (per-clip local time) and alignment (per-clip ground-plane offset)
//! knots.

use log::{debug, error, info, warn};
use nalgebra::{DVector, Isometry2};

use crate::annotation_match::{AnnotationMatcher, MatchReport};
use crate::clip::{AnimationSet, Clip, Track};
use crate::config::SpaceBuildConfig;
use crate::curve::BlendCurve;
use crate::error::{MotionSpaceError, Result};
use crate::ids::{ClipId, NodeHandle};
use crate::match_graph::{CorrespondenceGraph, MatchPath};
use crate::math::alignment_components;
use crate::segment::AnimationSegment;
use crate::space::AnimationSpace;
use crate::timewarp::{enforce_monotonic, unwrap_headings};

/// Keys closer than this to a segment boundary are replaced by the boundary key.
const BOUNDARY_EPS: f32 = 1e-5;

/// Summary of one build.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildReport {
    pub base_clips: usize,
    /// Knots per blend curve; zero when curves were not built.
    pub curve_samples: usize,
    /// Timewarp knot values moved by monotonic repair.
    pub repaired_knots: usize,
    /// Graph nodes with no path from the reference.
    pub skipped_nodes: Vec<NodeHandle>,
    pub matching: Option<MatchReport>,
}

struct Member {
    segment: AnimationSegment,
    path: MatchPath,
}

/// Builds [`AnimationSpace`]s from a match graph or a plain segment list.
#[derive(Clone, Debug, Default)]
pub struct SpaceBuilder {
    config: SpaceBuildConfig,
}

impl SpaceBuilder {
    pub fn new(config: SpaceBuildConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpaceBuildConfig {
        &self.config
    }

    /// Populate `space` from every node reachable from `reference`.
    ///
    /// The reference becomes base clip 0; the remaining clips follow graph node
    /// order. Base clips created by a previous build of `space` are removed from
    /// `set`, and any parametrization is discarded.
    pub fn build<G>(
        &self,
        space: &mut AnimationSpace,
        set: &mut AnimationSet,
        graph: &G,
        reference: NodeHandle,
    ) -> Result<BuildReport>
    where
        G: CorrespondenceGraph + ?Sized,
    {
        let result = self.build_from_graph(space, set, graph, reference);
        log_failure(space, &result);
        result
    }

    fn build_from_graph<G>(
        &self,
        space: &mut AnimationSpace,
        set: &mut AnimationSet,
        graph: &G,
        reference: NodeHandle,
    ) -> Result<BuildReport>
    where
        G: CorrespondenceGraph + ?Sized,
    {
        graph
            .segment(reference)
            .ok_or(MotionSpaceError::UnknownNode(reference))?;

        let mut targets = graph.nodes();
        targets.retain(|&n| n != reference);
        targets.insert(0, reference);
        let paths = graph.compute_optimal_paths(reference, &targets);

        let mut members = Vec::with_capacity(targets.len());
        let mut skipped = Vec::new();
        for (&node, path) in targets.iter().zip(paths) {
            match (path, graph.segment(node)) {
                (Some(path), Some(segment)) => {
                    segment.validate(set)?;
                    members.push(Member { segment, path });
                }
                _ if node == reference => {
                    return Err(MotionSpaceError::ReferenceUnreachable(reference));
                }
                _ => {
                    warn!(
                        "space '{}': node {node:?} unreachable from reference, skipped",
                        space.name()
                    );
                    skipped.push(node);
                }
            }
        }

        let clips = self.install_base_clips(space, set, &members)?;
        let mut report = BuildReport {
            base_clips: clips.len(),
            skipped_nodes: skipped,
            ..BuildReport::default()
        };

        if self.config.build_blend_curves {
            let (timewarp, alignment, repaired) =
                self.fit_blend_curves(graph, set, &members, &clips)?;
            report.curve_samples = timewarp.len();
            report.repaired_knots = repaired;
            space.set_blend_curves(Some(timewarp), Some(alignment));
        } else {
            space.set_blend_curves(None, None);
        }

        self.finish(space, set, report)
    }

    /// Populate `space` from independent segments with no correspondence data.
    ///
    /// Base clips follow `segments` order. Blend curves are cleared since there
    /// is nothing to fit them from.
    pub fn build_from_segments(
        &self,
        space: &mut AnimationSpace,
        set: &mut AnimationSet,
        segments: &[AnimationSegment],
    ) -> Result<BuildReport> {
        let result = self.build_segments(space, set, segments);
        log_failure(space, &result);
        result
    }

    fn build_segments(
        &self,
        space: &mut AnimationSpace,
        set: &mut AnimationSet,
        segments: &[AnimationSegment],
    ) -> Result<BuildReport> {
        let mut members = Vec::with_capacity(segments.len());
        for &segment in segments {
            segment.validate(set)?;
            members.push(Member {
                segment,
                path: MatchPath::default(),
            });
        }
        let clips = self.install_base_clips(space, set, &members)?;
        space.set_blend_curves(None, None);
        let report = BuildReport {
            base_clips: clips.len(),
            ..BuildReport::default()
        };
        self.finish(space, set, report)
    }

    fn finish(
        &self,
        space: &AnimationSpace,
        set: &mut AnimationSet,
        mut report: BuildReport,
    ) -> Result<BuildReport> {
        if self.config.match_annotations {
            let matcher = AnnotationMatcher::new(self.config.annotations.clone());
            report.matching = Some(matcher.make_matches(space, set)?);
        }
        info!(
            "space '{}': built {} base clip(s), {} curve knot(s), {} repaired",
            space.name(),
            report.base_clips,
            report.curve_samples,
            report.repaired_knots
        );
        Ok(report)
    }

    /// Cut a base clip per member and swap them into `space`.
    ///
    /// On a track layout mismatch the new clips are removed again and `space`
    /// keeps its previous base clips.
    fn install_base_clips(
        &self,
        space: &mut AnimationSpace,
        set: &mut AnimationSet,
        members: &[Member],
    ) -> Result<Vec<ClipId>> {
        let mut created = Vec::with_capacity(members.len());
        for member in members {
            match create_base_clip(set, &member.segment) {
                Ok(id) => created.push(id),
                Err(err) => {
                    discard_clips(set, &created);
                    return Err(err);
                }
            }
        }

        let previous = space.replace_base_clips(created.clone());
        if let Err(err) = space.validate_layout(set) {
            space.replace_base_clips(previous);
            discard_clips(set, &created);
            return Err(err);
        }
        discard_clips(set, &previous);
        space.clear_parametrization();
        Ok(created)
    }

    fn fit_blend_curves<G>(
        &self,
        graph: &G,
        set: &AnimationSet,
        members: &[Member],
        clips: &[ClipId],
    ) -> Result<(BlendCurve, BlendCurve, usize)>
    where
        G: CorrespondenceGraph + ?Sized,
    {
        let reference = set.clip(clips[0])?;
        let ref_len = reference.length;
        let rate = self.config.sample_rate.unwrap_or(reference.frame_rate);
        let n = sample_count(ref_len, rate, self.config.knot_spacing);
        let lengths = clips
            .iter()
            .map(|&id| set.clip(id).map(|c| c.length))
            .collect::<Result<Vec<_>>>()?;

        let count = clips.len();
        let mut times = vec![vec![0.0f32; count]; n];
        let mut aligns = vec![vec![0.0f32; 3 * count]; n];
        for i in 0..n {
            let t_ref = ref_len * i as f32 / (n - 1) as f32;
            times[i][0] = t_ref;
            for (j, member) in members.iter().enumerate().skip(1) {
                let (time, align) = propagate(graph, &member.path, t_ref)?;
                times[i][j] = time.clamp(0.0, lengths[j]);
                aligns[i][3 * j..3 * j + 3].copy_from_slice(&alignment_components(&align));
            }
        }
        unwrap_headings(&mut aligns, count);

        let mut timewarp = BlendCurve::from_points(times.into_iter().map(DVector::from_vec));
        let mut alignment = BlendCurve::from_points(aligns.into_iter().map(DVector::from_vec));
        alignment.calc_tangents();
        let repaired = enforce_monotonic(&mut timewarp, self.config.monotonic_epsilon);
        debug!("fitted blend curves: {n} knot(s) over {count} clip(s)");
        Ok((timewarp, alignment, repaired))
    }
}

/// Knots needed to cover `length` seconds with one knot every `spacing` frames.
pub fn sample_count(length: f32, frame_rate: f32, spacing: f32) -> usize {
    let spacing = if spacing.is_finite() && spacing > 0.0 { spacing } else { 1.0 };
    let frames = (length.max(0.0) * frame_rate.max(0.0) / spacing).ceil();
    if frames.is_finite() {
        (frames as usize + 1).max(2)
    } else {
        2
    }
}

/// Walk `path` from the reference at `time`, composing alignments.
fn propagate<G>(graph: &G, path: &MatchPath, time: f32) -> Result<(f32, Isometry2<f32>)>
where
    G: CorrespondenceGraph + ?Sized,
{
    let mut time = time;
    let mut acc = Isometry2::identity();
    for step in &path.steps {
        let (next, align) = graph
            .sample_edge(step.edge, time, step.from_first)
            .ok_or(MotionSpaceError::UnknownEdge(step.edge))?;
        time = next;
        acc *= align;
    }
    Ok((time, acc))
}

/// Cut `segment` out of its clip into a new clip owned by `set`.
///
/// Boundary keys are interpolated at the segment ends, interior keys are
/// shifted to start at zero, and annotations are clipped to the window.
pub fn create_base_clip(set: &mut AnimationSet, segment: &AnimationSegment) -> Result<ClipId> {
    segment.validate(set)?;
    let source = set.clip(segment.clip)?;
    let length = segment.duration();
    let mut clip = Clip::new(
        format!("{}[{:.3}-{:.3}]", source.name, segment.start, segment.end),
        source.frame_rate,
        length,
    );
    for track in &source.tracks {
        let mut cut = Track::new(track.bone.clone());
        cut.keys.extend(
            track
                .keys()
                .iter()
                .filter(|k| {
                    k.time > segment.start + BOUNDARY_EPS && k.time < segment.end - BOUNDARY_EPS
                })
                .map(|k| k.at(k.time - segment.start)),
        );
        *cut.create_key_frame(0.0) = track.interpolated(segment.start).at(0.0);
        *cut.create_key_frame(length) = track.interpolated(segment.end).at(length);
        clip.tracks.push(cut);
    }
    clip.annotations = source
        .annotations
        .clipped_for_segment(segment.start, segment.end);
    Ok(set.add_clip(clip))
}

fn log_failure(space: &AnimationSpace, result: &Result<BuildReport>) {
    if let Err(err) = result {
        error!("space '{}': build failed [{}]: {err}", space.name(), err.category());
    }
}

fn discard_clips(set: &mut AnimationSet, ids: &[ClipId]) {
    for &id in ids {
        if set.remove_clip(id).is_none() {
            debug!("base clip {id:?} already gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::KeyFrame;
    use nalgebra::{UnitQuaternion, Vector3};

    fn ramp_clip(name: &str, length: f32) -> Clip {
        let mut clip = Clip::new(name, 30.0, length);
        let mut track = Track::new("hips");
        let mut t = 0.0;
        while t <= length + 1e-6 {
            track.keys.push(KeyFrame {
                time: t,
                translation: Vector3::new(t, 0.0, 0.0),
                rotation: UnitQuaternion::identity(),
            });
            t += 0.4;
        }
        clip.tracks.push(track);
        clip
    }

    #[test]
    fn sample_count_covers_reference() {
        assert_eq!(sample_count(1.0, 30.0, 5.0), 7);
        assert_eq!(sample_count(0.0, 30.0, 5.0), 2);
        assert_eq!(sample_count(1.0, 30.0, 0.0), 31);
    }

    #[test]
    fn base_clip_boundaries_are_interpolated() {
        let mut set = AnimationSet::new();
        let src = set.add_clip(ramp_clip("walk", 2.0));
        let id = create_base_clip(&mut set, &AnimationSegment::new(src, 0.5, 1.5)).unwrap();
        let clip = set.clip(id).unwrap();
        let keys = clip.tracks[0].keys();
        assert_eq!(clip.length, 1.0);
        assert_eq!(keys.first().unwrap().time, 0.0);
        assert!((keys.first().unwrap().translation.x - 0.5).abs() < 1e-5);
        assert!((keys.last().unwrap().time - 1.0).abs() < 1e-6);
        assert!((keys.last().unwrap().translation.x - 1.5).abs() < 1e-5);
        assert!(keys.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn rebuild_replaces_base_clips() {
        let mut set = AnimationSet::new();
        let src = set.add_clip(ramp_clip("walk", 2.0));
        let mut space = set.create_space("s");
        let builder = SpaceBuilder::default();
        let seg = [AnimationSegment::new(src, 0.0, 1.0)];
        builder.build_from_segments(&mut space, &mut set, &seg).unwrap();
        let first = space.base_clips().to_vec();
        builder.build_from_segments(&mut space, &mut set, &seg).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.clip(first[0]).is_err());
        assert!(space.timewarp_curve().is_none());
    }

    #[test]
    fn layout_mismatch_keeps_previous_clips() {
        let mut set = AnimationSet::new();
        let a = set.add_clip(ramp_clip("a", 1.0));
        let mut other = ramp_clip("b", 1.0);
        other.tracks[0].bone = "spine".into();
        let b = set.add_clip(other);
        let mut space = set.create_space("s");
        let builder = SpaceBuilder::default();
        builder
            .build_from_segments(&mut space, &mut set, &[AnimationSegment::new(a, 0.0, 1.0)])
            .unwrap();
        let before = space.base_clips().to_vec();
        let err = builder
            .build_from_segments(
                &mut space,
                &mut set,
                &[AnimationSegment::new(a, 0.0, 1.0), AnimationSegment::new(b, 0.0, 1.0)],
            )
            .unwrap_err();
        assert!(matches!(err, MotionSpaceError::TrackLayoutMismatch { .. }));
        assert_eq!(space.base_clips(), &before[..]);
        assert_eq!(set.len(), 3);
    }
}
