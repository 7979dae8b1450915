//! Cross-clip annotation reconciliation.
//!
//! After a build every base clip carries its own annotations, cut from its
//! source. The matcher rewrites them so that each clip holds the same number of
//! annotations per compatible group, in the same order, so blending can pair
//! them up index by index. Intervals are compared in normalized clip time.
//!
//! Each class runs in three phases: extract (move annotations out of every
//! clip), compute (walk groups in lock-step, discarding or splitting), commit
//! (write the merged lists back).

use log::{debug, trace};

use crate::annotation::{Annotation, AnnotationClass, AnnotationPayload};
use crate::clip::AnimationSet;
use crate::config::AnnotationMatchConfig;
use crate::error::Result;
use crate::space::AnimationSpace;

/// Outcome for one annotation class.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassMatchReport {
    pub class: AnnotationClass,
    /// Compatible groups found in the first base clip.
    pub groups: usize,
    /// Matched tuples written back (one annotation per clip each).
    pub emitted: usize,
    pub splits: usize,
    /// Annotations dropped because nothing in the other clips lined up.
    pub discarded: usize,
}

impl ClassMatchReport {
    fn new(class: AnnotationClass) -> Self {
        Self {
            class,
            groups: 0,
            emitted: 0,
            splits: 0,
            discarded: 0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchReport {
    pub classes: Vec<ClassMatchReport>,
}

impl MatchReport {
    pub fn class(&self, class: AnnotationClass) -> Option<&ClassMatchReport> {
        self.classes.iter().find(|r| r.class == class)
    }

    pub fn total_splits(&self) -> usize {
        self.classes.iter().map(|r| r.splits).sum()
    }

    pub fn total_discarded(&self) -> usize {
        self.classes.iter().map(|r| r.discarded).sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Interval {
    start: f32,
    end: f32,
}

impl Interval {
    fn len(self) -> f32 {
        self.end - self.start
    }

    fn within(self, host: Interval, tol: f32) -> bool {
        self.start >= host.start - tol && self.end <= host.end + tol
    }

    fn overlap(self, other: Interval) -> f32 {
        (self.end.min(other.end) - self.start.max(other.start)).max(0.0)
    }
}

#[derive(Clone, Debug)]
struct Candidate {
    span: Interval,
    payload: AnnotationPayload,
}

#[derive(Clone, Debug, Default)]
pub struct AnnotationMatcher {
    config: AnnotationMatchConfig,
}

impl AnnotationMatcher {
    pub fn new(config: AnnotationMatchConfig) -> Self {
        Self { config }
    }

    /// Reconcile every annotation class across the base clips of `space`.
    pub fn make_matches(
        &self,
        space: &AnimationSpace,
        set: &mut AnimationSet,
    ) -> Result<MatchReport> {
        let mut report = MatchReport::default();
        for class in AnnotationClass::ALL {
            report.classes.push(self.make_matches_for(space, set, class)?);
        }
        Ok(report)
    }

    /// Reconcile a single class.
    pub fn make_matches_for(
        &self,
        space: &AnimationSpace,
        set: &mut AnimationSet,
        class: AnnotationClass,
    ) -> Result<ClassMatchReport> {
        let clips = space.base_clips();
        let mut report = ClassMatchReport::new(class);
        if clips.is_empty() {
            return Ok(report);
        }
        for &id in clips {
            set.clip(id)?;
        }

        // extract
        let mut scratch = Vec::with_capacity(clips.len());
        let mut lengths = Vec::with_capacity(clips.len());
        for &id in clips {
            let clip = set.clip_mut(id)?;
            lengths.push(if clip.length > 0.0 { clip.length } else { 1.0 });
            scratch.push(clip.annotations.container_mut(class).take_all());
        }

        // compute
        let mut groups: Vec<AnnotationPayload> = Vec::new();
        for a in &scratch[0] {
            if !groups.iter().any(|g| g.matches(&a.payload)) {
                groups.push(a.payload.clone());
            }
        }
        report.groups = groups.len();

        let mut merged: Vec<Vec<Annotation>> = vec![Vec::new(); clips.len()];
        for group in &groups {
            let mut candidates: Vec<Vec<Candidate>> = scratch
                .iter()
                .zip(&lengths)
                .map(|(anns, &len)| {
                    anns.iter()
                        .filter(|a| a.payload.matches(group))
                        .map(|a| Candidate {
                            span: Interval {
                                start: a.start / len,
                                end: a.end / len,
                            },
                            payload: a.payload.clone(),
                        })
                        .collect()
                })
                .collect();
            self.reconcile(&mut candidates, &lengths, &mut merged, &mut report);
        }
        // annotations of clips > 0 whose payload matches no group of the first clip
        report.discarded += scratch[1..]
            .iter()
            .flatten()
            .filter(|a| !groups.iter().any(|g| g.matches(&a.payload)))
            .count();

        // commit
        for (&id, anns) in clips.iter().zip(merged) {
            let container = set.clip_mut(id)?.annotations.container_mut(class);
            for a in anns {
                container.add(a);
            }
        }

        debug!(
            "{class:?}: {} group(s), {} matched, {} split(s), {} discarded",
            report.groups, report.emitted, report.splits, report.discarded
        );
        Ok(report)
    }

    fn reconcile(
        &self,
        candidates: &mut [Vec<Candidate>],
        lengths: &[f32],
        merged: &mut [Vec<Annotation>],
        report: &mut ClassMatchReport,
    ) {
        let n = candidates.len();
        let tol = self.config.overlap_tolerance;
        let mut cursor = vec![0usize; n];

        while (0..n).all(|j| cursor[j] < candidates[j].len()) {
            let current: Vec<Interval> = (0..n).map(|j| candidates[j][cursor[j]].span).collect();
            if !connected(&current, tol) {
                let earliest = (0..n)
                    .min_by(|&a, &b| {
                        current[a]
                            .start
                            .total_cmp(&current[b].start)
                            .then(current[a].end.total_cmp(&current[b].end))
                    })
                    .unwrap_or(0);
                trace!("discarding unmatched interval in clip {earliest}");
                cursor[earliest] += 1;
                report.discarded += 1;
                continue;
            }

            let splits: Vec<(usize, f32)> = (0..n)
                .filter_map(|j| self.split_point(j, candidates, &cursor).map(|s| (j, s)))
                .collect();
            if !splits.is_empty() {
                let mut after = current.clone();
                for &(j, s) in &splits {
                    after[j].end = s;
                }
                // a split that would disconnect the tuple is not applied
                if connected(&after, tol) {
                    for (j, s) in splits {
                        let host = &mut candidates[j][cursor[j]];
                        let tail = Candidate {
                            span: Interval {
                                start: s,
                                end: host.span.end,
                            },
                            payload: host.payload.clone(),
                        };
                        host.span.end = s;
                        candidates[j].insert(cursor[j] + 1, tail);
                        report.splits += 1;
                    }
                }
            }

            let payload = candidates[0][cursor[0]].payload.clone();
            for j in 0..n {
                let span = candidates[j][cursor[j]].span;
                let len = lengths[j];
                merged[j].push(Annotation::new(span.start * len, span.end * len, payload.clone()));
                cursor[j] += 1;
            }
            report.emitted += 1;
        }

        report.discarded += (0..n)
            .map(|j| candidates[j].len().saturating_sub(cursor[j]))
            .sum::<usize>();
    }

    /// Where clip `j`'s current interval should be cut, if anywhere.
    ///
    /// A neighbour votes when its current and next intervals both sit inside
    /// the host (within tolerance) and are each narrower than it. The vote is
    /// the midpoint of the gap between them, weighted by how much of the host
    /// the pair covers.
    fn split_point(
        &self,
        j: usize,
        candidates: &[Vec<Candidate>],
        cursor: &[usize],
    ) -> Option<f32> {
        let tol = self.config.overlap_tolerance;
        let host = candidates[j][cursor[j]].span;
        let host_len = host.len();
        if host_len <= 0.0 {
            return None;
        }
        let mut num = 0.0f32;
        let mut den = 0.0f32;
        for (k, list) in candidates.iter().enumerate() {
            if k == j {
                continue;
            }
            let Some(next) = list.get(cursor[k] + 1).map(|c| c.span) else {
                continue;
            };
            let cur = list[cursor[k]].span;
            if !(cur.within(host, tol) && next.within(host, tol)) {
                continue;
            }
            if cur.len() >= host_len || next.len() >= host_len {
                continue;
            }
            let target = 0.5 * (cur.end + next.start);
            if target <= host.start || target >= host.end {
                continue;
            }
            let quality = ((cur.overlap(host) + next.overlap(host)) / host_len).min(1.0);
            if quality < self.config.min_split_quality {
                continue;
            }
            num += quality * target;
            den += quality;
        }
        (den > 0.0).then(|| num / den)
    }
}

/// Grow a union from the first interval until it stops changing; connected
/// when it absorbed every interval.
fn connected(intervals: &[Interval], tol: f32) -> bool {
    let Some(first) = intervals.first() else {
        return true;
    };
    let mut included = vec![false; intervals.len()];
    included[0] = true;
    let (mut lo, mut hi) = (first.start, first.end);
    loop {
        let mut grew = false;
        for (k, iv) in intervals.iter().enumerate() {
            if !included[k] && iv.start <= hi + tol && iv.end >= lo - tol {
                included[k] = true;
                lo = lo.min(iv.start);
                hi = hi.max(iv.end);
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }
    included.into_iter().all(|i| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::Clip;
    use crate::ids::ClipId;

    fn plant(start: f32, end: f32, bone: &str) -> Annotation {
        Annotation::new(
            start,
            end,
            AnnotationPayload::PlantConstraint { bone: bone.into() },
        )
    }

    fn space_with(
        set: &mut AnimationSet,
        annotations: Vec<Vec<Annotation>>,
    ) -> (AnimationSpace, Vec<ClipId>) {
        let ids: Vec<ClipId> = annotations
            .into_iter()
            .enumerate()
            .map(|(i, anns)| {
                let mut clip = Clip::new(format!("c{i}"), 30.0, 1.0);
                for a in anns {
                    clip.annotations.add(a);
                }
                set.add_clip(clip)
            })
            .collect();
        let mut space = set.create_space("s");
        space.replace_base_clips(ids.clone());
        (space, ids)
    }

    fn plants(set: &AnimationSet, id: ClipId) -> Vec<(f32, f32)> {
        set.clip(id)
            .unwrap()
            .annotations
            .container(AnnotationClass::PlantConstraint)
            .entries()
            .iter()
            .map(|a| (a.start, a.end))
            .collect()
    }

    #[test]
    fn connectivity_chains_through_intermediate() {
        let a = Interval { start: 0.0, end: 0.3 };
        let b = Interval { start: 0.25, end: 0.6 };
        let c = Interval { start: 0.55, end: 0.9 };
        assert!(connected(&[a, c, b], 0.0));
        assert!(!connected(&[a, c], 0.0));
        assert!(connected(&[a, Interval { start: 0.31, end: 0.4 }], 0.02));
    }

    #[test]
    fn long_interval_is_split_to_match_neighbours() {
        let mut set = AnimationSet::new();
        let (space, ids) = space_with(
            &mut set,
            vec![
                vec![plant(0.1, 0.9, "foot_l")],
                vec![plant(0.1, 0.45, "foot_l"), plant(0.55, 0.9, "foot_l")],
                vec![plant(0.12, 0.47, "foot_l"), plant(0.53, 0.88, "foot_l")],
            ],
        );
        let matcher = AnnotationMatcher::default();
        let report = matcher
            .make_matches_for(&space, &mut set, AnnotationClass::PlantConstraint)
            .unwrap();
        assert_eq!(report.splits, 1);
        assert_eq!(report.emitted, 2);
        let first = plants(&set, ids[0]);
        assert_eq!(first.len(), 2);
        assert!((first[0].1 - 0.5).abs() < 1e-4, "{first:?}");
        assert!((first[1].0 - 0.5).abs() < 1e-4);
        for &id in &ids {
            assert_eq!(plants(&set, id).len(), 2);
        }

        let again = matcher
            .make_matches_for(&space, &mut set, AnnotationClass::PlantConstraint)
            .unwrap();
        assert_eq!(again.splits, 0);
        assert_eq!(again.discarded, 0);
        assert_eq!(plants(&set, ids[0]), first);
    }

    #[test]
    fn unmatched_intervals_are_discarded() {
        let mut set = AnimationSet::new();
        let (space, ids) = space_with(
            &mut set,
            vec![
                vec![plant(0.0, 0.1, "foot_l"), plant(0.5, 0.7, "foot_l")],
                vec![plant(0.5, 0.72, "foot_l")],
            ],
        );
        let report = AnnotationMatcher::default()
            .make_matches_for(&space, &mut set, AnnotationClass::PlantConstraint)
            .unwrap();
        assert_eq!(report.discarded, 1);
        assert_eq!(plants(&set, ids[0]), vec![(0.5, 0.7)]);
        assert_eq!(plants(&set, ids[1]).len(), 1);
    }

    #[test]
    fn groups_are_matched_independently() {
        let mut set = AnimationSet::new();
        let (space, ids) = space_with(
            &mut set,
            vec![
                vec![plant(0.0, 0.4, "foot_l"), plant(0.5, 0.9, "foot_r")],
                vec![
                    plant(0.05, 0.45, "foot_l"),
                    plant(0.5, 0.95, "foot_r"),
                    plant(0.0, 0.2, "hand"),
                ],
            ],
        );
        let report = AnnotationMatcher::default()
            .make_matches(&space, &mut set)
            .unwrap();
        let plants_report = report.class(AnnotationClass::PlantConstraint).unwrap();
        assert_eq!(plants_report.groups, 2);
        assert_eq!(plants_report.emitted, 2);
        assert_eq!(plants_report.discarded, 1);
        assert_eq!(plants(&set, ids[1]).len(), 2);
    }
}
