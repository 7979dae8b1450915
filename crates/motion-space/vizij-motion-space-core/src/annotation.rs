//! Clip annotations: labeled time intervals with class-specific payloads.
//!
//! Every clip carries one [`AnnotationContainer`] per [`AnnotationClass`]; containers
//! keep their entries sorted by start time.

use serde::{Deserialize, Serialize};

/// Semantic class of an annotation. Matching runs per class.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationClass {
    Transition,
    ParamTransition,
    PlantConstraint,
    SimEvent,
}

impl AnnotationClass {
    pub const ALL: [AnnotationClass; 4] = [
        AnnotationClass::Transition,
        AnnotationClass::ParamTransition,
        AnnotationClass::PlantConstraint,
        AnnotationClass::SimEvent,
    ];

    #[inline]
    fn slot(self) -> usize {
        match self {
            AnnotationClass::Transition => 0,
            AnnotationClass::ParamTransition => 1,
            AnnotationClass::PlantConstraint => 2,
            AnnotationClass::SimEvent => 3,
        }
    }

    /// Classes that are carried over when a clip is cut into a segment.
    #[inline]
    pub fn survives_clipping(self) -> bool {
        matches!(
            self,
            AnnotationClass::PlantConstraint | AnnotationClass::SimEvent
        )
    }
}

/// Variant-specific annotation data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnotationPayload {
    /// Allowed transition window into another clip or space.
    Transition { target: String },
    /// Transition whose target is itself parametrized.
    ParamTransition { target: String, params: Vec<f32> },
    /// Bone that stays planted on the ground during the interval.
    PlantConstraint { bone: String },
    /// Event forwarded to a physics or gameplay simulation.
    SimEvent { event: String },
}

impl AnnotationPayload {
    pub fn class(&self) -> AnnotationClass {
        match self {
            AnnotationPayload::Transition { .. } => AnnotationClass::Transition,
            AnnotationPayload::ParamTransition { .. } => AnnotationClass::ParamTransition,
            AnnotationPayload::PlantConstraint { .. } => AnnotationClass::PlantConstraint,
            AnnotationPayload::SimEvent { .. } => AnnotationClass::SimEvent,
        }
    }

    /// Compatibility predicate used to group annotations across clips.
    pub fn matches(&self, other: &AnnotationPayload) -> bool {
        match (self, other) {
            (
                AnnotationPayload::Transition { target: a },
                AnnotationPayload::Transition { target: b },
            ) => a == b,
            (
                AnnotationPayload::ParamTransition { target: a, .. },
                AnnotationPayload::ParamTransition { target: b, .. },
            ) => a == b,
            (
                AnnotationPayload::PlantConstraint { bone: a },
                AnnotationPayload::PlantConstraint { bone: b },
            ) => a == b,
            (
                AnnotationPayload::SimEvent { event: a },
                AnnotationPayload::SimEvent { event: b },
            ) => a == b,
            _ => false,
        }
    }
}

/// A labeled [start, end] interval in clip-local seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub start: f32,
    pub end: f32,
    pub payload: AnnotationPayload,
}

impl Annotation {
    pub fn new(start: f32, end: f32, payload: AnnotationPayload) -> Self {
        Self {
            start: start.min(end),
            end: end.max(start),
            payload,
        }
    }

    #[inline]
    pub fn class(&self) -> AnnotationClass {
        self.payload.class()
    }

    #[inline]
    pub fn duration(&self) -> f32 {
        self.end - self.start
    }

    #[inline]
    pub fn contains(&self, time: f32) -> bool {
        time >= self.start && time <= self.end
    }

    /// Restrict to the window [start, end] and shift into window-local time.
    ///
    /// Returns None when the annotation lies outside the window. An interval
    /// that only touches a window edge is dropped too; instantaneous events on
    /// the edge are kept.
    pub fn clipped(&self, start: f32, end: f32) -> Option<Annotation> {
        if self.end < start || self.start > end {
            return None;
        }
        let lo = self.start.max(start);
        let hi = self.end.min(end);
        if hi <= lo && self.duration() > 0.0 {
            return None;
        }
        Some(Annotation {
            start: lo - start,
            end: hi - start,
            payload: self.payload.clone(),
        })
    }
}

/// Annotations of a single class, sorted by start time.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationContainer {
    class: AnnotationClass,
    entries: Vec<Annotation>,
}

impl AnnotationContainer {
    pub fn new(class: AnnotationClass) -> Self {
        Self {
            class,
            entries: Vec::new(),
        }
    }

    pub fn class(&self) -> AnnotationClass {
        self.class
    }

    /// Insert keeping start-time order; equal starts keep insertion order.
    /// Annotations of another class are ignored and returned false.
    pub fn add(&mut self, annotation: Annotation) -> bool {
        if annotation.class() != self.class {
            return false;
        }
        let idx = self
            .entries
            .partition_point(|a| a.start <= annotation.start);
        self.entries.insert(idx, annotation);
        true
    }

    pub fn entries(&self) -> &[Annotation] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move every entry out, leaving the container empty.
    pub fn take_all(&mut self) -> Vec<Annotation> {
        std::mem::take(&mut self.entries)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries whose interval contains `time`.
    pub fn at_time(&self, time: f32) -> impl Iterator<Item = &Annotation> + '_ {
        self.entries.iter().filter(move |a| a.contains(time))
    }

    /// Copy of this container restricted to [start, end] in window-local time.
    pub fn clipped(&self, start: f32, end: f32) -> AnnotationContainer {
        AnnotationContainer {
            class: self.class,
            entries: self
                .entries
                .iter()
                .filter_map(|a| a.clipped(start, end))
                .collect(),
        }
    }
}

/// One container per annotation class.
///
/// Serialized as a flat annotation list; loading routes every entry through
/// [`AnnotationSet::add`], so class slots and start order hold for any input order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Annotation>", into = "Vec<Annotation>")]
pub struct AnnotationSet {
    containers: [AnnotationContainer; 4],
}

impl From<Vec<Annotation>> for AnnotationSet {
    fn from(annotations: Vec<Annotation>) -> Self {
        let mut set = AnnotationSet::default();
        for annotation in annotations {
            set.add(annotation);
        }
        set
    }
}

impl From<AnnotationSet> for Vec<Annotation> {
    fn from(set: AnnotationSet) -> Self {
        set.containers
            .into_iter()
            .flat_map(|c| c.entries)
            .collect()
    }
}

impl Default for AnnotationSet {
    fn default() -> Self {
        Self {
            containers: AnnotationClass::ALL.map(AnnotationContainer::new),
        }
    }
}

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container(&self, class: AnnotationClass) -> &AnnotationContainer {
        &self.containers[class.slot()]
    }

    pub fn container_mut(&mut self, class: AnnotationClass) -> &mut AnnotationContainer {
        &mut self.containers[class.slot()]
    }

    /// Route an annotation to the container of its class. Reversed bounds are
    /// swapped.
    pub fn add(&mut self, annotation: Annotation) {
        let Annotation {
            start,
            end,
            payload,
        } = annotation;
        let class = payload.class();
        self.container_mut(class)
            .add(Annotation::new(start, end, payload));
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnnotationContainer> {
        self.containers.iter()
    }

    /// Annotations carried into a segment cut from [start, end]: plant constraints
    /// and simulation events only, in segment-local time.
    pub fn clipped_for_segment(&self, start: f32, end: f32) -> AnnotationSet {
        let mut out = AnnotationSet::default();
        for class in AnnotationClass::ALL {
            if class.survives_clipping() {
                out.containers[class.slot()] = self.container(class).clipped(start, end);
            }
        }
        out
    }
}
