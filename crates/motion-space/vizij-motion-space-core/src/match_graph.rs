//! Match graph seam and its arena implementation.
//!
//! Nodes are candidate motion segments; edges carry sampled time and ground-plane
//! correspondences discovered by a motion-matching search. Nodes and edges are
//! addressed by index handles so the graph never hands out references into a
//! structure owned by someone else.
//!
//! Edge times are segment-local seconds on both sides. An edge alignment places
//! the second node's ground frame into the first node's frame; sampling from the
//! second node returns the inverse. Neither side has to be monotone in the other:
//! each walk direction looks samples up in its own time order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use hashbrown::HashMap;
use log::debug;
use nalgebra::Isometry2;
use serde::{Deserialize, Serialize};

use crate::error::{MotionSpaceError, Result};
use crate::ids::{EdgeId, NodeHandle};
use crate::math::{lerp_alignment, lerp_f32};
use crate::segment::AnimationSegment;

/// One step along a path: traverse `edge` and arrive at `node`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub edge: EdgeId,
    /// True when the edge is walked from its first node to its second node.
    pub from_first: bool,
    pub node: NodeHandle,
}

/// Edge sequence from a reference node; empty for the reference itself.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchPath {
    pub steps: Vec<PathStep>,
}

impl MatchPath {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Graph access needed by the space builder. Motion-matching hosts implement
/// this over their own storage; [`MatchGraph`] is the in-crate arena.
pub trait CorrespondenceGraph {
    /// Every node handle, in insertion order.
    fn nodes(&self) -> Vec<NodeHandle>;

    fn segment(&self, node: NodeHandle) -> Option<AnimationSegment>;

    /// Corresponding time on the other node and the alignment of the other node
    /// relative to the node the walk comes from.
    fn sample_edge(
        &self,
        edge: EdgeId,
        time: f32,
        from_first: bool,
    ) -> Option<(f32, Isometry2<f32>)>;

    /// Optimal path from `reference` to each target; None when unreachable.
    fn compute_optimal_paths(
        &self,
        reference: NodeHandle,
        targets: &[NodeHandle],
    ) -> Vec<Option<MatchPath>>;
}

/// A sampled correspondence between two segments.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    pub first_time: f32,
    pub second_time: f32,
    pub alignment: Isometry2<f32>,
}

impl Correspondence {
    pub fn new(first_time: f32, second_time: f32, alignment: Isometry2<f32>) -> Self {
        Self {
            first_time,
            second_time,
            alignment,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchNode {
    pub segment: AnimationSegment,
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchEdge {
    pub first: NodeHandle,
    pub second: NodeHandle,
    /// Non-negative traversal cost (match distance).
    pub cost: f32,
    /// Sorted by first-node time.
    samples: Vec<Correspondence>,
    /// Indices into `samples` in second-node time order.
    #[serde(skip)]
    by_second: Vec<usize>,
}

impl MatchEdge {
    pub fn new(
        first: NodeHandle,
        second: NodeHandle,
        cost: f32,
        mut samples: Vec<Correspondence>,
    ) -> Self {
        samples.sort_by(|a, b| a.first_time.total_cmp(&b.first_time));
        let mut by_second: Vec<usize> = (0..samples.len()).collect();
        by_second.sort_by(|&a, &b| samples[a].second_time.total_cmp(&samples[b].second_time));
        Self {
            first,
            second,
            cost: cost.max(0.0),
            samples,
            by_second,
        }
    }

    pub fn samples(&self) -> &[Correspondence] {
        &self.samples
    }

    /// Corresponding time on the far node plus the far node's alignment.
    /// Times outside the sampled range clamp to the first/last sample.
    pub fn sample(&self, time: f32, from_first: bool) -> Option<(f32, Isometry2<f32>)> {
        if from_first {
            lookup(
                self.samples.iter(),
                time,
                |c| c.first_time,
                |c| c.second_time,
            )
        } else {
            let (far, alignment) = lookup(
                self.by_second.iter().map(|&i| &self.samples[i]),
                time,
                |c| c.second_time,
                |c| c.first_time,
            )?;
            Some((far, alignment.inverse()))
        }
    }

    /// The node on the other side of `node`, with the walk direction.
    pub fn opposite(&self, node: NodeHandle) -> Option<(NodeHandle, bool)> {
        if node == self.first {
            Some((self.second, true))
        } else if node == self.second {
            Some((self.first, false))
        } else {
            None
        }
    }
}

/// Piecewise-linear lookup over samples ordered by `key`.
fn lookup<'a, I>(
    ordered: I,
    time: f32,
    key: impl Fn(&Correspondence) -> f32,
    other: impl Fn(&Correspondence) -> f32,
) -> Option<(f32, Isometry2<f32>)>
where
    I: Iterator<Item = &'a Correspondence>,
{
    let mut prev: Option<&Correspondence> = None;
    for c in ordered {
        if time <= key(c) {
            let Some(a) = prev else {
                return Some((other(c), c.alignment));
            };
            let denom = (key(c) - key(a)).max(f32::EPSILON);
            let t = ((time - key(a)) / denom).clamp(0.0, 1.0);
            let alignment = lerp_alignment(&a.alignment, &c.alignment, t);
            return Some((lerp_f32(other(a), other(c), t), alignment));
        }
        prev = Some(c);
    }
    prev.map(|last| (other(last), last.alignment))
}

/// Arena match graph.
#[derive(Clone, Debug, Default)]
pub struct MatchGraph {
    nodes: Vec<MatchNode>,
    edges: Vec<MatchEdge>,
    adjacency: HashMap<NodeHandle, Vec<EdgeId>>,
}

impl MatchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, segment: AnimationSegment) -> NodeHandle {
        let handle = NodeHandle(self.nodes.len() as u32);
        self.nodes.push(MatchNode { segment });
        handle
    }

    /// Connect two nodes.
    pub fn add_edge(
        &mut self,
        first: NodeHandle,
        second: NodeHandle,
        cost: f32,
        samples: Vec<Correspondence>,
    ) -> Result<EdgeId> {
        for node in [first, second] {
            if node.index() >= self.nodes.len() {
                return Err(MotionSpaceError::UnknownNode(node));
            }
        }
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(MatchEdge::new(first, second, cost, samples));
        self.adjacency.entry(first).or_default().push(id);
        if second != first {
            self.adjacency.entry(second).or_default().push(id);
        }
        Ok(id)
    }

    pub fn node(&self, node: NodeHandle) -> Option<&MatchNode> {
        self.nodes.get(node.index())
    }

    pub fn edge(&self, edge: EdgeId) -> Option<&MatchEdge> {
        self.edges.get(edge.index())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Dijkstra over edge costs; back-pointers per reached node.
    fn shortest_tree(&self, reference: NodeHandle) -> Vec<Option<Option<PathStepBack>>> {
        let mut dist = vec![f32::INFINITY; self.nodes.len()];
        let mut back: Vec<Option<Option<PathStepBack>>> = vec![None; self.nodes.len()];
        let mut heap = BinaryHeap::new();
        if reference.index() >= self.nodes.len() {
            return back;
        }
        dist[reference.index()] = 0.0;
        back[reference.index()] = Some(None);
        heap.push(Frontier {
            cost: 0.0,
            node: reference,
        });

        while let Some(Frontier { cost, node }) = heap.pop() {
            if cost > dist[node.index()] {
                continue;
            }
            let Some(edges) = self.adjacency.get(&node) else {
                continue;
            };
            for &edge_id in edges {
                let edge = &self.edges[edge_id.index()];
                let Some((next, from_first)) = edge.opposite(node) else {
                    continue;
                };
                let next_cost = cost + edge.cost;
                if next_cost < dist[next.index()] {
                    dist[next.index()] = next_cost;
                    back[next.index()] = Some(Some(PathStepBack {
                        prev: node,
                        edge: edge_id,
                        from_first,
                    }));
                    heap.push(Frontier {
                        cost: next_cost,
                        node: next,
                    });
                }
            }
        }
        back
    }
}

#[derive(Copy, Clone, Debug)]
struct PathStepBack {
    prev: NodeHandle,
    edge: EdgeId,
    from_first: bool,
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct Frontier {
    cost: f32,
    node: NodeHandle,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on cost.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl CorrespondenceGraph for MatchGraph {
    fn nodes(&self) -> Vec<NodeHandle> {
        (0..self.nodes.len() as u32).map(NodeHandle).collect()
    }

    fn segment(&self, node: NodeHandle) -> Option<AnimationSegment> {
        self.node(node).map(|n| n.segment)
    }

    fn sample_edge(
        &self,
        edge: EdgeId,
        time: f32,
        from_first: bool,
    ) -> Option<(f32, Isometry2<f32>)> {
        self.edge(edge)?.sample(time, from_first)
    }

    fn compute_optimal_paths(
        &self,
        reference: NodeHandle,
        targets: &[NodeHandle],
    ) -> Vec<Option<MatchPath>> {
        let back = self.shortest_tree(reference);
        targets
            .iter()
            .map(|&target| {
                let mut steps = Vec::new();
                let mut cur = target;
                loop {
                    match back.get(cur.index()).copied().flatten() {
                        None => return None,
                        Some(None) => break,
                        Some(Some(step)) => {
                            steps.push(PathStep {
                                edge: step.edge,
                                from_first: step.from_first,
                                node: cur,
                            });
                            cur = step.prev;
                        }
                    }
                }
                steps.reverse();
                debug!(
                    "match path {:?} -> {:?}: {} step(s)",
                    reference,
                    target,
                    steps.len()
                );
                Some(MatchPath { steps })
            })
            .collect()
    }
}
