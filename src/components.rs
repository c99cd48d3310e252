//! Connected-component splitting and per-component stitching.
//!
//! When rendering is delegated per component (or to an external layout
//! engine), the graph is partitioned with a union-find over node indices and
//! the finished component canvases are stacked perpendicular to the graph
//! direction with a fixed gap.

use std::collections::BTreeMap;

use crate::canvas::{merge_canvases, Canvas};
use crate::ir::{Direction, Graph};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Node ids in first-appearance order.
    pub nodes: Vec<String>,
    /// Indices into the graph's edge list; an edge belongs to a component
    /// iff both endpoints do.
    pub edges: Vec<usize>,
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Smaller root wins, keeping component order deterministic.
            let (lo, hi) = (ra.min(rb), ra.max(rb));
            self.parent[hi] = lo;
        }
    }
}

/// Partitions all node ids into connected components. Components are
/// ordered by their earliest node appearance; node and edge order within a
/// component follows the input.
pub fn find_connected_components(graph: &Graph) -> Vec<Component> {
    let ids = &graph.order;
    let index_of: BTreeMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(idx, id)| (id.as_str(), idx))
        .collect();

    let mut uf = UnionFind::new(ids.len());
    for edge in &graph.edges {
        if let (Some(&from), Some(&to)) = (
            index_of.get(edge.from.as_str()),
            index_of.get(edge.to.as_str()),
        ) {
            uf.union(from, to);
        }
    }

    let mut components: Vec<Component> = Vec::new();
    let mut component_of_root: BTreeMap<usize, usize> = BTreeMap::new();
    for idx in 0..ids.len() {
        let root = uf.find(idx);
        let slot = *component_of_root.entry(root).or_insert_with(|| {
            components.push(Component {
                nodes: Vec::new(),
                edges: Vec::new(),
            });
            components.len() - 1
        });
        components[slot].nodes.push(ids[idx].clone());
    }
    for (edge_idx, edge) in graph.edges.iter().enumerate() {
        if let (Some(&from), Some(&to)) = (
            index_of.get(edge.from.as_str()),
            index_of.get(edge.to.as_str()),
        ) {
            if uf.find(from) == uf.find(to) {
                let root = uf.find(from);
                let slot = component_of_root[&root];
                components[slot].edges.push(edge_idx);
            }
        }
    }
    components
}

/// A standalone graph per component, preserving direction, edge order and
/// the subgraphs whose members fall inside the component.
pub fn split_graph(graph: &Graph) -> Vec<Graph> {
    find_connected_components(graph)
        .into_iter()
        .map(|component| {
            let mut sub = Graph::new();
            sub.direction = graph.direction;
            sub.flip_vertical = graph.flip_vertical;
            for id in &component.nodes {
                let node = &graph.nodes[id];
                sub.ensure_node(id, Some(node.label.clone()), Some(node.shape));
            }
            for &edge_idx in &component.edges {
                sub.edges.push(graph.edges[edge_idx].clone());
            }
            for subgraph in &graph.subgraphs {
                let members: Vec<String> = subgraph
                    .nodes
                    .iter()
                    .filter(|id| component.nodes.contains(id))
                    .cloned()
                    .collect();
                if !members.is_empty() {
                    sub.subgraphs.push(crate::ir::Subgraph {
                        id: subgraph.id.clone(),
                        label: subgraph.label.clone(),
                        nodes: members,
                        parent: None,
                        children: Vec::new(),
                    });
                }
            }
            sub
        })
        .collect()
}

/// Offsets and total size for stacking component layouts: `LR` stacks
/// vertically (width = max, height = sum plus gaps), `TD` horizontally.
pub fn stitch_component_offsets(
    sizes: &[(i32, i32)],
    direction: Direction,
    gap: i32,
) -> (Vec<(i32, i32)>, (i32, i32)) {
    let mut offsets = Vec::with_capacity(sizes.len());
    let mut cursor = 0;
    let mut max_other = 0;
    for (idx, &(width, height)) in sizes.iter().enumerate() {
        let gap_before = if idx == 0 { 0 } else { gap };
        match direction {
            Direction::LeftRight => {
                cursor += gap_before;
                offsets.push((0, cursor));
                cursor += height;
                max_other = max_other.max(width);
            }
            Direction::TopDown => {
                cursor += gap_before;
                offsets.push((cursor, 0));
                cursor += width;
                max_other = max_other.max(height);
            }
        }
    }
    let total = match direction {
        Direction::LeftRight => (max_other, cursor),
        Direction::TopDown => (cursor, max_other),
    };
    (offsets, total)
}

/// Merges per-component canvases at the stitched offsets.
pub fn stitch_component_canvases(
    canvases: &[Canvas],
    direction: Direction,
    gap: i32,
) -> Canvas {
    let sizes: Vec<(i32, i32)> = canvases
        .iter()
        .map(|canvas| {
            let (x, y) = canvas.size();
            (x + 1, y + 1)
        })
        .collect();
    let (offsets, total) = stitch_component_offsets(&sizes, direction, gap);
    let mut stitched = Canvas::new((total.0 - 1).max(0), (total.1 - 1).max(0));
    for (canvas, offset) in canvases.iter().zip(offsets) {
        stitched = merge_canvases(&stitched, offset, true, &[canvas.clone()]);
    }
    stitched
}
