//! Grid layout for flowcharts: level-based placement on a logical grid,
//! column/row sizing from display widths, strict edge routing with a
//! whole-layout margin retry, and projection into drawing coordinates.

mod astar;
pub(crate) mod label_placement;
mod routing;
pub(crate) mod types;
mod usage;

pub use astar::{
    merge_path_idx, register_pathfinder_backend, AStarContext, Bounds, PathfinderBackend,
    StrictConstraints,
};
pub use label_placement::{determine_label_line, place_label, PlacedLabel};
pub use routing::{
    determine_start_and_end_dirs, self_reference_dirs, RouteRequest, RouteResult, Router,
};
pub use types::*;
pub use usage::{SegmentUsage, UsedPointSet};

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::config::LayoutConfig;
use crate::ir::{Direction, Graph};
use crate::text_metrics::str_width;

/// Uniform shifts tried when a strict route cannot be found: a port pinned
/// to the canvas edge can strand an edge, and a one-cell outside corridor is
/// usually all the router needs.
const LAYOUT_MARGINS: [i32; 5] = [0, 1, 2, 3, 4];
/// Extra rows reserved above a subgraph's topmost externally-targeted node.
const SUBGRAPH_INCOMING_OVERHEAD: i32 = 4;
/// Drawing-space padding around a subgraph's content.
const SUBGRAPH_PADDING: i32 = 2;
/// Rows kept free at a subgraph's top for its label.
const SUBGRAPH_LABEL_SPACE: i32 = 2;

#[derive(Debug, Clone)]
pub struct NodeLayout {
    pub id: String,
    pub label: String,
    pub grid: GridCoord,
    /// Top-left border cell of the node box.
    pub drawing: DrawingCoord,
    /// Border-to-border extents; the box occupies `drawing.x ..=
    /// drawing.x + box_width` horizontally.
    pub box_width: i32,
    pub box_height: i32,
}

#[derive(Debug, Clone)]
pub struct EdgeLayout {
    pub from: usize,
    pub to: usize,
    pub label: Option<String>,
    /// Merged grid path; empty when the edge proved unroutable on every
    /// margin.
    pub path: Vec<GridCoord>,
    pub label_line: Option<(GridCoord, GridCoord)>,
    pub start_dir: Dir,
    pub end_dir: Dir,
    pub directed: bool,
    pub arrow_start: bool,
    pub arrow_end: bool,
}

#[derive(Debug, Clone)]
pub struct SubgraphLayout {
    pub label: String,
    pub nodes: Vec<usize>,
    pub parent: Option<usize>,
    pub depth: usize,
    /// Drawing-space bounding box, borders inclusive.
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

#[derive(Debug, Clone)]
pub struct Layout {
    pub direction: Direction,
    pub flip_vertical: bool,
    pub nodes: Vec<NodeLayout>,
    pub edges: Vec<EdgeLayout>,
    pub subgraphs: Vec<SubgraphLayout>,
    pub column_width: BTreeMap<i32, i32>,
    pub row_height: BTreeMap<i32, i32>,
    pub offset_x: i32,
    pub offset_y: i32,
    /// Inclusive canvas extents.
    pub width: i32,
    pub height: i32,
}

impl Layout {
    /// Drawing cell at the centre of a grid cell.
    pub fn project(&self, coord: GridCoord) -> DrawingCoord {
        project_with(
            &self.column_width,
            &self.row_height,
            coord,
            (self.offset_x, self.offset_y),
        )
    }
}

fn project_with(
    column_width: &BTreeMap<i32, i32>,
    row_height: &BTreeMap<i32, i32>,
    coord: GridCoord,
    offset: (i32, i32),
) -> DrawingCoord {
    let x: i32 = (0..coord.x)
        .map(|col| column_width.get(&col).copied().unwrap_or(0))
        .sum();
    let y: i32 = (0..coord.y)
        .map(|row| row_height.get(&row).copied().unwrap_or(0))
        .sum();
    DrawingCoord {
        x: x + column_width.get(&coord.x).copied().unwrap_or(0) / 2 + offset.0,
        y: y + row_height.get(&coord.y).copied().unwrap_or(0) / 2 + offset.1,
    }
}

struct ResolvedEdge {
    from: usize,
    to: usize,
    label: Option<String>,
    directed: bool,
    arrow_start: bool,
    arrow_end: bool,
}

/// Per-margin layout state; thrown away and rebuilt when any edge proves
/// unroutable and another margin remains.
struct Attempt {
    coords: Vec<GridCoord>,
    column_width: BTreeMap<i32, i32>,
    row_height: BTreeMap<i32, i32>,
    routes: Vec<RouteResult>,
    label_lines: Vec<Option<(GridCoord, GridCoord)>>,
    complete: bool,
}

pub fn compute_layout(graph: &Graph, config: &LayoutConfig) -> Layout {
    let ids: Vec<String> = graph.order.clone();
    let index_of: HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(idx, id)| (id.as_str(), idx))
        .collect();
    let labels: Vec<String> = ids
        .iter()
        .map(|id| graph.nodes[id].label.clone())
        .collect();

    let edges: Vec<ResolvedEdge> = graph
        .edges
        .iter()
        .filter_map(|edge| {
            Some(ResolvedEdge {
                from: *index_of.get(edge.from.as_str())?,
                to: *index_of.get(edge.to.as_str())?,
                label: edge.label.clone(),
                directed: edge.directed,
                arrow_start: edge.arrow_start,
                arrow_end: edge.arrow_end,
            })
        })
        .collect();

    // Innermost subgraph membership per node.
    let mut subgraph_of: Vec<Option<usize>> = vec![None; ids.len()];
    for (sg_idx, subgraph) in graph.subgraphs.iter().enumerate() {
        for id in &subgraph.nodes {
            if let Some(&node) = index_of.get(id.as_str()) {
                subgraph_of[node] = Some(sg_idx);
            }
        }
    }

    if ids.is_empty() {
        return Layout {
            direction: graph.direction,
            flip_vertical: graph.flip_vertical,
            nodes: Vec::new(),
            edges: Vec::new(),
            subgraphs: Vec::new(),
            column_width: BTreeMap::new(),
            row_height: BTreeMap::new(),
            offset_x: 0,
            offset_y: 0,
            width: -1,
            height: -1,
        };
    }

    let mut attempt = None;
    for (step, &margin) in LAYOUT_MARGINS.iter().enumerate() {
        let last = step + 1 == LAYOUT_MARGINS.len();
        let candidate = layout_attempt(
            graph.direction,
            margin,
            last,
            &labels,
            &edges,
            &subgraph_of,
            config,
        );
        if candidate.complete || last {
            attempt = Some(candidate);
            break;
        }
    }
    let attempt = attempt.expect("at least one layout attempt runs");

    finish_layout(graph, ids, labels, edges, attempt)
}

fn layout_attempt(
    direction: Direction,
    margin: i32,
    is_last_margin: bool,
    labels: &[String],
    edges: &[ResolvedEdge],
    subgraph_of: &[Option<usize>],
    config: &LayoutConfig,
) -> Attempt {
    let node_count = labels.len();
    let mut grid: HashMap<GridCoord, usize> = HashMap::new();
    let mut coords: Vec<Option<GridCoord>> = vec![None; node_count];

    place_nodes(direction, margin, edges, subgraph_of, &mut grid, &mut coords);
    let coords: Vec<GridCoord> = coords
        .into_iter()
        .map(|coord| coord.expect("placement seats every node"))
        .collect();

    let mut column_width: BTreeMap<i32, i32> = BTreeMap::new();
    let mut row_height: BTreeMap<i32, i32> = BTreeMap::new();
    for idx in 0..node_count {
        size_node(
            idx,
            coords[idx],
            labels,
            edges,
            subgraph_of,
            &coords,
            config,
            &mut column_width,
            &mut row_height,
        );
    }

    // The search grid covers every node block plus the widest bounds
    // expansion the retry ladder may request.
    let base_max_x = coords.iter().map(|c| c.x + 2).max().unwrap_or(0) as usize;
    let base_max_y = coords.iter().map(|c| c.y + 2).max().unwrap_or(0) as usize;
    let stride = base_max_x + routing::MAX_BOUNDS_STEP + 2;
    let height = base_max_y + routing::MAX_BOUNDS_STEP + 2;
    let mut router = Router::new(stride, height);
    for (&cell, _) in grid.iter() {
        if cell.x >= 0 && cell.y >= 0 {
            router.astar.block(cell.x as usize + cell.y as usize * stride);
        }
    }

    let mut routes = Vec::with_capacity(edges.len());
    let mut label_lines: Vec<Option<(GridCoord, GridCoord)>> = vec![None; edges.len()];
    let mut placed_labels: Vec<PlacedLabel> = Vec::new();
    let mut complete = true;

    for (edge_idx, edge) in edges.iter().enumerate() {
        let result = router.route_edge(&RouteRequest {
            from_coord: coords[edge.from],
            to_coord: coords[edge.to],
            from_id: edge.from as u32 + 1,
            to_id: edge.to as u32 + 1,
            direction,
            base_bounds: (base_max_x, base_max_y),
        });

        if result.path.len() < 2 {
            complete = false;
            if !is_last_margin {
                routes.push(result);
                break;
            }
            routes.push(result);
            continue;
        }

        // Paths may run through columns and rows no node sized; give those a
        // default so the projection does not collapse them to zero width.
        for coord in &result.path {
            column_width.entry(coord.x).or_insert(config.padding_x / 2);
            row_height.entry(coord.y).or_insert(config.padding_y / 2);
        }

        if let Some(label) = &edge.label {
            let label_width = str_width(label) as i32;
            if label_width > 0 {
                if let Some((line, footprint)) = determine_label_line(
                    &result.path,
                    label_width,
                    &column_width,
                    &placed_labels,
                    &coords,
                ) {
                    let mid = label_placement::label_line_mid_column(line);
                    // A border column must stay width 1 or ports shear off
                    // their boxes; the label then overhangs instead.
                    if !label_placement::is_border_column(mid, &coords) {
                        let entry = column_width.entry(mid).or_insert(0);
                        *entry = (*entry).max(label_width + 2);
                    }
                    placed_labels.push(footprint);
                    label_lines[edge_idx] = Some(line);
                }
            }
        }

        routes.push(result);
    }
    routes.resize_with(edges.len(), RouteResult::unroutable);

    Attempt {
        coords,
        column_width,
        row_height,
        routes,
        label_lines,
        complete,
    }
}

/// Seats every node on the grid: roots first, then children level by level,
/// stranded nodes (cycles unreachable from any root) promoted to fresh
/// roots. Collisions shift perpendicular to the graph direction in steps of
/// four so each 3×3 block keeps a free lane around it.
fn place_nodes(
    direction: Direction,
    margin: i32,
    edges: &[ResolvedEdge],
    subgraph_of: &[Option<usize>],
    grid: &mut HashMap<GridCoord, usize>,
    coords: &mut [Option<GridCoord>],
) {
    let node_count = coords.len();
    let lr = direction == Direction::LeftRight;

    let mut has_incoming = vec![false; node_count];
    for edge in edges {
        has_incoming[edge.to] = true;
    }
    let roots: Vec<usize> = if has_incoming.iter().all(|&targeted| targeted) {
        (0..node_count).collect()
    } else {
        (0..node_count).filter(|&idx| !has_incoming[idx]).collect()
    };

    let children_of = |idx: usize| -> Vec<usize> {
        edges
            .iter()
            .filter(|edge| edge.from == idx)
            .map(|edge| edge.to)
            .collect()
    };

    // Under LR, subgraph-internal roots with children start one level in so
    // the subgraph border has room to its left.
    let mut external_roots = Vec::new();
    let mut subgraph_roots = Vec::new();
    let has_external = roots.iter().any(|&idx| subgraph_of[idx].is_none());
    let has_subgraph_with_children = roots
        .iter()
        .any(|&idx| subgraph_of[idx].is_some() && !children_of(idx).is_empty());
    if lr && has_external && has_subgraph_with_children {
        for &idx in &roots {
            if subgraph_of[idx].is_some() {
                subgraph_roots.push(idx);
            } else {
                external_roots.push(idx);
            }
        }
    } else {
        external_roots = roots;
    }

    let mut highest: HashMap<i32, i32> = HashMap::new();
    let mut queue: VecDeque<usize> = VecDeque::new();

    let mut place = |level: i32,
                     node: usize,
                     grid: &mut HashMap<GridCoord, usize>,
                     coords: &mut [Option<GridCoord>],
                     highest: &mut HashMap<i32, i32>| {
        let perpendicular = *highest.entry(level).or_insert(margin);
        let requested = if lr {
            GridCoord::new(level, perpendicular)
        } else {
            GridCoord::new(perpendicular, level)
        };
        let reserved = reserve_spot(grid, lr, node, requested);
        coords[node] = Some(reserved);
        let seated = if lr { reserved.y } else { reserved.x };
        highest.insert(level, seated + 4);
    };

    for &idx in &external_roots {
        place(margin, idx, grid, coords, &mut highest);
        queue.push_back(idx);
    }
    for &idx in &subgraph_roots {
        place(margin + 4, idx, grid, coords, &mut highest);
        queue.push_back(idx);
    }

    loop {
        while let Some(idx) = queue.pop_front() {
            let coord = coords[idx].expect("queued nodes are placed");
            let child_level = if lr { coord.x + 4 } else { coord.y + 4 };
            for child in children_of(idx) {
                if coords[child].is_some() {
                    continue;
                }
                place(child_level, child, grid, coords, &mut highest);
                queue.push_back(child);
            }
        }
        // Cycles not reachable from any root get seated as fresh roots.
        match coords.iter().position(|coord| coord.is_none()) {
            Some(idx) => {
                place(margin, idx, grid, coords, &mut highest);
                queue.push_back(idx);
            }
            None => break,
        }
    }
}

fn reserve_spot(
    grid: &mut HashMap<GridCoord, usize>,
    lr: bool,
    node: usize,
    requested: GridCoord,
) -> GridCoord {
    let mut coord = requested;
    while grid.contains_key(&coord) {
        coord = if lr {
            GridCoord::new(coord.x, coord.y + 4)
        } else {
            GridCoord::new(coord.x + 4, coord.y)
        };
    }
    for dx in 0..3 {
        for dy in 0..3 {
            grid.insert(GridCoord::new(coord.x + dx, coord.y + dy), node);
        }
    }
    coord
}

#[allow(clippy::too_many_arguments)]
fn size_node(
    idx: usize,
    coord: GridCoord,
    labels: &[String],
    edges: &[ResolvedEdge],
    subgraph_of: &[Option<usize>],
    coords: &[GridCoord],
    config: &LayoutConfig,
    column_width: &mut BTreeMap<i32, i32>,
    row_height: &mut BTreeMap<i32, i32>,
) {
    let label_width = str_width(&labels[idx]) as i32;
    let cols = [1, 2 * config.box_border_padding + label_width, 1];
    let rows = [1, 1 + 2 * config.box_border_padding, 1];

    for (offset, &width) in cols.iter().enumerate() {
        let entry = column_width.entry(coord.x + offset as i32).or_insert(0);
        *entry = (*entry).max(width);
    }
    for (offset, &height) in rows.iter().enumerate() {
        let entry = row_height.entry(coord.y + offset as i32).or_insert(0);
        *entry = (*entry).max(height);
    }

    if coord.x > 0 {
        let entry = column_width.entry(coord.x - 1).or_insert(0);
        *entry = (*entry).max(config.padding_x);
    }
    if coord.y > 0 {
        let mut padding = config.padding_y;
        if incoming_from_outside_subgraph(idx, edges, subgraph_of, coords) {
            padding += SUBGRAPH_INCOMING_OVERHEAD;
        }
        let entry = row_height.entry(coord.y - 1).or_insert(0);
        *entry = (*entry).max(padding);
    }
}

/// True for the topmost node of a subgraph that is targeted from outside it;
/// that node's row gets extra headroom so entering edges clear the border.
fn incoming_from_outside_subgraph(
    idx: usize,
    edges: &[ResolvedEdge],
    subgraph_of: &[Option<usize>],
    coords: &[GridCoord],
) -> bool {
    let Some(own) = subgraph_of[idx] else {
        return false;
    };
    let external = |node: usize| -> bool {
        edges
            .iter()
            .any(|edge| edge.to == node && subgraph_of[edge.from] != Some(own))
    };
    if !external(idx) {
        return false;
    }
    for (other, membership) in subgraph_of.iter().enumerate() {
        if other == idx || *membership != Some(own) {
            continue;
        }
        if external(other) && coords[other].y < coords[idx].y {
            return false;
        }
    }
    true
}

fn finish_layout(
    graph: &Graph,
    ids: Vec<String>,
    labels: Vec<String>,
    edges: Vec<ResolvedEdge>,
    attempt: Attempt,
) -> Layout {
    let Attempt {
        coords,
        column_width,
        row_height,
        routes,
        label_lines,
        ..
    } = attempt;

    let no_offset = (0, 0);
    let mut nodes: Vec<NodeLayout> = ids
        .into_iter()
        .zip(labels)
        .zip(coords.iter())
        .map(|((id, label), &grid)| {
            let drawing = project_with(&column_width, &row_height, grid, no_offset);
            let box_width = (0..2)
                .map(|i| column_width.get(&(grid.x + i)).copied().unwrap_or(0))
                .sum();
            let box_height = (0..2)
                .map(|i| row_height.get(&(grid.y + i)).copied().unwrap_or(0))
                .sum();
            NodeLayout {
                id,
                label,
                grid,
                drawing,
                box_width,
                box_height,
            }
        })
        .collect();

    let edges: Vec<EdgeLayout> = edges
        .into_iter()
        .zip(routes)
        .zip(label_lines)
        .map(|((edge, route), label_line)| EdgeLayout {
            from: edge.from,
            to: edge.to,
            label: edge.label,
            path: route.path,
            label_line,
            start_dir: route.start_dir,
            end_dir: route.end_dir,
            directed: edge.directed,
            arrow_start: edge.arrow_start,
            arrow_end: edge.arrow_end,
        })
        .collect();

    let index_by_id: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| (node.id.clone(), idx))
        .collect();
    let mut subgraphs: Vec<SubgraphLayout> = graph
        .subgraphs
        .iter()
        .map(|subgraph| SubgraphLayout {
            label: subgraph.label.clone(),
            nodes: subgraph
                .nodes
                .iter()
                .filter_map(|id| index_by_id.get(id).copied())
                .collect(),
            parent: subgraph.parent,
            depth: 0,
            min_x: 0,
            min_y: 0,
            max_x: -1,
            max_y: -1,
        })
        .collect();
    for idx in 0..subgraphs.len() {
        subgraphs[idx].depth = subgraph_depth(&subgraphs, idx);
    }
    compute_subgraph_boxes(graph, &nodes, &mut subgraphs);
    ensure_subgraph_spacing(&mut subgraphs);

    // Subgraph padding can reach above or left of the origin; shift the
    // whole drawing back into the first quadrant.
    let mut offset_x = 0;
    let mut offset_y = 0;
    for subgraph in subgraphs.iter().filter(|sg| !sg.nodes.is_empty()) {
        offset_x = offset_x.max(-subgraph.min_x);
        offset_y = offset_y.max(-subgraph.min_y);
    }
    if offset_x > 0 || offset_y > 0 {
        for node in &mut nodes {
            node.drawing.x += offset_x;
            node.drawing.y += offset_y;
        }
        for subgraph in &mut subgraphs {
            subgraph.min_x += offset_x;
            subgraph.min_y += offset_y;
            subgraph.max_x += offset_x;
            subgraph.max_y += offset_y;
        }
    }

    let total_x: i32 = column_width.values().sum();
    let total_y: i32 = row_height.values().sum();
    let mut width = total_x - 1 + offset_x;
    let mut height = total_y - 1 + offset_y;
    for subgraph in subgraphs.iter().filter(|sg| !sg.nodes.is_empty()) {
        width = width.max(subgraph.max_x);
        height = height.max(subgraph.max_y);
    }

    Layout {
        direction: graph.direction,
        flip_vertical: graph.flip_vertical,
        nodes,
        edges,
        subgraphs,
        column_width,
        row_height,
        offset_x,
        offset_y,
        width,
        height,
    }
}

fn subgraph_depth(subgraphs: &[SubgraphLayout], idx: usize) -> usize {
    let mut depth = 0;
    let mut cursor = subgraphs[idx].parent;
    while let Some(parent) = cursor {
        depth += 1;
        cursor = subgraphs[parent].parent;
    }
    depth
}

fn compute_subgraph_boxes(graph: &Graph, nodes: &[NodeLayout], subgraphs: &mut [SubgraphLayout]) {
    // Deepest first so parents can absorb their children's boxes.
    let mut order: Vec<usize> = (0..subgraphs.len()).collect();
    order.sort_by_key(|&idx| std::cmp::Reverse(subgraphs[idx].depth));

    for idx in order {
        if subgraphs[idx].nodes.is_empty() && graph.subgraphs[idx].children.is_empty() {
            continue;
        }
        let mut min_x = i32::MAX;
        let mut min_y = i32::MAX;
        let mut max_x = i32::MIN;
        let mut max_y = i32::MIN;

        for &child in &graph.subgraphs[idx].children {
            let child_box = &subgraphs[child];
            if child_box.max_x < child_box.min_x {
                continue;
            }
            min_x = min_x.min(child_box.min_x);
            min_y = min_y.min(child_box.min_y);
            max_x = max_x.max(child_box.max_x);
            max_y = max_y.max(child_box.max_y);
        }
        for &node_idx in &subgraphs[idx].nodes {
            let node = &nodes[node_idx];
            min_x = min_x.min(node.drawing.x);
            min_y = min_y.min(node.drawing.y);
            max_x = max_x.max(node.drawing.x + node.box_width);
            max_y = max_y.max(node.drawing.y + node.box_height);
        }
        if min_x == i32::MAX {
            continue;
        }
        subgraphs[idx].min_x = min_x - SUBGRAPH_PADDING;
        subgraphs[idx].min_y = min_y - SUBGRAPH_PADDING - SUBGRAPH_LABEL_SPACE;
        subgraphs[idx].max_x = max_x + SUBGRAPH_PADDING;
        subgraphs[idx].max_y = max_y + SUBGRAPH_PADDING;
    }
}

/// Pushes apart sibling root subgraphs whose padded boxes ended up touching.
fn ensure_subgraph_spacing(subgraphs: &mut [SubgraphLayout]) {
    const MIN_SPACING: i32 = 1;
    let roots: Vec<usize> = (0..subgraphs.len())
        .filter(|&idx| subgraphs[idx].parent.is_none() && !subgraphs[idx].nodes.is_empty())
        .collect();

    for i in 0..roots.len() {
        for j in (i + 1)..roots.len() {
            let (a, b) = (roots[i], roots[j]);
            let (first, second) = if a < b {
                let (left, right) = subgraphs.split_at_mut(b);
                (&mut left[a], &mut right[0])
            } else {
                let (left, right) = subgraphs.split_at_mut(a);
                (&mut right[0], &mut left[b])
            };

            let x_overlap = first.min_x < second.max_x && first.max_x > second.min_x;
            let y_overlap = first.min_y < second.max_y && first.max_y > second.min_y;
            if x_overlap {
                if first.max_y >= second.min_y - MIN_SPACING && first.min_y < second.min_y {
                    second.min_y = first.max_y + MIN_SPACING + 1;
                } else if second.max_y >= first.min_y - MIN_SPACING && second.min_y < first.min_y {
                    first.min_y = second.max_y + MIN_SPACING + 1;
                }
            }
            if y_overlap {
                if first.max_x >= second.min_x - MIN_SPACING && first.min_x < second.min_x {
                    second.min_x = first.max_x + MIN_SPACING + 1;
                } else if second.max_x >= first.min_x - MIN_SPACING && second.min_x < first.min_x {
                    first.min_x = second.max_x + MIN_SPACING + 1;
                }
            }
        }
    }
}
