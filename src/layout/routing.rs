//! Per-edge routing: port selection, a layered retry ladder over the strict
//! pathfinder, deterministic self-loops, and usage recording.

use crate::ir::Direction;

use super::astar::{merge_path_idx, strict_step_allowed, AStarContext, Bounds, StrictConstraints};
use super::types::{
    direction_between, Dir, GridCoord, DOWN, LEFT, RIGHT, UP, UPPER_LEFT, UPPER_RIGHT,
    LOWER_LEFT, LOWER_RIGHT,
};
use super::usage::{SegmentUsage, UsedPointSet};

/// Bounds expansion schedules. The fast ladder keeps the common case cheap;
/// the full ladder is the last word before an edge is declared unroutable.
const FAST_BOUNDS_STEPS: [usize; 3] = [12, 24, 48];
const FULL_BOUNDS_STEPS: [usize; 6] = [12, 24, 48, 96, 192, 384];
/// Largest bounds expansion any search may use; grids are allocated to it.
pub const MAX_BOUNDS_STEP: usize = 384;

/// Diagonal ports hug node corners and compose badly; strongly disfavoured.
const DIAGONAL_PORT_PENALTY: i32 = 100;
/// Ports pinned to the canvas edge overdraw borders and confuse the reverse
/// parser; disfavoured almost as strongly.
const BOUNDARY_PORT_PENALTY: i32 = 200;

/// Largest rectangular excursion tried for a self-loop.
const SELF_LOOP_MAX_CLEARANCE: i32 = 12;

#[derive(Debug, Clone)]
pub struct RouteResult {
    /// Merged grid path `[endpoint, turn, …, endpoint]`; empty when the edge
    /// proved unroutable.
    pub path: Vec<GridCoord>,
    pub start_dir: Dir,
    pub end_dir: Dir,
}

impl RouteResult {
    pub(crate) fn unroutable() -> Self {
        Self {
            path: Vec::new(),
            start_dir: RIGHT,
            end_dir: LEFT,
        }
    }
}

pub struct RouteRequest {
    pub from_coord: GridCoord,
    pub to_coord: GridCoord,
    /// Endpoint ids, node index + 1.
    pub from_id: u32,
    pub to_id: u32,
    pub direction: Direction,
    /// Maximum grid coordinates covered by node blocks; search bounds grow
    /// outward from here.
    pub base_bounds: (usize, usize),
}

/// Owns the per-attempt search state: the A* context plus both usage tables.
/// Discarded (or reset) when the layout-margin loop retries.
pub struct Router {
    pub astar: AStarContext,
    pub segments: SegmentUsage,
    pub used_points: UsedPointSet,
}

impl Router {
    pub fn new(stride: usize, height: usize) -> Self {
        let astar = AStarContext::new(stride, height);
        let cells = astar.cell_count();
        Self {
            astar,
            segments: SegmentUsage::new(cells),
            used_points: UsedPointSet::new(cells),
        }
    }

    fn cell_index(&self, coord: GridCoord) -> u32 {
        (coord.x as usize + coord.y as usize * self.astar.stride()) as u32
    }

    fn in_grid(&self, coord: GridCoord) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && (coord.x as usize) < self.astar.stride()
            && (coord.y as usize) < self.astar.height()
    }

    /// Routes one edge, consulting and then updating the usage tables. The
    /// returned path is empty when every candidate and bounds expansion
    /// failed; the caller decides whether that aborts the layout attempt.
    pub fn route_edge(&mut self, req: &RouteRequest) -> RouteResult {
        if req.from_coord == req.to_coord {
            return self.route_self_loop(req);
        }

        let (preferred, alternative) =
            determine_start_and_end_dirs(req.direction, req.from_coord, req.to_coord);

        let base = dedup_pairs(&[preferred, alternative]);
        let start_set = dedup_dirs(&[preferred.0, alternative.0, RIGHT, LEFT, DOWN, UP]);
        let end_base = dedup_dirs(&[preferred.1, alternative.1]);
        let end_set = dedup_dirs(&[preferred.1, alternative.1, RIGHT, LEFT, DOWN, UP]);
        let start_expanded = cartesian(&start_set, &end_base);
        let all_expanded = cartesian(&start_set, &end_set);

        let phases: [(&[(Dir, Dir)], &[usize]); 6] = [
            (&base, &FAST_BOUNDS_STEPS),
            (&start_expanded, &FAST_BOUNDS_STEPS),
            (&all_expanded, &FAST_BOUNDS_STEPS),
            (&base, &FULL_BOUNDS_STEPS),
            (&start_expanded, &FULL_BOUNDS_STEPS),
            (&all_expanded, &FULL_BOUNDS_STEPS),
        ];

        for (candidates, steps) in phases {
            for &step in steps {
                let bounds = Bounds {
                    max_x: req.base_bounds.0 + step,
                    max_y: req.base_bounds.1 + step,
                };
                if let Some(result) = self.try_candidates(req, candidates, bounds) {
                    return result;
                }
            }
        }

        RouteResult::unroutable()
    }

    fn try_candidates(
        &mut self,
        req: &RouteRequest,
        candidates: &[(Dir, Dir)],
        bounds: Bounds,
    ) -> Option<RouteResult> {
        let stride = self.astar.stride();
        let mut best: Option<(i32, Vec<u32>, Vec<u32>, (Dir, Dir))> = None;

        for &(start_dir, end_dir) in candidates {
            let from = req.from_coord.port(start_dir);
            let to = req.to_coord.port(end_dir);
            if from == to || !self.in_grid(from) || !self.in_grid(to) {
                continue;
            }
            let from_idx = self.cell_index(from);
            let to_idx = self.cell_index(to);
            let strict = StrictConstraints {
                used_points: &self.used_points,
                segments: &self.segments,
                route_from: from_idx,
                route_to: to_idx,
                edge_from_id: req.from_id,
                edge_to_id: req.to_id,
            };
            let Some(raw) = self.astar.get_path_strict(from_idx, to_idx, bounds, &strict) else {
                continue;
            };
            let merged = merge_path_idx(&raw, stride);
            let cost = merged.len() as i32
                + port_penalty(start_dir, from)
                + port_penalty(end_dir, to);
            if best.as_ref().map_or(true, |(best_cost, ..)| cost < *best_cost) {
                best = Some((cost, raw, merged, (start_dir, end_dir)));
            }
        }

        let (_, raw, merged, (start_dir, end_dir)) = best?;
        self.record(&raw, req.from_id, req.to_id);
        Some(RouteResult {
            path: self.to_coords(&merged),
            start_dir,
            end_dir,
        })
    }

    /// A self-edge skips the pathfinder: a canned rectangular excursion is
    /// cheaper than letting the strict search hunt for a satisfying loop.
    /// Clearance grows until the loop composes cleanly.
    fn route_self_loop(&mut self, req: &RouteRequest) -> RouteResult {
        let node = req.from_coord;
        let ((start_dir, end_dir), _) = self_reference_dirs(req.direction);

        for clearance in 1..=SELF_LOOP_MAX_CLEARANCE {
            let corners = match req.direction {
                Direction::LeftRight => [
                    node.port(RIGHT),
                    GridCoord::new(node.x + 2 + clearance, node.y + 1),
                    GridCoord::new(node.x + 2 + clearance, node.y + 2 + clearance),
                    GridCoord::new(node.x + 1, node.y + 2 + clearance),
                    node.port(DOWN),
                ],
                Direction::TopDown => [
                    node.port(DOWN),
                    GridCoord::new(node.x + 1, node.y + 2 + clearance),
                    GridCoord::new(node.x + 2 + clearance, node.y + 2 + clearance),
                    GridCoord::new(node.x + 2 + clearance, node.y + 1),
                    node.port(RIGHT),
                ],
            };
            if !corners.iter().all(|&coord| self.in_grid(coord)) {
                continue;
            }
            let raw = self.expand_to_units(&corners);
            let interior_free = raw[1..raw.len() - 1]
                .iter()
                .all(|&idx| self.astar.blocked[idx as usize] == 0);
            if !interior_free {
                continue;
            }
            let strict = StrictConstraints {
                used_points: &self.used_points,
                segments: &self.segments,
                route_from: raw[0],
                route_to: *raw.last().unwrap(),
                edge_from_id: req.from_id,
                edge_to_id: req.to_id,
            };
            let stride = self.astar.stride();
            let clean = raw
                .windows(2)
                .all(|w| strict_step_allowed(&strict, w[0] as usize, w[1] as usize, stride));
            if !clean {
                continue;
            }
            self.record(&raw, req.from_id, req.to_id);
            return RouteResult {
                path: corners.to_vec(),
                start_dir,
                end_dir,
            };
        }

        RouteResult::unroutable()
    }

    fn record(&mut self, raw: &[u32], from_id: u32, to_id: u32) {
        self.segments.record_path(raw, from_id, to_id);
        self.used_points
            .record_path(raw, self.astar.stride(), &self.astar.blocked);
    }

    fn to_coords(&self, idxs: &[u32]) -> Vec<GridCoord> {
        let stride = self.astar.stride();
        idxs.iter()
            .map(|&idx| {
                let y = idx as usize / stride;
                let x = idx as usize - y * stride;
                GridCoord::new(x as i32, y as i32)
            })
            .collect()
    }

    /// Expands a corner list into the raw unit-step index path.
    fn expand_to_units(&self, corners: &[GridCoord]) -> Vec<u32> {
        let mut raw = vec![self.cell_index(corners[0])];
        for pair in corners.windows(2) {
            let (mut cur, target) = (pair[0], pair[1]);
            let step_x = (target.x - cur.x).signum();
            let step_y = (target.y - cur.y).signum();
            while cur != target {
                cur = GridCoord::new(cur.x + step_x, cur.y + step_y);
                raw.push(self.cell_index(cur));
            }
        }
        raw
    }
}

fn port_penalty(dir: Dir, port: GridCoord) -> i32 {
    let mut penalty = 0;
    if dir.is_diagonal() {
        penalty += DIAGONAL_PORT_PENALTY;
    }
    if port.x == 0 || port.y == 0 {
        penalty += BOUNDARY_PORT_PENALTY;
    }
    penalty
}

fn dedup_dirs(dirs: &[Dir]) -> Vec<Dir> {
    let mut out: Vec<Dir> = Vec::new();
    for &dir in dirs {
        if !out.contains(&dir) {
            out.push(dir);
        }
    }
    out
}

fn dedup_pairs(pairs: &[(Dir, Dir)]) -> Vec<(Dir, Dir)> {
    let mut out: Vec<(Dir, Dir)> = Vec::new();
    for &pair in pairs {
        if !out.contains(&pair) {
            out.push(pair);
        }
    }
    out
}

fn cartesian(starts: &[Dir], ends: &[Dir]) -> Vec<(Dir, Dir)> {
    let mut out = Vec::with_capacity(starts.len() * ends.len());
    for &start in starts {
        for &end in ends {
            out.push((start, end));
        }
    }
    out
}

/// Preferred and alternative (start, end) port pairs for the vector between
/// two placed nodes, one table entry per octant and graph direction.
pub fn determine_start_and_end_dirs(
    direction: Direction,
    from: GridCoord,
    to: GridCoord,
) -> ((Dir, Dir), (Dir, Dir)) {
    let octant = direction_between((from.x, from.y), (to.x, to.y));
    let lr = direction == Direction::LeftRight;
    let is_backwards = if lr {
        octant == LEFT || octant == UPPER_LEFT || octant == LOWER_LEFT
    } else {
        octant == UP || octant == UPPER_LEFT || octant == UPPER_RIGHT
    };

    match octant {
        d if d == LOWER_RIGHT => {
            if lr {
                ((DOWN, LEFT), (RIGHT, UP))
            } else {
                ((RIGHT, UP), (DOWN, LEFT))
            }
        }
        d if d == UPPER_RIGHT => {
            if lr {
                ((UP, LEFT), (RIGHT, DOWN))
            } else {
                ((RIGHT, DOWN), (UP, LEFT))
            }
        }
        d if d == LOWER_LEFT => {
            if lr {
                ((DOWN, DOWN), (LEFT, UP))
            } else {
                ((LEFT, UP), (DOWN, RIGHT))
            }
        }
        d if d == UPPER_LEFT => {
            if lr {
                ((DOWN, DOWN), (LEFT, DOWN))
            } else {
                ((RIGHT, RIGHT), (UP, RIGHT))
            }
        }
        d => {
            if is_backwards {
                if lr && d == LEFT {
                    ((DOWN, DOWN), (LEFT, RIGHT))
                } else if !lr && d == UP {
                    ((RIGHT, RIGHT), (UP, DOWN))
                } else {
                    ((d, d.opposite()), (d, d.opposite()))
                }
            } else {
                ((d, d.opposite()), (d, d.opposite()))
            }
        }
    }
}

/// Canned port pair for self-references.
pub fn self_reference_dirs(direction: Direction) -> ((Dir, Dir), (Dir, Dir)) {
    match direction {
        Direction::LeftRight => ((RIGHT, DOWN), (DOWN, RIGHT)),
        Direction::TopDown => ((DOWN, RIGHT), (RIGHT, DOWN)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(x: i32, y: i32) -> GridCoord {
        GridCoord::new(x, y)
    }

    fn router_with_nodes(nodes: &[GridCoord]) -> Router {
        let mut router = Router::new(64, 64);
        for node in nodes {
            for dx in 0..3 {
                for dy in 0..3 {
                    let idx = (node.x + dx) as usize + (node.y + dy) as usize * 64;
                    router.astar.block(idx);
                }
            }
        }
        router
    }

    #[test]
    fn forward_edge_routes_straight() {
        let mut router = router_with_nodes(&[grid(0, 0), grid(4, 0)]);
        let result = router.route_edge(&RouteRequest {
            from_coord: grid(0, 0),
            to_coord: grid(4, 0),
            from_id: 1,
            to_id: 2,
            direction: Direction::LeftRight,
            base_bounds: (6, 2),
        });
        assert_eq!(result.start_dir, RIGHT);
        assert_eq!(result.end_dir, LEFT);
        assert_eq!(result.path, vec![grid(2, 1), grid(4, 1)]);
    }

    #[test]
    fn direction_table_prefers_down_for_lower_right_in_lr() {
        let (preferred, alternative) =
            determine_start_and_end_dirs(Direction::LeftRight, grid(0, 0), grid(4, 4));
        assert_eq!(preferred, (DOWN, LEFT));
        assert_eq!(alternative, (RIGHT, UP));
    }

    #[test]
    fn backward_edge_in_lr_leaves_downward() {
        let (preferred, _) =
            determine_start_and_end_dirs(Direction::LeftRight, grid(4, 0), grid(0, 0));
        assert_eq!(preferred, (DOWN, DOWN));
    }

    #[test]
    fn self_loop_is_rectangular_and_leaves_the_box() {
        let mut router = router_with_nodes(&[grid(0, 0)]);
        let result = router.route_edge(&RouteRequest {
            from_coord: grid(0, 0),
            to_coord: grid(0, 0),
            from_id: 1,
            to_id: 1,
            direction: Direction::LeftRight,
            base_bounds: (2, 2),
        });
        // Four merged segments: out right, down, back left, up into the
        // bottom port.
        assert_eq!(result.path.len(), 5);
        assert_eq!(result.path[0], grid(2, 1));
        assert_eq!(*result.path.last().unwrap(), grid(1, 2));
        assert_eq!(result.start_dir, RIGHT);
        assert_eq!(result.end_dir, DOWN);
    }

    #[test]
    fn second_self_loop_widens_its_clearance() {
        let mut router = router_with_nodes(&[grid(0, 0)]);
        let req = RouteRequest {
            from_coord: grid(0, 0),
            to_coord: grid(0, 0),
            from_id: 1,
            to_id: 1,
            direction: Direction::LeftRight,
            base_bounds: (2, 2),
        };
        let first = router.route_edge(&req);
        let second = router.route_edge(&req);
        assert!(!second.path.is_empty());
        assert_ne!(first.path, second.path);
    }

    #[test]
    fn parallel_edges_may_not_share_middle_segments() {
        let mut router = router_with_nodes(&[grid(0, 0), grid(8, 0)]);
        let req = RouteRequest {
            from_coord: grid(0, 0),
            to_coord: grid(8, 0),
            from_id: 1,
            to_id: 2,
            direction: Direction::LeftRight,
            base_bounds: (10, 2),
        };
        let first = router.route_edge(&req);
        assert_eq!(first.path, vec![grid(2, 1), grid(8, 1)]);
        // The straight trunk's interior is now a middle segment, so the
        // second edge has to bow around it.
        let second = router.route_edge(&req);
        assert!(!second.path.is_empty());
        assert_ne!(first.path, second.path);
        assert!(second.path.len() > 2);
    }
}
