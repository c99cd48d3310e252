//! Bounded 4-neighbour A* over the routing grid.
//!
//! One context lives per layout attempt and is reused across every search in
//! it: three parallel arrays are revalidated by a rolling stamp instead of
//! being cleared, so a search costs O(cells touched), not O(grid).

use once_cell::sync::OnceCell;

use super::usage::{segment_key, step_bits, SegmentUsage, UsedPointSet};

/// Inclusive search bounds. Cells beyond them are never expanded, which is
/// how the router's staged widening keeps early attempts cheap.
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub max_x: usize,
    pub max_y: usize,
}

/// Inputs of a strict search on top of the blocked bitmap.
pub struct StrictConstraints<'a> {
    pub used_points: &'a UsedPointSet,
    pub segments: &'a SegmentUsage,
    /// Port indices of the edge being routed; sharing exemptions apply only
    /// to the step leaving `route_from` and the step entering `route_to`.
    pub route_from: u32,
    pub route_to: u32,
    /// Endpoint ids (node index + 1) of the edge being routed.
    pub edge_from_id: u32,
    pub edge_to_id: u32,
}

/// Binary min-heap over (priority, cost) kept as parallel vectors; popping
/// returns plain integers, so the hot loop never allocates. Strict `<`
/// comparisons keep insertion order among equal priorities.
#[derive(Debug, Default)]
struct MinHeap {
    idxs: Vec<u32>,
    priorities: Vec<u32>,
    costs: Vec<u32>,
}

impl MinHeap {
    fn clear(&mut self) {
        self.idxs.clear();
        self.priorities.clear();
        self.costs.clear();
    }

    fn push(&mut self, idx: u32, priority: u32, cost: u32) {
        self.idxs.push(idx);
        self.priorities.push(priority);
        self.costs.push(cost);
        self.bubble_up(self.idxs.len() - 1);
    }

    fn pop(&mut self) -> Option<(u32, u32)> {
        if self.idxs.is_empty() {
            return None;
        }
        let out = (self.idxs[0], self.costs[0]);
        let last = self.idxs.len() - 1;
        self.idxs.swap(0, last);
        self.priorities.swap(0, last);
        self.costs.swap(0, last);
        self.idxs.pop();
        self.priorities.pop();
        self.costs.pop();
        if !self.idxs.is_empty() {
            self.sink_down(0);
        }
        Some(out)
    }

    fn bubble_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) >> 1;
            if self.priorities[i] < self.priorities[parent] {
                self.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sink_down(&mut self, mut i: usize) {
        let len = self.idxs.len();
        loop {
            let mut smallest = i;
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            if left < len && self.priorities[left] < self.priorities[smallest] {
                smallest = left;
            }
            if right < len && self.priorities[right] < self.priorities[smallest] {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.idxs.swap(a, b);
        self.priorities.swap(a, b);
        self.costs.swap(a, b);
    }
}

pub struct AStarContext {
    stride: usize,
    height: usize,
    pub blocked: Vec<u8>,
    stamp: u32,
    cost_stamp: Vec<u32>,
    cost_so_far: Vec<u32>,
    came_from: Vec<i32>,
    heap: MinHeap,
}

impl AStarContext {
    pub fn new(stride: usize, height: usize) -> Self {
        let cells = stride * height;
        Self {
            stride,
            height,
            blocked: vec![0; cells],
            stamp: 0,
            cost_stamp: vec![0; cells],
            cost_so_far: vec![0; cells],
            came_from: vec![-1; cells],
            heap: MinHeap::default(),
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cell_count(&self) -> usize {
        self.stride * self.height
    }

    pub fn block(&mut self, idx: usize) {
        self.blocked[idx] = 1;
    }

    /// Next search epoch. 0 is the never-touched sentinel, so a wrap clears
    /// the stamp table and restarts at 1.
    fn next_stamp(&mut self) -> u32 {
        self.stamp = self.stamp.wrapping_add(1);
        if self.stamp == 0 {
            self.cost_stamp.fill(0);
            self.stamp = 1;
        }
        self.stamp
    }

    /// Shortest path from `from` to `to`, only blocked cells impassable.
    /// The target itself may be entered even when blocked, so searches can
    /// terminate on node borders. Returns cell indices from source to target
    /// inclusive, or `None` when the bounded search exhausts.
    pub fn get_path(&mut self, from: u32, to: u32, bounds: Bounds) -> Option<Vec<u32>> {
        if let Some(backend) = pathfinder_backend() {
            return backend.get_path(self.stride, self.height, &self.blocked, from, to, bounds);
        }
        self.search(from, to, bounds, None)
    }

    /// Strict search: additionally refuses steps that would compose a
    /// four-way crossing under `UsedPointSet` or violate the segment-sharing
    /// rules in `SegmentUsage`.
    pub fn get_path_strict(
        &mut self,
        from: u32,
        to: u32,
        bounds: Bounds,
        strict: &StrictConstraints<'_>,
    ) -> Option<Vec<u32>> {
        if let Some(backend) = pathfinder_backend() {
            return backend.get_path_strict(
                self.stride,
                self.height,
                &self.blocked,
                from,
                to,
                bounds,
                strict,
            );
        }
        self.search(from, to, bounds, Some(strict))
    }

    fn search(
        &mut self,
        from: u32,
        to: u32,
        bounds: Bounds,
        strict: Option<&StrictConstraints<'_>>,
    ) -> Option<Vec<u32>> {
        let cells = self.cell_count();
        let (from_idx, to_idx) = (from as usize, to as usize);
        if cells == 0 || from_idx >= cells || to_idx >= cells {
            return None;
        }
        let max_x = bounds.max_x.min(self.stride - 1);
        let max_y = bounds.max_y.min(self.height - 1);

        let stamp = self.next_stamp();
        self.heap.clear();
        self.cost_stamp[from_idx] = stamp;
        self.cost_so_far[from_idx] = 0;
        self.came_from[from_idx] = -1;
        self.heap.push(from, 0, 0);

        let to_y = to_idx / self.stride;
        let to_x = to_idx - to_y * self.stride;

        while let Some((current_u32, cost_at_push)) = self.heap.pop() {
            let current = current_u32 as usize;
            // Stale entries superseded by a cheaper discovery.
            if self.cost_stamp[current] != stamp || cost_at_push != self.cost_so_far[current] {
                continue;
            }
            if current == to_idx {
                return Some(self.reconstruct(current_u32));
            }

            let cost = self.cost_so_far[current];
            let cy = current / self.stride;
            let cx = current - cy * self.stride;

            // Expansion order right/left/down/up; with strict `<` heap
            // comparisons this fixes tie-breaking.
            for step in 0..4usize {
                let next = match step {
                    0 if cx < max_x => current + 1,
                    1 if cx > 0 => current - 1,
                    2 if cy < max_y => current + self.stride,
                    3 if cy > 0 => current - self.stride,
                    _ => continue,
                };
                if self.blocked[next] != 0 && next != to_idx {
                    continue;
                }
                if let Some(strict) = strict {
                    if !strict_step_allowed(strict, current, next, self.stride) {
                        continue;
                    }
                }
                let new_cost = cost + 1;
                if self.cost_stamp[next] == stamp && new_cost >= self.cost_so_far[next] {
                    continue;
                }
                self.cost_stamp[next] = stamp;
                self.cost_so_far[next] = new_cost;
                self.came_from[next] = current_u32 as i32;

                let ny = next / self.stride;
                let nx = next - ny * self.stride;
                let dx = nx.abs_diff(to_x) as u32;
                let dy = ny.abs_diff(to_y) as u32;
                // Manhattan distance with a +1 off-axis bias toward
                // straight-line completion.
                let h = dx + dy + u32::from(dx != 0 && dy != 0);
                self.heap.push(next as u32, new_cost + h, new_cost);
            }
        }

        None
    }

    fn reconstruct(&self, mut current: u32) -> Vec<u32> {
        let mut path = Vec::new();
        loop {
            path.push(current);
            let parent = self.came_from[current as usize];
            if parent < 0 {
                break;
            }
            current = parent as u32;
        }
        path.reverse();
        path
    }
}

/// Per-step strict admission: the four-way crossing ban, then the
/// segment-sharing rule. Shared segments are only legal as the routed edge's
/// start step over segments whose sole start sharer is the same source, as
/// its end step over segments whose sole end sharer is the same target, or
/// as both for endpoint-adjacent edges; middle segments are never shared.
#[inline]
pub(super) fn strict_step_allowed(
    strict: &StrictConstraints<'_>,
    from: usize,
    to: usize,
    stride: usize,
) -> bool {
    let (from_bit, to_bit) = step_bits(from, to, stride);
    let from_mask = strict.used_points.mask(from);
    if from_mask != 0 && UsedPointSet::would_cross(from_mask, from_bit) {
        return false;
    }
    let to_mask = strict.used_points.mask(to);
    if to_mask != 0 && UsedPointSet::would_cross(to_mask, to_bit) {
        return false;
    }

    let key = segment_key(from, to);
    let segments = strict.segments;
    if !segments.used(key) {
        return true;
    }
    if segments.used_as_middle(key) {
        return false;
    }

    let is_start_step = from as u32 == strict.route_from;
    let is_end_step = to as u32 == strict.route_to;
    let ss = segments.start_source(key);
    let et = segments.end_target(key);
    let ss_multi = segments.start_source_multi(key);
    let et_multi = segments.end_target_multi(key);

    if is_start_step && is_end_step {
        let start_ok = !ss_multi && (ss == 0 || ss == strict.edge_from_id);
        let end_ok = !et_multi && (et == 0 || et == strict.edge_to_id);
        return start_ok && end_ok;
    }
    if is_start_step {
        return !et_multi && et == 0 && !ss_multi && ss == strict.edge_from_id;
    }
    if is_end_step {
        return !ss_multi && ss == 0 && !et_multi && et == strict.edge_to_id;
    }
    false
}

/// Collapses collinear runs to `[endpoint, turn, …, turn, endpoint]`.
pub fn merge_path_idx(path: &[u32], stride: usize) -> Vec<u32> {
    if path.len() <= 2 {
        return path.to_vec();
    }
    let stride = stride as i64;
    let mut merged = vec![path[0]];
    for window in path.windows(3) {
        let (a, b, c) = (window[0] as i64, window[1] as i64, window[2] as i64);
        let prev_vertical = (b - a).abs() == stride;
        let next_vertical = (c - b).abs() == stride;
        let prev_sign = (b - a).signum();
        let next_sign = (c - b).signum();
        if prev_vertical != next_vertical || prev_sign != next_sign {
            merged.push(window[1]);
        }
    }
    merged.push(*path.last().unwrap());
    merged
}

/// Drop-in replacement contract for the strict pathfinder: a host may
/// register a native implementation at process start and every context in
/// the process will route through it. Falling back to the built-in search is
/// automatic when nothing is registered.
pub trait PathfinderBackend: Send + Sync {
    fn get_path(
        &self,
        stride: usize,
        height: usize,
        blocked: &[u8],
        from: u32,
        to: u32,
        bounds: Bounds,
    ) -> Option<Vec<u32>>;

    #[allow(clippy::too_many_arguments)]
    fn get_path_strict(
        &self,
        stride: usize,
        height: usize,
        blocked: &[u8],
        from: u32,
        to: u32,
        bounds: Bounds,
        strict: &StrictConstraints<'_>,
    ) -> Option<Vec<u32>>;
}

static PATHFINDER_BACKEND: OnceCell<Box<dyn PathfinderBackend>> = OnceCell::new();

/// Installs a process-wide pathfinder backend. Returns false if one was
/// already registered.
pub fn register_pathfinder_backend(backend: Box<dyn PathfinderBackend>) -> bool {
    PATHFINDER_BACKEND.set(backend).is_ok()
}

fn pathfinder_backend() -> Option<&'static (dyn PathfinderBackend + 'static)> {
    PATHFINDER_BACKEND.get().map(|backend| backend.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(max_x: usize, max_y: usize) -> Bounds {
        Bounds { max_x, max_y }
    }

    fn idx(x: usize, y: usize, stride: usize) -> u32 {
        (x + y * stride) as u32
    }

    #[test]
    fn straight_path_on_empty_grid() {
        let mut ctx = AStarContext::new(10, 10);
        let path = ctx.get_path(idx(1, 1, 10), idx(5, 1, 10), bounds(9, 9)).unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(path[0], idx(1, 1, 10));
        assert_eq!(*path.last().unwrap(), idx(5, 1, 10));
    }

    #[test]
    fn blocked_cells_force_a_detour_but_target_is_enterable() {
        let mut ctx = AStarContext::new(10, 10);
        // Wall at (3,0)..(3,2).
        for y in 0..3 {
            ctx.block(3 + y * 10);
        }
        let path = ctx.get_path(idx(1, 1, 10), idx(5, 1, 10), bounds(9, 9)).unwrap();
        assert!(path.len() > 5);
        assert!(!path.contains(&idx(3, 1, 10)));

        // A blocked target is still reachable.
        ctx.block(idx(5, 1, 10) as usize);
        let path = ctx.get_path(idx(1, 1, 10), idx(5, 1, 10), bounds(9, 9)).unwrap();
        assert_eq!(*path.last().unwrap(), idx(5, 1, 10));
    }

    #[test]
    fn bounded_search_exhausts() {
        let mut ctx = AStarContext::new(20, 20);
        assert!(ctx.get_path(idx(0, 0, 20), idx(10, 0, 20), bounds(5, 5)).is_none());
    }

    #[test]
    fn context_is_reusable_across_searches() {
        let mut ctx = AStarContext::new(10, 10);
        for _ in 0..100 {
            assert!(ctx.get_path(idx(0, 0, 10), idx(9, 9, 10), bounds(9, 9)).is_some());
        }
    }

    #[test]
    fn merge_path_collapses_collinear_runs() {
        // (1,1) → (4,1) → (4,3) on stride 10.
        let raw = [11u32, 12, 13, 14, 24, 34];
        let merged = merge_path_idx(&raw, 10);
        assert_eq!(merged, vec![11, 14, 34]);
    }

    #[test]
    fn strict_permits_plain_crossings() {
        // Two perpendicular strokes may cross; only a fourth arm at an
        // already three-armed cell is refused.
        let stride = 10;
        let mut ctx = AStarContext::new(stride, 10);
        let mut points = UsedPointSet::new(100);
        let segments = SegmentUsage::new(100);
        let vertical: Vec<u32> = (0..5).map(|y| idx(3, y, stride)).collect();
        points.record_path(&vertical, stride, &ctx.blocked);

        let strict = StrictConstraints {
            used_points: &points,
            segments: &segments,
            route_from: idx(1, 2, stride),
            route_to: idx(6, 2, stride),
            edge_from_id: 1,
            edge_to_id: 2,
        };
        let path = ctx
            .get_path_strict(idx(1, 2, stride), idx(6, 2, stride), bounds(9, 9), &strict)
            .unwrap();
        assert!(path.contains(&idx(3, 2, stride)));
    }

    #[test]
    fn strict_refuses_completing_a_fourth_arm() {
        let stride = 10;
        let mut ctx = AStarContext::new(stride, 10);
        let mut points = UsedPointSet::new(100);
        let mut segments = SegmentUsage::new(100);
        // Horizontal stroke through (1,2)..(5,2) plus a vertical stub ending
        // at (3,2) leave that cell with three arms.
        let horizontal: Vec<u32> = (1..=5).map(|x| idx(x, 2, stride)).collect();
        points.record_path(&horizontal, stride, &ctx.blocked);
        segments.record_path(&horizontal, 1, 2);
        let stub: Vec<u32> = (0..=2).map(|y| idx(3, y, stride)).collect();
        points.record_path(&stub, stride, &ctx.blocked);
        segments.record_path(&stub, 3, 4);

        let strict = StrictConstraints {
            used_points: &points,
            segments: &segments,
            route_from: idx(3, 5, stride),
            route_to: idx(3, 0, stride),
            edge_from_id: 5,
            edge_to_id: 6,
        };
        let path = ctx
            .get_path_strict(idx(3, 5, stride), idx(3, 0, stride), bounds(9, 9), &strict)
            .unwrap();
        assert!(!path.contains(&idx(3, 2, stride)));
    }

    #[test]
    fn strict_allows_shared_start_segment_for_same_source() {
        let stride = 10;
        let mut ctx = AStarContext::new(stride, 10);
        let mut points = UsedPointSet::new(100);
        let mut segments = SegmentUsage::new(100);
        // First edge: (1,1) → (5,1), source id 3.
        let first: Vec<u32> = (1..=5).map(|x| idx(x, 1, stride)).collect();
        segments.record_path(&first, 3, 9);
        points.record_path(&first, stride, &ctx.blocked);

        // Same source may leave through the same first segment.
        let strict = StrictConstraints {
            used_points: &points,
            segments: &segments,
            route_from: idx(1, 1, stride),
            route_to: idx(2, 5, stride),
            edge_from_id: 3,
            edge_to_id: 4,
        };
        let path = ctx
            .get_path_strict(idx(1, 1, stride), idx(2, 5, stride), bounds(9, 9), &strict)
            .unwrap();
        assert_eq!(path[0], idx(1, 1, stride));

        // A different source must not reuse that start segment.
        let strict_other = StrictConstraints {
            used_points: &points,
            segments: &segments,
            route_from: idx(1, 1, stride),
            route_to: idx(2, 5, stride),
            edge_from_id: 5,
            edge_to_id: 4,
        };
        let other = ctx
            .get_path_strict(idx(1, 1, stride), idx(2, 5, stride), bounds(9, 9), &strict_other)
            .unwrap();
        assert_ne!(other.get(1).copied(), Some(idx(2, 1, stride)));
    }

    #[test]
    fn strict_refuses_middle_segment_reuse() {
        let stride = 10;
        let mut ctx = AStarContext::new(stride, 10);
        let mut points = UsedPointSet::new(100);
        let mut segments = SegmentUsage::new(100);
        let first: Vec<u32> = (1..=5).map(|x| idx(x, 1, stride)).collect();
        segments.record_path(&first, 3, 9);
        points.record_path(&first, stride, &ctx.blocked);

        // An edge trying to ride along the middle of the first path has to
        // bow around it instead.
        let strict = StrictConstraints {
            used_points: &points,
            segments: &segments,
            route_from: idx(2, 1, stride),
            route_to: idx(4, 1, stride),
            edge_from_id: 6,
            edge_to_id: 7,
        };
        let path = ctx
            .get_path_strict(idx(2, 1, stride), idx(4, 1, stride), bounds(9, 9), &strict)
            .unwrap();
        let forbidden = [
            segment_key(idx(2, 1, stride) as usize, idx(3, 1, stride) as usize),
            segment_key(idx(3, 1, stride) as usize, idx(4, 1, stride) as usize),
        ];
        for pair in path.windows(2) {
            let key = segment_key(pair[0] as usize, pair[1] as usize);
            assert!(!forbidden.contains(&key), "middle segment reused");
        }
        assert!(path.len() > 3);
    }
}
