//! Decodes rendered Unicode character art back into Mermaid text.
//!
//! Only this renderer's own output is in scope: node boxes are rectangles,
//! arrows always sit next to a target border, and every arrow's line network
//! leads back to a source-marker junction on exactly the borders that
//! emitted it. The ASCII alphabet collapses junctions and carries no
//! markers, so it is not decodable.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;

use crate::charset::{is_arrowhead, is_source_marker};
use crate::text_metrics::{char_width, is_label_char};

/// Reverse-parses rendered flowchart art into Mermaid source.
pub fn reverse_parse(text: &str) -> String {
    let grid = Grid::from_text(text);
    let boxes = detect_boxes(&grid);
    let arrows = trace_arrows(&grid, &boxes);
    emit_mermaid(&boxes, arrows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    Blank,
    /// Second column of a wide glyph; occupies terminal space but holds no
    /// code point of its own.
    Shadow,
    Glyph(char),
}

struct Grid {
    rows: Vec<Vec<Cell>>,
    width: i32,
    height: i32,
}

impl Grid {
    /// Rebuilds the printed cell grid: every line widens to the maximum
    /// display width and each wide code point is followed by an explicit
    /// shadow cell so grid columns map 1:1 onto terminal columns.
    fn from_text(text: &str) -> Self {
        let mut rows: Vec<Vec<Cell>> = text
            .split('\n')
            .map(|line| {
                let mut cells = Vec::new();
                for ch in line.chars() {
                    match char_width(ch) {
                        0 => continue,
                        1 => {
                            cells.push(if ch == ' ' { Cell::Blank } else { Cell::Glyph(ch) });
                        }
                        _ => {
                            cells.push(Cell::Glyph(ch));
                            cells.push(Cell::Shadow);
                        }
                    }
                }
                cells
            })
            .collect();
        let width = rows.iter().map(|row| row.len()).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, Cell::Blank);
        }
        let height = rows.len();
        Self {
            rows,
            width: width as i32,
            height: height as i32,
        }
    }

    fn at(&self, x: i32, y: i32) -> Cell {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return Cell::Blank;
        }
        self.rows[y as usize][x as usize]
    }

    fn glyph(&self, x: i32, y: i32) -> Option<char> {
        match self.at(x, y) {
            Cell::Glyph(ch) => Some(ch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BoxRect {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    label: String,
}

impl BoxRect {
    fn on_border(&self, x: i32, y: i32) -> bool {
        let on_x = (x == self.x1 || x == self.x2) && (self.y1..=self.y2).contains(&y);
        let on_y = (y == self.y1 || y == self.y2) && (self.x1..=self.x2).contains(&x);
        on_x || on_y
    }

    fn strictly_inside(&self, x: i32, y: i32) -> bool {
        x > self.x1 && x < self.x2 && y > self.y1 && y < self.y2
    }
}

fn is_top_or_bottom_border(ch: char) -> bool {
    matches!(ch, '─' | '┬' | '┴')
}

fn is_side_border(ch: char) -> bool {
    matches!(ch, '│' | '├' | '┤')
}

fn is_structural(ch: char) -> bool {
    crate::canvas::junction_mask(ch).is_some() || is_arrowhead(ch)
}

/// Finds node boxes with three complementary strategies, drops rectangles
/// that merely wrap other rectangles (subgraph borders), and rejects
/// candidates without a readable label.
fn detect_boxes(grid: &Grid) -> Vec<BoxRect> {
    let mut rects: Vec<(i32, i32, i32, i32)> = Vec::new();
    let mut push = |rect: (i32, i32, i32, i32), rects: &mut Vec<(i32, i32, i32, i32)>| {
        if !rects.contains(&rect) {
            rects.push(rect);
        }
    };

    for rect in top_left_anchored_boxes(grid) {
        push(rect, &mut rects);
    }
    for rect in bottom_up_boxes(grid) {
        push(rect, &mut rects);
    }
    for rect in fixed_height_boxes(grid) {
        push(rect, &mut rects);
    }

    // Subgraph rectangles wrap node boxes; keep only innermost rectangles.
    let wrappers: Vec<bool> = rects
        .iter()
        .map(|&(x1, y1, x2, y2)| {
            rects.iter().any(|&(ox1, oy1, ox2, oy2)| {
                (ox1, oy1, ox2, oy2) != (x1, y1, x2, y2)
                    && x1 <= ox1
                    && y1 <= oy1
                    && x2 >= ox2
                    && y2 >= oy2
            })
        })
        .collect();

    let mut boxes = Vec::new();
    for (idx, &(x1, y1, x2, y2)) in rects.iter().enumerate() {
        if wrappers[idx] {
            continue;
        }
        if let Some(label) = interior_label(grid, x1, y1, x2, y2) {
            boxes.push(BoxRect {
                x1,
                y1,
                x2,
                y2,
                label,
            });
        }
    }
    boxes
}

fn top_left_anchored_boxes(grid: &Grid) -> Vec<(i32, i32, i32, i32)> {
    let mut rects = Vec::new();
    for y1 in 0..grid.height {
        for x1 in 0..grid.width {
            if grid.glyph(x1, y1) != Some('┌') {
                continue;
            }
            let Some(x2) = scan_top_border(grid, x1, y1) else {
                continue;
            };
            let mut y = y1 + 1;
            while y < grid.height {
                let left = grid.glyph(x1, y);
                let right = grid.glyph(x2, y);
                if left == Some('└') && right == Some('┘') && bottom_border_complete(grid, x1, x2, y)
                {
                    rects.push((x1, y1, x2, y));
                    break;
                }
                let sides_ok = left.map_or(false, is_side_border)
                    && right.map_or(false, is_side_border);
                if !sides_ok {
                    break;
                }
                y += 1;
            }
        }
    }
    rects
}

/// Walks upward from a bottom border; recovers boxes whose top border was
/// overwritten by an edge label (corners survive label placement, the
/// horizontal run may not).
fn bottom_up_boxes(grid: &Grid) -> Vec<(i32, i32, i32, i32)> {
    let mut rects = Vec::new();
    for y2 in 0..grid.height {
        for x1 in 0..grid.width {
            if grid.glyph(x1, y2) != Some('└') {
                continue;
            }
            let Some(x2) = scan_bottom_border(grid, x1, y2) else {
                continue;
            };
            let mut top_side = y2;
            while top_side > 0 {
                let above = top_side - 1;
                let left = grid.glyph(x1, above);
                let right = grid.glyph(x2, above);
                let sides_ok = left.map_or(false, is_side_border)
                    && right.map_or(false, is_side_border);
                if !sides_ok {
                    break;
                }
                top_side = above;
            }
            if top_side < y2 && top_side > 0 {
                rects.push((x1, top_side - 1, x2, y2));
            }
        }
    }
    rects
}

/// Recognizes default-padding boxes row-wise: a label row flanked by side
/// borders, empty padding rows above and below, full borders two rows out.
/// Catches boxes both anchored strategies lose to overdrawn corners.
fn fixed_height_boxes(grid: &Grid) -> Vec<(i32, i32, i32, i32)> {
    let mut rects = Vec::new();
    for y in 2..grid.height.saturating_sub(2) {
        for x1 in 0..grid.width {
            if !grid.glyph(x1, y).map_or(false, is_side_border) {
                continue;
            }
            for x2 in (x1 + 2)..grid.width {
                if !grid.glyph(x2, y).map_or(false, is_side_border) {
                    continue;
                }
                let padding_rows_ok = [y - 1, y + 1].iter().all(|&row| {
                    grid.glyph(x1, row).map_or(false, is_side_border)
                        && grid.glyph(x2, row).map_or(false, is_side_border)
                        && ((x1 + 1)..x2)
                            .all(|x| matches!(grid.at(x, row), Cell::Blank | Cell::Shadow))
                });
                if !padding_rows_ok {
                    continue;
                }
                if top_row_complete(grid, x1, x2, y - 2) && bottom_row_complete(grid, x1, x2, y + 2)
                {
                    rects.push((x1, y - 2, x2, y + 2));
                    break;
                }
            }
        }
    }
    rects
}

fn scan_top_border(grid: &Grid, x1: i32, y: i32) -> Option<i32> {
    let mut x = x1 + 1;
    while x < grid.width {
        match grid.glyph(x, y) {
            Some('┐') => return Some(x),
            Some(ch) if is_top_or_bottom_border(ch) => x += 1,
            _ => return None,
        }
    }
    None
}

fn scan_bottom_border(grid: &Grid, x1: i32, y: i32) -> Option<i32> {
    let mut x = x1 + 1;
    while x < grid.width {
        match grid.glyph(x, y) {
            Some('┘') => return Some(x),
            Some(ch) if is_top_or_bottom_border(ch) => x += 1,
            _ => return None,
        }
    }
    None
}

fn bottom_border_complete(grid: &Grid, x1: i32, x2: i32, y: i32) -> bool {
    ((x1 + 1)..x2).all(|x| grid.glyph(x, y).map_or(false, is_top_or_bottom_border))
}

fn top_row_complete(grid: &Grid, x1: i32, x2: i32, y: i32) -> bool {
    grid.glyph(x1, y) == Some('┌')
        && grid.glyph(x2, y) == Some('┐')
        && bottom_border_complete(grid, x1, x2, y)
}

fn bottom_row_complete(grid: &Grid, x1: i32, x2: i32, y: i32) -> bool {
    grid.glyph(x1, y) == Some('└')
        && grid.glyph(x2, y) == Some('┘')
        && bottom_border_complete(grid, x1, x2, y)
}

/// Interior text of a candidate box, or `None` when it holds nothing a
/// label would contain (pure line art is a routing artefact, not a node).
fn interior_label(grid: &Grid, x1: i32, y1: i32, x2: i32, y2: i32) -> Option<String> {
    let mut best: Option<String> = None;
    let mut best_score = 0usize;
    for y in (y1 + 1)..y2 {
        let mut row = String::new();
        for x in (x1 + 1)..x2 {
            match grid.at(x, y) {
                Cell::Glyph(ch) if !is_structural(ch) => row.push(ch),
                Cell::Shadow => {}
                _ => row.push(' '),
            }
        }
        let trimmed = row.trim().to_string();
        let score = trimmed.chars().filter(|&ch| is_label_char(ch)).count();
        if score > best_score {
            best_score = score;
            best = Some(trimmed);
        }
    }
    best
}

#[derive(Debug, Clone)]
struct SourceCandidate {
    box_idx: usize,
    dist: i32,
    /// Cells from the arrow back to the source marker.
    path: Vec<(i32, i32)>,
    /// Edge label recovered along this candidate's path.
    label: Option<String>,
}

#[derive(Debug, Clone)]
struct DecodedArrow {
    target: usize,
    sources: Vec<SourceCandidate>,
}

fn arrow_delta(ch: char) -> Option<(i32, i32)> {
    match ch {
        '▲' => Some((0, -1)),
        '▼' => Some((0, 1)),
        '◄' => Some((-1, 0)),
        '►' => Some((1, 0)),
        _ => None,
    }
}

/// For every arrowhead: resolve the target box from the border cell the
/// arrow points into, then flood backward through the line network
/// collecting every source-marker border cell that can have emitted it.
fn trace_arrows(grid: &Grid, boxes: &[BoxRect]) -> Vec<DecodedArrow> {
    let mut arrows = Vec::new();
    for y in 0..grid.height {
        for x in 0..grid.width {
            let Some(ch) = grid.glyph(x, y) else {
                continue;
            };
            let Some((dx, dy)) = arrow_delta(ch) else {
                continue;
            };
            let border_cell = (x + dx, y + dy);
            let Some(target) = boxes
                .iter()
                .position(|rect| rect.on_border(border_cell.0, border_cell.1))
            else {
                continue;
            };

            let mut sources = backward_flood(grid, boxes, (x, y), border_cell);
            for candidate in &mut sources {
                candidate.label = recover_label(grid, candidate);
            }
            arrows.push(DecodedArrow { target, sources });
        }
    }
    arrows
}

fn backward_flood(
    grid: &Grid,
    boxes: &[BoxRect],
    start: (i32, i32),
    target_border_cell: (i32, i32),
) -> Vec<SourceCandidate> {
    let mut parents: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
    let mut dist: HashMap<(i32, i32), i32> = HashMap::new();
    let mut queue = VecDeque::new();
    let mut sources: HashMap<usize, SourceCandidate> = HashMap::new();

    dist.insert(start, 0);
    queue.push_back(start);

    while let Some(cell) = queue.pop_front() {
        let here = dist[&cell];
        for delta in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            let next = (cell.0 + delta.0, cell.1 + delta.1);
            if next == target_border_cell || dist.contains_key(&next) {
                continue;
            }
            let traversable = match grid.at(next.0, next.1) {
                Cell::Blank => false,
                Cell::Shadow => true,
                Cell::Glyph(_) => true,
            };
            if !traversable {
                continue;
            }
            if boxes.iter().any(|rect| rect.strictly_inside(next.0, next.1)) {
                continue;
            }

            if let Some(owner) = boxes.iter().position(|rect| rect.on_border(next.0, next.1)) {
                // Border cells terminate the flood; only marker glyphs count
                // as source ports.
                let marker = grid
                    .glyph(next.0, next.1)
                    .map_or(false, is_source_marker);
                if marker {
                    let candidate_dist = here + 1;
                    let replace = sources
                        .get(&owner)
                        .map_or(true, |existing| candidate_dist < existing.dist);
                    if replace {
                        // Collected marker-first, i.e. source → arrow order.
                        let mut path = vec![next, cell];
                        let mut cursor = cell;
                        while let Some(&parent) = parents.get(&cursor) {
                            path.push(parent);
                            cursor = parent;
                        }
                        sources.insert(
                            owner,
                            SourceCandidate {
                                box_idx: owner,
                                dist: candidate_dist,
                                path,
                                label: None,
                            },
                        );
                    }
                }
                continue;
            }

            dist.insert(next, here + 1);
            parents.insert(next, cell);
            queue.push_back(next);
        }
    }

    let mut out: Vec<SourceCandidate> = sources.into_values().collect();
    out.sort_by_key(|candidate| (candidate.dist, candidate.box_idx));
    out
}

/// First horizontal run of label characters met walking the path from the
/// source side toward the arrow (the renderer biases labels onto the first
/// segment wide enough, so the first hit is the edge's own label).
fn recover_label(grid: &Grid, candidate: &SourceCandidate) -> Option<String> {
    for &(x, y) in &candidate.path {
        if let Some(run) = label_run_at(grid, x, y) {
            return Some(run);
        }
    }
    None
}

fn is_label_cell(grid: &Grid, x: i32, y: i32) -> bool {
    match grid.at(x, y) {
        Cell::Glyph(ch) => !is_structural(ch),
        Cell::Shadow => true,
        Cell::Blank => false,
    }
}

/// Maximal horizontal run of label cells covering `(x, y)`; single interior
/// blanks are bridged so space-bearing labels survive.
fn label_run_at(grid: &Grid, x: i32, y: i32) -> Option<String> {
    if !is_label_cell(grid, x, y) {
        return None;
    }
    let mut lo = x;
    while is_label_cell(grid, lo - 1, y)
        || (grid.at(lo - 1, y) == Cell::Blank && is_label_cell(grid, lo - 2, y))
    {
        lo -= 1;
    }
    let mut hi = x;
    while is_label_cell(grid, hi + 1, y)
        || (grid.at(hi + 1, y) == Cell::Blank && is_label_cell(grid, hi + 2, y))
    {
        hi += 1;
    }
    let mut text = String::new();
    for cx in lo..=hi {
        match grid.at(cx, y) {
            Cell::Glyph(ch) => text.push(ch),
            Cell::Blank => text.push(' '),
            Cell::Shadow => {}
        }
    }
    let trimmed = text.trim().to_string();
    if trimmed.chars().any(is_label_char) {
        Some(trimmed)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DecodedEdge {
    from: usize,
    to: usize,
    label: Option<String>,
    bidirectional: bool,
}

fn emit_mermaid(boxes: &[BoxRect], arrows: Vec<DecodedArrow>) -> String {
    // Box spread decides the emitted direction; either parses back to an
    // equivalent graph, this just keeps re-renders shaped like the input.
    let spread_x = boxes.iter().map(|rect| rect.x2).max().unwrap_or(0);
    let spread_y = boxes.iter().map(|rect| rect.y2).max().unwrap_or(0);
    let direction = if spread_x >= spread_y { "LR" } else { "TD" };

    let mut edges: Vec<DecodedEdge> = Vec::new();
    for arrow in arrows {
        let mut candidates = arrow.sources;
        if candidates.is_empty() {
            continue;
        }
        // Pseudo-self-loops: a long way back to our own border usually means
        // the flood leaked around the box, not a real self-reference.
        let min_other = candidates
            .iter()
            .filter(|candidate| candidate.box_idx != arrow.target)
            .map(|candidate| candidate.dist)
            .min();
        if let Some(min_other) = min_other {
            candidates.retain(|candidate| {
                candidate.box_idx != arrow.target || candidate.dist <= min_other - 2
            });
        }

        let labelled: Vec<(usize, Option<String>, i32)> = candidates
            .iter()
            .map(|candidate| {
                (
                    candidate.box_idx,
                    candidate.label.clone(),
                    candidate.dist,
                )
            })
            .collect();

        if labelled.len() > 1 {
            let all_same_label = labelled
                .windows(2)
                .all(|pair| pair[0].1 == pair[1].1);
            if all_same_label {
                // Genuine fan-in over a shared end segment.
                for (source, label, _) in labelled {
                    edges.push(DecodedEdge {
                        from: source,
                        to: arrow.target,
                        label,
                        bidirectional: false,
                    });
                }
            } else {
                // Ambiguous: prefer fewer edges over invented ones.
                let pick = labelled
                    .iter()
                    .min_by_key(|(source, _, dist)| {
                        (*dist, usize::from(*source == arrow.target))
                    })
                    .cloned();
                if let Some((source, label, _)) = pick {
                    edges.push(DecodedEdge {
                        from: source,
                        to: arrow.target,
                        label,
                        bidirectional: false,
                    });
                }
            }
        } else if let Some((source, label, _)) = labelled.into_iter().next() {
            edges.push(DecodedEdge {
                from: source,
                to: arrow.target,
                label,
                bidirectional: false,
            });
        }
    }

    merge_bidirectional(&mut edges);

    // Stable node ids: labels sorted (ties by position).
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        boxes[a]
            .label
            .cmp(&boxes[b].label)
            .then(boxes[a].y1.cmp(&boxes[b].y1))
            .then(boxes[a].x1.cmp(&boxes[b].x1))
    });
    let mut id_of: Vec<String> = vec![String::new(); boxes.len()];
    for (seq, &box_idx) in order.iter().enumerate() {
        id_of[box_idx] = format!("N{}", seq + 1);
    }

    let mut out = String::new();
    let _ = writeln!(out, "flowchart {direction}");
    for &box_idx in &order {
        let _ = writeln!(out, "    {}[\"{}\"]", id_of[box_idx], boxes[box_idx].label);
    }

    edges.sort_by(|a, b| {
        id_of[a.from]
            .cmp(&id_of[b.from])
            .then(id_of[a.to].cmp(&id_of[b.to]))
            .then(a.label.cmp(&b.label))
    });
    for edge in edges {
        let arrow = if edge.bidirectional { "<-->" } else { "-->" };
        match &edge.label {
            Some(label) if !label.is_empty() => {
                let _ = writeln!(
                    out,
                    "    {} {arrow}|{label}| {}",
                    id_of[edge.from], id_of[edge.to]
                );
            }
            _ => {
                let _ = writeln!(out, "    {} {arrow} {}", id_of[edge.from], id_of[edge.to]);
            }
        }
    }
    out
}

/// Collapses matching opposite arrows (same label, mirrored endpoints) into
/// one bidirectional edge, the inverse of how `<-->` is rendered.
fn merge_bidirectional(edges: &mut Vec<DecodedEdge>) {
    let mut result: Vec<DecodedEdge> = Vec::new();
    let mut consumed = vec![false; edges.len()];
    for i in 0..edges.len() {
        if consumed[i] {
            continue;
        }
        let mut edge = edges[i].clone();
        if edge.from != edge.to {
            if let Some(j) = (i + 1..edges.len()).find(|&j| {
                !consumed[j]
                    && edges[j].from == edge.to
                    && edges[j].to == edge.from
                    && edges[j].label == edge.label
            }) {
                consumed[j] = true;
                edge.bidirectional = true;
            }
        }
        result.push(edge);
    }
    *edges = std::mem::take(&mut result);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_simple_boxes_and_edge() {
        let art = "\
┌─────┐      ┌─────┐
│ aaa ├─────►│ bbb │
└─────┘      └─────┘";
        let out = reverse_parse(art);
        assert!(out.contains("flowchart LR"));
        assert!(out.contains("N1[\"aaa\"]"));
        assert!(out.contains("N2[\"bbb\"]"));
        assert!(out.contains("N1 --> N2"));
    }

    #[test]
    fn recovers_edge_labels() {
        let art = "\
┌─────┐          ┌─────┐
│ aaa ├──go.now─►│ bbb │
└─────┘          └─────┘";
        let out = reverse_parse(art);
        assert!(out.contains("N1 -->|go.now| N2"), "{out}");
    }

    #[test]
    fn box_survives_label_overwriting_its_top_border() {
        let art = "\
┌he┐
│ab│
└──┘";
        let grid = Grid::from_text(art);
        let boxes = detect_boxes(&grid);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].label, "ab");
    }

    #[test]
    fn wrapping_rectangles_are_dropped() {
        let art = "\
┌─────────┐
│ ┌─────┐ │
│ │ n1  │ │
│ └─────┘ │
└─────────┘";
        let grid = Grid::from_text(art);
        let boxes = detect_boxes(&grid);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].label, "n1");
    }

    #[test]
    fn wide_glyph_labels_roundtrip_through_the_grid() {
        // The emoji occupies two printed columns, so the border chars line
        // up only when the grid inserts its shadow cell.
        let art = "\
┌──────────┐
│ 📋 writer│
└──────────┘";
        let grid = Grid::from_text(art);
        let boxes = detect_boxes(&grid);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].label, "📋 writer");
    }

    #[test]
    fn empty_art_decodes_to_an_empty_flowchart() {
        let out = reverse_parse("");
        assert!(out.starts_with("flowchart"));
        assert!(!out.contains("N1"));
    }

    #[test]
    fn five_row_box_with_marker_sides_is_detected() {
        let art = "\
┌─────┐
│     │
│ x   ├──
│     │
└─────┘";
        let grid = Grid::from_text(art);
        let boxes = detect_boxes(&grid);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].label, "x");
    }
}
