//! Canvas compositing: boxes, paths, corners, arrowheads, port markers and
//! labels are painted as separate overlays and merged in a fixed order, so
//! junction merging stays deterministic regardless of edge order within a
//! layer. Crossing de-ambiguation runs last, after labels have had a chance
//! to read the composited base.

use std::collections::HashSet;

use crate::canvas::{merge_canvases, Canvas};
use crate::charset::Charset;
use crate::config::RenderConfig;
use crate::layout::{
    direction_between, place_label, Dir, DrawingCoord, EdgeLayout, Layout, DOWN, LEFT, LOWER_LEFT,
    LOWER_RIGHT, MIDDLE, RIGHT, UP, UPPER_LEFT, UPPER_RIGHT,
};
use crate::text_metrics::str_width;

pub fn render_text(layout: &Layout, config: &RenderConfig) -> String {
    if layout.nodes.is_empty() {
        return String::new();
    }
    let charset = Charset::for_mode(config.use_ascii);
    let mut base = Canvas::new(layout.width.max(0), layout.height.max(0));

    // Subgraph borders, shallowest first, so nested borders overdraw their
    // parents.
    let mut subgraph_order: Vec<usize> = (0..layout.subgraphs.len())
        .filter(|&idx| !layout.subgraphs[idx].nodes.is_empty())
        .collect();
    subgraph_order.sort_by_key(|&idx| layout.subgraphs[idx].depth);
    for &idx in &subgraph_order {
        let subgraph = &layout.subgraphs[idx];
        let border = draw_border_box(
            subgraph.max_x - subgraph.min_x,
            subgraph.max_y - subgraph.min_y,
            &charset,
        );
        base = merge_canvases(
            &base,
            (subgraph.min_x, subgraph.min_y),
            charset.ascii,
            &[border],
        );
    }

    for node in &layout.nodes {
        let box_canvas = draw_node_box(node.box_width, node.box_height, &node.label, &charset);
        base = merge_canvases(
            &base,
            (node.drawing.x, node.drawing.y),
            charset.ascii,
            &[box_canvas],
        );
    }

    let mut line_layer = base.blank_like();
    let mut corner_layer = base.blank_like();
    let mut arrow_layer = base.blank_like();
    let mut marker_layer = base.blank_like();
    let mut avoid: HashSet<(i32, i32)> = HashSet::new();

    for edge in &layout.edges {
        if edge.path.len() < 2 {
            continue;
        }
        let art = draw_edge(layout, edge, &charset, &mut avoid);
        line_layer = merge_canvases(&line_layer, (0, 0), charset.ascii, &[art.lines]);
        corner_layer = merge_canvases(&corner_layer, (0, 0), charset.ascii, &[art.corners]);
        arrow_layer = merge_canvases(&arrow_layer, (0, 0), charset.ascii, &[art.arrows]);
        marker_layer = merge_canvases(&marker_layer, (0, 0), charset.ascii, &[art.markers]);
    }

    base = merge_canvases(&base, (0, 0), charset.ascii, &[line_layer]);
    base = merge_canvases(&base, (0, 0), charset.ascii, &[corner_layer]);
    base = merge_canvases(&base, (0, 0), charset.ascii, &[arrow_layer]);
    base = merge_canvases(&base, (0, 0), charset.ascii, &[marker_layer]);

    // Labels read the composited base so they can dodge everything that
    // carries routing semantics.
    let mut label_layer = base.blank_like();
    for edge in &layout.edges {
        let (Some(label), Some(line)) = (&edge.label, edge.label_line) else {
            continue;
        };
        let a = layout.project(line.0);
        let b = layout.project(line.1);
        if let Some(start) = place_label(&base, label, (a, b), &avoid) {
            label_layer.draw_text(start.x, start.y, label);
        }
    }
    base = merge_canvases(&base, (0, 0), charset.ascii, &[label_layer]);

    for &idx in &subgraph_order {
        let subgraph = &layout.subgraphs[idx];
        let label = draw_subgraph_label(
            subgraph.max_x - subgraph.min_x,
            &subgraph.label,
        );
        base = merge_canvases(
            &base,
            (subgraph.min_x, subgraph.min_y),
            charset.ascii,
            &[label],
        );
    }

    if !charset.ascii {
        base.deambiguate_crossings();
    }
    if layout.flip_vertical {
        base = base.flip_vertical();
    }
    base.to_string()
}

struct EdgeArt {
    lines: Canvas,
    corners: Canvas,
    arrows: Canvas,
    markers: Canvas,
}

fn draw_edge(
    layout: &Layout,
    edge: &EdgeLayout,
    charset: &Charset,
    avoid: &mut HashSet<(i32, i32)>,
) -> EdgeArt {
    let mut lines = Canvas::new(layout.width.max(0), layout.height.max(0));
    let mut corners = lines.blank_like();
    let mut arrows = lines.blank_like();
    let mut markers = lines.blank_like();

    // Stroke segments. Each drawn range excludes its own endpoints: the
    // start cell belongs to the port marker, turn cells to the corner layer.
    let mut segments: Vec<Vec<DrawingCoord>> = Vec::new();
    let mut segment_dirs: Vec<Dir> = Vec::new();
    let mut previous = edge.path[0];
    for &next in edge.path.iter().skip(1) {
        let from = layout.project(previous);
        let to = layout.project(next);
        if from == to {
            previous = next;
            continue;
        }
        let dir = direction_between((previous.x, previous.y), (next.x, next.y));
        let mut drawn = draw_line(&mut lines, from, to, charset);
        if drawn.is_empty() {
            drawn.push(from);
        }
        segments.push(drawn);
        segment_dirs.push(dir);
        previous = next;
    }
    if segments.is_empty() {
        return EdgeArt {
            lines,
            corners,
            arrows,
            markers,
        };
    }

    for window in edge.path.windows(3) {
        let corner_at = layout.project(window[1]);
        let prev_dir = direction_between((window[0].x, window[0].y), (window[1].x, window[1].y));
        let next_dir = direction_between((window[1].x, window[1].y), (window[2].x, window[2].y));
        let glyph = corner_char(prev_dir, next_dir, charset);
        corners.set(corner_at.x, corner_at.y, glyph);
    }

    if edge.arrow_end || !edge.directed {
        // Port marker on the source border, Unicode only.
        if !charset.ascii {
            if let Some((cell, glyph)) = start_marker(&segments[0], segment_dirs[0]) {
                markers.set(cell.x, cell.y, glyph);
                avoid.insert((cell.x, cell.y));
            }
        }
    }

    if edge.arrow_end {
        let last = segments.last().unwrap();
        let fallback = *segment_dirs.last().unwrap();
        let tip = *last.last().unwrap();
        let dir = line_direction(last, fallback);
        arrows.set(tip.x, tip.y, arrow_char(dir, fallback, charset));
        avoid.insert((tip.x, tip.y));
    }

    if edge.arrow_start {
        // Bidirectional edges get a tail arrowhead pointing back at the
        // source, plus a marker on the target border so both directions stay
        // traceable.
        let first = &segments[0];
        let fallback = segment_dirs[0].opposite();
        let tail = first[0];
        let dir = line_direction(first, segment_dirs[0]).opposite();
        arrows.set(tail.x, tail.y, arrow_char(dir, fallback, charset));
        avoid.insert((tail.x, tail.y));
        if !charset.ascii {
            if let Some((cell, glyph)) =
                end_marker(segments.last().unwrap(), *segment_dirs.last().unwrap())
            {
                markers.set(cell.x, cell.y, glyph);
                avoid.insert((cell.x, cell.y));
            }
        }
    }

    EdgeArt {
        lines,
        corners,
        arrows,
        markers,
    }
}

/// Draws one axis-aligned stroke, keeping one cell clear at either end for
/// the port marker and the turn/arrow cells. Returns the drawn cells in
/// stroke order.
fn draw_line(
    canvas: &mut Canvas,
    from: DrawingCoord,
    to: DrawingCoord,
    charset: &Charset,
) -> Vec<DrawingCoord> {
    let dir = direction_between((from.x, from.y), (to.x, to.y));
    let mut drawn = Vec::new();
    match dir {
        d if d == RIGHT => {
            for x in (from.x + 1)..=(to.x - 1) {
                canvas.set(x, from.y, charset.horizontal);
                drawn.push(DrawingCoord::new(x, from.y));
            }
        }
        d if d == LEFT => {
            for x in ((to.x + 1)..=(from.x - 1)).rev() {
                canvas.set(x, from.y, charset.horizontal);
                drawn.push(DrawingCoord::new(x, from.y));
            }
        }
        d if d == DOWN => {
            for y in (from.y + 1)..=(to.y - 1) {
                canvas.set(from.x, y, charset.vertical);
                drawn.push(DrawingCoord::new(from.x, y));
            }
        }
        d if d == UP => {
            for y in ((to.y + 1)..=(from.y - 1)).rev() {
                canvas.set(from.x, y, charset.vertical);
                drawn.push(DrawingCoord::new(from.x, y));
            }
        }
        _ => {}
    }
    drawn
}

fn line_direction(line: &[DrawingCoord], fallback: Dir) -> Dir {
    if line.len() < 2 {
        return fallback;
    }
    let first = line[0];
    let last = line[line.len() - 1];
    let dir = direction_between((first.x, first.y), (last.x, last.y));
    if dir == MIDDLE {
        fallback
    } else {
        dir
    }
}

fn arrow_char(dir: Dir, fallback: Dir, charset: &Charset) -> char {
    let resolve = |d: Dir| -> Option<char> {
        if charset.ascii {
            match d {
                x if x == UP => Some(charset.arrow_up),
                x if x == DOWN => Some(charset.arrow_down),
                x if x == LEFT => Some(charset.arrow_left),
                x if x == RIGHT => Some(charset.arrow_right),
                _ => None,
            }
        } else {
            match d {
                x if x == UP => Some(charset.arrow_up),
                x if x == DOWN => Some(charset.arrow_down),
                x if x == LEFT => Some(charset.arrow_left),
                x if x == RIGHT => Some(charset.arrow_right),
                x if x == UPPER_RIGHT => Some('◥'),
                x if x == UPPER_LEFT => Some('◤'),
                x if x == LOWER_RIGHT => Some('◢'),
                x if x == LOWER_LEFT => Some('◣'),
                _ => None,
            }
        }
    };
    resolve(dir)
        .or_else(|| resolve(fallback))
        .unwrap_or(charset.arrow_fallback)
}

fn corner_char(prev_dir: Dir, next_dir: Dir, charset: &Charset) -> char {
    if charset.ascii {
        return '+';
    }
    if (prev_dir == RIGHT && next_dir == DOWN) || (prev_dir == UP && next_dir == LEFT) {
        '┐'
    } else if (prev_dir == RIGHT && next_dir == UP) || (prev_dir == DOWN && next_dir == LEFT) {
        '┘'
    } else if (prev_dir == LEFT && next_dir == DOWN) || (prev_dir == UP && next_dir == RIGHT) {
        '┌'
    } else if (prev_dir == LEFT && next_dir == UP) || (prev_dir == DOWN && next_dir == RIGHT) {
        '└'
    } else {
        '+'
    }
}

/// Marker on the source border, one cell behind the first drawn stroke
/// cell: the border glyph grows an arm toward the departing edge.
fn start_marker(first_line: &[DrawingCoord], dir: Dir) -> Option<(DrawingCoord, char)> {
    let from = *first_line.first()?;
    let (cell, glyph) = match dir {
        d if d == UP => (DrawingCoord::new(from.x, from.y + 1), '┴'),
        d if d == DOWN => (DrawingCoord::new(from.x, from.y - 1), '┬'),
        d if d == LEFT => (DrawingCoord::new(from.x + 1, from.y), '┤'),
        d if d == RIGHT => (DrawingCoord::new(from.x - 1, from.y), '├'),
        _ => return None,
    };
    Some((cell, glyph))
}

/// Marker on the target border, one cell past the last drawn stroke cell.
fn end_marker(last_line: &[DrawingCoord], dir: Dir) -> Option<(DrawingCoord, char)> {
    let tip = *last_line.last()?;
    let (cell, glyph) = match dir {
        d if d == UP => (DrawingCoord::new(tip.x, tip.y - 1), '┬'),
        d if d == DOWN => (DrawingCoord::new(tip.x, tip.y + 1), '┴'),
        d if d == LEFT => (DrawingCoord::new(tip.x - 1, tip.y), '├'),
        d if d == RIGHT => (DrawingCoord::new(tip.x + 1, tip.y), '┤'),
        _ => return None,
    };
    Some((cell, glyph))
}

fn draw_border_box(width: i32, height: i32, charset: &Charset) -> Canvas {
    let mut canvas = Canvas::new(width.max(0), height.max(0));
    if width <= 0 || height <= 0 {
        return canvas;
    }
    for x in 1..width {
        canvas.set(x, 0, charset.horizontal);
        canvas.set(x, height, charset.horizontal);
    }
    for y in 1..height {
        canvas.set(0, y, charset.vertical);
        canvas.set(width, y, charset.vertical);
    }
    canvas.set(0, 0, charset.corner_tl);
    canvas.set(width, 0, charset.corner_tr);
    canvas.set(0, height, charset.corner_bl);
    canvas.set(width, height, charset.corner_br);
    canvas
}

fn draw_node_box(width: i32, height: i32, label: &str, charset: &Charset) -> Canvas {
    let mut canvas = draw_border_box(width, height, charset);
    let label_width = str_width(label) as i32;
    if label_width > 0 {
        let text_x = width / 2 - ceil_div(label_width, 2) + 1;
        canvas.draw_text(text_x, height / 2, label);
    }
    canvas
}

fn draw_subgraph_label(width: i32, label: &str) -> Canvas {
    let mut canvas = Canvas::new(width.max(0), 1);
    let label_width = str_width(label) as i32;
    if label_width == 0 || width <= 0 {
        return canvas;
    }
    let x = (width / 2 - label_width / 2).max(1);
    canvas.draw_text(x, 1, label);
    canvas
}

fn ceil_div(a: i32, b: i32) -> i32 {
    if a % b == 0 {
        a / b
    } else {
        a / b + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LayoutConfig, RenderConfig};
    use crate::layout::compute_layout;
    use crate::parser::parse_mermaid;

    fn render(input: &str) -> String {
        let parsed = parse_mermaid(input).unwrap();
        let layout = compute_layout(&parsed.graph, &LayoutConfig::default());
        render_text(&layout, &RenderConfig::default())
    }

    fn render_ascii(input: &str) -> String {
        let parsed = parse_mermaid(input).unwrap();
        let layout = compute_layout(&parsed.graph, &LayoutConfig::default());
        render_text(
            &layout,
            &RenderConfig {
                use_ascii: true,
                direction: None,
            },
        )
    }

    #[test]
    fn empty_graph_renders_empty_string() {
        assert_eq!(render("flowchart LR\n"), "");
    }

    #[test]
    fn single_edge_renders_boxes_arrow_and_marker() {
        let out = render("flowchart LR\nA[task.start] --> B[writer]");
        assert!(out.contains("task.start"));
        assert!(out.contains("writer"));
        assert!(out.contains('►'));
        assert!(out.contains('├'));
        assert!(!out.contains('┼'));
    }

    #[test]
    fn labelled_edge_carries_its_label_once() {
        let out = render("flowchart LR\nA -->|spec.start| B");
        assert_eq!(out.matches("spec.start").count(), 1);
        assert!(!out.contains('┼'));
    }

    #[test]
    fn ascii_output_uses_only_the_ascii_alphabet() {
        let out = render_ascii("flowchart LR\nA -->|go| B\nA --> C");
        for ch in out.chars() {
            assert!(
                ch.is_ascii(),
                "unexpected non-ascii char {ch:?} in ascii mode"
            );
        }
        assert!(out.contains('>') || out.contains('v'));
    }

    #[test]
    fn all_lines_are_padded_to_the_same_display_width() {
        let out = render("flowchart TD\nA[one] --> B[two]\nA --> C[three]");
        let widths: Vec<usize> = out
            .lines()
            .map(crate::text_metrics::str_width)
            .collect();
        assert!(!widths.is_empty());
        assert!(widths.iter().all(|&w| w == widths[0]), "{widths:?}");
    }

    #[test]
    fn unicode_output_never_contains_the_four_way_cross() {
        // Crossing edges: A→D and C→B must intersect somewhere.
        let out = render("flowchart LR\nA --> B\nA --> D\nC --> D\nC --> B");
        assert!(!out.contains('┼'), "{out}");
    }

    #[test]
    fn self_loop_keeps_the_box_intact() {
        let out = render("flowchart LR\nA --> A");
        assert!(out.contains('▲') || out.contains('◄'));
        // Box corners all present.
        for glyph in ['┌', '┐', '└', '┘'] {
            assert!(out.contains(glyph));
        }
        assert!(!out.contains('┼'));
    }

    #[test]
    fn bottom_top_flips_the_canvas() {
        let td = render("flowchart TD\nA --> B");
        let bt = render("flowchart BT\nA --> B");
        assert!(td.contains('▼'));
        assert!(bt.contains('▲'));
    }

    #[test]
    fn subgraph_border_and_label_are_drawn() {
        let out = render("flowchart LR\nsubgraph Grp\nA --> B\nend");
        assert!(out.contains("Grp"));
        assert!(out.contains('┌'));
    }

    #[test]
    fn wide_label_box_interior_matches_label_width() {
        // Top-down so the label row carries no port marker.
        let out = render("flowchart TD\nA[📋 writer] --> B[ok]");
        let line = out
            .lines()
            .find(|line| line.contains("📋 writer"))
            .expect("label line");
        let interior: String = line
            .chars()
            .skip_while(|&c| c != '│')
            .skip(1)
            .take_while(|&c| c != '│')
            .collect();
        // Interior = label + twice the border padding.
        assert_eq!(crate::text_metrics::str_width(&interior), 9 + 2);
    }
}
