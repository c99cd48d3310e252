use std::path::{Path, PathBuf};

use mermaid_text_renderer::charset::{is_arrowhead, is_source_marker};
use mermaid_text_renderer::config::{LayoutConfig, RenderConfig};
use mermaid_text_renderer::layout::compute_layout;
use mermaid_text_renderer::layout_dump::LayoutDump;
use mermaid_text_renderer::parser::parse_mermaid;
use mermaid_text_renderer::render::render_text;
use mermaid_text_renderer::text_metrics::str_width;

// Keep this list explicit so new fixtures must be added intentionally.
const FIXTURES: [&str; 12] = [
    "flowchart/basic.mmd",
    "flowchart/labels.mmd",
    "flowchart/fanout.mmd",
    "flowchart/fanin.mmd",
    "flowchart/cycle.mmd",
    "flowchart/self_loop.mmd",
    "flowchart/subgraph.mmd",
    "flowchart/unicode.mmd",
    "flowchart/backward.mmd",
    "flowchart/dense.mmd",
    "flowchart/bidirectional.mmd",
    "flowchart/td_basic.mmd",
];

fn fixture_path(rel: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(rel)
}

fn render_fixture(rel: &str, use_ascii: bool) -> String {
    let input = std::fs::read_to_string(fixture_path(rel)).expect("fixture read failed");
    let parsed = parse_mermaid(&input).expect("parse failed");
    let layout = compute_layout(&parsed.graph, &LayoutConfig::default());
    render_text(
        &layout,
        &RenderConfig {
            use_ascii,
            direction: None,
        },
    )
}

#[test]
fn unicode_renders_never_contain_the_four_way_cross() {
    for rel in FIXTURES {
        let out = render_fixture(rel, false);
        assert!(!out.contains('┼'), "{rel} produced a ┼:\n{out}");
    }
}

#[test]
fn every_render_is_a_padded_rectangle() {
    for rel in FIXTURES {
        let out = render_fixture(rel, false);
        let widths: Vec<usize> = out.lines().map(str_width).collect();
        assert!(!widths.is_empty(), "{rel} rendered empty");
        assert!(
            widths.iter().all(|&w| w == widths[0]),
            "{rel} is ragged: {widths:?}\n{out}"
        );
    }
}

#[test]
fn arrowheads_come_with_source_markers() {
    for rel in FIXTURES {
        let out = render_fixture(rel, false);
        let has_arrow = out.chars().any(is_arrowhead);
        let has_marker = out.chars().any(is_source_marker);
        assert!(has_arrow, "{rel} rendered no arrowheads:\n{out}");
        assert!(has_marker, "{rel} rendered no source markers:\n{out}");
    }
}

#[test]
fn ascii_renders_stay_within_the_ascii_alphabet() {
    for rel in FIXTURES {
        let input = std::fs::read_to_string(fixture_path(rel)).unwrap();
        // Fixtures with non-ascii labels still render, their labels pass
        // through verbatim; everything structural must be ASCII.
        let out = render_fixture(rel, true);
        let parsed = parse_mermaid(&input).unwrap();
        let label_chars: std::collections::HashSet<char> = parsed
            .graph
            .nodes
            .values()
            .flat_map(|node| node.label.chars())
            .collect();
        for ch in out.chars() {
            assert!(
                ch.is_ascii() || label_chars.contains(&ch),
                "{rel}: structural char {ch:?} leaked into ascii mode"
            );
        }
    }
}

#[test]
fn every_label_survives_rendering() {
    for rel in FIXTURES {
        let input = std::fs::read_to_string(fixture_path(rel)).unwrap();
        let parsed = parse_mermaid(&input).unwrap();
        let out = render_fixture(rel, false);
        for node in parsed.graph.nodes.values() {
            assert!(
                out.contains(&node.label),
                "{rel}: node label {:?} missing:\n{out}",
                node.label
            );
        }
    }
}

#[test]
fn fanin_labels_render_twice_and_never_concatenated() {
    let out = render_fixture("flowchart/fanin.mmd", false);
    assert_eq!(
        out.matches("spec.ready").count(),
        2,
        "expected the shared label once per edge:\n{out}"
    );
    assert!(!out.contains("spec.readyspec.ready"), "{out}");
    assert!(!out.contains("readyspec"), "{out}");
}

#[test]
fn edge_paths_start_and_end_on_their_node_borders() {
    for rel in FIXTURES {
        let input = std::fs::read_to_string(fixture_path(rel)).unwrap();
        let parsed = parse_mermaid(&input).unwrap();
        let layout = compute_layout(&parsed.graph, &LayoutConfig::default());
        let dump = LayoutDump::from_layout(&layout);

        for edge in dump.edges.iter().filter(|edge| edge.routed) {
            let from_box = dump.nodes.iter().find(|n| n.id == edge.from).unwrap();
            let to_box = dump.nodes.iter().find(|n| n.id == edge.to).unwrap();
            let first = edge.points.first().unwrap();
            let last = edge.points.last().unwrap();
            assert!(
                on_border(from_box, first[0], first[1]),
                "{rel}: edge {}→{} does not start on its source border",
                edge.from,
                edge.to
            );
            assert!(
                on_border(to_box, last[0], last[1]),
                "{rel}: edge {}→{} does not end on its target border",
                edge.from,
                edge.to
            );
        }
    }
}

fn on_border(node: &mermaid_text_renderer::layout_dump::NodeDump, x: i32, y: i32) -> bool {
    let max_x = node.x + node.width - 1;
    let max_y = node.y + node.height - 1;
    let on_vertical = (x == node.x || x == max_x) && (node.y..=max_y).contains(&y);
    let on_horizontal = (y == node.y || y == max_y) && (node.x..=max_x).contains(&x);
    on_vertical || on_horizontal
}

#[test]
fn self_loop_box_borders_stay_intact() {
    let out = render_fixture("flowchart/self_loop.mmd", false);
    let parsed = parse_mermaid("flowchart LR\nA --> A").unwrap();
    let layout = compute_layout(&parsed.graph, &LayoutConfig::default());
    let node = &layout.nodes[0];

    let lines: Vec<Vec<char>> = out.lines().map(|line| line.chars().collect()).collect();
    let top = &lines[node.drawing.y as usize];
    let bottom = &lines[(node.drawing.y + node.box_height) as usize];
    assert_eq!(top[node.drawing.x as usize], '┌');
    assert_eq!(top[(node.drawing.x + node.box_width) as usize], '┐');
    assert_eq!(bottom[node.drawing.x as usize], '└');
    assert_eq!(bottom[(node.drawing.x + node.box_width) as usize], '┘');

    // The loop leaves the box: at least four turns drawn outside it.
    let corners = out.chars().filter(|c| matches!(c, '┐' | '┘' | '└' | '┌')).count();
    assert!(corners > 4, "expected loop corners beyond the box corners");
}

#[test]
fn empty_input_renders_to_an_empty_string() {
    let parsed = parse_mermaid("flowchart LR\n").unwrap();
    let layout = compute_layout(&parsed.graph, &LayoutConfig::default());
    let out = render_text(&layout, &RenderConfig::default());
    assert_eq!(out, "");
}
