use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mermaid_text_renderer::config::{LayoutConfig, RenderConfig};
use mermaid_text_renderer::layout::compute_layout;
use mermaid_text_renderer::parser::parse_mermaid;
use mermaid_text_renderer::render::render_text;
use mermaid_text_renderer::reverse::reverse_parse;

fn fixture(name: &str) -> &'static str {
    match name {
        "flowchart_small" => include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/benches/fixtures/flowchart_small.mmd"
        )),
        "flowchart_medium" => include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/benches/fixtures/flowchart_medium.mmd"
        )),
        "flowchart_large" => include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/benches/fixtures/flowchart_large.mmd"
        )),
        _ => panic!("unknown fixture {name}"),
    }
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    for name in ["flowchart_small", "flowchart_medium", "flowchart_large"] {
        let input = fixture(name);
        group.bench_with_input(BenchmarkId::from_parameter(name), input, |b, input| {
            b.iter(|| {
                let parsed = parse_mermaid(black_box(input)).unwrap();
                let layout = compute_layout(&parsed.graph, &LayoutConfig::default());
                black_box(render_text(&layout, &RenderConfig::default()))
            });
        });
    }
    group.finish();
}

fn bench_reverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("reverse");
    for name in ["flowchart_small", "flowchart_medium"] {
        let parsed = parse_mermaid(fixture(name)).unwrap();
        let layout = compute_layout(&parsed.graph, &LayoutConfig::default());
        let art = render_text(&layout, &RenderConfig::default());
        group.bench_with_input(BenchmarkId::from_parameter(name), &art, |b, art| {
            b.iter(|| black_box(reverse_parse(black_box(art))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_render, bench_reverse);
criterion_main!(benches);
