use crate::components::{split_graph, stitch_component_canvases};
use crate::config::{load_config, merge_init_config, Config};
use crate::ir::Direction;
use crate::layout::compute_layout;
use crate::layout_dump::LayoutDump;
use crate::parser::parse_mermaid;
use crate::render::render_text;
use crate::reverse::reverse_parse;
use anyhow::Result;
use clap::Parser;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "mmtr",
    version,
    about = "Mermaid flowchart renderer for terminals (Unicode/ASCII character art)"
)]
pub struct Args {
    /// Input file (.mmd or .md) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Plain ASCII output instead of Unicode box drawing
    #[arg(long = "ascii")]
    pub ascii: bool,

    /// Config JSON file
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Override the graph direction (LR, RL, TD, TB, BT)
    #[arg(long = "direction")]
    pub direction: Option<String>,

    /// Decode rendered character art back into Mermaid text
    #[arg(long = "reverse")]
    pub reverse: bool,

    /// Lay out and render each connected component separately, then stack
    /// the results
    #[arg(long = "split-components")]
    pub split_components: bool,

    /// Write the computed layout as JSON to this path
    #[arg(long = "dump-layout")]
    pub dump_layout: Option<PathBuf>,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    let mut base_config = load_config(args.config.as_deref())?;
    if args.ascii {
        base_config.render.use_ascii = true;
    }
    if let Some(direction) = &args.direction {
        base_config.render.direction = Some(direction.clone());
    }

    let (input, is_markdown) = read_input(args.input.as_deref())?;

    if args.reverse {
        let mermaid = reverse_parse(&input);
        return write_output(&mermaid, args.output.as_deref());
    }

    let diagrams = if is_markdown {
        extract_mermaid_blocks(&input)
    } else {
        vec![input]
    };
    if diagrams.is_empty() {
        return Err(anyhow::anyhow!("no Mermaid diagrams found in input"));
    }

    let mut rendered = Vec::with_capacity(diagrams.len());
    for (idx, diagram) in diagrams.iter().enumerate() {
        let parsed = parse_mermaid(diagram)?;
        let mut config = base_config.clone();
        if let Some(init) = parsed.init_config {
            config = merge_init_config(config, init);
        }
        let mut graph = parsed.graph;
        if let Some(token) = &config.render.direction {
            if let Some((direction, flip)) = Direction::from_token(token) {
                graph.direction = direction;
                graph.flip_vertical = flip;
            }
        }

        let text = if args.split_components {
            render_components(&graph, &config)
        } else {
            let layout = compute_layout(&graph, &config.layout);
            if idx == 0 {
                if let Some(path) = &args.dump_layout {
                    LayoutDump::from_layout(&layout).write(path)?;
                }
            }
            render_text(&layout, &config.render)
        };
        rendered.push(text);
    }

    write_output(&rendered.join("\n\n"), args.output.as_deref())
}

fn render_components(graph: &crate::ir::Graph, config: &Config) -> String {
    let parts = split_graph(graph);
    let canvases: Vec<crate::canvas::Canvas> = parts
        .iter()
        .map(|part| {
            let layout = compute_layout(part, &config.layout);
            let text = render_text(&layout, &config.render);
            text_to_canvas(&text)
        })
        .collect();
    let gap = config.layout.padding_y.max(1);
    stitch_component_canvases(&canvases, graph.direction, gap).to_string()
}

fn text_to_canvas(text: &str) -> crate::canvas::Canvas {
    let mut canvas = crate::canvas::Canvas::empty();
    for (y, line) in text.lines().enumerate() {
        canvas.draw_text(0, y as i32, line);
    }
    canvas
}

fn read_input(path: Option<&Path>) -> Result<(String, bool)> {
    if let Some(path) = path {
        if path == Path::new("-") {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            return Ok((buf, false));
        }
        let content = std::fs::read_to_string(path)?;
        let is_md = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext, "md" | "markdown"))
            .unwrap_or(false);
        return Ok((content, is_md));
    }

    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok((buf, false))
}

fn write_output(text: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, text)?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(text.as_bytes())?;
            handle.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn extract_mermaid_blocks(input: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut in_block = false;
    let mut current = Vec::new();
    let mut fence = String::new();

    for line in input.lines() {
        let trimmed = line.trim();
        if !in_block {
            if let Some(start_fence) = detect_mermaid_fence(trimmed) {
                in_block = true;
                fence = start_fence;
                continue;
            }
        } else if is_fence_end(trimmed, &fence) {
            in_block = false;
            blocks.push(current.join("\n"));
            current.clear();
            continue;
        }

        if in_block {
            current.push(line.to_string());
        }
    }

    blocks
}

fn detect_mermaid_fence(line: &str) -> Option<String> {
    for (fence, marker) in [("```", '`'), ("~~~", '~'), (":::", ':')] {
        if line.starts_with(fence) {
            let rest = line.trim_start_matches(marker).trim();
            if rest.starts_with("mermaid") {
                return Some(fence.to_string());
            }
        }
    }
    None
}

fn is_fence_end(line: &str, fence: &str) -> bool {
    line.starts_with(fence) && line[fence.len()..].trim().is_empty()
}
