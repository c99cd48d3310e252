use crate::layout::Layout;
use anyhow::Result;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Serializable snapshot of a computed layout: node box rectangles, routed
/// edge paths in both grid and drawing coordinates, and subgraph frames.
/// Written by `--dump-layout` and used by tests to assert geometry without
/// golden text.
#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub direction: String,
    pub width: i32,
    pub height: i32,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
    pub subgraphs: Vec<SubgraphDump>,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub id: String,
    pub label: String,
    /// Top-left border cell.
    pub x: i32,
    pub y: i32,
    /// Cell counts, borders included.
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub from: String,
    pub to: String,
    pub label: Option<String>,
    pub routed: bool,
    /// Merged grid path.
    pub grid_path: Vec<[i32; 2]>,
    /// The same path projected onto the canvas.
    pub points: Vec<[i32; 2]>,
}

#[derive(Debug, Serialize)]
pub struct SubgraphDump {
    pub label: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl LayoutDump {
    pub fn from_layout(layout: &Layout) -> Self {
        let nodes = layout
            .nodes
            .iter()
            .map(|node| NodeDump {
                id: node.id.clone(),
                label: node.label.clone(),
                x: node.drawing.x,
                y: node.drawing.y,
                width: node.box_width + 1,
                height: node.box_height + 1,
            })
            .collect();

        let edges = layout
            .edges
            .iter()
            .map(|edge| EdgeDump {
                from: layout.nodes[edge.from].id.clone(),
                to: layout.nodes[edge.to].id.clone(),
                label: edge.label.clone(),
                routed: edge.path.len() >= 2,
                grid_path: edge.path.iter().map(|coord| [coord.x, coord.y]).collect(),
                points: edge
                    .path
                    .iter()
                    .map(|coord| {
                        let projected = layout.project(*coord);
                        [projected.x, projected.y]
                    })
                    .collect(),
            })
            .collect();

        let subgraphs = layout
            .subgraphs
            .iter()
            .filter(|subgraph| !subgraph.nodes.is_empty())
            .map(|subgraph| SubgraphDump {
                label: subgraph.label.clone(),
                x: subgraph.min_x,
                y: subgraph.min_y,
                width: subgraph.max_x - subgraph.min_x + 1,
                height: subgraph.max_y - subgraph.min_y + 1,
            })
            .collect();

        Self {
            direction: layout.direction.token().to_string(),
            width: layout.width + 1,
            height: layout.height + 1,
            nodes,
            edges,
            subgraphs,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}
