use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    TopDown,
    LeftRight,
}

impl Direction {
    /// Resolves a Mermaid direction token. `BT` maps to `TopDown` plus a
    /// vertical flip of the finished canvas; `RL` is rendered as `LR`.
    pub fn from_token(token: &str) -> Option<(Self, bool)> {
        match token {
            "TD" | "TB" => Some((Self::TopDown, false)),
            "BT" => Some((Self::TopDown, true)),
            "LR" | "RL" => Some((Self::LeftRight, false)),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Self::TopDown => "TD",
            Self::LeftRight => "LR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub shape: NodeShape,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub label: Option<String>,
    pub directed: bool,
    pub arrow_start: bool,
    pub arrow_end: bool,
    pub style: EdgeStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStyle {
    Solid,
    Dotted,
    Thick,
}

#[derive(Debug, Clone)]
pub struct Subgraph {
    pub id: Option<String>,
    pub label: String,
    pub nodes: Vec<String>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Graph {
    pub direction: Direction,
    /// Set for `BT` graphs; the renderer flips the finished canvas.
    pub flip_vertical: bool,
    pub nodes: BTreeMap<String, Node>,
    /// Node ids in first-appearance order. Layout seats roots in this order.
    pub order: Vec<String>,
    pub edges: Vec<Edge>,
    pub subgraphs: Vec<Subgraph>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeShape {
    Rectangle,
    RoundRect,
    Stadium,
    Subroutine,
    Circle,
    Diamond,
    Hexagon,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            direction: Direction::TopDown,
            flip_vertical: false,
            nodes: BTreeMap::new(),
            order: Vec::new(),
            edges: Vec::new(),
            subgraphs: Vec::new(),
        }
    }

    pub fn ensure_node(&mut self, id: &str, label: Option<String>, shape: Option<NodeShape>) {
        if !self.nodes.contains_key(id) {
            self.order.push(id.to_string());
        }
        let entry = self.nodes.entry(id.to_string()).or_insert(Node {
            id: id.to_string(),
            label: id.to_string(),
            shape: NodeShape::Rectangle,
        });
        if let Some(label) = label {
            entry.label = label;
        }
        if let Some(shape) = shape {
            entry.shape = shape;
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
