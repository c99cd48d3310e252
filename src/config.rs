use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub render: RenderConfig,
    pub layout: LayoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub use_ascii: bool,
    /// Overrides the direction declared in the diagram header (`LR`, `TD`,
    /// `TB`, `BT`, `RL`).
    pub direction: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            use_ascii: false,
            direction: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Minimum free columns before a node's block.
    pub padding_x: i32,
    /// Minimum free rows before a node's block.
    pub padding_y: i32,
    /// Blank columns/rows between a node label and its box border.
    pub box_border_padding: i32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            padding_x: 5,
            padding_y: 5,
            box_border_padding: 1,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Applies a `%%{init: {...}}%%` directive on top of the loaded config.
/// Only the flowchart keys this renderer understands are picked up.
pub fn merge_init_config(mut config: Config, init: serde_json::Value) -> Config {
    if let Some(flowchart) = init.get("flowchart") {
        if let Some(val) = flowchart.get("useAscii").and_then(|v| v.as_bool()) {
            config.render.use_ascii = val;
        }
        if let Some(val) = flowchart.get("paddingX").and_then(|v| v.as_i64()) {
            config.layout.padding_x = val as i32;
        }
        if let Some(val) = flowchart.get("paddingY").and_then(|v| v.as_i64()) {
            config.layout.padding_y = val as i32;
        }
        if let Some(val) = flowchart.get("boxBorderPadding").and_then(|v| v.as_i64()) {
            config.layout.box_border_padding = val as i32;
        }
        if let Some(val) = flowchart.get("direction").and_then(|v| v.as_str()) {
            config.render.direction = Some(val.to_string());
        }
    }
    config
}
