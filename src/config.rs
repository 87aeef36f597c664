use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::PageGeometry;
use crate::render::markdown::MarkdownOptions;
use crate::units::{self, Unit};

const MIB: usize = 1024 * 1024;

/// Conversion settings, usually read from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Markdown wrap column; 0 disables wrapping.
    pub line_width: usize,
    pub include_frontmatter: bool,
    pub html_tables_for_merges: bool,
    pub page: PageSettings,
    /// Inputs at least this large are converted on the worker pool.
    pub worker_threshold: usize,
    pub max_workers: usize,
    /// Larger inputs are rejected before the container is opened.
    pub max_file_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            line_width: 98,
            include_frontmatter: false,
            html_tables_for_merges: true,
            page: PageSettings::default(),
            worker_threshold: MIB,
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            max_file_size: 100 * MIB,
        }
    }
}

/// Page geometry overrides as measure strings (`"8.5in"`, `"21cm"`, or bare
/// twips). Unset fields keep the document's own geometry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSettings {
    pub width: Option<String>,
    pub height: Option<String>,
    pub margin_top: Option<String>,
    pub margin_right: Option<String>,
    pub margin_bottom: Option<String>,
    pub margin_left: Option<String>,
    pub header_inset: Option<String>,
}

fn measure(name: &str, literal: &Option<String>, current: f64) -> Result<f64> {
    let Some(literal) = literal else {
        return Ok(current);
    };
    let twips = units::parse_measure(literal, Unit::Twip);
    let is_zero_literal = literal
        .trim()
        .trim_end_matches(char::is_alphabetic)
        .parse::<f64>()
        .is_ok_and(|v| v == 0.0);
    if twips < 0.0 || (twips == 0.0 && !is_zero_literal) {
        return Err(Error::Config(format!("page.{name}: invalid measure {literal:?}")));
    }
    Ok(twips)
}

impl PageSettings {
    pub fn apply(&self, base: PageGeometry) -> Result<PageGeometry> {
        let geometry = PageGeometry {
            width: measure("width", &self.width, base.width)?,
            height: measure("height", &self.height, base.height)?,
            margin_top: measure("margin_top", &self.margin_top, base.margin_top)?,
            margin_right: measure("margin_right", &self.margin_right, base.margin_right)?,
            margin_bottom: measure("margin_bottom", &self.margin_bottom, base.margin_bottom)?,
            margin_left: measure("margin_left", &self.margin_left, base.margin_left)?,
            header_inset: measure("header_inset", &self.header_inset, base.header_inset)?,
        };
        if geometry.width <= 0.0 || geometry.height <= 0.0 {
            return Err(Error::Config("page width and height must be positive".into()));
        }
        Ok(geometry)
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn markdown_options(&self) -> MarkdownOptions {
        MarkdownOptions {
            line_width: self.line_width,
            include_frontmatter: self.include_frontmatter,
            html_tables_for_merges: self.html_tables_for_merges,
        }
    }
}
