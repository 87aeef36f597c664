pub mod config;
pub mod detect;
mod docx;
mod error;
pub mod fields;
pub mod merge;
pub mod metadata;
pub mod model;
pub mod package;
mod pptx;
pub mod render;
pub mod units;
pub mod worker;

pub use config::Config;
pub use detect::FileType;
pub use error::{Error, ErrorKind, Result};
pub use fields::FieldContext;
pub use merge::ResolvedDocument;
pub use model::{PageGeometry, ParsedDocument};
pub use package::Package;
pub use render::{MarkdownOptions, Page, StyleContext, layout, render_pages_html, to_markdown};

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
    Html,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
            OutputFormat::Html => "html",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            "html" => Ok(OutputFormat::Html),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "format", content = "content", rename_all = "lowercase")]
pub enum Output {
    Markdown(String),
    /// The parsed document tree.
    Json(String),
    Html(String),
}

impl Output {
    pub fn as_str(&self) -> &str {
        match self {
            Output::Markdown(s) | Output::Json(s) | Output::Html(s) => s,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Output::Markdown(s) | Output::Json(s) | Output::Html(s) => s,
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detects the file type and parses the document tree.
pub fn parse_bytes(buffer: &[u8]) -> Result<ParsedDocument> {
    parse_bytes_as(buffer, detect::detect(buffer, None, None)?)
}

pub fn parse_bytes_as(buffer: &[u8], file_type: FileType) -> Result<ParsedDocument> {
    parse_limited(buffer, file_type, package::DEFAULT_EXTRACT_LIMIT)
}

fn parse_limited(buffer: &[u8], file_type: FileType, limit: usize) -> Result<ParsedDocument> {
    let file_type = file_type.ensure_supported()?;
    let pkg = Package::open_with_limit(buffer, limit)?;
    match file_type {
        FileType::Pptx => pptx::parse(&pkg),
        _ => docx::parse(&pkg),
    }
}

/// Field resolution followed by merge resolution.
pub fn resolve(doc: ParsedDocument, ctx: &FieldContext) -> ResolvedDocument {
    ResolvedDocument::new(fields::resolve_fields(doc, ctx))
}

fn check_size(len: usize, config: &Config) -> Result<()> {
    if len > config.max_file_size {
        return Err(Error::PackageRead(format!(
            "input is {len} bytes, the limit is {}",
            config.max_file_size
        )));
    }
    Ok(())
}

fn render_output(resolved: &ResolvedDocument, format: OutputFormat, config: &Config) -> Result<Output> {
    match format {
        OutputFormat::Markdown => Ok(Output::Markdown(to_markdown(
            resolved,
            &config.markdown_options(),
        ))),
        OutputFormat::Json => Ok(Output::Json(serde_json::to_string_pretty(&resolved.doc)?)),
        OutputFormat::Html => {
            let geometry = config
                .page
                .apply(PageGeometry::for_document(&resolved.doc))?;
            let pages = layout(resolved, &geometry);
            Ok(Output::Html(render_pages_html(
                resolved,
                &pages,
                &StyleContext::default(),
            )))
        }
    }
}

fn convert_detected(
    buffer: &[u8],
    file_type: FileType,
    format: OutputFormat,
    config: &Config,
) -> Result<Output> {
    check_size(buffer.len(), config)?;
    let doc = parse_limited(buffer, file_type, config.max_file_size)?;
    let resolved = resolve(doc, &FieldContext::default());
    let output = render_output(&resolved, format, config)?;
    log::info!("converted {file_type} to {} ({} bytes)", format.extension(), output.as_str().len());
    Ok(output)
}

pub fn convert_bytes(buffer: &[u8], format: OutputFormat, config: &Config) -> Result<Output> {
    convert_bytes_as(buffer, None, format, config)
}

pub fn convert_bytes_as(
    buffer: &[u8],
    file_type: Option<FileType>,
    format: OutputFormat,
    config: &Config,
) -> Result<Output> {
    check_size(buffer.len(), config)?;
    let file_type = detect::detect(buffer, file_type, None)?;
    convert_detected(buffer, file_type, format, config)
}

/// Converts on a worker thread when `buffer` reaches `config.worker_threshold`.
pub fn convert_bytes_auto(
    buffer: Vec<u8>,
    file_type: Option<FileType>,
    format: OutputFormat,
    config: &Config,
) -> Result<Output> {
    if buffer.len() < config.worker_threshold {
        return convert_bytes_as(&buffer, file_type, format, config);
    }
    log::info!("offloading {} byte input to a worker", buffer.len());
    let pool = worker::OffloadPool::new(1, config)?;
    let task_id = pool.submit(buffer, file_type, format)?;
    let response = pool.recv()?;
    if response.task_id != task_id {
        return Err(Error::Worker(format!("unexpected response for task {}", response.task_id)));
    }
    pool.terminate();
    response.into_result()
}

/// Converts several documents on up to `config.max_workers` threads.
/// Results are returned in input order; one failure does not stop the rest.
pub fn convert_many(
    inputs: Vec<(Vec<u8>, Option<FileType>)>,
    format: OutputFormat,
    config: &Config,
) -> Result<Vec<Result<Output>>> {
    if inputs.is_empty() {
        return Ok(Vec::new());
    }
    let pool = worker::OffloadPool::new(config.max_workers.clamp(1, inputs.len()), config)?;
    let mut order = HashMap::with_capacity(inputs.len());
    for (index, (buffer, file_type)) in inputs.into_iter().enumerate() {
        order.insert(pool.submit(buffer, file_type, format)?, index);
    }
    let mut results: Vec<Option<Result<Output>>> = (0..order.len()).map(|_| None).collect();
    for _ in 0..order.len() {
        let response = pool.recv()?;
        let Some(&index) = order.get(&response.task_id) else {
            return Err(Error::Worker(format!("unexpected response for task {}", response.task_id)));
        };
        results[index] = Some(response.into_result());
    }
    log::info!("converted {} documents on {} workers", results.len(), pool.len());
    pool.terminate();
    Ok(results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err(Error::Worker("no response for task".into()))))
        .collect())
}

pub fn convert_file(path: &Path, format: OutputFormat, config: &Config) -> Result<Output> {
    convert_file_as(path, None, format, config)
}

/// Like [`convert_file`]; the extension of `path` breaks detection ties.
pub fn convert_file_as(
    path: &Path,
    file_type: Option<FileType>,
    format: OutputFormat,
    config: &Config,
) -> Result<Output> {
    let size = std::fs::metadata(path)?.len();
    check_size(usize::try_from(size).unwrap_or(usize::MAX), config)?;
    let buffer = std::fs::read(path)?;
    let file_type = detect::detect(&buffer, file_type, Some(path))?;
    convert_detected(&buffer, file_type, format, config)
}
