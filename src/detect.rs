use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Docx,
    Pptx,
    Pages,
    Keynote,
}

impl FileType {
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        ext.parse().ok()
    }

    pub fn is_supported(self) -> bool {
        matches!(self, FileType::Docx | FileType::Pptx)
    }

    /// Fails with `UnsupportedFormat` for the iWork formats.
    pub fn ensure_supported(self) -> Result<Self> {
        if self.is_supported() {
            Ok(self)
        } else {
            Err(Error::UnsupportedFormat(self.to_string()))
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileType::Docx => "DOCX",
            FileType::Pptx => "PPTX",
            FileType::Pages => "Pages",
            FileType::Keynote => "Keynote",
        })
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "docx" | "docm" | "dotx" => Ok(FileType::Docx),
            "pptx" | "pptm" | "potx" => Ok(FileType::Pptx),
            "pages" => Ok(FileType::Pages),
            "key" | "keynote" => Ok(FileType::Keynote),
            other => Err(format!("unknown file type: {other}")),
        }
    }
}

fn is_slide_part(name: &str) -> bool {
    name.strip_prefix("ppt/slides/slide")
        .and_then(|rest| rest.strip_suffix(".xml"))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Guesses the format from the zip entry names without extracting anything.
/// iWork archives share `Index/Document.iwa`, so `hint` breaks the tie.
pub fn sniff(buffer: &[u8], hint: Option<FileType>) -> Option<FileType> {
    let zip = zip::ZipArchive::new(Cursor::new(buffer)).ok()?;
    let names: Vec<&str> = zip.file_names().collect();
    let has = |part: &str| names.iter().any(|n| n.trim_start_matches('/') == part);

    if has("word/document.xml") {
        return Some(FileType::Docx);
    }
    if has("ppt/presentation.xml") || names.iter().any(|n| is_slide_part(n)) {
        return Some(FileType::Pptx);
    }
    if has("index.apxl") {
        return Some(FileType::Keynote);
    }
    if has("Index/Document.iwa") || has("index.xml") {
        return Some(match hint {
            Some(FileType::Keynote) => FileType::Keynote,
            _ => FileType::Pages,
        });
    }
    None
}

/// An explicit choice wins; otherwise the container is sniffed, then the
/// extension of `path` is consulted.
pub fn detect(buffer: &[u8], explicit: Option<FileType>, path: Option<&Path>) -> Result<FileType> {
    if let Some(file_type) = explicit {
        return Ok(file_type);
    }
    let by_extension = path.and_then(FileType::from_extension);
    if let Some(file_type) = sniff(buffer, by_extension) {
        log::debug!("detected {file_type} from package contents");
        return Ok(file_type);
    }
    by_extension.ok_or_else(|| Error::PackageRead("unrecognized document package".into()))
}
