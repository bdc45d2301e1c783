//! Collaborators that describe content: the metadata probe, attribute
//! extraction and thumbnail rendering.
//!
//! The cache core only sees their outputs. Each sits behind a trait so the
//! coordinator can run with stand-ins where the real tools are unavailable.

pub mod exiftool;
pub mod mimetype;
pub mod thumbs;

use std::io;
use std::path::{Path, PathBuf};

use crate::database::{AttrValue, Thumbnail};

pub use exiftool::ExifTool;
pub use mimetype::InferProbe;
pub use thumbs::PngThumbnails;

/// Descriptive facts about a file's format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    pub ext: Option<String>,
    pub mime: String,
    pub magic: String,
}

pub trait MetadataProbe: Send + Sync {
    fn probe(&self, path: &Path) -> io::Result<ProbeInfo>;
}

/// Named facts about one file's content.
pub type Attributes = Vec<(String, AttrValue)>;

pub trait AttributeSource: Send + Sync {
    /// One attribute list per path, in the order given.
    fn attributes(&self, paths: &[PathBuf]) -> anyhow::Result<Vec<Attributes>>;
}

pub trait ThumbnailGenerator: Send + Sync {
    fn thumbnails(&self, path: &Path) -> anyhow::Result<Vec<Thumbnail>>;
}
