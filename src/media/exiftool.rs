use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};

use crate::database::AttrValue;
use crate::media::{AttributeSource, Attributes};

/// Tags exiftool reports about the file on disk rather than its content.
const PATH_TAGS: &[&str] = &[
    "SourceFile",
    "FileName",
    "Directory",
    "FilePermissions",
    "FileModifyDate",
    "FileAccessDate",
    "FileInodeChangeDate",
    "FileCreateDate",
];

/// Wrapper around the external `exiftool` program.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self { program: PathBuf::from("exiftool") }
    }
}

impl ExifTool {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    /// Raw `exiftool -j` records for `paths`, in the tool's order.
    pub fn records(&self, paths: &[PathBuf]) -> Result<Vec<Map<String, Value>>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let mut child = Command::new(&self.program)
            .arg("-j")
            .args(paths)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program.display()))?;

        let mut stdout = child.stdout.take().ok_or_else(|| anyhow!("Failed to open stdout"))?;
        let mut buffer = Vec::new();
        stdout.read_to_end(&mut buffer).context("Failed to read exiftool output")?;

        // exiftool exits non-zero when any one file fails but still reports the rest
        let status = child.wait().context("Failed to wait on exiftool")?;
        if buffer.iter().all(u8::is_ascii_whitespace) {
            if status.success() {
                return Ok(Vec::new());
            }
            return Err(anyhow!("exiftool exited with {}", status));
        }
        serde_json::from_slice(&buffer).context("Failed to parse exiftool output")
    }
}

impl AttributeSource for ExifTool {
    fn attributes(&self, paths: &[PathBuf]) -> Result<Vec<Attributes>> {
        Ok(match_records(paths, self.records(paths)?))
    }
}

/// Pair records back up with the paths they describe via `SourceFile`, which
/// exiftool echoes exactly as given. Paths without a record get no attributes.
pub fn match_records(paths: &[PathBuf], records: Vec<Map<String, Value>>) -> Vec<Attributes> {
    let mut by_source: HashMap<String, Map<String, Value>> = records
        .into_iter()
        .filter_map(|record| {
            let source = record.get("SourceFile")?.as_str()?.to_string();
            Some((source, record))
        })
        .collect();

    paths
        .iter()
        .map(|path| {
            by_source
                .remove(&source_key(path))
                .map(content_attributes)
                .unwrap_or_default()
        })
        .collect()
}

fn source_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn content_attributes(record: Map<String, Value>) -> Attributes {
    record
        .into_iter()
        .filter(|(name, _)| !PATH_TAGS.contains(&name.as_str()))
        .map(|(name, value)| (name, AttrValue::from(value)))
        .collect()
}
