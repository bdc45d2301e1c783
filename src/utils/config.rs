use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

pub const CACHE_VAR: &str = "REPHILE_CACHE";
pub const JOBS_VAR: &str = "REPHILE_JOBS";
pub const DOTENV: &str = ".env";

/// Where the cache lives and how many workers ingest into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub cache: PathBuf,
    pub jobs: usize,
}

impl Settings {
    /// Resolve from command-line values, then the process environment, then
    /// `.env` in the working directory.
    pub fn resolve(cache: Option<PathBuf>, jobs: Option<usize>) -> Result<Self> {
        Self::resolve_with(cache, jobs, |key| std::env::var(key).ok(), Path::new(DOTENV))
    }

    pub fn resolve_with(
        cache: Option<PathBuf>,
        jobs: Option<usize>,
        env: impl Fn(&str) -> Option<String>,
        dotenv: &Path,
    ) -> Result<Self> {
        let file = load_from_env(dotenv)?;
        let lookup = |key: &str| env(key).or_else(|| file.get(key).cloned());

        let cache = match cache {
            Some(cache) => cache,
            None => lookup(CACHE_VAR).map(PathBuf::from).ok_or_else(|| {
                anyhow!("No cache configured: pass --cache, set {} or run `rephile init --remember`", CACHE_VAR)
            })?,
        };
        let jobs = match jobs.map(Ok).or_else(|| lookup(JOBS_VAR).map(|v| parse_jobs(&v))) {
            Some(jobs) => jobs?,
            None => default_jobs(),
        };
        debug!("Settings: cache={:?} jobs={}", cache, jobs);
        Ok(Self { cache, jobs: jobs.max(1) })
    }
}

fn parse_jobs(value: &str) -> Result<usize> {
    value.trim().parse().with_context(|| format!("{} must be a positive integer, got {:?}", JOBS_VAR, value))
}

fn default_jobs() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// `KEY=value` pairs from a dotenv file. A missing file has none.
pub fn load_from_env(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let reader = BufReader::new(file);

    let mut vars = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            vars.insert(key.trim().to_string(), value.to_string());
        }
    }
    Ok(vars)
}

/// Set `key` in a dotenv file, keeping every other line as it was.
pub fn save_to_env(path: &Path, key: &str, value: &str) -> Result<()> {
    let existing = if path.exists() {
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?
    } else {
        String::new()
    };

    let entry = format!("{}={}", key, value);
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| match line.split_once('=') {
            Some((k, _)) if k.trim() == key => {
                replaced = true;
                entry.clone()
            }
            _ => line.to_string(),
        })
        .collect();
    if !replaced {
        lines.push(entry);
    }

    let mut contents = lines.join("\n");
    contents.push('\n');
    fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))?;
    info!("Saved {} to {:?}", key, path);
    Ok(())
}
