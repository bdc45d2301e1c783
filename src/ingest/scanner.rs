use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// Expand command-line paths into the files to ingest.
///
/// Without `recursive` the paths pass through untouched. With it, directories
/// are walked in name order and replaced by the regular files beneath them,
/// skipping hidden entries.
pub fn expand<P: AsRef<Path>>(paths: &[P], recursive: bool) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if !recursive || !path.is_dir() {
            out.push(path.to_path_buf());
            continue;
        }
        let walker = WalkDir::new(path).sort_by_file_name().into_iter();
        for entry in walker.filter_entry(|e| e.depth() == 0 || !is_hidden(e)) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => out.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable entry under {:?}: {}", path, e),
            }
        }
    }
    out
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name()
         .to_str()
         .map(|s| s.starts_with('.'))
         .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn walks_directories_skipping_hidden() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("sub/a.txt"), "a").unwrap();
        fs::write(root.join(".hidden"), "h").unwrap();
        fs::write(root.join(".git/config"), "c").unwrap();

        let files = expand(&[root], true);
        assert_eq!(files, [root.join("b.txt"), root.join("sub/a.txt")]);
    }

    #[test]
    fn non_recursive_passes_paths_through() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        let files = expand(&[dir.path(), missing.as_path()], false);
        assert_eq!(files, [dir.path().to_path_buf(), missing]);
    }
}
