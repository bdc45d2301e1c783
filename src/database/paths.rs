use std::collections::HashMap;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::database::atomically;
use crate::database::models::{PathRecord, PathStat};
use crate::error::{CacheError, Result};

/// Registry of filesystem paths, each pointing at the digest of its current
/// content.
#[derive(Debug, Clone, Copy)]
pub struct PathIndex<'c> {
    conn: &'c Connection,
}

impl<'c> PathIndex<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Result<Option<PathRecord>> {
        let path = absolute(path.as_ref())?;
        let sql = format!("SELECT {} FROM path WHERE id = ?1", PathRecord::COLUMNS);
        Ok(self.conn.query_row(&sql, params![key(&path)], PathRecord::from_row).optional()?)
    }

    /// Records for whichever of `paths` are already indexed, keyed by
    /// absolute path.
    pub fn known<I, P>(&self, paths: I) -> Result<HashMap<PathBuf, PathRecord>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let sql = format!("SELECT {} FROM path WHERE id = ?1", PathRecord::COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut found = HashMap::new();
        for path in paths {
            let path = absolute(path.as_ref())?;
            if found.contains_key(&path) {
                continue;
            }
            if let Some(record) = stmt.query_row(params![key(&path)], PathRecord::from_row).optional()? {
                found.insert(path, record);
            }
        }
        Ok(found)
    }

    /// Bring each path's record in line with the hash of its current content.
    ///
    /// Unknown paths are inserted with fresh stat metadata. Known paths whose
    /// digest already matches are left untouched. Known paths pointing at
    /// another digest are repointed in place. Returns the resulting records
    /// in input order.
    pub fn fresh<P, H>(&self, pairs: &[(P, H)]) -> Result<Vec<PathRecord>>
    where
        P: AsRef<Path>,
        H: AsRef<str>,
    {
        atomically(self.conn, "fresh", || {
            let mut out = Vec::with_capacity(pairs.len());
            let (mut created, mut repointed) = (0usize, 0usize);
            for (path, hash) in pairs {
                let path = absolute(path.as_ref())?;
                let hash = hash.as_ref();
                let record = match self.get(&path)? {
                    Some(record) if record.digest_id == hash => record,
                    Some(record) => {
                        debug!("{:?} changed: {} -> {}", path, record.digest_id, hash);
                        repointed += 1;
                        self.write(&path, hash, true)?
                    }
                    None => {
                        created += 1;
                        self.write(&path, hash, false)?
                    }
                };
                out.push(record);
            }
            debug!("Paths: {} new, {} repointed, {} total", created, repointed, pairs.len());
            Ok(out)
        })
    }

    fn write(&self, path: &Path, hash: &str, existing: bool) -> Result<PathRecord> {
        let (real, stat) = stat(path).map_err(|e| CacheError::unreadable(path, e))?;
        let sql = if existing {
            "UPDATE path SET real = ?2, mode = ?3, uid = ?4, gid = ?5, atime = ?6, mtime = ?7,
             ctime = ?8, digest_id = ?9 WHERE id = ?1"
        } else {
            "INSERT INTO path (id, real, mode, uid, gid, atime, mtime, ctime, digest_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        };
        self.conn.execute(
            sql,
            params![
                key(path),
                key(&real),
                stat.mode,
                stat.uid,
                stat.gid,
                stat.atime,
                stat.mtime,
                stat.ctime,
                hash
            ],
        )?;
        Ok(PathRecord { id: path.to_path_buf(), real, stat, digest_id: hash.to_string() })
    }

    /// Re-record stat metadata for indexed paths whose stat moved on while
    /// their content did not, such as a touched file. The digest pointer is
    /// kept. Paths whose stat still matches (access time aside) and paths
    /// that are not indexed are skipped. Returns the number of rows rewritten.
    pub fn restat<P: AsRef<Path>>(&self, paths: &[P]) -> Result<usize> {
        atomically(self.conn, "restat", || {
            let mut updated = 0;
            for path in paths {
                let path = absolute(path.as_ref())?;
                let Some(record) = self.get(&path)? else {
                    continue;
                };
                let (real, now) = stat(&path).map_err(|e| CacheError::unreadable(&path, e))?;
                let now = PathStat { atime: record.stat.atime, ..now };
                if real == record.real && now == record.stat {
                    continue;
                }
                self.write(&path, &record.digest_id, true)?;
                updated += 1;
            }
            debug!("Restat: {} of {} paths rewritten", updated, paths.len());
            Ok(updated)
        })
    }

    /// Every indexed path currently pointing at `hash`.
    pub fn paths_of(&self, hash: &str) -> Result<Vec<PathRecord>> {
        let sql = format!("SELECT {} FROM path WHERE digest_id = ?1 ORDER BY id", PathRecord::COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![hash], PathRecord::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count(&self) -> Result<u64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM path", [], |row| row.get(0))?)
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// The absolute form of `path`, without resolving symlinks.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| CacheError::unreadable(path, e))
}

/// Resolved path and stat metadata of the file at `path`.
pub fn stat(path: &Path) -> io::Result<(PathBuf, PathStat)> {
    let meta = fs::metadata(path)?;
    let real = fs::canonicalize(path)?;
    let (mode, uid, gid) = ownership(&meta);
    let stat = PathStat {
        mode,
        uid,
        gid,
        atime: unix_nanos(meta.accessed()),
        mtime: unix_nanos(meta.modified()),
        ctime: change_time(&meta),
    };
    Ok((real, stat))
}

/// Whether the file at `path` still looks like it did when `record` was
/// written: same length as its digest and the same modification and change
/// times. Anything unreadable counts as changed.
///
/// A rewrite of the same length inside one tick of the filesystem's
/// timestamp clock goes unnoticed; `force` covers that.
pub fn unchanged(path: &Path, record: &PathRecord, size: u64) -> bool {
    match fs::metadata(path) {
        Ok(meta) => {
            record.stat.mtime.is_some()
                && meta.len() == size
                && unix_nanos(meta.modified()) == record.stat.mtime
                && change_time(&meta) == record.stat.ctime
        }
        Err(_) => false,
    }
}

#[cfg(unix)]
fn ownership(meta: &Metadata) -> (Option<u32>, Option<u32>, Option<u32>) {
    use std::os::unix::fs::MetadataExt;
    (Some(meta.mode()), Some(meta.uid()), Some(meta.gid()))
}

#[cfg(not(unix))]
fn ownership(_meta: &Metadata) -> (Option<u32>, Option<u32>, Option<u32>) {
    (None, None, None)
}

/// Inode change time, which moves on every write and every `utimes`.
#[cfg(unix)]
fn change_time(meta: &Metadata) -> Option<i64> {
    use std::os::unix::fs::MetadataExt;
    meta.ctime().checked_mul(1_000_000_000)?.checked_add(meta.ctime_nsec())
}

#[cfg(not(unix))]
fn change_time(meta: &Metadata) -> Option<i64> {
    unix_nanos(meta.created())
}

fn unix_nanos(time: io::Result<SystemTime>) -> Option<i64> {
    let time = time.ok()?;
    let nanos = match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).ok()?,
        Err(before) => -i64::try_from(before.duration().as_nanos()).ok()?,
    };
    Some(nanos)
}
