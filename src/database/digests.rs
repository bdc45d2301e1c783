use std::collections::{HashMap, HashSet};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::database::atomically;
use crate::database::models::{AttrType, AttrValue, Attribute, Digest, NewDigestRecord, Thumbnail};
use crate::error::{CacheError, Result};

/// The deduplicated registry of content: one row per content hash.
#[derive(Debug, Clone, Copy)]
pub struct DigestStore<'c> {
    conn: &'c Connection,
}

impl<'c> DigestStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, hash: &str) -> Result<Option<Digest>> {
        let sql = format!("SELECT {} FROM digest WHERE id = ?1", Digest::COLUMNS);
        Ok(self.conn.query_row(&sql, params![hash], Digest::from_row).optional()?)
    }

    /// Existing digests for any of `hashes`. Hashes not in the store are
    /// simply absent from the result.
    pub fn lookup_by_hash<I, S>(&self, hashes: I) -> Result<HashMap<String, Digest>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sql = format!("SELECT {} FROM digest WHERE id = ?1", Digest::COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut found = HashMap::new();
        for hash in hashes {
            let hash = hash.as_ref();
            if found.contains_key(hash) {
                continue;
            }
            if let Some(digest) = stmt.query_row(params![hash], Digest::from_row).optional()? {
                found.insert(hash.to_string(), digest);
            }
        }
        Ok(found)
    }

    /// Insert digests that are known not to be stored yet.
    ///
    /// Records sharing a hash collapse to the first one seen, including its
    /// attributes. Returns one digest per unique hash in first-seen order. The
    /// whole batch is written atomically.
    pub fn create_missing(&self, records: &[NewDigestRecord]) -> Result<Vec<Digest>> {
        let mut seen = HashSet::new();
        let unique: Vec<&NewDigestRecord> =
            records.iter().filter(|r| seen.insert(r.hash.as_str())).collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        atomically(self.conn, "create_missing", || {
            let mut insert = self.conn.prepare(
                "INSERT INTO digest (id, size, ext, mime, magic) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut created = Vec::with_capacity(unique.len());
            for record in &unique {
                insert.execute(params![record.hash, record.size, record.ext, record.mime, record.magic])?;
                self.upsert_attributes(&record.hash, &record.attributes)?;
                created.push(record.digest());
            }
            debug!("Created {} digests ({} records)", created.len(), records.len());
            Ok(created)
        })
    }

    /// Re-apply freshly probed metadata to digests that are already stored.
    ///
    /// Identity and size stay as they are; `ext`, `mime`, `magic` and the
    /// whole attribute set are replaced.
    pub fn refresh(&self, records: &[NewDigestRecord]) -> Result<Vec<Digest>> {
        let mut seen = HashSet::new();
        let unique: Vec<&NewDigestRecord> =
            records.iter().filter(|r| seen.insert(r.hash.as_str())).collect();

        atomically(self.conn, "refresh", || {
            let mut update = self
                .conn
                .prepare("UPDATE digest SET ext = ?2, mime = ?3, magic = ?4 WHERE id = ?1")?;
            let mut refreshed = Vec::with_capacity(unique.len());
            for record in &unique {
                if update.execute(params![record.hash, record.ext, record.mime, record.magic])? == 0 {
                    return Err(CacheError::ConstraintViolation(format!(
                        "cannot refresh unknown digest {}",
                        record.hash
                    )));
                }
                self.conn.execute("DELETE FROM attribute WHERE digest_id = ?1", params![record.hash])?;
                self.upsert_attributes(&record.hash, &record.attributes)?;
                refreshed.push(self.get(&record.hash)?.unwrap_or_else(|| record.digest()));
            }
            Ok(refreshed)
        })
    }

    fn upsert_attributes(&self, hash: &str, attributes: &[(String, AttrValue)]) -> Result<()> {
        if attributes.is_empty() {
            return Ok(());
        }
        let mut stmt = self.conn.prepare(
            "INSERT INTO attribute (digest_id, name, text, type) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(digest_id, name) DO UPDATE SET text = excluded.text, type = excluded.type",
        )?;
        for (name, value) in attributes {
            stmt.execute(params![hash, name, value.to_text(), value.kind().as_str()])?;
        }
        Ok(())
    }

    pub fn attributes_of(&self, hash: &str) -> Result<Vec<Attribute>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, text, type FROM attribute WHERE digest_id = ?1 ORDER BY name")?;
        let rows = stmt.query_map(params![hash], |row| {
            let name: String = row.get(0)?;
            let text: String = row.get(1)?;
            let kind: String = row.get(2)?;
            Ok((name, text, kind))
        })?;
        let mut attributes = Vec::new();
        for row in rows {
            let (name, text, kind) = row?;
            let kind = AttrType::parse(&kind).unwrap_or(AttrType::Text);
            attributes.push(Attribute {
                digest_id: hash.to_string(),
                name,
                value: AttrValue::decode(kind, &text),
            });
        }
        Ok(attributes)
    }

    /// Replace thumbnails of the same size, keep the others.
    pub fn store_thumbnails(&self, hash: &str, thumbnails: &[Thumbnail]) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "INSERT OR REPLACE INTO thumbnail (digest_id, width, height, image) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for thumb in thumbnails {
            stmt.execute(params![hash, thumb.width, thumb.height, thumb.image])?;
        }
        Ok(())
    }

    pub fn thumbnails_of(&self, hash: &str) -> Result<Vec<Thumbnail>> {
        let mut stmt = self.conn.prepare(
            "SELECT width, height, image FROM thumbnail WHERE digest_id = ?1 ORDER BY width, height",
        )?;
        let rows = stmt.query_map(params![hash], |row| {
            Ok(Thumbnail { width: row.get(0)?, height: row.get(1)?, image: row.get(2)? })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count(&self) -> Result<u64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM digest", [], |row| row.get(0))?)
    }
}
