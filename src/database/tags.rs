//! Tags and the edges between them.
//!
//! Both tags and content may be tagged. Edges run from the tagged thing
//! (tail) to its tag (head). Nothing stops tag edges from forming a cycle, so
//! traversals keep a visited set.

use std::collections::{BTreeMap, HashSet, VecDeque};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::database::atomically;
use crate::database::models::{Digest, Node, Tag};
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct TagGraph<'c> {
    conn: &'c Connection,
}

impl<'c> TagGraph<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Create any missing tags and set descriptions.
    ///
    /// Plain `names` are created without a description when missing and left
    /// alone otherwise. Every entry of `described` is created or has its
    /// description replaced. Returns one tag per distinct name: `names` in
    /// order, then described names not already listed.
    pub fn ensure<S: AsRef<str>>(&self, names: &[S], described: &BTreeMap<String, String>) -> Result<Vec<Tag>> {
        atomically(self.conn, "ensure_tags", || {
            let mut plain = self
                .conn
                .prepare("INSERT INTO tag (name) VALUES (?1) ON CONFLICT(name) DO NOTHING")?;
            for name in names {
                plain.execute(params![name.as_ref()])?;
            }
            let mut upsert = self.conn.prepare(
                "INSERT INTO tag (name, description) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET description = excluded.description",
            )?;
            for (name, description) in described {
                upsert.execute(params![name, description])?;
            }
            Ok(())
        })?;

        let mut seen = HashSet::new();
        let ordered: Vec<&str> = names
            .iter()
            .map(AsRef::as_ref)
            .chain(described.keys().map(String::as_str))
            .filter(|name| seen.insert(*name))
            .collect();
        let mut tags = Vec::with_capacity(ordered.len());
        for name in ordered {
            if let Some(tag) = self.by_name(name)? {
                tags.push(tag);
            }
        }
        Ok(tags)
    }

    pub fn by_name(&self, name: &str) -> Result<Option<Tag>> {
        Ok(self
            .conn
            .query_row("SELECT id, name, description FROM tag WHERE name = ?1", params![name], Tag::from_row)
            .optional()?)
    }

    /// Existing tags with the given names, in the order asked. Unknown names
    /// are skipped.
    pub fn get<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Tag>> {
        let mut tags = Vec::new();
        for name in names {
            if let Some(tag) = self.by_name(name.as_ref())? {
                tags.push(tag);
            }
        }
        Ok(tags)
    }

    /// Put every tail under every head. Linking an existing pair is a no-op.
    ///
    /// Returns how many edges were actually created.
    pub fn link(&self, tails: &[Node], heads: &[Tag]) -> Result<usize> {
        atomically(self.conn, "link", || {
            let mut tag_edge = self
                .conn
                .prepare("INSERT OR IGNORE INTO tag_edge (tail, head) VALUES (?1, ?2)")?;
            let mut content_edge = self
                .conn
                .prepare("INSERT OR IGNORE INTO content_tag_edge (digest, tag) VALUES (?1, ?2)")?;
            let mut created = 0;
            for tail in tails {
                for head in heads {
                    created += match tail {
                        Node::Tag(id) => tag_edge.execute(params![id, head.id])?,
                        Node::Content(hash) => content_edge.execute(params![hash, head.id])?,
                    };
                }
            }
            debug!("Linked {} tails under {} heads: {} new edges", tails.len(), heads.len(), created);
            Ok(created)
        })
    }

    /// Tags directly attached to a piece of content.
    pub fn tags_of(&self, hash: &str) -> Result<Vec<Tag>> {
        self.collect(
            "SELECT t.id, t.name, t.description FROM tag t
             JOIN content_tag_edge e ON e.tag = t.id
             WHERE e.digest = ?1 ORDER BY t.name",
            params![hash],
        )
    }

    /// Tags this tag is filed under.
    pub fn parents(&self, tag: &Tag) -> Result<Vec<Tag>> {
        self.collect(
            "SELECT t.id, t.name, t.description FROM tag t
             JOIN tag_edge e ON e.head = t.id
             WHERE e.tail = ?1 ORDER BY t.name",
            params![tag.id],
        )
    }

    /// Tags filed under this tag.
    pub fn children(&self, tag: &Tag) -> Result<Vec<Tag>> {
        self.collect(
            "SELECT t.id, t.name, t.description FROM tag t
             JOIN tag_edge e ON e.tail = t.id
             WHERE e.head = ?1 ORDER BY t.name",
            params![tag.id],
        )
    }

    /// Every tag reachable by following edges from `tag` towards its heads,
    /// nearest first. Terminates on cycles; `tag` itself is only included if
    /// a cycle leads back to it.
    pub fn ancestors(&self, tag: &Tag) -> Result<Vec<Tag>> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([tag.clone()]);
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            for parent in self.parents(&current)? {
                if visited.insert(parent.id) {
                    out.push(parent.clone());
                    queue.push_back(parent);
                }
            }
        }
        Ok(out)
    }

    /// Content filed directly under `tag`.
    pub fn tagged(&self, tag: &Tag) -> Result<Vec<Digest>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.id, d.size, d.ext, d.mime, d.magic FROM digest d
             JOIN content_tag_edge e ON e.digest = d.id
             WHERE e.tag = ?1 ORDER BY d.id",
        )?;
        let rows = stmt.query_map(params![tag.id], Digest::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn collect(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, Tag::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
