use std::fmt;
use std::path::PathBuf;

use rusqlite::Row;
use serde::Serialize;

/// One record per distinct content identity.
///
/// A `Digest` is a plain value: the paths, attributes and tags that refer to
/// it are looked up by its `id` through the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Digest {
    /// Hex SHA-256 of the content.
    pub id: String,
    pub size: u64,
    pub ext: Option<String>,
    pub mime: String,
    pub magic: String,
}

impl Digest {
    pub(crate) const COLUMNS: &'static str = "id, size, ext, mime, magic";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            size: row.get(1)?,
            ext: row.get(2)?,
            mime: row.get(3)?,
            magic: row.get(4)?,
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>10} {} .{} [{}]", self.size, self.id, self.ext.as_deref().unwrap_or(""), self.mime)
    }
}

/// A freshly computed digest that is not in the store yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDigestRecord {
    pub hash: String,
    pub size: u64,
    pub ext: Option<String>,
    pub mime: String,
    pub magic: String,
    pub attributes: Vec<(String, AttrValue)>,
}

impl NewDigestRecord {
    pub fn digest(&self) -> Digest {
        Digest {
            id: self.hash.clone(),
            size: self.size,
            ext: self.ext.clone(),
            mime: self.mime.clone(),
            magic: self.magic.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrType {
    Text,
    Integer,
    Rational,
}

impl AttrType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Rational => "rational",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "integer" => Some(Self::Integer),
            "rational" => Some(Self::Rational),
            _ => None,
        }
    }
}

/// The value of an attribute, decoded once from its stored text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Text(String),
    Integer(i64),
    Rational(f64),
}

impl AttrValue {
    pub fn kind(&self) -> AttrType {
        match self {
            Self::Text(_) => AttrType::Text,
            Self::Integer(_) => AttrType::Integer,
            Self::Rational(_) => AttrType::Rational,
        }
    }

    /// The stored text form.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Rational(r) => r.to_string(),
        }
    }

    /// Decode stored text according to its type. Text that does not parse as
    /// the declared number type is kept as text rather than lost.
    pub fn decode(kind: AttrType, text: &str) -> Self {
        match kind {
            AttrType::Text => Self::Text(text.to_string()),
            AttrType::Integer => text
                .parse()
                .map(Self::Integer)
                .unwrap_or_else(|_| Self::Text(text.to_string())),
            AttrType::Rational => text
                .parse()
                .map(Self::Rational)
                .unwrap_or_else(|_| Self::Text(text.to_string())),
        }
    }
}

impl From<serde_json::Value> for AttrValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Self::Integer(i),
                (None, Some(f)) => Self::Rational(f),
                _ => Self::Text(n.to_string()),
            },
            Value::String(s) => Self::Text(s),
            other => Self::Text(other.to_string()),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub digest_id: String,
    pub name: String,
    pub value: AttrValue,
}

/// Filesystem stat metadata recorded for a path. Timestamps are nanoseconds
/// since the unix epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PathStat {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub atime: Option<i64>,
    pub mtime: Option<i64>,
    pub ctime: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathRecord {
    /// Absolute path, the primary key.
    pub id: PathBuf,
    /// Symlink-resolved path.
    pub real: PathBuf,
    pub stat: PathStat,
    pub digest_id: String,
}

impl PathRecord {
    pub(crate) const COLUMNS: &'static str = "id, real, mode, uid, gid, atime, mtime, ctime, digest_id";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: PathBuf::from(row.get::<_, String>(0)?),
            real: PathBuf::from(row.get::<_, String>(1)?),
            stat: PathStat {
                mode: row.get(2)?,
                uid: row.get(3)?,
                gid: row.get(4)?,
                atime: row.get(5)?,
                mtime: row.get(6)?,
                ctime: row.get(7)?,
            },
            digest_id: row.get(8)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

impl Tag {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self { id: row.get(0)?, name: row.get(1)?, description: row.get(2)? })
    }
}

/// The tail of an edge: either another tag or a piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Tag(i64),
    Content(String),
}

impl From<&Tag> for Node {
    fn from(tag: &Tag) -> Self {
        Self::Tag(tag.id)
    }
}

impl From<&Digest> for Node {
    fn from(digest: &Digest) -> Self {
        Self::Content(digest.id.clone())
    }
}

/// A PNG thumbnail rendered from a digest's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub image: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attr_value_decodes_by_declared_type() {
        assert_eq!(AttrValue::decode(AttrType::Integer, "42"), AttrValue::Integer(42));
        assert_eq!(AttrValue::decode(AttrType::Rational, "2.5"), AttrValue::Rational(2.5));
        assert_eq!(AttrValue::decode(AttrType::Text, "42"), AttrValue::Text("42".into()));
        assert_eq!(
            AttrValue::decode(AttrType::Integer, "1/250"),
            AttrValue::Text("1/250".into())
        );
    }

    #[test]
    fn attr_value_from_json() {
        assert_eq!(AttrValue::from(json!(3000)), AttrValue::Integer(3000));
        assert_eq!(AttrValue::from(json!(5.6)), AttrValue::Rational(5.6));
        assert_eq!(AttrValue::from(json!("Canon")), AttrValue::Text("Canon".into()));
        assert_eq!(AttrValue::from(json!(true)), AttrValue::Text("true".into()));
    }

    #[test]
    fn attr_type_names_round_trip() {
        for kind in [AttrType::Text, AttrType::Integer, AttrType::Rational] {
            assert_eq!(AttrType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AttrType::parse("string"), None);
    }
}
