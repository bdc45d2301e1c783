//! Read-only queries for reporting and export.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::database::models::{AttrValue, Digest, Tag};
use crate::database::Store;
use crate::error::Result;

/// Everything the cache knows about one piece of content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestReport {
    #[serde(flatten)]
    pub digest: Digest,
    pub attributes: BTreeMap<String, AttrValue>,
    pub paths: Vec<PathBuf>,
    pub tags: Vec<String>,
}

impl Store {
    /// The digest each path currently points at, in input order. Paths that
    /// are not indexed yield `None`.
    pub fn digests_by_path<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<Option<Digest>>> {
        let known = self.paths().known(paths)?;
        let hashes = known.values().map(|record| record.digest_id.as_str());
        let digests = self.digests().lookup_by_hash(hashes)?;
        paths
            .iter()
            .map(|path| {
                let path = crate::database::paths::absolute(path.as_ref())?;
                Ok(known.get(&path).and_then(|record| digests.get(&record.digest_id)).cloned())
            })
            .collect()
    }

    pub fn digest_attributes(&self, hash: &str) -> Result<BTreeMap<String, AttrValue>> {
        Ok(self
            .digests()
            .attributes_of(hash)?
            .into_iter()
            .map(|attr| (attr.name, attr.value))
            .collect())
    }

    pub fn tags_of(&self, hash: &str) -> Result<Vec<Tag>> {
        self.tags().tags_of(hash)
    }

    pub fn describe(&self, digest: &Digest) -> Result<DigestReport> {
        Ok(DigestReport {
            digest: digest.clone(),
            attributes: self.digest_attributes(&digest.id)?,
            paths: self.paths().paths_of(&digest.id)?.into_iter().map(|p| p.id).collect(),
            tags: self.tags_of(&digest.id)?.into_iter().map(|t| t.name).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{NewDigestRecord, Node};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn report_gathers_attributes_paths_and_tags() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let missing = dir.path().join("missing.jpg");
        fs::write(&a, "jpeg-ish").unwrap();

        let store = Store::open_in_memory().unwrap();
        store
            .digests()
            .create_missing(&[NewDigestRecord {
                hash: "h".into(),
                size: 8,
                ext: Some("jpg".into()),
                mime: "image/jpeg".into(),
                magic: "Image (jpg)".into(),
                attributes: vec![("ISO".into(), AttrValue::Integer(100))],
            }])
            .unwrap();
        store.paths().fresh(&[(&a, "h")]).unwrap();
        let tags = store.tags().ensure(&["holiday"], &BTreeMap::new()).unwrap();
        store.tags().link(&[Node::Content("h".into())], &tags).unwrap();

        let found = store.digests_by_path(&[&missing, &a]).unwrap();
        assert!(found[0].is_none());
        let digest = found[1].clone().unwrap();
        assert_eq!(digest.id, "h");

        let report = store.describe(&digest).unwrap();
        assert_eq!(report.paths, [a.clone()]);
        assert_eq!(report.tags, ["holiday"]);
        assert_eq!(report.attributes["ISO"], AttrValue::Integer(100));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["id"], "h");
        assert_eq!(json["mime"], "image/jpeg");
        assert_eq!(json["attributes"]["ISO"], 100);
    }
}
