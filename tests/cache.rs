use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rephile::database::{AttrValue, Node, Store};
use rephile::ingest::hash_size;
use rephile::media::{AttributeSource, Attributes};
use rephile::{CacheCoordinator, CacheError};
use tempfile::{tempdir, TempDir};

/// Stands in for exiftool: tags every file with its name.
struct NameAttributes;

impl AttributeSource for NameAttributes {
    fn attributes(&self, paths: &[PathBuf]) -> anyhow::Result<Vec<Attributes>> {
        Ok(paths
            .iter()
            .map(|p| {
                let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                vec![("FileTitle".to_string(), AttrValue::Text(name))]
            })
            .collect())
    }
}

fn coordinator(jobs: usize) -> CacheCoordinator {
    CacheCoordinator::new(jobs).unwrap().with_attributes(NameAttributes).with_thumbnails(None)
}

fn write(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn counts(store: &Store) -> (u64, u64) {
    (store.digests().count().unwrap(), store.paths().count().unwrap())
}

#[test]
fn identical_bytes_share_one_digest() {
    let dir = tempdir().unwrap();
    let a = write(&dir, "a.jpg", b"same bytes");
    let b = write(&dir, "b.jpg", b"same bytes");
    let expected = hash_size(&a).unwrap();

    let mut store = Store::open_in_memory().unwrap();
    let out = coordinator(4).build(&mut store, &[&a, &b], false).unwrap();

    let (da, db) = (out[0].as_ref().unwrap(), out[1].as_ref().unwrap());
    assert_eq!(da.id, expected.hash);
    assert_eq!(da.size, expected.size);
    assert_eq!(da, db);
    assert_eq!(counts(&store), (1, 2));

    // the first path's attributes win
    let attrs = store.digest_attributes(&da.id).unwrap();
    assert_eq!(attrs["FileTitle"], AttrValue::Text("a.jpg".into()));
}

#[test]
fn rebuilding_creates_nothing() {
    let dir = tempdir().unwrap();
    let paths: Vec<PathBuf> =
        (0..6).map(|i| write(&dir, &format!("f{i}.txt"), format!("file {}", i % 3).as_bytes())).collect();

    let mut store = Store::open_in_memory().unwrap();
    let first = coordinator(3).build(&mut store, &paths, false).unwrap();
    let before = counts(&store);
    assert_eq!(before, (3, 6));

    let second = coordinator(3).build(&mut store, &paths, false).unwrap();
    assert_eq!(counts(&store), before);
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.as_ref().unwrap(), b.as_ref().unwrap());
    }
}

#[test]
fn forced_refresh_keeps_identity() {
    let dir = tempdir().unwrap();
    let a = write(&dir, "a.txt", b"hello");

    let mut store = Store::open_in_memory().unwrap();
    let first = coordinator(1).build(&mut store, &[&a], false).unwrap().remove(0).unwrap();
    let forced = coordinator(1).build(&mut store, &[&a], true).unwrap().remove(0).unwrap();

    assert_eq!(forced.id, first.id);
    assert_eq!(forced.size, first.size);
    assert_eq!(counts(&store), (1, 1));
}

#[test]
fn overwritten_path_is_repointed_in_place() {
    let dir = tempdir().unwrap();
    let a = write(&dir, "a.jpg", b"first picture bytes");
    let b = write(&dir, "b.jpg", b"first picture bytes");

    let mut store = Store::open_in_memory().unwrap();
    let out = coordinator(2).build(&mut store, &[&a, &b], false).unwrap();
    let h = out[0].as_ref().unwrap().id.clone();
    assert_eq!(out[1].as_ref().unwrap().id, h);
    assert_eq!(counts(&store), (1, 2));

    fs::write(&b, b"an edited picture").unwrap();
    let out = coordinator(2).build(&mut store, &[&b], false).unwrap();
    let h2 = out[0].as_ref().unwrap().id.clone();
    assert_ne!(h2, h);
    assert_eq!(h2, hash_size(&b).unwrap().hash);

    assert_eq!(counts(&store), (2, 2));
    assert_eq!(store.paths().get(&b).unwrap().unwrap().digest_id, h2);
    assert_eq!(store.paths().get(&a).unwrap().unwrap().digest_id, h);
}

#[test]
fn path_rewritten_to_known_content_points_at_that_digest() {
    let dir = tempdir().unwrap();
    let a = write(&dir, "a.txt", b"alpha");
    let b = write(&dir, "b.txt", b"bravo, longer");

    let mut store = Store::open_in_memory().unwrap();
    let out = coordinator(2).build(&mut store, &[&a, &b], false).unwrap();
    let hb = out[1].as_ref().unwrap().id.clone();
    assert_eq!(counts(&store), (2, 2));

    fs::write(&a, b"bravo, longer").unwrap();
    let out = coordinator(2).build(&mut store, &[&a], false).unwrap();
    assert_eq!(out[0].as_ref().unwrap().id, hb);

    assert_eq!(counts(&store), (2, 2));
    assert_eq!(store.paths().get(&a).unwrap().unwrap().digest_id, hb);
    assert_eq!(store.paths().paths_of(&hb).unwrap().len(), 2);
}

#[test]
fn results_follow_input_order_for_any_pool_size() {
    let dir = tempdir().unwrap();
    let paths: Vec<PathBuf> =
        (0..23).map(|i| write(&dir, &format!("{i:02}.bin"), &vec![i as u8; i + 1])).collect();
    let expected: Vec<String> = paths.iter().map(|p| hash_size(p).unwrap().hash).collect();

    for jobs in 1..=8 {
        let mut store = Store::open_in_memory().unwrap();
        let mut shuffled = paths.clone();
        shuffled.reverse();
        let out = coordinator(jobs).build(&mut store, &shuffled, false).unwrap();
        let got: Vec<String> = out.into_iter().map(|r| r.unwrap().id).rev().collect();
        assert_eq!(got, expected, "jobs = {jobs}");
    }
}

#[test]
fn unreadable_path_does_not_sink_the_batch() {
    let dir = tempdir().unwrap();
    let good = write(&dir, "good.txt", b"fine");
    let gone = dir.path().join("gone.txt");

    let mut store = Store::open_in_memory().unwrap();
    let out = coordinator(2).build(&mut store, &[&good, &gone], false).unwrap();

    assert!(out[0].is_ok());
    match &out[1] {
        Err(CacheError::PathUnreadable { path, .. }) => assert_eq!(path, &gone),
        other => panic!("expected PathUnreadable, got {other:?}"),
    }
    assert_eq!(counts(&store), (1, 1));
    assert_eq!(store.digests_by_path(&[&good, &gone]).unwrap()[1], None);
}

#[test]
fn tagging_is_idempotent_and_reported() {
    let dir = tempdir().unwrap();
    let a = write(&dir, "a.txt", b"tagged");

    let mut store = Store::open_in_memory().unwrap();
    let digest = coordinator(1).build(&mut store, &[&a], false).unwrap().remove(0).unwrap();

    let tags = store.tags();
    let described = BTreeMap::from([("animals".to_string(), "Living things".to_string())]);
    let heads = tags.ensure(&["animals"], &described).unwrap();
    let cat = tags.ensure(&["cat"], &BTreeMap::new()).unwrap();

    let tails = [Node::from(&cat[0]), Node::from(&digest)];
    assert_eq!(tags.link(&tails, &heads).unwrap(), 2);
    assert_eq!(tags.link(&tails, &heads).unwrap(), 0);
    assert_eq!(tags.ensure(&["animals", "cat"], &BTreeMap::new()).unwrap().len(), 2);

    let report = store.describe(&digest).unwrap();
    assert_eq!(report.tags, ["animals"]);
    assert_eq!(report.paths, [a.clone()]);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["id"], digest.id.as_str());
    assert_eq!(json["attributes"]["FileTitle"], "a.txt");
}

#[test]
fn cache_survives_reopening() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cache.db");
    let a = write(&dir, "a.txt", b"persisted");

    let digest = {
        let mut store = Store::open(&db).unwrap();
        coordinator(2).build(&mut store, &[&a], false).unwrap().remove(0).unwrap()
    };

    let store = Store::open(&db).unwrap();
    assert_eq!(store.schema_version().unwrap().as_deref(), Some("1"));
    assert_eq!(store.digests_by_path(&[Path::new(&a)]).unwrap(), [Some(digest)]);
}
