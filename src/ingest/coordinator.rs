use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::database::{paths, Digest, DigestStore, NewDigestRecord, PathIndex, Store, Thumbnail};
use crate::error::{CacheError, Result};
use crate::ingest::hasher::{hash_size, HashSize};
use crate::ingest::jobs::{par_groups, par_map};
use crate::media::{
    AttributeSource, Attributes, ExifTool, InferProbe, MetadataProbe, ProbeInfo, PngThumbnails,
    ThumbnailGenerator,
};

/// What the parallel pass learns about one path.
struct Scanned {
    path: PathBuf,
    content: HashSize,
    info: ProbeInfo,
}

/// Batched ingestion of paths into a [`Store`].
///
/// Hashing, probing, attribute extraction and thumbnail rendering fan out
/// over a fixed-size worker pool. Everything touching the store happens on
/// the calling thread inside one transaction.
pub struct CacheCoordinator {
    pool: ThreadPool,
    probe: Box<dyn MetadataProbe>,
    attributes: Box<dyn AttributeSource>,
    thumbnails: Option<Box<dyn ThumbnailGenerator>>,
    progress: Option<ProgressBar>,
}

impl CacheCoordinator {
    /// A coordinator with `jobs` workers, the `infer` probe, `exiftool`
    /// attributes and PNG thumbnails.
    pub fn new(jobs: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .thread_name(|i| format!("rephile-worker-{}", i))
            .build()?;
        Ok(Self {
            pool,
            probe: Box::new(InferProbe),
            attributes: Box::new(ExifTool::default()),
            thumbnails: Some(Box::new(PngThumbnails::default())),
            progress: None,
        })
    }

    pub fn with_probe(mut self, probe: impl MetadataProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn with_attributes(mut self, source: impl AttributeSource + 'static) -> Self {
        self.attributes = Box::new(source);
        self
    }

    /// Replace the thumbnail renderer; `None` disables thumbnails.
    pub fn with_thumbnails(mut self, generator: Option<Box<dyn ThumbnailGenerator>>) -> Self {
        self.thumbnails = generator;
        self
    }

    /// Ticked once per path hashed.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    pub fn jobs(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Ingest `paths`, returning one outcome per input path in input order.
    ///
    /// Paths already indexed resolve to their stored digest without being
    /// read as long as their length, modification and change times are
    /// unchanged. A path re-hashed to the digest it already had gets its stat
    /// re-recorded so the next build can skip it again. With `force` every
    /// path is hashed and re-probed and stored digests get their metadata
    /// refreshed. A path that cannot be read yields
    /// [`CacheError::PathUnreadable`] at its position while the rest of the
    /// batch proceeds. Store failures abort the call and
    /// nothing is committed.
    pub fn build<P: AsRef<Path>>(
        &self,
        store: &mut Store,
        paths: &[P],
        force: bool,
    ) -> Result<Vec<Result<Digest>>> {
        let absolute: Vec<Result<PathBuf>> = paths.iter().map(|p| paths::absolute(p.as_ref())).collect();

        let tx = store.transaction()?;
        let digests = DigestStore::new(&tx);
        let index = PathIndex::new(&tx);

        let mut outcomes: HashMap<PathBuf, Result<Digest>> = HashMap::new();
        let known = index.known(absolute.iter().flatten())?;
        if !force {
            let stored = digests.lookup_by_hash(known.values().map(|r| r.digest_id.as_str()))?;
            for (path, record) in &known {
                match stored.get(&record.digest_id) {
                    Some(digest) if paths::unchanged(path, record, digest.size) => {
                        outcomes.insert(path.clone(), Ok(digest.clone()));
                    }
                    _ => debug!("{:?} changed on disk since it was indexed", path),
                }
            }
        }

        let mut seen = HashSet::new();
        let pending: Vec<PathBuf> = absolute
            .iter()
            .flatten()
            .filter(|path| !outcomes.contains_key(*path) && seen.insert(*path))
            .cloned()
            .collect();
        info!(
            "Building {} paths: {} cached, {} to scan with {} workers",
            paths.len(),
            outcomes.len(),
            pending.len(),
            self.jobs()
        );

        if let Some(bar) = &self.progress {
            bar.set_length(pending.len() as u64);
        }
        let mut scanned = Vec::with_capacity(pending.len());
        for result in par_map(&self.pool, &pending, |path| self.scan(path)) {
            match result {
                Ok(item) => scanned.push(item),
                Err(err) => {
                    warn!("{}", err);
                    if let Some(path) = err.path().map(Path::to_path_buf) {
                        outcomes.insert(path, Err(err));
                    }
                }
            }
        }

        let stored = digests.lookup_by_hash(scanned.iter().map(|s| s.content.hash.as_str()))?;
        let mut hashes = HashSet::new();
        let targets: Vec<&Scanned> = scanned
            .iter()
            .filter(|s| force || !stored.contains_key(&s.content.hash))
            .filter(|s| hashes.insert(s.content.hash.as_str()))
            .collect();

        let target_paths: Vec<PathBuf> = targets.iter().map(|s| s.path.clone()).collect();
        let attributes = par_groups(&self.pool, &target_paths, |chunk| self.extract(chunk));
        let thumbnails = par_map(&self.pool, &targets, |s| self.render(s));

        let (mut created, mut refreshed) = (Vec::new(), Vec::new());
        for (target, attributes) in targets.iter().zip(attributes) {
            let hash = &target.content.hash;
            // a failed extraction must not wipe what a refresh would replace
            let attributes = match attributes {
                Some(attributes) => attributes,
                None if stored.contains_key(hash) => {
                    digests.attributes_of(hash)?.into_iter().map(|a| (a.name, a.value)).collect()
                }
                None => Vec::new(),
            };
            let record = NewDigestRecord {
                hash: target.content.hash.clone(),
                size: target.content.size,
                ext: target.info.ext.clone(),
                mime: target.info.mime.clone(),
                magic: target.info.magic.clone(),
                attributes,
            };
            if stored.contains_key(&record.hash) {
                refreshed.push(record);
            } else {
                created.push(record);
            }
        }

        let mut by_hash = stored;
        for digest in digests.create_missing(&created)?.into_iter().chain(digests.refresh(&refreshed)?) {
            by_hash.insert(digest.id.clone(), digest);
        }
        for (target, thumbs) in targets.iter().zip(&thumbnails) {
            if !thumbs.is_empty() {
                digests.store_thumbnails(&target.content.hash, thumbs)?;
            }
        }
        info!("{} new digests, {} refreshed", created.len(), refreshed.len());

        let pairs: Vec<(&Path, &str)> =
            scanned.iter().map(|s| (s.path.as_path(), s.content.hash.as_str())).collect();
        index.fresh(&pairs)?;
        let restat: Vec<&Path> = scanned
            .iter()
            .filter(|s| known.get(&s.path).is_some_and(|r| r.digest_id == s.content.hash))
            .map(|s| s.path.as_path())
            .collect();
        index.restat(&restat)?;
        for s in &scanned {
            if let Some(digest) = by_hash.get(&s.content.hash) {
                outcomes.insert(s.path.clone(), Ok(digest.clone()));
            }
        }

        tx.commit()?;
        debug!("Committed batch of {} paths", paths.len());

        Ok(absolute
            .into_iter()
            .map(|path| {
                let path = path?;
                match outcomes.get(&path) {
                    Some(Ok(digest)) => Ok(digest.clone()),
                    Some(Err(err)) => Err(err.duplicate_for_path().unwrap_or_else(|| {
                        CacheError::unreadable(&path, io::Error::other(err.to_string()))
                    })),
                    None => Err(CacheError::unreadable(&path, io::Error::other("path was not resolved"))),
                }
            })
            .collect())
    }

    fn scan(&self, path: &Path) -> Result<Scanned> {
        let content = hash_size(path).map_err(|e| CacheError::unreadable(path, e));
        if let Some(bar) = &self.progress {
            bar.inc(1);
        }
        let content = content?;
        let info = self.probe.probe(path).map_err(|e| CacheError::unreadable(path, e))?;
        Ok(Scanned { path: path.to_path_buf(), content, info })
    }

    /// `None` for every path of a chunk the source failed on.
    fn extract(&self, paths: &[PathBuf]) -> Vec<Option<Attributes>> {
        match self.attributes.attributes(paths) {
            Ok(found) if found.len() == paths.len() => found.into_iter().map(Some).collect(),
            Ok(found) => {
                warn!("Attribute source returned {} results for {} paths", found.len(), paths.len());
                vec![None; paths.len()]
            }
            Err(e) => {
                warn!("Attribute extraction failed for {} paths: {:#}", paths.len(), e);
                vec![None; paths.len()]
            }
        }
    }

    fn render(&self, scanned: &Scanned) -> Vec<Thumbnail> {
        let Some(generator) = &self.thumbnails else {
            return Vec::new();
        };
        if !scanned.info.mime.starts_with("image/") {
            return Vec::new();
        }
        generator.thumbnails(&scanned.path).unwrap_or_else(|e| {
            warn!("No thumbnails for {:?}: {:#}", scanned.path, e);
            Vec::new()
        })
    }
}
