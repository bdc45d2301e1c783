use rayon::prelude::*;
use rayon::ThreadPool;

/// Length of the contiguous chunks `len` items are split into so that each
/// of `workers` gets at most one.
pub fn chunk_size(len: usize, workers: usize) -> usize {
    len.div_ceil(workers.max(1)).max(1)
}

/// Apply `f` to contiguous chunks of `items` on `pool`, one chunk per worker,
/// and flatten the results back into input order.
pub fn par_groups<T, R, F>(pool: &ThreadPool, items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&[T]) -> Vec<R> + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }
    let size = chunk_size(items.len(), pool.current_num_threads());
    let groups: Vec<Vec<R>> = pool.install(|| items.par_chunks(size).map(|chunk| f(chunk)).collect());
    groups.into_iter().flatten().collect()
}

/// [`par_groups`] with `f` applied item by item inside each chunk.
pub fn par_map<T, R, F>(pool: &ThreadPool, items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    par_groups(pool, items, |chunk| chunk.iter().map(&f).collect())
}
