use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use memmap2::MmapOptions;
use sha2::{Digest, Sha256};

const MMAP_THRESHOLD: u64 = 500 * 1024 * 1024; // 500 MB

/// Content identity and length of some bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashSize {
    pub hash: String,
    pub size: u64,
}

/// Hash everything `reader` yields.
pub fn hash_reader(reader: impl Read) -> io::Result<HashSize> {
    let mut reader = BufReader::new(reader);
    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];
    let mut size = 0u64;
    loop {
        let count = reader.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        size += count as u64;
        hasher.update(&buffer[..count]);
    }
    Ok(HashSize { hash: hex::encode(hasher.finalize()), size })
}

/// Hash the file at `path`.
pub fn hash_size(path: &Path) -> io::Result<HashSize> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();

    if len > MMAP_THRESHOLD {
        // SAFETY: the map is read once and dropped before returning; a file
        // truncated underneath us is the caller's problem, as with any reader.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        let mut hasher = Sha256::new();
        hasher.update(&mmap[..]);
        return Ok(HashSize { hash: hex::encode(hasher.finalize()), size: mmap.len() as u64 });
    }
    hash_reader(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn known_vector() {
        let got = hash_reader(&b"abc"[..]).unwrap();
        assert_eq!(got, HashSize { hash: ABC_SHA256.into(), size: 3 });
    }

    #[test]
    fn empty_input() {
        let got = hash_reader(io::empty()).unwrap();
        assert_eq!(got.size, 0);
        assert_eq!(got.hash, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[test]
    fn file_matches_stream_across_buffer_boundaries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let bytes: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &bytes).unwrap();

        let from_file = hash_size(&path).unwrap();
        assert_eq!(from_file.size, 50_000);
        assert_eq!(from_file, hash_reader(&bytes[..]).unwrap());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = hash_size(Path::new("/no/such/file")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
