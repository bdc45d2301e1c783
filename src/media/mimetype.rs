use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::media::{MetadataProbe, ProbeInfo};

/// How much of a file is inspected for its signature.
const HEAD_LEN: u64 = 8192;

/// Content sniffing via `infer`'s magic-number matchers, with a text
/// fallback for content that has no magic number.
#[derive(Debug, Clone, Copy, Default)]
pub struct InferProbe;

impl MetadataProbe for InferProbe {
    fn probe(&self, path: &Path) -> io::Result<ProbeInfo> {
        let mut head = Vec::with_capacity(HEAD_LEN as usize);
        File::open(path)?.take(HEAD_LEN).read_to_end(&mut head)?;
        Ok(detect(path, &head))
    }
}

pub fn detect(path: &Path, head: &[u8]) -> ProbeInfo {
    let named = path
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .filter(|ext| !ext.is_empty());

    if let Some(kind) = infer::get(head) {
        return ProbeInfo {
            ext: named.or_else(|| Some(kind.extension().to_string())),
            mime: kind.mime_type().to_string(),
            magic: format!("{} {:?} data", kind.extension(), kind.matcher_type()),
        };
    }

    let (mime, magic) = if head.is_empty() {
        ("inode/x-empty", "empty")
    } else if looks_like_text(head) {
        let magic = if head.is_ascii() { "ASCII text" } else { "UTF-8 text" };
        ("text/plain", magic)
    } else {
        ("application/octet-stream", "data")
    };
    ProbeInfo { ext: named, mime: mime.to_string(), magic: magic.to_string() }
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // a multi-byte character cut off by the head limit
        Err(e) => e.error_len().is_none(),
    }
}
