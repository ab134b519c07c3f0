//! Collision-free output names.

use std::path::{Path, PathBuf};

/// Width of the numeric suffix.
const SUFFIX_DIGITS: usize = 4;

/// First `<stem>_NNNN<.ext>` next to `path` that does not exist yet.
///
/// An existing `_NNNN` suffix on the stem is replaced rather than stacked,
/// so `data_0003.txt` yields `data_0001.txt` if that name is free.
pub fn unique_file_name(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = strip_counter(&stem);
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    let mut n: u32 = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{base}_{n:0width$}.{ext}", width = SUFFIX_DIGITS),
            None => format!("{base}_{n:0width$}", width = SUFFIX_DIGITS),
        };
        let candidate = parent.join(name);
        if !candidate.is_file() {
            return candidate;
        }
        n = n.saturating_add(1);
    }
}

fn strip_counter(stem: &str) -> &str {
    let bytes = stem.as_bytes();
    if bytes.len() > SUFFIX_DIGITS + 1 {
        let split = bytes.len() - SUFFIX_DIGITS - 1;
        if bytes[split] == b'_' && bytes[split + 1..].iter().all(u8::is_ascii_digit) {
            return &stem[..split];
        }
    }
    stem
}
