//! Per-bucket sequence allocation
//!
//! Every prompt gets a bucket directory under the storage root; within a
//! bucket, filenames are derived from a sequence counter that never
//! repeats and never goes backward, across restarts included. Restart
//! recovery is a startup-time reconciliation: scan the directory, take the
//! highest leading numeric prefix, and resume one past it. The scan is the
//! sole recovery mechanism and stays out of the allocation hot path.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

use crate::prompts::Prompt;

struct BucketEntry {
    dir: PathBuf,
    next: AtomicU64,
}

/// Owns every bucket's sequence counter. The bucket table is immutable
/// after the startup scan; the only mutation is the fetch-and-add inside
/// [`BucketAllocator::allocate`], so handlers for the same bucket can run
/// concurrently without ever being handed the same number.
pub struct BucketAllocator {
    buckets: HashMap<String, BucketEntry>,
}

impl BucketAllocator {
    /// Reconcile the storage tree against the prompt set.
    ///
    /// Creates missing bucket directories (with the `sentence.txt`
    /// sidecar recording the prompt). A bucket whose directory cannot be
    /// created or read is logged and excluded; uploads to it fail with
    /// not-found while the rest keep working.
    pub fn scan(storage_root: &Path, prompts: &[Prompt]) -> Result<Self> {
        fs::create_dir_all(storage_root).with_context(|| {
            format!("failed to create storage root {}", storage_root.display())
        })?;

        let mut buckets = HashMap::new();
        for prompt in prompts {
            let dir = storage_root.join(&prompt.id);
            match init_bucket(&dir, &prompt.text) {
                Ok(next) => {
                    buckets.insert(
                        prompt.id.clone(),
                        BucketEntry {
                            dir,
                            next: AtomicU64::new(next),
                        },
                    );
                }
                Err(e) => {
                    warn!(
                        bucket = %prompt.id,
                        dir = %dir.display(),
                        error = %e,
                        "excluding bucket, directory not usable"
                    );
                }
            }
        }

        info!(buckets = buckets.len(), root = %storage_root.display(), "storage ready");
        Ok(Self { buckets })
    }

    /// Reserve the next sequence number in `bucket`, or `None` for an
    /// unknown or excluded bucket. Returns the number and the bucket
    /// directory the file belongs in.
    pub fn allocate(&self, bucket: &str) -> Option<(u64, &Path)> {
        let entry = self.buckets.get(bucket)?;
        let seq = entry.next.fetch_add(1, Ordering::Relaxed);
        Some((seq, &entry.dir))
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Zero-padded filename for a sequence number; five digits and up simply
/// outgrow the padding.
pub fn sequence_filename(seq: u64, extension: &str) -> String {
    format!("{:04}{}", seq, extension)
}

/// Create a fresh bucket directory, or scan an existing one for the next
/// sequence number.
fn init_bucket(dir: &Path, sentence: &str) -> io::Result<u64> {
    if !dir.exists() {
        fs::create_dir(dir)?;
        fs::write(dir.join("sentence.txt"), sentence)?;
        return Ok(0);
    }

    let mut max: Option<u64> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(n) = leading_number(&name.to_string_lossy()) {
            max = Some(max.map_or(n, |m| m.max(n)));
        }
    }
    Ok(max.map_or(0, |m| m + 1))
}

/// Leading numeric prefix of a filename, if any (`0003.wav` -> 3).
fn leading_number(name: &str) -> Option<u64> {
    let end = name
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(name.len());
    name[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn prompt(id: &str) -> Prompt {
        Prompt {
            id: id.to_string(),
            text: format!("sentence for {}", id),
        }
    }

    #[test]
    fn test_fresh_bucket_starts_at_zero() {
        let root = tempfile::tempdir().unwrap();
        let allocator = BucketAllocator::scan(root.path(), &[prompt("greeting")]).unwrap();

        let (seq, dir) = allocator.allocate("greeting").unwrap();
        assert_eq!(seq, 0);
        assert_eq!(dir, root.path().join("greeting"));
        assert_eq!(allocator.allocate("greeting").unwrap().0, 1);
    }

    #[test]
    fn test_fresh_bucket_writes_sentence_sidecar() {
        let root = tempfile::tempdir().unwrap();
        BucketAllocator::scan(root.path(), &[prompt("greeting")]).unwrap();

        let sidecar = fs::read_to_string(root.path().join("greeting/sentence.txt")).unwrap();
        assert_eq!(sidecar, "sentence for greeting");
    }

    #[test]
    fn test_rescan_resumes_past_the_maximum() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("greeting");
        fs::create_dir(&dir).unwrap();
        for name in ["0000.wav", "0001.wav", "0003.wav"] {
            fs::write(dir.join(name), b"x").unwrap();
        }

        let allocator = BucketAllocator::scan(root.path(), &[prompt("greeting")]).unwrap();
        // Max is 3, so the next allocation is 4 even though 2 was skipped.
        assert_eq!(allocator.allocate("greeting").unwrap().0, 4);
    }

    #[test]
    fn test_sidecar_and_junk_names_do_not_confuse_the_scan() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("greeting");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("sentence.txt"), b"hi").unwrap();
        fs::write(dir.join("notes"), b"x").unwrap();
        fs::write(dir.join("0007.webm"), b"x").unwrap();

        let allocator = BucketAllocator::scan(root.path(), &[prompt("greeting")]).unwrap();
        assert_eq!(allocator.allocate("greeting").unwrap().0, 8);
    }

    #[test]
    fn test_unknown_bucket_allocates_nothing() {
        let root = tempfile::tempdir().unwrap();
        let allocator = BucketAllocator::scan(root.path(), &[prompt("greeting")]).unwrap();
        assert!(allocator.allocate("other").is_none());
    }

    #[test]
    fn test_unusable_bucket_is_excluded_not_fatal() {
        let root = tempfile::tempdir().unwrap();
        // A plain file where the bucket directory should be.
        fs::write(root.path().join("broken"), b"not a directory").unwrap();

        let allocator =
            BucketAllocator::scan(root.path(), &[prompt("broken"), prompt("greeting")]).unwrap();
        assert_eq!(allocator.bucket_count(), 1);
        assert!(allocator.allocate("broken").is_none());
        assert!(allocator.allocate("greeting").is_some());
    }

    #[test]
    fn test_concurrent_allocations_never_collide() {
        let root = tempfile::tempdir().unwrap();
        let allocator =
            Arc::new(BucketAllocator::scan(root.path(), &[prompt("greeting")]).unwrap());

        const N: usize = 64;
        let handles: Vec<_> = (0..N)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                std::thread::spawn(move || allocator.allocate("greeting").unwrap().0)
            })
            .collect();

        let mut seen: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        seen.sort_unstable();
        let expected: Vec<u64> = (0..N as u64).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_sequence_filename_padding() {
        assert_eq!(sequence_filename(0, ".wav"), "0000.wav");
        assert_eq!(sequence_filename(42, ".webm"), "0042.webm");
        assert_eq!(sequence_filename(12345, ".wav"), "12345.wav");
    }
}
