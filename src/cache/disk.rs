//! Disk-backed persistent completion cache.
//!
//! Architecture:
//! - Serialization format: bincode (compact binary)
//! - Compression: zstd level 3
//! - Cache location: `<user cache dir>/completion-mux/v1/`
//! - Entry key: blake3 hash of the buffer's file name
//! - Invalidation: format version check + freshness anchor recorded on store
//!
//! Safety:
//! - Graceful degradation: an unreadable, corrupt or version-mismatched
//!   entry reads as empty instead of failing the call
//! - Atomic writes: tmp file + rename to avoid torn entries
//!
//! Entries are small (a few hundred rows at most), so reads happen inline;
//! only the compress-and-write path is pushed onto the blocking pool.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::debug;

use crate::cache::PersistentCache;
use crate::metrics::TimingGuard;
use crate::models::{Completion, Context};

/// Current entry format version.
///
/// Bump on breaking changes to `CacheEntry` to invalidate old entries
/// automatically.
const CACHE_VERSION: u32 = 1;

/// zstd compression level for entry files.
const ZSTD_LEVEL: i32 = 3;

/// Hard cap on rows retained per buffer; oldest rows are evicted first.
const MAX_ROWS: usize = 512;

/// How many decoded entries stay resident in front of the disk.
const MEMORY_ENTRIES: usize = 32;

/// One persisted entry: the rows for a single buffer plus the anchor that
/// was current when they were last stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    version: u32,
    buf_id: u64,
    row: u32,
    word_anchor: String,
    rows: Vec<Completion>,
}

/// Default [`PersistentCache`] implementation backed by compressed entry
/// files, with an LRU of decoded entries in front.
///
/// Freshness policy: never fresh for manual requests; otherwise fresh iff
/// the request is for the same buffer and row as the most recent store and
/// the current word run extends the word run recorded then. Row changes,
/// buffer changes and backspacing past the stored anchor all read as stale.
pub struct DiskCache {
    dir: PathBuf,
    memory: Mutex<LruCache<String, CacheEntry>>,
}

impl DiskCache {
    /// Open the cache in the platform cache directory.
    pub fn new() -> Result<Self> {
        let base = dirs::cache_dir().context("unable to determine user cache directory")?;
        Self::with_root(base.join("completion-mux"))
    }

    /// Open the cache under an explicit root. The versioned subdirectory
    /// is created if missing.
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self> {
        let dir = root.into().join(format!("v{CACHE_VERSION}"));
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create cache directory {}", dir.display()))?;
        let capacity = NonZeroUsize::new(MEMORY_ENTRIES).expect("resident entry cap is non-zero");
        Ok(Self {
            dir,
            memory: Mutex::new(LruCache::new(capacity)),
        })
    }

    fn entry_path(&self, filename: &str) -> PathBuf {
        let key = blake3::hash(filename.as_bytes()).to_hex();
        self.dir.join(format!("{key}.bin"))
    }

    /// Resident entry for `filename`, falling back to disk on a miss.
    fn entry_for(&self, filename: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.memory.lock().get(filename) {
            return Some(entry.clone());
        }
        let entry = read_entry(&self.entry_path(filename))?;
        self.memory.lock().put(filename.to_owned(), entry.clone());
        Some(entry)
    }
}

#[async_trait]
impl PersistentCache for DiskCache {
    fn is_fresh(&self, context: &Context) -> bool {
        if context.manual {
            return false;
        }
        match self.entry_for(&context.filename) {
            Some(entry) => {
                entry.buf_id == context.buf_id
                    && entry.row == context.row
                    && context.word_anchor().starts_with(&entry.word_anchor)
            }
            None => false,
        }
    }

    async fn lookup(&self, context: &Context) -> Result<Vec<Completion>> {
        let _guard = TimingGuard::new("cache_lookup");
        let Some(entry) = self.entry_for(&context.filename) else {
            return Ok(Vec::new());
        };

        let anchor = context.word_anchor();
        let mut rows: Vec<Completion> = entry
            .rows
            .iter()
            .filter(|row| row.sort_by.to_lowercase().starts_with(&anchor))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.weight_adjust
                .partial_cmp(&a.weight_adjust)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.sort_by.cmp(&b.sort_by))
        });

        debug!(
            change_id = %context.change_id,
            rows = rows.len(),
            "served completion rows from cache"
        );
        Ok(rows)
    }

    async fn store(&self, context: &Context, chunk: &[Completion]) -> Result<()> {
        let _guard = TimingGuard::new("cache_store");
        let mut entry = self
            .entry_for(&context.filename)
            .unwrap_or_else(|| CacheEntry {
                version: CACHE_VERSION,
                buf_id: context.buf_id,
                row: context.row,
                word_anchor: String::new(),
                rows: Vec::new(),
            });

        entry.buf_id = context.buf_id;
        entry.row = context.row;
        entry.word_anchor = context.word_anchor();

        for item in chunk {
            // Re-stored rows move to the back so eviction drops stale ones.
            if let Some(pos) = entry
                .rows
                .iter()
                .position(|row| row.sort_by == item.sort_by && row.label == item.label)
            {
                entry.rows.remove(pos);
            }
            entry.rows.push(item.clone());
        }
        if entry.rows.len() > MAX_ROWS {
            let excess = entry.rows.len() - MAX_ROWS;
            entry.rows.drain(..excess);
        }

        let path = self.entry_path(&context.filename);
        let to_write = entry.clone();
        task::spawn_blocking(move || write_entry(&path, &to_write))
            .await
            .context("cache store task failed")??;

        self.memory.lock().put(context.filename.clone(), entry);
        debug!(change_id = %context.change_id, stored = chunk.len(), "persisted completion chunk");
        Ok(())
    }
}

/// Decode one entry file. Any failure, including a format version
/// mismatch, reads as "no entry".
fn read_entry(path: &Path) -> Option<CacheEntry> {
    let bytes = fs::read(path).ok()?;
    let decoded = zstd::decode_all(&bytes[..]).ok()?;
    let entry: CacheEntry = bincode::deserialize(&decoded).ok()?;
    if entry.version != CACHE_VERSION {
        debug!(found = entry.version, expected = CACHE_VERSION, "discarding cache entry version");
        return None;
    }
    Some(entry)
}

fn write_entry(path: &Path, entry: &CacheEntry) -> Result<()> {
    let encoded = bincode::serialize(entry).context("failed to encode cache entry")?;
    let compressed =
        zstd::encode_all(&encoded[..], ZSTD_LEVEL).context("failed to compress cache entry")?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &compressed)
        .with_context(|| format!("failed to write cache entry {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move cache entry into place at {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Edit;

    fn completion(sort_by: &str, weight: f32) -> Completion {
        Completion {
            source: "lsp".into(),
            weight_adjust: weight,
            label: sort_by.to_uppercase(),
            sort_by: sort_by.into(),
            edit: Edit::Plain {
                new_text: sort_by.into(),
            },
        }
    }

    fn ctx(words: &str, row: u32, manual: bool) -> Context {
        Context::new(7, "src/main.rs", "rust", row, words.len() as u32, words, "", manual)
    }

    #[tokio::test]
    async fn stored_rows_come_back_prefix_filtered() {
        let root = tempfile::tempdir().unwrap();
        let cache = DiskCache::with_root(root.path()).unwrap();

        let store_ctx = ctx("pr", 3, false);
        cache
            .store(
                &store_ctx,
                &[completion("print", 0.0), completion("assert", 0.0)],
            )
            .await
            .unwrap();

        let rows = cache.lookup(&ctx("pri", 3, false)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sort_by, "print");
    }

    #[tokio::test]
    async fn heavier_rows_rank_first() {
        let root = tempfile::tempdir().unwrap();
        let cache = DiskCache::with_root(root.path()).unwrap();

        let store_ctx = ctx("p", 0, false);
        cache
            .store(
                &store_ctx,
                &[
                    completion("panic", 0.0),
                    completion("print", 1.5),
                    completion("parse", 0.5),
                ],
            )
            .await
            .unwrap();

        let rows = cache.lookup(&ctx("p", 0, false)).await.unwrap();
        let keys: Vec<&str> = rows.iter().map(|row| row.sort_by.as_str()).collect();
        assert_eq!(keys, vec!["print", "parse", "panic"]);
    }

    #[tokio::test]
    async fn freshness_tracks_forward_typing_on_one_row() {
        let root = tempfile::tempdir().unwrap();
        let cache = DiskCache::with_root(root.path()).unwrap();

        cache
            .store(&ctx("pri", 3, false), &[completion("print", 0.0)])
            .await
            .unwrap();

        assert!(cache.is_fresh(&ctx("prin", 3, false)), "continuation is fresh");
        assert!(cache.is_fresh(&ctx("pri", 3, false)), "same anchor is fresh");
        assert!(!cache.is_fresh(&ctx("pr", 3, false)), "backspace is stale");
        assert!(!cache.is_fresh(&ctx("prin", 4, false)), "row change is stale");
        assert!(!cache.is_fresh(&ctx("prin", 3, true)), "manual is never fresh");
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let root = tempfile::tempdir().unwrap();
        {
            let cache = DiskCache::with_root(root.path()).unwrap();
            cache
                .store(&ctx("pri", 3, false), &[completion("print", 0.0)])
                .await
                .unwrap();
        }

        let reopened = DiskCache::with_root(root.path()).unwrap();
        let rows = reopened.lookup(&ctx("pri", 3, false)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(reopened.is_fresh(&ctx("print", 3, false)));
    }

    #[tokio::test]
    async fn corrupt_entry_reads_as_empty() {
        let root = tempfile::tempdir().unwrap();
        let cache = DiskCache::with_root(root.path()).unwrap();
        let lookup_ctx = ctx("pri", 3, false);

        fs::write(cache.entry_path(&lookup_ctx.filename), b"not an entry").unwrap();

        let rows = cache.lookup(&lookup_ctx).await.unwrap();
        assert!(rows.is_empty());
        assert!(!cache.is_fresh(&lookup_ctx));
    }

    #[tokio::test]
    async fn restored_rows_are_deduplicated() {
        let root = tempfile::tempdir().unwrap();
        let cache = DiskCache::with_root(root.path()).unwrap();

        cache
            .store(&ctx("pr", 3, false), &[completion("print", 0.0)])
            .await
            .unwrap();
        cache
            .store(&ctx("pri", 3, false), &[completion("print", 2.0)])
            .await
            .unwrap();

        let rows = cache.lookup(&ctx("pri", 3, false)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].weight_adjust, 2.0);
    }
}
