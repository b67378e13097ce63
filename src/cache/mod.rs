//! Persistent completion cache: contract and default disk implementation.

pub mod disk;

pub use disk::DiskCache;

use async_trait::async_trait;

use crate::models::{Completion, Context};

/// Store for completions that survive across calls and across restarts.
///
/// The aggregator consults [`is_fresh`](PersistentCache::is_fresh) once
/// per call, races [`lookup`](PersistentCache::lookup) against the other
/// producers regardless of the verdict, and pushes every non-empty
/// cache-eligible chunk through [`store`](PersistentCache::store).
/// Rows returned by `lookup` are treated as already vetted and ranked:
/// they bypass the acceptance gate entirely, so implementations must only
/// return rows that plausibly match the given context.
#[async_trait]
pub trait PersistentCache: Send + Sync {
    /// Whether the stored rows can serve `context` directly, making a new
    /// live query unnecessary. Must not suspend; the verdict is needed
    /// before any producer starts.
    fn is_fresh(&self, context: &Context) -> bool;

    /// Fetch stored completions ranked for `context`.
    async fn lookup(&self, context: &Context) -> anyhow::Result<Vec<Completion>>;

    /// Persist one chunk of freshly arrived completions.
    async fn store(&self, context: &Context, chunk: &[Completion]) -> anyhow::Result<()>;
}
