//! Scripted collaborator doubles for the aggregation tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::time::sleep;

use completion_mux::cache::PersistentCache;
use completion_mux::config::{MatchOptions, SourceInfo};
use completion_mux::models::{Completion, Context, Edit, Emission, SourceBatch};
use completion_mux::source::{BatchStream, LiveSource};
use completion_mux::worker::{AggregateError, CompletionWorker};

/// Route tracing output of the test run to stderr. Safe to call from
/// every test; repeat initialization is ignored.
pub fn init_test_logging() {
    let _ = completion_mux::logging::init_logger(true, Some("debug"), false);
}

pub fn completion(sort_by: &str) -> Completion {
    Completion {
        source: "lsp".into(),
        weight_adjust: 0.0,
        label: sort_by.to_uppercase(),
        sort_by: sort_by.into(),
        edit: Edit::Plain {
            new_text: sort_by.into(),
        },
    }
}

/// A completion carrying a stale range edit, as a live transport would
/// produce against the document it answered for.
pub fn range_completion(sort_by: &str) -> Completion {
    Completion {
        source: "lsp".into(),
        weight_adjust: 0.0,
        label: sort_by.to_uppercase(),
        sort_by: sort_by.into(),
        edit: Edit::Range {
            new_text: sort_by.into(),
            begin: 0,
            end: 3,
        },
    }
}

pub fn batch(keys: &[&str], cache_eligible: bool) -> SourceBatch {
    SourceBatch {
        cache_eligible,
        items: keys.iter().map(|key| completion(key)).collect(),
    }
}

pub fn eligible(keys: &[&str]) -> SourceBatch {
    batch(keys, true)
}

pub fn ctx(words: &str, manual: bool) -> Context {
    Context::new(1, "src/main.rs", "rust", 0, words.len() as u32, words, "", manual)
}

pub fn worker(
    options: MatchOptions,
    cache: Arc<ScriptedCache>,
    source: Arc<ScriptedSource>,
) -> CompletionWorker {
    CompletionWorker::new(options, SourceInfo::new("lsp", 0.0), cache, source)
        .expect("options are valid")
}

/// Sort keys of the item emissions, flush boundaries skipped.
pub fn item_keys(emissions: &[Emission]) -> Vec<String> {
    emissions
        .iter()
        .filter_map(|emission| emission.item())
        .map(|completion| completion.sort_by.clone())
        .collect()
}

pub fn flush_count(emissions: &[Emission]) -> usize {
    emissions
        .iter()
        .filter(|emission| matches!(emission, Emission::FlushBoundary))
        .count()
}

/// Drain a call that is expected to succeed.
pub async fn collect_ok(
    stream: impl Stream<Item = Result<Emission, AggregateError>>,
) -> Vec<Emission> {
    stream
        .map(|result| result.expect("call should not fail"))
        .collect()
        .await
}

/// Cache double whose freshness verdicts follow a script, one per call;
/// the last verdict repeats once the script runs out.
pub struct ScriptedCache {
    fresh: Mutex<VecDeque<bool>>,
    rows: Vec<Completion>,
    lookup_delay: Duration,
    fail_lookup: bool,
    fail_store: bool,
    pub stored: Mutex<Vec<Vec<Completion>>>,
}

impl ScriptedCache {
    pub fn new(fresh: &[bool], rows: Vec<Completion>) -> Self {
        Self {
            fresh: Mutex::new(fresh.iter().copied().collect()),
            rows,
            lookup_delay: Duration::ZERO,
            fail_lookup: false,
            fail_store: false,
            stored: Mutex::new(Vec::new()),
        }
    }

    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = delay;
        self
    }

    pub fn failing_lookup(mut self) -> Self {
        self.fail_lookup = true;
        self
    }

    pub fn failing_store(mut self) -> Self {
        self.fail_store = true;
        self
    }

    fn next_fresh(&self) -> bool {
        let mut script = self.fresh.lock();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().copied().unwrap_or(false)
        }
    }
}

#[async_trait]
impl PersistentCache for ScriptedCache {
    fn is_fresh(&self, _context: &Context) -> bool {
        self.next_fresh()
    }

    async fn lookup(&self, _context: &Context) -> anyhow::Result<Vec<Completion>> {
        sleep(self.lookup_delay).await;
        if self.fail_lookup {
            anyhow::bail!("scripted lookup failure");
        }
        Ok(self.rows.clone())
    }

    async fn store(&self, _context: &Context, chunk: &[Completion]) -> anyhow::Result<()> {
        if self.fail_store {
            anyhow::bail!("scripted store failure");
        }
        self.stored.lock().push(chunk.to_vec());
        Ok(())
    }
}

/// Live source double: one scripted batch sequence per expected query,
/// each batch preceded by its delay. Queries beyond the script yield
/// nothing.
pub struct ScriptedSource {
    calls: Mutex<VecDeque<Vec<(Duration, SourceBatch)>>>,
    pub queries: AtomicUsize,
}

impl ScriptedSource {
    pub fn silent() -> Self {
        Self::with_calls(Vec::new())
    }

    pub fn with_calls(calls: Vec<Vec<(Duration, SourceBatch)>>) -> Self {
        Self {
            calls: Mutex::new(calls.into_iter().collect()),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl LiveSource for ScriptedSource {
    fn query(&self, _context: &Context, _info: &SourceInfo) -> BatchStream {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let timed = self.calls.lock().pop_front().unwrap_or_default();
        futures::stream::iter(timed)
            .then(|(delay, batch)| async move {
                sleep(delay).await;
                Ok(batch)
            })
            .boxed()
    }
}
