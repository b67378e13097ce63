//! The aggregation worker: one long-lived instance per live source.
//!
//! Every keystroke turns into one call to [`CompletionWorker::work`],
//! which races the replay buffer, the persistent cache and a live query,
//! filters what was not already vetted, enforces the result budget and
//! emits completions interleaved with flush boundaries.

pub mod gate;
mod merge;
mod replay;

use std::sync::Arc;

use futures::FutureExt;
use futures::StreamExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::cache::PersistentCache;
use crate::config::{MatchOptions, SourceInfo};
use crate::metrics::{TimingGuard, metrics};
use crate::models::{Context, Emission, SourceTag};
use crate::source::LiveSource;
use merge::SourceMerge;
use replay::ReplayBuffer;

/// Failure taxonomy for one aggregation call.
///
/// Completions already emitted before the failure remain valid; the error
/// is the terminal value of the stream. Retries, if wanted, belong to the
/// collaborators, not here.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("persistent cache lookup failed: {0}")]
    CacheLookup(anyhow::Error),
    #[error("persistent cache write failed: {0}")]
    CacheStore(anyhow::Error),
    #[error("live completion query failed: {0}")]
    LiveQuery(anyhow::Error),
}

/// How many emissions may sit unconsumed before the call suspends.
const EMISSION_BUFFER: usize = 32;

/// Aggregates completions from replay, cache and live query for one source.
///
/// The worker owns the replay buffer across calls. Calls must not be
/// interleaved: a new context supersedes the previous call, whose stream
/// the consumer simply drops. Dropping the stream quietly winds down the
/// in-flight call at its next emission; nothing leaks.
pub struct CompletionWorker {
    options: Arc<MatchOptions>,
    info: Arc<SourceInfo>,
    cache: Arc<dyn PersistentCache>,
    source: Arc<dyn LiveSource>,
    replay: Arc<Mutex<ReplayBuffer>>,
}

impl CompletionWorker {
    /// Build a worker over the given collaborators, validating the options
    /// up front.
    pub fn new(
        options: MatchOptions,
        info: SourceInfo,
        cache: Arc<dyn PersistentCache>,
        source: Arc<dyn LiveSource>,
    ) -> anyhow::Result<Self> {
        options.validate()?;
        Ok(Self {
            options: Arc::new(options),
            info: Arc::new(info),
            cache,
            source,
            replay: Arc::new(Mutex::new(ReplayBuffer::default())),
        })
    }

    /// Aggregate completions for one keystroke.
    ///
    /// Returns a finite stream of [`Emission`] values: accepted candidates
    /// interleaved with flush boundaries, ending after the merged sources
    /// are exhausted or with one terminal `Err` on collaborator failure.
    pub fn work(&self, context: Context) -> ReceiverStream<Result<Emission, AggregateError>> {
        let (tx, rx) = mpsc::channel(EMISSION_BUFFER);
        let call = Call {
            options: self.options.clone(),
            info: self.info.clone(),
            cache: self.cache.clone(),
            source: self.source.clone(),
            replay: self.replay.clone(),
        };
        tokio::spawn(async move {
            if let Err(err) = call.run(context, &tx).await {
                let _ = tx.send(Err(err)).await;
            }
        });
        ReceiverStream::new(rx)
    }
}

/// Everything one in-flight call needs, detached from the worker so the
/// call can outlive the borrow of `work`.
struct Call {
    options: Arc<MatchOptions>,
    info: Arc<SourceInfo>,
    cache: Arc<dyn PersistentCache>,
    source: Arc<dyn LiveSource>,
    replay: Arc<Mutex<ReplayBuffer>>,
}

impl Call {
    async fn run(
        self,
        context: Context,
        tx: &mpsc::Sender<Result<Emission, AggregateError>>,
    ) -> Result<(), AggregateError> {
        let _timing = TimingGuard::new("aggregate_call");

        let word_anchor = context.word_anchor();
        let sym_anchor = context.sym_anchor();
        let limit = if context.manual {
            usize::MAX
        } else {
            self.options.max_results
        };

        let fresh = self.cache.is_fresh(&context);
        if fresh {
            metrics().record_cache_fresh();
        } else {
            metrics().record_cache_stale();
            // Whatever was buffered no longer matches the edit state.
            self.replay.lock().clear();
        }

        let replayed = self.replay.lock().drain();
        let lookup = {
            let cache = self.cache.clone();
            let lookup_ctx = context.clone();
            async move { cache.lookup(&lookup_ctx).await }.boxed()
        };
        let live = (context.manual || !fresh).then(|| {
            metrics().record_live_query();
            self.source.query(&context, &self.info)
        });

        debug!(
            change_id = %context.change_id,
            fresh,
            querying = live.is_some(),
            replaying = !replayed.items.is_empty(),
            "aggregating completions"
        );

        let mut merged = SourceMerge::new(replayed, lookup, live);
        let mut emitted = 0usize;

        while let Some(next) = merged.next().await {
            let (tag, batch) = next?;

            // Fresh cache-eligible arrivals are kept for the next call.
            // Replayed batches are not re-captured: a buffered batch lives
            // for exactly one further call.
            if batch.cache_eligible && tag == SourceTag::LiveQuery {
                self.replay.lock().append(batch.items.clone());
            }

            for chunk in batch.items.chunks(self.options.max_results) {
                if emitted < limit {
                    for item in chunk {
                        if emitted >= limit {
                            break;
                        }
                        let admit = match tag {
                            // Vetted and ranked when stored; never re-gated.
                            SourceTag::PersistentCache => true,
                            SourceTag::ReplayBuffer | SourceTag::LiveQuery => {
                                let admit =
                                    gate::admit(&word_anchor, &sym_anchor, item, &self.options);
                                if admit {
                                    metrics().record_gate_accept();
                                } else {
                                    metrics().record_gate_reject();
                                }
                                admit
                            }
                        };
                        if admit {
                            if tx.send(Ok(Emission::Item(item.clone()))).await.is_err() {
                                // Consumer hung up; a newer keystroke
                                // superseded this call.
                                return Ok(());
                            }
                            emitted += 1;
                            metrics().record_emitted();
                        }
                    }
                }

                // Persistence is independent of the display budget: every
                // non-empty cache-eligible chunk is flushed, even once the
                // budget is spent.
                if batch.cache_eligible && !chunk.is_empty() {
                    self.cache
                        .store(&context, chunk)
                        .await
                        .map_err(AggregateError::CacheStore)?;
                    metrics().record_flush();
                    if tx.send(Ok(Emission::FlushBoundary)).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }

        debug!(change_id = %context.change_id, emitted, "aggregation call complete");
        Ok(())
    }
}
