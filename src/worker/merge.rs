//! Race-then-drain merge of the three completion producers.
//!
//! Phase 1 starts the replayed batch, the persistent-cache lookup and the
//! first pull of the live query together and yields each as it completes,
//! so the fastest source bounds latency instead of the slowest. Phase 2
//! begins only after all three have fired and drains whatever else the
//! live query produces, strictly in arrival order. No batch is dropped.

use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, Stream, StreamExt};

use super::AggregateError;
use crate::models::{Completion, SourceBatch, SourceTag};
use crate::source::BatchStream;

type RaceFuture = BoxFuture<'static, Result<Arrival, AggregateError>>;

/// Outcome of one Phase-1 producer.
enum Arrival {
    /// A producer that yields exactly one batch.
    Ready(SourceTag, SourceBatch),
    /// The live query's first batch, carrying the stream back for Phase 2.
    LiveHead {
        first: SourceBatch,
        rest: Option<BatchStream>,
    },
}

/// Merged view over the three producers of one aggregation call.
pub(crate) struct SourceMerge {
    race: FuturesUnordered<RaceFuture>,
    tail: Option<BatchStream>,
}

impl SourceMerge {
    /// Start all three producers.
    ///
    /// `live` is `None` when no query is issued for this call; the live
    /// slot then resolves immediately with an empty default batch.
    pub fn new(
        replayed: SourceBatch,
        lookup: BoxFuture<'static, anyhow::Result<Vec<Completion>>>,
        live: Option<BatchStream>,
    ) -> Self {
        let race = FuturesUnordered::new();

        race.push(async move { Ok(Arrival::Ready(SourceTag::ReplayBuffer, replayed)) }.boxed());

        race.push(
            async move {
                let items = lookup.await.map_err(AggregateError::CacheLookup)?;
                let batch = SourceBatch {
                    cache_eligible: false,
                    items,
                };
                Ok(Arrival::Ready(SourceTag::PersistentCache, batch))
            }
            .boxed(),
        );

        race.push(
            async move {
                match live {
                    Some(mut stream) => match stream.next().await {
                        Some(Ok(first)) => Ok(Arrival::LiveHead {
                            first,
                            rest: Some(stream),
                        }),
                        Some(Err(err)) => Err(AggregateError::LiveQuery(err)),
                        None => Ok(Arrival::LiveHead {
                            first: SourceBatch::default(),
                            rest: None,
                        }),
                    },
                    None => Ok(Arrival::LiveHead {
                        first: SourceBatch::default(),
                        rest: None,
                    }),
                }
            }
            .boxed(),
        );

        Self { race, tail: None }
    }
}

impl Stream for SourceMerge {
    type Item = Result<(SourceTag, SourceBatch), AggregateError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            // Phase 1: yield each producer as it completes.
            if !this.race.is_empty() {
                match Pin::new(&mut this.race).poll_next(cx) {
                    Poll::Ready(Some(Ok(Arrival::Ready(tag, batch)))) => {
                        return Poll::Ready(Some(Ok((tag, batch))));
                    }
                    Poll::Ready(Some(Ok(Arrival::LiveHead { first, rest }))) => {
                        this.tail = rest;
                        return Poll::Ready(Some(Ok((SourceTag::LiveQuery, first))));
                    }
                    Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                    Poll::Ready(None) => continue,
                    Poll::Pending => return Poll::Pending,
                }
            }

            // Phase 2: strict arrival-order drain of the remaining live
            // batches.
            return match this.tail.as_mut() {
                Some(tail) => match tail.as_mut().poll_next(cx) {
                    Poll::Ready(Some(Ok(batch))) => {
                        Poll::Ready(Some(Ok((SourceTag::LiveQuery, batch))))
                    }
                    Poll::Ready(Some(Err(err))) => {
                        Poll::Ready(Some(Err(AggregateError::LiveQuery(err))))
                    }
                    Poll::Ready(None) => Poll::Ready(None),
                    Poll::Pending => Poll::Pending,
                },
                None => Poll::Ready(None),
            };
        }
    }
}
