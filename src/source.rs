//! Contract for the live completion source.

use futures::stream::BoxStream;

use crate::config::SourceInfo;
use crate::models::{Context, SourceBatch};

/// Asynchronous sequence of result batches from one query.
pub type BatchStream = BoxStream<'static, anyhow::Result<SourceBatch>>;

/// A transport that can answer a completion request with a stream of
/// batches.
///
/// Batches must be yielded in transport arrival order; pulling may
/// suspend at I/O boundaries. The stream is finite: once the transport
/// has nothing more to say it ends, it never blocks forever. A failed
/// pull surfaces as an `Err` item and terminates the call that issued it;
/// batches already yielded remain valid.
///
/// Implementations own all network/IPC detail. The aggregation core only
/// pulls; cancellation of an abandoned query belongs to the supervising
/// layer around the transport.
pub trait LiveSource: Send + Sync {
    /// Issue a completion request for `context` on behalf of the source
    /// identified by `info`.
    fn query(&self, context: &Context, info: &SourceInfo) -> BatchStream;
}
