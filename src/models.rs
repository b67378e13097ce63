//! Core data model for the completion pipeline.
//!
//! Everything here is plain data: the per-keystroke [`Context`] snapshot,
//! the [`Completion`] candidates the sources produce, the tagged
//! [`SourceBatch`] groups flowing out of the merge, and the [`Emission`]
//! values the aggregator hands to the consumer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable snapshot of the edit state at request time.
///
/// Built once per keystroke by the embedder and discarded after one
/// aggregation call. The text immediately before the cursor arrives
/// pre-split into a word run and a symbol run; the worker derives its
/// lowercased anchors from those.
#[derive(Debug, Clone)]
pub struct Context {
    /// Unique id for this keystroke, used to correlate log lines.
    pub change_id: Uuid,
    /// Buffer the cursor lives in.
    pub buf_id: u64,
    /// File backing the buffer, empty for scratch buffers.
    pub filename: String,
    /// File type as the editor reports it.
    pub filetype: String,
    /// Cursor row, zero-based.
    pub row: u32,
    /// Cursor column, zero-based.
    pub col: u32,
    /// Run of word characters immediately before the cursor.
    pub words_before: String,
    /// Run of symbol characters immediately before the cursor.
    pub syms_before: String,
    /// Whether the user asked for completion explicitly.
    pub manual: bool,
}

impl Context {
    /// Snapshot the edit state for one keystroke, minting a fresh change id.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        buf_id: u64,
        filename: impl Into<String>,
        filetype: impl Into<String>,
        row: u32,
        col: u32,
        words_before: impl Into<String>,
        syms_before: impl Into<String>,
        manual: bool,
    ) -> Self {
        Self {
            change_id: Uuid::new_v4(),
            buf_id,
            filename: filename.into(),
            filetype: filetype.into(),
            row,
            col,
            words_before: words_before.into(),
            syms_before: syms_before.into(),
            manual,
        }
    }

    /// Lowercased word run before the cursor, the anchor for word candidates.
    pub fn word_anchor(&self) -> String {
        self.words_before.to_lowercase()
    }

    /// Lowercased symbol run before the cursor, the anchor for symbol candidates.
    pub fn sym_anchor(&self) -> String {
        self.syms_before.to_lowercase()
    }
}

/// Payload applied to the document when a completion is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Edit {
    /// Insert `new_text` at the cursor.
    Plain { new_text: String },
    /// Replace columns `begin..end` on the cursor line with `new_text`.
    Range { new_text: String, begin: u32, end: u32 },
}

impl Edit {
    /// The text this edit would insert.
    pub fn text(&self) -> &str {
        match self {
            Edit::Plain { new_text } => new_text,
            Edit::Range { new_text, .. } => new_text,
        }
    }
}

/// A candidate suggestion. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Short name of the source that produced this candidate.
    pub source: String,
    /// Ranking nudge carried over from the source configuration.
    pub weight_adjust: f32,
    /// Text shown in the menu.
    pub label: String,
    /// Text used for matching and ranking.
    pub sort_by: String,
    /// Payload to apply on acceptance.
    pub edit: Edit,
}

/// Provenance of a batch, decided by the merge.
///
/// Every consumption point matches exhaustively on this so a new source
/// cannot be mishandled silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTag {
    /// Rows fetched from the persistent store. Already vetted and ranked.
    PersistentCache,
    /// Batches replayed from the previous call's buffer.
    ReplayBuffer,
    /// Batches arriving from the live query.
    LiveQuery,
}

/// A tagged group of completions, consumed exactly once per call.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    /// Whether this batch may be buffered for replay and persisted.
    pub cache_eligible: bool,
    /// The candidates, in source order.
    pub items: Vec<Completion>,
}

/// One value of the output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    /// An accepted candidate.
    Item(Completion),
    /// A persistence boundary: the chunk emitted just before this was
    /// flushed to the persistent store. Safe to treat as a checkpoint.
    FlushBoundary,
}

impl Emission {
    /// The completion inside, if this is an item.
    pub fn item(&self) -> Option<&Completion> {
        match self {
            Emission::Item(completion) => Some(completion),
            Emission::FlushBoundary => None,
        }
    }
}
