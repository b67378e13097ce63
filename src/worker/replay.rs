//! Short-lived replay of cache-eligible batches across calls.
//!
//! The buffer is owned by exactly one worker and only ever touched between
//! suspension points; it is the caller's job to never run two calls against
//! the same worker interleaved.

use crate::models::{Completion, Edit, SourceBatch};

/// Batches captured from the previous call, waiting to be replayed once.
#[derive(Debug, Default)]
pub(crate) struct ReplayBuffer {
    batches: Vec<Vec<Completion>>,
}

impl ReplayBuffer {
    /// Drop everything; the buffered batches no longer match the edit state.
    pub fn clear(&mut self) {
        self.batches.clear();
    }

    /// Capture one batch for replay on the next call.
    pub fn append(&mut self, items: Vec<Completion>) {
        self.batches.push(items);
    }

    /// Flatten and sanitize everything buffered into one combined batch,
    /// leaving the buffer empty. The result stays cache-eligible so its
    /// chunks are persisted like any fresh arrival.
    pub fn drain(&mut self) -> SourceBatch {
        let items = self
            .batches
            .drain(..)
            .flatten()
            .map(sanitize)
            .collect();
        SourceBatch {
            cache_eligible: true,
            items,
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Normalize a buffered completion before replay.
///
/// Range payloads were computed against a document state that no longer
/// exists, so they collapse to a plain insert of their text. A missing
/// sort key is rebuilt from the insert text. Idempotent.
pub(crate) fn sanitize(item: Completion) -> Completion {
    let Completion {
        source,
        weight_adjust,
        label,
        sort_by,
        edit,
    } = item;
    let new_text = edit.text().to_owned();
    let sort_by = if sort_by.is_empty() {
        new_text.clone()
    } else {
        sort_by
    };
    Completion {
        source,
        weight_adjust,
        label,
        sort_by,
        edit: Edit::Plain { new_text },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_completion(sort_by: &str) -> Completion {
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

    #[test]
    fn drain_flattens_and_empties() {
        let mut buffer = ReplayBuffer::default();
        buffer.append(vec![range_completion("print"), range_completion("println")]);
        buffer.append(vec![range_completion("panic")]);

        let batch = buffer.drain();
        assert!(batch.cache_eligible);
        assert_eq!(batch.items.len(), 3);
        assert!(buffer.is_empty());
    }

    #[test]
    fn clear_discards_buffered_batches() {
        let mut buffer = ReplayBuffer::default();
        buffer.append(vec![range_completion("print")]);
        buffer.clear();
        assert!(buffer.drain().items.is_empty());
    }

    #[test]
    fn sanitize_collapses_range_edits() {
        let sanitized = sanitize(range_completion("print"));
        assert_eq!(
            sanitized.edit,
            Edit::Plain {
                new_text: "print".into()
            }
        );
    }

    #[test]
    fn sanitize_rebuilds_missing_sort_key() {
        let mut item = range_completion("print");
        item.sort_by = String::new();
        let sanitized = sanitize(item);
        assert_eq!(sanitized.sort_by, "print");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize(range_completion("print"));
        let twice = sanitize(once.clone());
        assert_eq!(once, twice);
    }
}
