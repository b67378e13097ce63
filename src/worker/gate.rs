//! Acceptance gate for candidates that did not come pre-vetted.

use crate::config::MatchOptions;
use crate::fuzzy;
use crate::models::Completion;

/// Decide whether `candidate` may be shown against the current anchors.
///
/// The candidate is first classified by its sort key's leading character:
/// word-ish keys compare against the word anchor, everything else against
/// the symbol anchor. Acceptance then requires all three of:
///
/// 1. similarity ratio at or above the configured cutoff,
/// 2. the key long enough (within `look_ahead` slack) to plausibly match
///    what was typed,
/// 3. the anchor not already starting with the key, so nothing the user
///    has fully typed out is suggested back at them.
///
/// A candidate with an empty sort key is rejected outright rather than
/// allowed to fail the whole stream.
pub fn admit(
    word_anchor: &str,
    sym_anchor: &str,
    candidate: &Completion,
    options: &MatchOptions,
) -> bool {
    let Some(head) = candidate.sort_by.chars().next() else {
        return false;
    };
    let anchor = if fuzzy::is_word_char(head, &options.unifying_chars) {
        word_anchor
    } else {
        sym_anchor
    };

    let key = candidate.sort_by.to_lowercase();
    let ratio = fuzzy::multi_set_ratio(anchor, &key, options.look_ahead);

    ratio >= options.fuzzy_cutoff
        && key.chars().count() + options.look_ahead >= anchor.chars().count()
        && !anchor.starts_with(key.as_str())
}
