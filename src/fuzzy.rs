//! Multiset similarity scoring and word-character classification.
//!
//! The ratio here is deliberately cheap: no alignment, no automaton, just
//! character-count overlap with a bounded tolerance for trailing extras.
//! It runs once per candidate per keystroke, so constant factors matter
//! more than metric sophistication.

use rustc_hash::{FxHashMap, FxHashSet};

/// Whether `c` belongs to a word run under the configured unifying set.
pub fn is_word_char(c: char, unifying_chars: &FxHashSet<char>) -> bool {
    c.is_alphanumeric() || unifying_chars.contains(&c)
}

/// Multiset overlap ratio between two strings, in `[0, 1]`.
///
/// The longer string is first truncated to `len(shorter) + look_ahead`
/// characters, so a candidate may carry up to `look_ahead` trailing
/// characters beyond the typed text without being penalized for them.
/// The score is the Dice coefficient over character multisets of what
/// remains: `2 * overlap / (len(a) + len(b))`.
///
/// Two empty strings score `1.0`; an empty string against a non-empty one
/// scores `0.0`. The score is symmetric in its arguments and grows
/// monotonically with shared-character overlap.
pub fn multi_set_ratio(lhs: &str, rhs: &str, look_ahead: usize) -> f32 {
    let l: Vec<char> = lhs.chars().collect();
    let r: Vec<char> = rhs.chars().collect();
    let (shorter, longer) = if l.len() <= r.len() { (&l, &r) } else { (&r, &l) };
    let cap = shorter.len().saturating_add(look_ahead);
    let longer = &longer[..longer.len().min(cap)];

    if shorter.is_empty() && longer.is_empty() {
        return 1.0;
    }

    let mut counts: FxHashMap<char, usize> = FxHashMap::default();
    for &c in shorter.iter() {
        *counts.entry(c).or_insert(0) += 1;
    }
    let mut overlap = 0usize;
    for &c in longer.iter() {
        if let Some(n) = counts.get_mut(&c) {
            if *n > 0 {
                *n -= 1;
                overlap += 1;
            }
        }
    }

    (2 * overlap) as f32 / (shorter.len() + longer.len()) as f32
}
