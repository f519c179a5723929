//! Cross-source item matching
//!
//! Pairs externally-sourced works with tracked catalog items using an ordered
//! set of identity strategies:
//!
//! 1. byte-equal source link, searched across every local item;
//! 2. byte-equal title, only when no link matched.
//!
//! Within a strategy, local items are scanned in source order and the first
//! hit wins, so ties cannot occur. Title matching is an approximation: two
//! different works sharing a title will be paired.

use crate::model::Item;

/// Identity keys used for matching
pub trait MatchKeys {
    fn source_link(&self) -> &str;
    fn title(&self) -> &str;
}

impl MatchKeys for Item {
    fn source_link(&self) -> &str {
        &self.source_link
    }

    fn title(&self) -> &str {
        &self.title
    }
}

/// Strategy that produced a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    Link,
    Title,
}

/// One local/external pair, as indices into the matcher's inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedPair {
    pub local: usize,
    pub external: usize,
    pub by: MatchedBy,
}

/// Result of matching
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matching {
    /// Paired items
    pub pairs: Vec<MatchedPair>,
    /// External items with no local counterpart: creation candidates
    pub unmatched: Vec<usize>,
    /// External items whose only counterpart was already claimed by an
    /// earlier external item; neither updated nor created
    pub shadowed: Vec<usize>,
}

/// Match `external` items against `local` items
///
/// Each local item is paired with at most one external item, the first one
/// in source order that reaches it. Unmatched local items are not reported:
/// they are left untouched.
pub fn match_items<L: MatchKeys, E: MatchKeys>(local: &[L], external: &[E]) -> Matching {
    let mut claimed = vec![false; local.len()];
    let mut matching = Matching::default();

    for (external_index, candidate) in external.iter().enumerate() {
        let found = local
            .iter()
            .position(|item| item.source_link() == candidate.source_link())
            .map(|index| (index, MatchedBy::Link))
            .or_else(|| {
                local
                    .iter()
                    .position(|item| item.title() == candidate.title())
                    .map(|index| (index, MatchedBy::Title))
            });

        match found {
            Some((local_index, by)) if !claimed[local_index] => {
                claimed[local_index] = true;
                matching.pairs.push(MatchedPair {
                    local: local_index,
                    external: external_index,
                    by,
                });
            }
            Some(_) => matching.shadowed.push(external_index),
            None => matching.unmatched.push(external_index),
        }
    }

    matching
}
