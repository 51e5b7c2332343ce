//! Update computation
//!
//! WAF Classic sets are changed by lists of INSERT / DELETE updates, not by
//! replacement. These helpers turn (current, desired) into such a list.
//! Contents are sets: order and duplicates carry no meaning. Deletes come
//! first so a batch never transiently exceeds a size limit.

use crate::types::{RegexMatchSetUpdate, RegexMatchTuple, RegexPatternSetUpdate};
use std::collections::HashSet;
use std::hash::Hash;

/// Elements of `old` missing from `new`, and of `new` missing from `old`,
/// each in first-seen order without duplicates
fn set_difference<'a, T: Eq + Hash>(old: &'a [T], new: &'a [T]) -> (Vec<&'a T>, Vec<&'a T>) {
    let old_set: HashSet<&T> = old.iter().collect();
    let new_set: HashSet<&T> = new.iter().collect();

    let mut seen = HashSet::new();
    let removed = old
        .iter()
        .filter(|item| !new_set.contains(item) && seen.insert(*item))
        .collect();

    let mut seen = HashSet::new();
    let added = new
        .iter()
        .filter(|item| !old_set.contains(item) && seen.insert(*item))
        .collect();

    (removed, added)
}

/// Updates turning pattern strings `old` into `new`
pub fn diff_pattern_strings(old: &[String], new: &[String]) -> Vec<RegexPatternSetUpdate> {
    let (removed, added) = set_difference(old, new);

    removed
        .into_iter()
        .map(|p| RegexPatternSetUpdate::delete(p.clone()))
        .chain(added.into_iter().map(|p| RegexPatternSetUpdate::insert(p.clone())))
        .collect()
}

/// Updates turning match tuples `old` into `new`
pub fn diff_match_tuples(old: &[RegexMatchTuple], new: &[RegexMatchTuple]) -> Vec<RegexMatchSetUpdate> {
    let (removed, added) = set_difference(old, new);

    removed
        .into_iter()
        .map(|t| RegexMatchSetUpdate::delete(t.clone()))
        .chain(added.into_iter().map(|t| RegexMatchSetUpdate::insert(t.clone())))
        .collect()
}
