use std::cmp::Ordering;
use std::sync::Arc;

use super::similarity::ratio;
use super::{DocIndex, Record};
use crate::caching::{CacheEntry, Refresh, TimedCache};

/// Candidates scoring below this are never considered a match.
pub const ACCEPT_THRESHOLD: f64 = 0.8;

/// How much better than the runner-up the best candidate has to score to be picked.
pub const MIN_MARGIN: f64 = 0.05;

/// The outcome of resolving a query against a [`DocIndex`].
#[derive(Clone, Debug, PartialEq)]
pub enum Match {
    /// The query names a record exactly, ignoring case.
    Exact(Record),
    /// The query did not name a record, but `record` is a clear best guess.
    Approximate {
        record: Record,
        /// The query as it was given.
        query: String,
    },
    /// No record matches, or several match about equally well.
    NotFound,
}

/// Case-folds a query and strips a trailing `()`, so `fs.open()` finds `fs.open`.
pub fn normalize_query(query: &str) -> String {
    let query = query.trim().to_lowercase();
    match query.strip_suffix("()") {
        Some(stripped) => stripped.trim_end().to_owned(),
        None => query,
    }
}

/// Scores all `keys` against `search`, keeping those at or above [`ACCEPT_THRESHOLD`].
pub fn score_keys<'k>(
    keys: impl IntoIterator<Item = &'k str>,
    search: &str,
) -> Vec<(&'k str, f64)> {
    keys.into_iter()
        .map(|key| (key, ratio(key, search)))
        .filter(|(_, score)| *score >= ACCEPT_THRESHOLD)
        .collect()
}

/// Picks the best of the scored candidates, if it is a clear winner.
///
/// The best candidate wins if it is the only one, or if it beats the runner-up by at least
/// [`MIN_MARGIN`]. Equal scores keep their original order.
pub fn pick_best<K>(mut candidates: Vec<(K, f64)>) -> Option<K> {
    candidates.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(Ordering::Equal));

    let mut candidates = candidates.into_iter();
    let (best, best_score) = candidates.next()?;
    match candidates.next() {
        Some((_, second_score)) if best_score < second_score + MIN_MARGIN => None,
        _ => Some(best),
    }
}

/// Resolves `query` against `index`: an exact match if there is one, otherwise a clear best
/// guess among the similar keys.
pub fn resolve_in(index: &DocIndex, query: &str) -> Match {
    let search = normalize_query(query);

    if let Some(record) = index.get(&search) {
        return Match::Exact(record.clone());
    }

    let candidates = score_keys(index.iter().map(|(key, _)| key), &search);
    match pick_best(candidates).and_then(|key| index.get(key)) {
        Some(record) => Match::Approximate {
            record: record.clone(),
            query: query.to_owned(),
        },
        None => Match::NotFound,
    }
}

/// Resolves queries against the latest [`DocIndex`] held by a cache.
#[derive(Debug)]
pub struct ApproximateResolver<R: Refresh<Item = Arc<DocIndex>>> {
    index: TimedCache<R>,
}

impl<R: Refresh<Item = Arc<DocIndex>>> Clone for ApproximateResolver<R> {
    fn clone(&self) -> Self {
        Self {
            index: self.index.clone(),
        }
    }
}

impl<R: Refresh<Item = Arc<DocIndex>>> ApproximateResolver<R> {
    pub fn new(index: TimedCache<R>) -> Self {
        Self { index }
    }

    /// Resolves `query` against the current index.
    ///
    /// This only fails if the index could not be fetched and was never fetched before.
    pub async fn resolve(&self, query: &str) -> CacheEntry<Match> {
        let index = self.index.get().await?;
        let result = resolve_in(&index, query);

        match &result {
            Match::Exact(record) => {
                tracing::info!(search = query, result = %record.name, "event=search");
                metric!(counter("resolve") += 1, "result" => "exact");
            }
            Match::Approximate { record, .. } => {
                tracing::info!(search = query, result = %record.name, "event=search.approx");
                metric!(counter("resolve") += 1, "result" => "approximate");
            }
            Match::NotFound => {
                tracing::warn!(search = query, "event=search.missing");
                metric!(counter("resolve") += 1, "result" => "not_found");
            }
        }

        Ok(result)
    }
}
