use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::TrackId;

/// A track proposed by the similarity index, with its affinity weight
///
/// Scores are not normalized across source tracks. Higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub track_id: TrackId,
    pub score: f64,
}

impl ScoredCandidate {
    pub fn new(track_id: TrackId, score: f64) -> Self {
        Self { track_id, score }
    }
}

/// Ordered list of track ids without repeats
///
/// Every constructor drops later occurrences of an id already present, so the
/// first position a track reaches is the one it keeps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CandidateList(Vec<TrackId>);

impl CandidateList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a list from an ordered sequence, keeping first occurrences
    pub fn from_ordered<I>(ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<TrackId>,
    {
        let mut seen = HashSet::new();
        let ids = ids
            .into_iter()
            .map(Into::into)
            .filter(|id| seen.insert(*id))
            .collect();
        Self(ids)
    }

    /// Keeps at most the first `k` entries
    pub fn truncated(mut self, k: usize) -> Self {
        self.0.truncate(k);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[TrackId] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrackId> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<TrackId> {
        self.0
    }
}

impl FromIterator<TrackId> for CandidateList {
    fn from_iter<T: IntoIterator<Item = TrackId>>(iter: T) -> Self {
        Self::from_ordered(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ordered_keeps_first_occurrence() {
        let list = CandidateList::from_ordered([3_i64, 1, 3, 2, 1]);
        assert_eq!(list.as_slice(), &[TrackId(3), TrackId(1), TrackId(2)]);
    }

    #[test]
    fn test_truncated_bounds_length() {
        let list = CandidateList::from_ordered([1_i64, 2, 3, 4]).truncated(2);
        assert_eq!(list.len(), 2);
        assert_eq!(list.into_vec(), vec![TrackId(1), TrackId(2)]);
    }

    #[test]
    fn test_truncated_beyond_length_is_noop() {
        let list = CandidateList::from_ordered([1_i64, 2]).truncated(10);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_empty_list() {
        let list = CandidateList::new();
        assert!(list.is_empty());
        assert_eq!(serde_json::to_string(&list).unwrap(), "[]");
    }

    #[test]
    fn test_collect_deduplicates() {
        let list: CandidateList = [TrackId(5), TrackId(5), TrackId(6)].into_iter().collect();
        assert_eq!(list.as_slice(), &[TrackId(5), TrackId(6)]);
    }
}
