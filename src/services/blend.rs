use crate::models::CandidateList;

/// Merges offline and online lists into one list of at most `k` tracks
///
/// The lists are interleaved pairwise starting with offline, the tail of the
/// longer one is appended, repeats are dropped (first occurrence wins, which
/// favours the offline position for tracks found by both) and the result is
/// cut to `k`. Both sources therefore reach the front of the response even
/// when one is much shorter.
///
/// Never fails: an empty input passes the other one through.
pub fn blend(offline: &CandidateList, online: &CandidateList, k: usize) -> CandidateList {
    if k == 0 {
        return CandidateList::new();
    }

    let offline = offline.as_slice();
    let online = online.as_slice();
    let shared = offline.len().min(online.len());

    let interleaved = offline[..shared]
        .iter()
        .zip(&online[..shared])
        .flat_map(|(off, on)| [*off, *on]);
    let remainder = offline[shared..].iter().chain(&online[shared..]).copied();

    CandidateList::from_ordered(interleaved.chain(remainder)).truncated(k)
}
