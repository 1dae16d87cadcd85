//! Choosing the occurrence that represents an anchor.

use serde::{Deserialize, Serialize};

use super::MatchSet;
use crate::models::geometry::{PointF, RectangleF};

/// Picks one candidate out of an anchor's match-sets.
pub trait CandidateRanker {
    /// Index of the representative candidate.
    ///
    /// `expected` is where the anchor's primary rectangle would be if
    /// nothing had moved (its authored position plus any parent shift).
    fn select(&self, candidates: &[MatchSet], expected: PointF) -> Option<usize>;
}

/// Built-in ranking policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingPolicy {
    /// The last candidate in page order.
    #[default]
    Last,
    /// The first candidate in page order.
    First,
    /// The candidate closest to the expected position; earlier wins ties.
    NearestToAuthored,
}

impl CandidateRanker for RankingPolicy {
    fn select(&self, candidates: &[MatchSet], expected: PointF) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        match self {
            RankingPolicy::Last => Some(candidates.len() - 1),
            RankingPolicy::First => Some(0),
            RankingPolicy::NearestToAuthored => {
                let distance = |set: &MatchSet| {
                    let p = set.primary().location();
                    (p.x - expected.x).powi(2) + (p.y - expected.y).powi(2)
                };
                candidates
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| distance(a).total_cmp(&distance(b)))
                    .map(|(i, _)| i)
            }
        }
    }
}

impl<R: CandidateRanker + ?Sized> CandidateRanker for &R {
    fn select(&self, candidates: &[MatchSet], expected: PointF) -> Option<usize> {
        (**self).select(candidates, expected)
    }
}

impl<R: CandidateRanker + ?Sized> CandidateRanker for Box<R> {
    fn select(&self, candidates: &[MatchSet], expected: PointF) -> Option<usize> {
        (**self).select(candidates, expected)
    }
}

/// Primary rectangle and index of the representative candidate.
pub fn select_representative<R: CandidateRanker + ?Sized>(
    ranker: &R,
    candidates: &[MatchSet],
    expected: PointF,
) -> Option<(RectangleF, usize)> {
    let index = ranker.select(candidates, expected)?;
    candidates.get(index).map(|set| (set.primary(), index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<MatchSet> {
        [10.0, 50.0, 90.0]
            .iter()
            .map(|&y| MatchSet::new(RectangleF::new(5.0, y, 20.0, 8.0), vec![]))
            .collect()
    }

    #[test]
    fn test_default_policy_picks_last() {
        let (rect, index) =
            select_representative(&RankingPolicy::default(), &candidates(), PointF::default())
                .unwrap();
        assert_eq!(index, 2);
        assert_eq!(rect.location(), PointF::new(5.0, 90.0));
    }

    #[test]
    fn test_first_and_nearest() {
        let sets = candidates();
        assert_eq!(RankingPolicy::First.select(&sets, PointF::default()), Some(0));
        assert_eq!(
            RankingPolicy::NearestToAuthored.select(&sets, PointF::new(5.0, 55.0)),
            Some(1)
        );
    }

    #[test]
    fn test_empty_candidates() {
        assert_eq!(
            select_representative(&RankingPolicy::Last, &[], PointF::default()),
            None
        );
    }

    #[test]
    fn test_custom_ranker() {
        struct Second;
        impl CandidateRanker for Second {
            fn select(&self, candidates: &[MatchSet], _expected: PointF) -> Option<usize> {
                (candidates.len() > 1).then_some(1)
            }
        }
        let boxed: Box<dyn CandidateRanker> = Box::new(Second);
        assert_eq!(boxed.select(&candidates(), PointF::default()), Some(1));
    }
}
