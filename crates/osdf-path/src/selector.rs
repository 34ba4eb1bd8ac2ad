//! Policy-constrained path selection

use osdf_common::{AtomicCounter, ConnectPoint, Path, PathSelectionAlgo, Policy};
use serde::Serialize;
use tracing::{debug, warn};

/// How a path was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOutcome {
    /// Uniform random pick
    Random,
    /// First candidate visiting the whole partial path
    Satisfied,
    /// No candidate visits the partial path; last candidate returned
    Fallback,
}

/// Selected path plus how it was chosen
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedPath {
    /// The path
    pub path: Path,
    /// Selection outcome
    pub outcome: SelectionOutcome,
}

impl SelectedPath {
    /// False when the partial-path constraint was not honored
    pub fn constraint_met(&self) -> bool {
        self.outcome != SelectionOutcome::Fallback
    }
}

/// Selection counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SelectorStats {
    /// Selections made
    pub selections: u64,
    /// Random picks
    pub random: u64,
    /// Constraint satisfied
    pub satisfied: u64,
    /// Constraint not satisfiable
    pub fallbacks: u64,
    /// Calls with no candidates
    pub empty: u64,
}

/// Picks one path among candidates according to a policy's algorithm
#[derive(Debug, Default)]
pub struct PathSelector {
    selections: AtomicCounter,
    random: AtomicCounter,
    satisfied: AtomicCounter,
    fallbacks: AtomicCounter,
    empty: AtomicCounter,
}

impl PathSelector {
    /// Create selector
    pub fn new() -> Self {
        Self::default()
    }

    /// Select for `policy` using its algorithm and partial path
    pub fn select_for(&self, candidates: &[Path], policy: &Policy) -> Option<SelectedPath> {
        self.select(policy.path_selection(), candidates, policy.partial_path())
    }

    /// Select a path
    ///
    /// `Random` picks uniformly. Every other algorithm, `Ecmp` included,
    /// returns the first candidate whose links touch every point of
    /// `partial_path`, or the last candidate when none does.
    pub fn select(
        &self,
        algo: PathSelectionAlgo,
        candidates: &[Path],
        partial_path: &[ConnectPoint],
    ) -> Option<SelectedPath> {
        if candidates.is_empty() {
            self.empty.inc();
            return None;
        }
        self.selections.inc();

        match algo {
            PathSelectionAlgo::Random => {
                self.random.inc();
                let index = rand::random::<usize>() % candidates.len();
                debug!("Random path {} of {}", index, candidates.len());
                Some(SelectedPath {
                    path: candidates[index].clone(),
                    outcome: SelectionOutcome::Random,
                })
            }
            PathSelectionAlgo::Ecmp
            | PathSelectionAlgo::BestPossiblePath
            | PathSelectionAlgo::OnDemand => Some(self.constrained(candidates, partial_path)),
        }
    }

    fn constrained(&self, candidates: &[Path], partial_path: &[ConnectPoint]) -> SelectedPath {
        if let Some(path) = candidates.iter().find(|p| p.visits_all(partial_path)) {
            self.satisfied.inc();
            return SelectedPath {
                path: path.clone(),
                outcome: SelectionOutcome::Satisfied,
            };
        }

        self.fallbacks.inc();
        let last = &candidates[candidates.len() - 1];
        warn!(
            "No candidate path visits {:?}; falling back to last of {} candidates",
            partial_path.iter().map(|cp| cp.to_string()).collect::<Vec<_>>(),
            candidates.len()
        );
        SelectedPath {
            path: last.clone(),
            outcome: SelectionOutcome::Fallback,
        }
    }

    /// Counter snapshot
    pub fn stats(&self) -> SelectorStats {
        SelectorStats {
            selections: self.selections.get(),
            random: self.random.get(),
            satisfied: self.satisfied.get(),
            fallbacks: self.fallbacks.get(),
            empty: self.empty.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osdf_common::Link;
    use proptest::prelude::*;

    fn cp(dev: &str, port: u32) -> ConnectPoint {
        ConnectPoint::new(dev, port)
    }

    /// s1 -> via -> s4, two hops
    fn two_hop(via: &str) -> Path {
        Path::new(vec![
            Link::new(cp("s1", 1), cp(via, 1)),
            Link::new(cp(via, 2), cp("s4", 1)),
        ])
    }

    #[test]
    fn test_best_possible_path_honors_constraint() {
        let selector = PathSelector::new();
        let paths = vec![two_hop("s2"), two_hop("s3")];

        let chosen = selector
            .select(PathSelectionAlgo::BestPossiblePath, &paths, &[cp("s3", 1)])
            .unwrap();
        assert_eq!(chosen.path, paths[1]);
        assert!(chosen.constraint_met());
    }

    #[test]
    fn test_on_demand_and_ecmp_match_default() {
        let selector = PathSelector::new();
        let paths = vec![two_hop("s2"), two_hop("s3")];
        for algo in [PathSelectionAlgo::OnDemand, PathSelectionAlgo::Ecmp] {
            let chosen = selector.select(algo, &paths, &[cp("s3", 2)]).unwrap();
            assert_eq!(chosen.path, paths[1]);
        }
    }

    #[test]
    fn test_empty_constraint_takes_first() {
        let selector = PathSelector::new();
        let paths = vec![two_hop("s2"), two_hop("s3")];
        let chosen = selector
            .select(PathSelectionAlgo::BestPossiblePath, &paths, &[])
            .unwrap();
        assert_eq!(chosen.path, paths[0]);
    }

    #[test]
    fn test_unsatisfiable_falls_back_to_last() {
        let selector = PathSelector::new();
        let paths = vec![two_hop("s2"), two_hop("s3")];
        let chosen = selector
            .select(PathSelectionAlgo::BestPossiblePath, &paths, &[cp("s9", 1)])
            .unwrap();
        assert_eq!(chosen.path, paths[1]);
        assert_eq!(chosen.outcome, SelectionOutcome::Fallback);
        assert!(!chosen.constraint_met());
        assert_eq!(selector.stats().fallbacks, 1);
    }

    #[test]
    fn test_no_candidates() {
        let selector = PathSelector::new();
        assert!(selector.select(PathSelectionAlgo::Random, &[], &[]).is_none());
        assert!(selector.select(PathSelectionAlgo::BestPossiblePath, &[], &[]).is_none());
        assert_eq!(selector.stats().empty, 2);
        assert_eq!(selector.stats().selections, 0);
    }

    #[test]
    fn test_random_roughly_uniform() {
        let selector = PathSelector::new();
        let paths = vec![two_hop("s2"), two_hop("s3"), two_hop("s5")];
        let mut hits = [0u32; 3];
        for _ in 0..3000 {
            let chosen = selector.select(PathSelectionAlgo::Random, &paths, &[]).unwrap();
            let i = paths.iter().position(|p| *p == chosen.path).unwrap();
            hits[i] += 1;
        }
        for h in hits {
            assert!((700..1300).contains(&h), "skewed distribution {:?}", hits);
        }
        assert_eq!(selector.stats().random, 3000);
    }

    proptest! {
        #[test]
        fn prop_random_returns_member(n in 1usize..8) {
            let selector = PathSelector::new();
            let paths: Vec<Path> = (0..n).map(|i| two_hop(&format!("t{}", i))).collect();
            let chosen = selector.select(PathSelectionAlgo::Random, &paths, &[]).unwrap();
            prop_assert!(paths.contains(&chosen.path));
        }
    }
}
