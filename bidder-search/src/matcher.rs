use async_trait::async_trait;
use bidder_core::{CoreError, Targets};
use std::ops::Range;
use tokio_util::sync::CancellationToken;

use crate::executor::Executor;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("Search cancelled")]
    Cancelled,
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Decides whether a probe value satisfies a campaign constraint.
#[async_trait]
pub trait Eligibility: Send + Sync {
    /// Empty targets mean "no restriction" and always match.
    async fn matches(
        &self,
        cancel: &CancellationToken,
        probe: i64,
        targets: &Targets,
    ) -> Result<bool, MatchError>;
}

/// Membership test that splits large target lists across the executor's
/// workers. Small lists are scanned inline.
#[derive(Debug, Clone)]
pub struct Matcher {
    executor: Executor,
}

impl Matcher {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    /// More than one element per worker.
    fn runs_parallel(&self, len: usize) -> bool {
        let workers = self.executor.workers();
        workers > 1 && len > workers
    }

    /// One contiguous chunk per worker; the last one absorbs the remainder.
    fn partitions(&self, len: usize) -> Vec<Range<usize>> {
        let workers = self.executor.workers();
        let chunk = len / workers;
        (0..workers)
            .map(|i| {
                let start = i * chunk;
                let end = if i + 1 == workers { len } else { start + chunk };
                start..end
            })
            .collect()
    }
}

#[async_trait]
impl Eligibility for Matcher {
    async fn matches(
        &self,
        cancel: &CancellationToken,
        probe: i64,
        targets: &Targets,
    ) -> Result<bool, MatchError> {
        if cancel.is_cancelled() {
            return Err(MatchError::Cancelled);
        }

        let len = targets.len();
        if len == 0 {
            return Ok(true);
        }

        if !self.runs_parallel(len) {
            return Ok(targets.any_in(0..len, probe));
        }

        let producers = self
            .partitions(len)
            .into_iter()
            .map(|range| {
                let targets = targets.clone();
                range.map(move |i| targets.accepts(i, probe))
            })
            .collect();

        // Dropping `merged` on the early return cancels the other chunks.
        let mut merged = self.executor.fan_in(cancel, producers).take(len);
        while let Some(found) = merged.next().await {
            if found {
                return Ok(true);
            }
        }

        if cancel.is_cancelled() {
            return Err(MatchError::Cancelled);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidder_core::PositionRule;
    use proptest::prelude::*;

    fn publishers(ids: &[i64]) -> Targets {
        Targets::Publishers(ids.to_vec().into())
    }

    fn positions(rules: &[(i64, i64)]) -> Targets {
        Targets::Positions(
            rules
                .iter()
                .map(|(p, d)| PositionRule::new(*p, *d))
                .collect::<Vec<_>>()
                .into(),
        )
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn test_partitions_cover_everything() {
        let matcher = Matcher::new(Executor::new(4));
        let parts = matcher.partitions(10);
        assert_eq!(parts, vec![0..2, 2..4, 4..6, 6..10]);

        let matcher = Matcher::new(Executor::new(3));
        assert_eq!(matcher.partitions(9), vec![0..3, 3..6, 6..9]);
    }

    #[test]
    fn test_parallel_threshold() {
        let matcher = Matcher::new(Executor::new(4));
        assert!(!matcher.runs_parallel(4));
        assert!(matcher.runs_parallel(5));
        assert!(!Matcher::new(Executor::new(1)).runs_parallel(1000));
    }

    #[tokio::test]
    async fn test_empty_targets_match() {
        let matcher = Matcher::new(Executor::new(4));
        let cancel = CancellationToken::new();
        assert_eq!(matcher.matches(&cancel, 1, &publishers(&[])).await, Ok(true));
        assert_eq!(matcher.matches(&cancel, 1, &positions(&[])).await, Ok(true));
    }

    #[tokio::test]
    async fn test_publisher_examples() {
        let cancel = CancellationToken::new();
        for workers in [1, 2, 3] {
            let matcher = Matcher::new(Executor::new(workers));
            assert_eq!(matcher.matches(&cancel, 1, &publishers(&[6, 4, 3, 4, 52, 1, 4])).await, Ok(true));
            assert_eq!(matcher.matches(&cancel, 1, &publishers(&[6, 4, 3, 4, 52, 8, 4])).await, Ok(false));
        }
    }

    #[tokio::test]
    async fn test_position_examples() {
        let cancel = CancellationToken::new();
        for workers in [1, 2] {
            let matcher = Matcher::new(Executor::new(workers));
            assert_eq!(matcher.matches(&cancel, 1, &positions(&[(18, 3), (43, 3), (7, 6)])).await, Ok(true));
            assert_eq!(matcher.matches(&cancel, 1, &positions(&[(18, 3), (43, 3), (8, 6)])).await, Ok(false));
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let matcher = Matcher::new(Executor::new(2));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            matcher.matches(&cancel, 1, &publishers(&[1, 2, 3])).await,
            Err(MatchError::Cancelled)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancelled_during_parallel_search() {
        let matcher = Matcher::new(Executor::new(4));
        let targets = Targets::Publishers((0..4_000_000).collect::<Vec<i64>>().into());
        assert!(matcher.runs_parallel(targets.len()));

        let cancel = CancellationToken::new();
        let search = matcher.matches(&cancel, -1, &targets);
        let cancel_soon = async {
            tokio::task::yield_now().await;
            cancel.cancel();
        };

        let (result, ()) = tokio::join!(search, cancel_soon);
        assert_eq!(result, Err(MatchError::Cancelled));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_large_parallel_search() {
        let matcher = Matcher::new(Executor::new(8));
        let cancel = CancellationToken::new();
        let ids: Vec<i64> = (0..100_000).collect();
        let targets = publishers(&ids);

        assert_eq!(matcher.matches(&cancel, 99_999, &targets).await, Ok(true));
        assert_eq!(matcher.matches(&cancel, 0, &targets).await, Ok(true));
        assert_eq!(matcher.matches(&cancel, 100_000, &targets).await, Ok(false));
    }

    proptest! {
        #[test]
        fn prop_parallel_matches_sequential(
            ids in prop::collection::vec(-50i64..50, 0..64),
            probe in -60i64..60,
            workers in 2usize..9,
        ) {
            let targets = publishers(&ids);
            let expected = ids.contains(&probe) || ids.is_empty();
            let cancel = CancellationToken::new();

            let (sequential, parallel) = block_on(async {
                let sequential = Matcher::new(Executor::new(1)).matches(&cancel, probe, &targets).await;
                let parallel = Matcher::new(Executor::new(workers)).matches(&cancel, probe, &targets).await;
                (sequential, parallel)
            });

            prop_assert_eq!(sequential, Ok(expected));
            prop_assert_eq!(parallel, Ok(expected));
        }

        #[test]
        fn prop_position_window_is_inclusive(
            rules in prop::collection::vec((-100i64..100, 0i64..20), 1..32),
            probe in -130i64..130,
            workers in 1usize..6,
        ) {
            let expected = rules.iter().any(|(p, d)| p - d <= probe && probe <= p + d);
            let targets = positions(&rules);
            let cancel = CancellationToken::new();

            let found = block_on(Matcher::new(Executor::new(workers)).matches(&cancel, probe, &targets));
            prop_assert_eq!(found, Ok(expected));
        }
    }
}
